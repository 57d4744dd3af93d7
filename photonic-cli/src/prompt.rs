//! Interactive credential prompt.

use std::io;
use std::path::PathBuf;

use console::style;
use dialoguer::{Input, Password};
use photonic::auth::{CredentialPrompt, Credentials};

/// Asks for the portal login on the terminal.
pub struct TerminalPrompt {
    credentials_path: PathBuf,
}

impl TerminalPrompt {
    pub fn new(credentials_path: PathBuf) -> Self {
        Self { credentials_path }
    }
}

impl CredentialPrompt for TerminalPrompt {
    fn prompt(&self) -> io::Result<Credentials> {
        println!();
        println!("{}", style("Portal login required").bold());
        println!(
            "Credentials will be saved to {}",
            self.credentials_path.display()
        );
        println!();

        let username: String = Input::new()
            .with_prompt("Email")
            .interact_text()
            .map_err(io::Error::other)?;
        let password = Password::new()
            .with_prompt("Password")
            .interact()
            .map_err(io::Error::other)?;

        Ok(Credentials::new(username.trim(), password))
    }
}

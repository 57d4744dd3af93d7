//! Helpers shared by unit tests.

use std::path::Path;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use crate::auth::{CachedToken, CredentialStore, Credentials, NoPrompt, PortalClient, TokenStore};
use crate::config::PortalConfig;

/// Build an unsigned JWT whose payload carries `exp`.
pub(crate) fn make_jwt(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"user_id":42,"exp":{}}}"#, exp));
    format!("{}.{}.signature", header, payload)
}

/// A JWT valid for the next hour.
pub(crate) fn fresh_jwt() -> String {
    make_jwt(Utc::now().timestamp() + 3600)
}

/// A client for `base_url` that already holds a usable token, so no login
/// request is made.
pub(crate) fn logged_in_client(base_url: &str, state_dir: &Path) -> Arc<PortalClient> {
    let config = PortalConfig::default()
        .with_base_url(base_url)
        .with_state_dir(state_dir);
    CredentialStore::new(&config.credentials_path)
        .save(&Credentials::new("dr@example.com", "hunter2"))
        .unwrap();
    TokenStore::new(&config.token_path)
        .save(&CachedToken::from_jwt(fresh_jwt()).unwrap())
        .unwrap();
    Arc::new(PortalClient::new(&config, Arc::new(NoPrompt)).unwrap())
}

/// A server that reads each request, writes `reply` (possibly nothing, or an
/// incomplete response) and then holds the connection open without
/// answering further. Returns its base URL.
pub(crate) async fn stalling_server(reply: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut request = [0u8; 4096];
            let _ = socket.read(&mut request).await;
            let _ = socket.write_all(&reply).await;
            held.push(socket);
        }
    });
    format!("http://{}", addr)
}

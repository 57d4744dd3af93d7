//! The shared, authenticated portal client.

use std::sync::Arc;

use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::multipart::Form;
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::credentials::{CredentialPrompt, CredentialStore, Credentials};
use super::error::{AuthError, ClientError, RequestError};
use super::session::{AuthState, Session};
use super::token::{CachedToken, TokenStore};
use crate::config::{Endpoints, PortalConfig};
use crate::store::JsonFileStore;

/// Body of the login endpoint's JSON response.
#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    status: serde_json::Value,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Authenticated HTTP client for one portal.
///
/// Share it as `Arc<PortalClient>`. All workers see the same token; when it
/// needs refreshing, exactly one of them logs in while the others wait and
/// reuse the result.
pub struct PortalClient {
    http: reqwest::Client,
    endpoints: Endpoints,
    login_timeout: std::time::Duration,
    credential_store: CredentialStore,
    token_store: TokenStore,
    prompt: Arc<dyn CredentialPrompt>,
    session: RwLock<Session>,
    refresh: Mutex<()>,
}

impl PortalClient {
    /// Build a client, loading stored credentials and the cached token.
    ///
    /// If no credentials are stored, `prompt` is asked for them and the
    /// answer is saved. A cached token that is still usable will be reused.
    pub fn new(
        config: &PortalConfig,
        prompt: Arc<dyn CredentialPrompt>,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(format!("photonic/{}", crate::VERSION))
            .build()?;

        let credential_store = CredentialStore::new(&config.credentials_path);
        let token_store = TokenStore::new(&config.token_path);

        let credentials = match load_or_warn(&credential_store) {
            Some(credentials) => credentials,
            None => {
                let credentials = prompt.prompt().map_err(ClientError::Prompt)?;
                credential_store.save(&credentials)?;
                info!(path = %credential_store.path().display(), "Saved credentials");
                credentials
            }
        };

        let token = load_or_warn(&token_store);
        if let Some(token) = token.as_ref().filter(|t| t.is_usable()) {
            debug!(expires = %token.expires_display(), "Reusing cached token");
        }

        Ok(Self {
            http,
            endpoints: config.endpoints(),
            login_timeout: config.login_timeout,
            credential_store,
            token_store,
            prompt,
            session: RwLock::new(Session::new(credentials, token)),
            refresh: Mutex::new(()),
        })
    }

    /// Portal endpoint URLs.
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Current state of the failure latch.
    pub fn auth_state(&self) -> AuthState {
        self.session.read().state.clone()
    }

    pub fn is_poisoned(&self) -> bool {
        self.session.read().state.is_poisoned()
    }

    /// Authenticated GET with extra headers (e.g. `Range`).
    pub async fn authenticated_get(
        &self,
        url: &str,
        headers: HeaderMap,
    ) -> Result<Response, RequestError> {
        let token = self.bearer_token().await?;
        let response = self
            .http
            .get(url)
            .headers(headers)
            .header(AUTHORIZATION, authorization_value(&token)?)
            .send()
            .await?;
        self.check_unauthorized(&response, &token).await;
        Ok(response)
    }

    /// Authenticated multipart POST.
    pub async fn authenticated_post(&self, url: &str, form: Form) -> Result<Response, RequestError> {
        let token = self.bearer_token().await?;
        let response = self
            .http
            .post(url)
            .header(AUTHORIZATION, authorization_value(&token)?)
            .multipart(form)
            .send()
            .await?;
        self.check_unauthorized(&response, &token).await;
        Ok(response)
    }

    /// Make sure a usable token is held, logging in if needed.
    ///
    /// Never touches the network while the session is poisoned. Concurrent
    /// callers that all find the token stale trigger a single login.
    pub async fn ensure_authenticated(&self) -> Result<(), AuthError> {
        let observed = {
            let session = self.session.read();
            session.check_latch()?;
            if session.usable_token().is_some() {
                return Ok(());
            }
            session.generation
        };

        let _refresh = self.refresh.lock().await;

        {
            let session = self.session.read();
            session.check_latch()?;
            if session.usable_token().is_some() {
                return Ok(());
            }
            if session.generation != observed {
                if let Some(err) = &session.last_failure {
                    return Err(err.clone());
                }
            }
        }

        self.login().await.map(|_| ())
    }

    /// Log in now, regardless of the current token.
    pub async fn authenticate(&self) -> Result<(), AuthError> {
        let _refresh = self.refresh.lock().await;
        self.session.read().check_latch()?;
        self.login().await.map(|_| ())
    }

    /// Forget stored credentials and token, clear the latch, ask for new
    /// credentials and log in with them.
    pub async fn reset_credentials(&self) -> Result<(), ClientError> {
        let _refresh = self.refresh.lock().await;

        self.credential_store.clear()?;
        self.token_store.clear()?;
        info!("Cleared stored credentials and token");

        let prompt = Arc::clone(&self.prompt);
        let credentials = tokio::task::spawn_blocking(move || prompt.prompt())
            .await
            .map_err(|e| ClientError::Prompt(std::io::Error::other(e)))?
            .map_err(ClientError::Prompt)?;
        self.credential_store.save(&credentials)?;

        self.session.write().reset(credentials);
        self.login().await?;
        Ok(())
    }

    async fn bearer_token(&self) -> Result<CachedToken, AuthError> {
        self.ensure_authenticated().await?;
        self.session
            .read()
            .usable_token()
            .cloned()
            .ok_or(AuthError::NoToken)
    }

    /// One login round-trip. Callers must hold the refresh lock.
    async fn login(&self) -> Result<CachedToken, AuthError> {
        let credentials = self.session.read().credentials.clone();
        info!(user = %credentials.username, "Authenticating");

        let outcome = self.request_token(&credentials).await;
        self.session.write().record_login(&outcome);

        match &outcome {
            Ok(token) => {
                info!(expires = %token.expires_display(), "Authenticated");
                if let Err(e) = self.token_store.save(token) {
                    warn!(error = %e, "Failed to persist token");
                }
            }
            Err(AuthError::CredentialsInvalid(reason)) => {
                warn!(%reason, "Login rejected; automatic re-authentication disabled");
                if let Err(e) = self.token_store.clear() {
                    warn!(error = %e, "Failed to remove cached token");
                }
            }
            Err(e) => warn!(error = %e, "Login failed"),
        }

        outcome
    }

    async fn request_token(&self, credentials: &Credentials) -> Result<CachedToken, AuthError> {
        let form = Form::new()
            .text("email", credentials.username.clone())
            .text("password", credentials.password.clone());

        let response = self
            .http
            .post(self.endpoints.login())
            .header(ACCEPT, "application/json")
            .multipart(form)
            .timeout(self.login_timeout)
            .send()
            .await
            .map_err(|e| AuthError::Authentication(format!("login request failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AuthError::CredentialsInvalid(
                "rate limited by the portal; the account may be temporarily locked".to_string(),
            ));
        }
        if !status.is_success() {
            return Err(AuthError::Authentication(format!(
                "login returned HTTP {}",
                status
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| AuthError::Authentication(format!("failed to read login response: {}", e)))?;
        let login: LoginResponse = serde_json::from_slice(&body)
            .map_err(|e| AuthError::Authentication(format!("malformed login response: {}", e)))?;

        let token = match login.token.filter(|t| !t.is_empty()) {
            Some(token) if is_truthy(&login.status) => token,
            _ => {
                let message = login
                    .message
                    .unwrap_or_else(|| "login rejected by the portal".to_string());
                return Err(AuthError::CredentialsInvalid(message));
            }
        };

        CachedToken::from_jwt(token).map_err(|e| {
            AuthError::Authentication(format!("login returned an unreadable token: {}", e))
        })
    }

    /// A 401 means the token we sent is dead.
    async fn check_unauthorized(&self, response: &Response, used: &CachedToken) {
        if response.status() == StatusCode::UNAUTHORIZED {
            self.invalidate_token(used).await;
        }
    }

    /// Clear `used` from memory and disk unless a refresh already replaced it.
    /// Runs under the refresh lock so a concurrent login cannot persist a new
    /// token between the comparison and the file removal.
    async fn invalidate_token(&self, used: &CachedToken) {
        let _refresh = self.refresh.lock().await;

        let cleared = self.session.write().invalidate(&used.access_token);
        if cleared {
            warn!("Portal rejected the bearer token; it will be refreshed on next use");
            if let Err(e) = self.token_store.clear() {
                warn!(error = %e, "Failed to remove cached token");
            }
        }
    }
}

impl std::fmt::Debug for PortalClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalClient")
            .field("endpoints", &self.endpoints)
            .field("state", &self.auth_state())
            .finish_non_exhaustive()
    }
}

fn authorization_value(token: &CachedToken) -> Result<HeaderValue, AuthError> {
    HeaderValue::from_str(&format!("JWT {}", token.access_token))
        .map_err(|_| AuthError::Authentication("token is not a valid header value".to_string()))
}

fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(a) => !a.is_empty(),
        serde_json::Value::Object(o) => !o.is_empty(),
    }
}

fn load_or_warn<T>(store: &JsonFileStore<T>) -> Option<T>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    store.load().unwrap_or_else(|e| {
        warn!(error = %e, "Ignoring unreadable file");
        None
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::NoPrompt;
    use crate::testing::{fresh_jwt, make_jwt};
    use chrono::Utc;
    use mockito::{Matcher, Server, ServerGuard};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const LOGIN_PATH: &str = "/api/quickrad/telerad/login-validation";

    struct FixedPrompt {
        credentials: Credentials,
        calls: AtomicUsize,
    }

    impl CredentialPrompt for FixedPrompt {
        fn prompt(&self) -> std::io::Result<Credentials> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.credentials.clone())
        }
    }

    fn config(server: &ServerGuard, state: &Path) -> PortalConfig {
        PortalConfig::default()
            .with_base_url(server.url())
            .with_state_dir(state)
    }

    fn client_with_stored_credentials(server: &ServerGuard, temp: &TempDir) -> PortalClient {
        let config = config(server, temp.path());
        CredentialStore::new(&config.credentials_path)
            .save(&Credentials::new("dr@example.com", "hunter2"))
            .unwrap();
        PortalClient::new(&config, Arc::new(NoPrompt)).unwrap()
    }

    fn login_ok(jwt: &str) -> String {
        format!(r#"{{"status":true,"token":"{}"}}"#, jwt)
    }

    #[tokio::test]
    async fn test_login_sends_form_and_uses_jwt_header() {
        let mut server = Server::new_async().await;
        let temp = TempDir::new().unwrap();
        let jwt = fresh_jwt();

        let login = server
            .mock("POST", LOGIN_PATH)
            .match_header("accept", "application/json")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#"name="email"\s+dr@example\.com"#.to_string()),
                Matcher::Regex(r#"name="password"\s+hunter2"#.to_string()),
            ]))
            .with_body(login_ok(&jwt))
            .expect(1)
            .create_async()
            .await;
        let api = server
            .mock("POST", "/echo")
            .match_header("authorization", format!("JWT {}", jwt).as_str())
            .with_body("ok")
            .create_async()
            .await;

        let client = client_with_stored_credentials(&server, &temp);
        let url = format!("{}/echo", server.url());
        let response = client.authenticated_post(&url, Form::new()).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        login.assert_async().await;
        api.assert_async().await;

        let cached = TokenStore::new(temp.path().join("token.json"))
            .load()
            .unwrap()
            .unwrap();
        assert_eq!(cached.access_token, jwt);
    }

    #[tokio::test]
    async fn test_bad_password_is_credentials_invalid_and_leaves_no_token() {
        let mut server = Server::new_async().await;
        let temp = TempDir::new().unwrap();
        let token_path = temp.path().join("token.json");
        TokenStore::new(&token_path)
            .save(&CachedToken {
                access_token: "stale".to_string(),
                exp_epoch: 1,
            })
            .unwrap();

        server
            .mock("POST", LOGIN_PATH)
            .with_body(r#"{"status": false, "message": "bad password"}"#)
            .create_async()
            .await;

        let client = client_with_stored_credentials(&server, &temp);
        let err = client.ensure_authenticated().await.unwrap_err();

        assert!(matches!(err, AuthError::CredentialsInvalid(_)));
        assert!(err.to_string().contains("bad password"));
        assert!(!token_path.exists());
        assert!(client.is_poisoned());
    }

    #[tokio::test]
    async fn test_poisoned_session_makes_no_network_calls() {
        let mut server = Server::new_async().await;
        let temp = TempDir::new().unwrap();

        let login = server
            .mock("POST", LOGIN_PATH)
            .with_body(r#"{"status": false}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client_with_stored_credentials(&server, &temp);
        assert!(client.ensure_authenticated().await.is_err());

        for _ in 0..3 {
            let err = client.ensure_authenticated().await.unwrap_err();
            assert!(matches!(err, AuthError::CredentialsInvalid(_)));
        }
        let url = format!("{}/anything", server.url());
        let err = client
            .authenticated_get(&url, HeaderMap::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_auth(),
            Some(AuthError::CredentialsInvalid(_))
        ));
        assert!(matches!(
            client.authenticate().await,
            Err(AuthError::CredentialsInvalid(_))
        ));

        login.assert_async().await;
    }

    #[tokio::test]
    async fn test_rate_limit_poisons() {
        let mut server = Server::new_async().await;
        let temp = TempDir::new().unwrap();

        server
            .mock("POST", LOGIN_PATH)
            .with_status(429)
            .create_async()
            .await;

        let client = client_with_stored_credentials(&server, &temp);
        let err = client.ensure_authenticated().await.unwrap_err();

        assert!(matches!(err, AuthError::CredentialsInvalid(_)));
        assert!(err.to_string().contains("rate limited"));
        assert!(client.is_poisoned());
    }

    #[tokio::test]
    async fn test_server_error_does_not_poison() {
        let mut server = Server::new_async().await;
        let temp = TempDir::new().unwrap();

        let login = server
            .mock("POST", LOGIN_PATH)
            .with_status(500)
            .expect(2)
            .create_async()
            .await;

        let client = client_with_stored_credentials(&server, &temp);
        for _ in 0..2 {
            let err = client.ensure_authenticated().await.unwrap_err();
            assert!(matches!(err, AuthError::Authentication(_)));
        }

        assert_eq!(client.auth_state(), AuthState::Ready);
        login.assert_async().await;
    }

    #[tokio::test]
    async fn test_malformed_json_is_authentication_error() {
        let mut server = Server::new_async().await;
        let temp = TempDir::new().unwrap();

        server
            .mock("POST", LOGIN_PATH)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let client = client_with_stored_credentials(&server, &temp);
        let err = client.ensure_authenticated().await.unwrap_err();

        assert!(matches!(err, AuthError::Authentication(_)));
        assert!(!client.is_poisoned());
    }

    #[tokio::test]
    async fn test_undecodable_token_is_authentication_error() {
        let mut server = Server::new_async().await;
        let temp = TempDir::new().unwrap();

        server
            .mock("POST", LOGIN_PATH)
            .with_body(r#"{"status": true, "token": "opaque-not-a-jwt"}"#)
            .create_async()
            .await;

        let client = client_with_stored_credentials(&server, &temp);
        let err = client.ensure_authenticated().await.unwrap_err();

        assert!(matches!(err, AuthError::Authentication(_)));
        assert!(!client.is_poisoned());
        assert!(!temp.path().join("token.json").exists());
    }

    #[tokio::test]
    async fn test_cached_token_is_reused() {
        let mut server = Server::new_async().await;
        let temp = TempDir::new().unwrap();
        let jwt = fresh_jwt();
        TokenStore::new(temp.path().join("token.json"))
            .save(&CachedToken::from_jwt(jwt.clone()).unwrap())
            .unwrap();

        let login = server
            .mock("POST", LOGIN_PATH)
            .expect(0)
            .create_async()
            .await;
        let api = server
            .mock("GET", "/data")
            .match_header("authorization", format!("JWT {}", jwt).as_str())
            .create_async()
            .await;

        let client = client_with_stored_credentials(&server, &temp);
        let url = format!("{}/data", server.url());
        client.authenticated_get(&url, HeaderMap::new()).await.unwrap();

        login.assert_async().await;
        api.assert_async().await;
    }

    #[tokio::test]
    async fn test_expiring_token_triggers_login() {
        let mut server = Server::new_async().await;
        let temp = TempDir::new().unwrap();
        let nearly_expired = make_jwt(Utc::now().timestamp() + 10);
        TokenStore::new(temp.path().join("token.json"))
            .save(&CachedToken::from_jwt(nearly_expired).unwrap())
            .unwrap();

        let login = server
            .mock("POST", LOGIN_PATH)
            .with_body(login_ok(&fresh_jwt()))
            .expect(1)
            .create_async()
            .await;

        let client = client_with_stored_credentials(&server, &temp);
        client.ensure_authenticated().await.unwrap();
        client.ensure_authenticated().await.unwrap();

        login.assert_async().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_refresh_logs_in_once() {
        let mut server = Server::new_async().await;
        let temp = TempDir::new().unwrap();

        let login = server
            .mock("POST", LOGIN_PATH)
            .with_body(login_ok(&fresh_jwt()))
            .expect(1)
            .create_async()
            .await;

        let client = Arc::new(client_with_stored_credentials(&server, &temp));
        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let client = Arc::clone(&client);
            tasks.spawn(async move { client.ensure_authenticated().await });
        }
        while let Some(result) = tasks.join_next().await {
            result.unwrap().unwrap();
        }

        login.assert_async().await;
    }

    #[tokio::test]
    async fn test_unauthorized_response_invalidates_token() {
        let mut server = Server::new_async().await;
        let temp = TempDir::new().unwrap();
        let token_path = temp.path().join("token.json");
        TokenStore::new(&token_path)
            .save(&CachedToken::from_jwt(fresh_jwt()).unwrap())
            .unwrap();

        let login = server
            .mock("POST", LOGIN_PATH)
            .with_body(login_ok(&fresh_jwt()))
            .expect(1)
            .create_async()
            .await;
        server
            .mock("GET", "/data")
            .with_status(401)
            .create_async()
            .await;

        let client = client_with_stored_credentials(&server, &temp);
        let url = format!("{}/data", server.url());
        let response = client.authenticated_get(&url, HeaderMap::new()).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(!token_path.exists());

        client.ensure_authenticated().await.unwrap();
        login.assert_async().await;
        assert!(token_path.exists());
    }

    #[tokio::test]
    async fn test_stale_invalidation_keeps_token_from_concurrent_refresh() {
        let server = Server::new_async().await;
        let temp = TempDir::new().unwrap();
        let token_path = temp.path().join("token.json");
        let stale = CachedToken::from_jwt(make_jwt(Utc::now().timestamp() + 600)).unwrap();
        TokenStore::new(&token_path).save(&stale).unwrap();

        let client = Arc::new(client_with_stored_credentials(&server, &temp));
        let refreshed = CachedToken::from_jwt(fresh_jwt()).unwrap();

        // Stand in for a login in progress: the invalidation has to wait for it.
        let refresh = client.refresh.lock().await;
        let invalidation = tokio::spawn({
            let client = Arc::clone(&client);
            let stale = stale.clone();
            async move { client.invalidate_token(&stale).await }
        });
        tokio::task::yield_now().await;

        client.session.write().token = Some(refreshed.clone());
        client.token_store.save(&refreshed).unwrap();
        drop(refresh);
        invalidation.await.unwrap();

        let on_disk = TokenStore::new(&token_path).load().unwrap().unwrap();
        assert_eq!(on_disk, refreshed);
        assert_eq!(client.session.read().token.as_ref(), Some(&refreshed));
    }

    #[tokio::test]
    async fn test_reset_credentials_clears_latch_and_logs_in() {
        let mut server = Server::new_async().await;
        let temp = TempDir::new().unwrap();
        let config = config(&server, temp.path());
        CredentialStore::new(&config.credentials_path)
            .save(&Credentials::new("dr@example.com", "wrong"))
            .unwrap();

        server
            .mock("POST", LOGIN_PATH)
            .match_body(Matcher::Regex(r#"name="password"\s+wrong"#.to_string()))
            .with_body(r#"{"status": false, "message": "bad password"}"#)
            .create_async()
            .await;
        let good_login = server
            .mock("POST", LOGIN_PATH)
            .match_body(Matcher::Regex(r#"name="password"\s+right"#.to_string()))
            .with_body(login_ok(&fresh_jwt()))
            .expect(1)
            .create_async()
            .await;

        let prompt = Arc::new(FixedPrompt {
            credentials: Credentials::new("dr@example.com", "right"),
            calls: AtomicUsize::new(0),
        });
        let client = PortalClient::new(&config, prompt.clone()).unwrap();
        assert_eq!(prompt.calls.load(Ordering::SeqCst), 0);

        assert!(client.ensure_authenticated().await.is_err());
        assert!(client.is_poisoned());

        client.reset_credentials().await.unwrap();

        assert_eq!(prompt.calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.auth_state(), AuthState::Ready);
        client.ensure_authenticated().await.unwrap();
        good_login.assert_async().await;

        let stored = CredentialStore::new(&config.credentials_path)
            .load()
            .unwrap()
            .unwrap();
        assert_eq!(stored.password, "right");
    }

    #[tokio::test]
    async fn test_missing_credentials_are_prompted_and_saved() {
        let server = Server::new_async().await;
        let temp = TempDir::new().unwrap();
        let config = config(&server, temp.path());

        let prompt = Arc::new(FixedPrompt {
            credentials: Credentials::new("new@example.com", "pw"),
            calls: AtomicUsize::new(0),
        });
        PortalClient::new(&config, prompt.clone()).unwrap();

        assert_eq!(prompt.calls.load(Ordering::SeqCst), 1);
        assert!(config.credentials_path.exists());
    }

    #[test]
    fn test_missing_credentials_without_prompt_fail() {
        let temp = TempDir::new().unwrap();
        let config = PortalConfig::default().with_state_dir(temp.path());

        let err = PortalClient::new(&config, Arc::new(NoPrompt)).unwrap_err();
        assert!(matches!(err, ClientError::Prompt(_)));
    }

    #[test]
    fn test_truthiness() {
        use serde_json::json;
        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!(1)));
        assert!(is_truthy(&json!("ok")));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&serde_json::Value::Null));
    }
}

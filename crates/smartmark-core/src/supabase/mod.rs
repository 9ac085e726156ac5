//! Hosted backend client
//!
//! `SupabaseClient` implements both service traits over HTTP:
//! - `rest`: PostgREST CRUD on the `bookmarks` table
//! - `auth`: GoTrue OAuth with PKCE, token refresh and logout
//! - `session`: the persisted session file
//! - `callback`: turning the OAuth callback URL into a session
//!
//! ## Usage
//!
//! ```ignore
//! let backend = config.backend()?;
//! let client = Arc::new(SupabaseClient::new(backend, SessionFile::new(config.session_path()))?);
//! let store = BookmarkStore::new(client.clone(), client.clone(), config.redirect_to());
//! ```

mod auth;
mod callback;
mod rest;
mod session;
#[cfg(test)]
mod test_server;

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};
use tracing::warn;

use crate::config::BackendConfig;
use crate::error::ServiceError;
use crate::models::Session;
use crate::service::{AuthChangeKind, AuthEvent};

pub use auth::{BrowserOpener, Opener, Pkce};
pub use callback::{complete_sign_in, parse_callback, CallbackOutcome, CallbackParams};
pub use session::SessionFile;

/// Timeout for every backend request
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Session state guarded by one lock so refreshes never race
#[derive(Default)]
struct AuthState {
    session: Option<Session>,
    /// PKCE verifier of the sign-in in progress
    verifier: Option<String>,
    /// Whether `InitialSession` has been emitted
    announced: bool,
}

/// Client for the hosted auth/data service
pub struct SupabaseClient {
    http: reqwest::Client,
    backend: BackendConfig,
    session_file: SessionFile,
    state: Mutex<AuthState>,
    opener: Arc<dyn Opener>,
    auth_tx: broadcast::Sender<AuthEvent>,
}

impl SupabaseClient {
    /// Create a client, restoring any persisted session
    ///
    /// An unreadable session file is ignored; the user signs in again.
    pub fn new(backend: BackendConfig, session_file: SessionFile) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("smartmark/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let session = session_file.load().unwrap_or_else(|e| {
            warn!("Ignoring stored session: {:#}", e);
            None
        });
        let (auth_tx, _) = broadcast::channel(16);

        Ok(Self {
            http,
            backend,
            session_file,
            state: Mutex::new(AuthState {
                session,
                ..AuthState::default()
            }),
            opener: Arc::new(BrowserOpener),
            auth_tx,
        })
    }

    /// Use a custom way to present the authorize URL
    pub fn with_opener(mut self, opener: Arc<dyn Opener>) -> Self {
        self.opener = opener;
        self
    }

    pub fn backend(&self) -> &BackendConfig {
        &self.backend
    }

    /// Whether a session is held (without refreshing it)
    pub async fn has_session(&self) -> bool {
        self.state.lock().await.session.is_some()
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.backend.url, path)
    }

    fn emit(&self, kind: AuthChangeKind, session: Option<Session>) {
        // no subscribers is fine
        let _ = self.auth_tx.send(AuthEvent::new(kind, session));
    }

    fn persist(&self, session: &Session) {
        if let Err(e) = self.session_file.save(session) {
            warn!("Failed to persist session: {:#}", e);
        }
    }

    fn forget(&self) {
        if let Err(e) = self.session_file.clear() {
            warn!("Failed to remove stored session: {:#}", e);
        }
    }
}

/// Pass a success response through, or map the error body
async fn check(response: reqwest::Response) -> Result<reqwest::Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(api_error(status.as_u16(), &body))
}

/// Decode a JSON body
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ServiceError> {
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| ServiceError::Decode(e.to_string()))
}

/// Map a PostgREST (`code`, `message`) or GoTrue (`error_code`, `msg`) error body
fn api_error(status: u16, body: &str) -> ServiceError {
    let value: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let field = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);

    let message = ["message", "msg", "error_description", "error"]
        .iter()
        .find_map(|key| field(*key))
        .unwrap_or_else(|| {
            let text = body.trim();
            if text.is_empty() {
                format!("Request failed with status {}", status)
            } else {
                text.to_string()
            }
        });

    let code = match value.get("code") {
        Some(Value::String(code)) => Some(code.clone()),
        _ => field("error_code"),
    };

    ServiceError::Api {
        status,
        code,
        message,
    }
}

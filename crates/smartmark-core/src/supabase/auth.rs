//! GoTrue authentication
//!
//! OAuth uses the PKCE flow: the authorize URL carries the S256 challenge,
//! the verifier stays in memory, and the code from the callback is traded
//! for a session at the token endpoint.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use super::{check, decode, SupabaseClient};
use crate::error::ServiceError;
use crate::models::Session;
use crate::service::{AuthChangeKind, AuthEvent, AuthService, OAuthProvider};

/// Presents the authorize URL to the user
pub trait Opener: Send + Sync {
    fn open(&self, url: &str) -> Result<(), ServiceError>;
}

/// Opens the system browser
pub struct BrowserOpener;

impl Opener for BrowserOpener {
    fn open(&self, url: &str) -> Result<(), ServiceError> {
        open::that(url).map_err(|e| ServiceError::Other(format!("Failed to open browser: {}", e)))
    }
}

/// PKCE verifier and its S256 challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pkce {
    pub verifier: String,
    pub challenge: String,
}

impl Pkce {
    /// A fresh 64 character verifier
    pub fn generate() -> Self {
        Self::from_verifier(format!(
            "{}{}",
            Uuid::new_v4().simple(),
            Uuid::new_v4().simple()
        ))
    }

    pub fn from_verifier(verifier: String) -> Self {
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self {
            verifier,
            challenge,
        }
    }
}

impl SupabaseClient {
    /// URL that starts the provider's consent screen
    pub fn authorize_url(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
        challenge: &str,
    ) -> Result<Url, ServiceError> {
        let mut url = Url::parse(&self.endpoint("/auth/v1/authorize"))
            .map_err(|e| ServiceError::Other(format!("Invalid backend URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("provider", provider.as_str())
            .append_pair("redirect_to", redirect_to)
            .append_pair("code_challenge", challenge)
            .append_pair("code_challenge_method", "s256");
        Ok(url)
    }

    /// Trade the callback code for a session
    ///
    /// Requires a sign-in started by this client, since the verifier is
    /// only kept in memory.
    pub async fn exchange_code_for_session(&self, code: &str) -> Result<Session, ServiceError> {
        let mut state = self.state.lock().await;
        let verifier = state.verifier.take().ok_or_else(|| {
            ServiceError::Other("No sign-in in progress, start the login again".to_string())
        })?;

        debug!("Exchanging auth code for a session");
        let session = self
            .token_request("pkce", json!({ "auth_code": code, "code_verifier": verifier }))
            .await?;

        state.session = Some(session.clone());
        state.announced = true;
        drop(state);

        self.persist(&session);
        info!("Signed in as {}", session.user.display_name());
        self.emit(AuthChangeKind::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn token_request(&self, grant_type: &str, body: Value) -> Result<Session, ServiceError> {
        let url = format!(
            "{}?grant_type={}",
            self.endpoint("/auth/v1/token"),
            grant_type
        );
        let response = self
            .http
            .post(url)
            .header("apikey", &self.backend.anon_key)
            .json(&body)
            .send()
            .await?;
        decode(check(response).await?).await
    }

    /// The held session, refreshed first when it has expired
    ///
    /// A rejected refresh token ends the session.
    pub(super) async fn current_session(&self) -> Result<Option<Session>, ServiceError> {
        let mut state = self.state.lock().await;
        let Some(session) = state.session.clone() else {
            return Ok(None);
        };
        if !session.is_expired(Utc::now()) {
            return Ok(Some(session));
        }

        let Some(refresh_token) = session.refresh_token.clone() else {
            info!("Session expired without a refresh token");
            state.session = None;
            drop(state);
            self.forget();
            self.emit(AuthChangeKind::SignedOut, None);
            return Ok(None);
        };

        debug!("Refreshing expired session");
        match self
            .token_request("refresh_token", json!({ "refresh_token": refresh_token }))
            .await
        {
            Ok(fresh) => {
                state.session = Some(fresh.clone());
                drop(state);
                self.persist(&fresh);
                self.emit(AuthChangeKind::TokenRefreshed, Some(fresh.clone()));
                Ok(Some(fresh))
            }
            Err(e @ ServiceError::Api { status: 400..=403, .. }) => {
                warn!("Refresh rejected, signing out: {}", e);
                state.session = None;
                drop(state);
                self.forget();
                self.emit(AuthChangeKind::SignedOut, None);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl AuthService for SupabaseClient {
    async fn get_session(&self) -> Result<Option<Session>, ServiceError> {
        let session = self.current_session().await?;
        let first = {
            let mut state = self.state.lock().await;
            !std::mem::replace(&mut state.announced, true)
        };
        if first {
            self.emit(AuthChangeKind::InitialSession, session.clone());
        }
        Ok(session)
    }

    async fn sign_in_with_oauth(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
    ) -> Result<(), ServiceError> {
        let pkce = Pkce::generate();
        let url = self.authorize_url(provider, redirect_to, &pkce.challenge)?;
        self.state.lock().await.verifier = Some(pkce.verifier);

        info!("Opening {} sign-in", provider);
        self.opener.open(url.as_str())
    }

    async fn sign_out(&self) -> Result<(), ServiceError> {
        let session = self.state.lock().await.session.clone();

        if let Some(session) = session {
            let response = self
                .http
                .post(self.endpoint("/auth/v1/logout"))
                .header("apikey", &self.backend.anon_key)
                .bearer_auth(&session.access_token)
                .send()
                .await?;
            match check(response).await {
                Ok(_) => {}
                Err(e) if e.is_unauthorized() => {
                    debug!("Session already invalid on the server: {}", e);
                }
                Err(e) => return Err(e),
            }
        }

        {
            let mut state = self.state.lock().await;
            state.session = None;
            state.verifier = None;
        }
        self.forget();
        info!("Signed out");
        self.emit(AuthChangeKind::SignedOut, None);
        Ok(())
    }

    fn auth_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.auth_tx.subscribe()
    }
}

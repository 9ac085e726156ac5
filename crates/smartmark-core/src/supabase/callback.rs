//! OAuth callback handling
//!
//! The provider sends the browser back to `{site}/auth/callback?code=..`.
//! The code is exchanged for a session and the user continues to `next`,
//! or to the auth error page when anything is missing or rejected.

use tracing::{info, warn};
use url::Url;

use super::SupabaseClient;
use crate::config::{AUTH_ERROR_PATH, DEFAULT_NEXT};

/// Query parameters of a callback URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub next: String,
}

/// Where the user goes after the callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// Exchange succeeded
    Redirect(String),
    /// Missing or rejected code
    AuthCodeError,
}

impl CallbackOutcome {
    /// Path to navigate to
    pub fn path(&self) -> &str {
        match self {
            CallbackOutcome::Redirect(next) => next,
            CallbackOutcome::AuthCodeError => AUTH_ERROR_PATH,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CallbackOutcome::Redirect(_))
    }
}

/// Extract `code` and `next` from a callback URL
pub fn parse_callback(callback_url: &str) -> Result<CallbackParams, url::ParseError> {
    let url = Url::parse(callback_url.trim())?;
    let mut code = None;
    let mut next = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" if !value.is_empty() => code = Some(value.into_owned()),
            "next" => next = Some(value.into_owned()),
            _ => {}
        }
    }
    Ok(CallbackParams {
        code,
        next: next.unwrap_or_else(|| DEFAULT_NEXT.to_string()),
    })
}

/// Exchange the code in `callback_url` and decide where to go next
pub async fn complete_sign_in(client: &SupabaseClient, callback_url: &str) -> CallbackOutcome {
    let params = match parse_callback(callback_url) {
        Ok(params) => params,
        Err(e) => {
            warn!("Invalid callback URL: {}", e);
            return CallbackOutcome::AuthCodeError;
        }
    };

    let Some(code) = params.code else {
        warn!("Callback without code");
        return CallbackOutcome::AuthCodeError;
    };

    match client.exchange_code_for_session(&code).await {
        Ok(session) => {
            info!("Signed in as {}", session.user.display_name());
            CallbackOutcome::Redirect(params.next)
        }
        Err(e) => {
            warn!("Code exchange failed: {}", e);
            CallbackOutcome::AuthCodeError
        }
    }
}

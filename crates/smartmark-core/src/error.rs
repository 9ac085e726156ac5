//! Error types
//!
//! Validation errors are detected locally and never reach the service.
//! Service errors come back from the hosted backend. Store errors are what
//! the store surfaces to the UI.

use thiserror::Error;

/// Postgres error code for a unique constraint violation
pub const UNIQUE_VIOLATION: &str = "23505";

/// Message shown for a URL the user has already saved
pub const DUPLICATE_URL_MESSAGE: &str = "You have already bookmarked this URL";

/// Local validation failures for a new bookmark
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please fill in all fields ({0} is required)")]
    MissingField(&'static str),

    #[error("Please enter a valid URL: '{0}'")]
    InvalidUrl(String),

    #[error("Title is too long ({actual} characters, maximum is {max})")]
    TitleTooLong { max: usize, actual: usize },
}

/// Errors reported by the auth/data service
#[derive(Error, Debug)]
pub enum ServiceError {
    /// The service rejected the request
    #[error("{message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// The request never got a response
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The response could not be understood
    #[error("Unexpected response from service: {0}")]
    Decode(String),

    /// An operation required a session and none is held
    #[error("Not signed in")]
    NoSession,

    #[error("{0}")]
    Other(String),
}

impl ServiceError {
    /// Build an API error from its parts
    pub fn api(status: u16, code: Option<&str>, message: impl Into<String>) -> Self {
        ServiceError::Api {
            status,
            code: code.map(str::to_string),
            message: message.into(),
        }
    }

    /// Whether this is the per-user unique URL constraint firing
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            ServiceError::Api { code: Some(code), .. } if code == UNIQUE_VIOLATION
        )
    }

    /// Whether the service refused the credentials
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ServiceError::Api { status: 401 | 403, .. })
    }
}

/// Errors surfaced by the bookmark store
#[derive(Error, Debug)]
pub enum StoreError {
    /// The URL is already in the collection, detected locally or by the
    /// service's unique constraint
    #[error("{}", DUPLICATE_URL_MESSAGE)]
    DuplicateUrl,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Service(ServiceError),
}

impl From<ServiceError> for StoreError {
    /// Remaps a unique violation to [`StoreError::DuplicateUrl`]
    fn from(error: ServiceError) -> Self {
        if error.is_unique_violation() {
            StoreError::DuplicateUrl
        } else {
            StoreError::Service(error)
        }
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

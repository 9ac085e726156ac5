//! Collaborator contract for the hosted auth/data service
//!
//! The store only talks to the backend through these traits, so it can be
//! driven by the Supabase client in production and by in-memory fakes in
//! tests.

use std::fmt;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::ServiceError;
use crate::models::{Bookmark, BookmarkPatch, NewBookmarkRow, Session};

/// OAuth identity providers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthProvider {
    Google,
    Github,
}

impl OAuthProvider {
    /// Provider slug used by the auth service
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "google",
            OAuthProvider::Github => "github",
        }
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kinds of session change notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthChangeKind {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

impl AuthChangeKind {
    /// Wire name of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthChangeKind::InitialSession => "INITIAL_SESSION",
            AuthChangeKind::SignedIn => "SIGNED_IN",
            AuthChangeKind::SignedOut => "SIGNED_OUT",
            AuthChangeKind::TokenRefreshed => "TOKEN_REFRESHED",
            AuthChangeKind::UserUpdated => "USER_UPDATED",
        }
    }
}

impl fmt::Display for AuthChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A session change delivered by the auth service
#[derive(Debug, Clone, PartialEq)]
pub struct AuthEvent {
    pub kind: AuthChangeKind,
    pub session: Option<Session>,
}

impl AuthEvent {
    pub fn new(kind: AuthChangeKind, session: Option<Session>) -> Self {
        Self { kind, session }
    }
}

/// A row-level change pushed by the realtime channel
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    Insert(Bookmark),
    Update(Bookmark),
    Delete { id: String },
}

impl ChangeEvent {
    /// Id of the affected row
    pub fn id(&self) -> &str {
        match self {
            ChangeEvent::Insert(b) | ChangeEvent::Update(b) => &b.id,
            ChangeEvent::Delete { id } => id,
        }
    }
}

/// OAuth and session management
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Current session, if any
    async fn get_session(&self) -> Result<Option<Session>, ServiceError>;

    /// Start the OAuth redirect flow, returning to `redirect_to`
    async fn sign_in_with_oauth(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
    ) -> Result<(), ServiceError>;

    /// Terminate the current session
    async fn sign_out(&self) -> Result<(), ServiceError>;

    /// Subscribe to session changes. Dropping the receiver unsubscribes.
    fn auth_events(&self) -> broadcast::Receiver<AuthEvent>;
}

/// CRUD over the `bookmarks` table
#[async_trait]
pub trait BookmarkService: Send + Sync {
    /// All bookmarks owned by `user_id`, newest first
    async fn list(&self, user_id: &str) -> Result<Vec<Bookmark>, ServiceError>;

    /// Insert a row and return the canonical record
    async fn insert(&self, row: &NewBookmarkRow) -> Result<Bookmark, ServiceError>;

    /// Apply a partial update
    async fn update(&self, id: &str, patch: &BookmarkPatch) -> Result<(), ServiceError>;

    /// Delete a row
    async fn delete(&self, id: &str) -> Result<(), ServiceError>;
}

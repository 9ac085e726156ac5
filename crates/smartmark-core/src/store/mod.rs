//! Bookmark store
//!
//! The `BookmarkStore` is the single source of truth for the signed-in user
//! and their bookmarks. It mediates between the UI and the remote service:
//! - Optimistic mutations are applied before any request is sent
//! - Server responses are reconciled against whatever is in state by then
//! - Push events from the realtime channel are merged through `apply_change`
//!
//! ## Usage
//!
//! ```ignore
//! let store = Arc::new(BookmarkStore::new(auth, data, redirect_to));
//! let mut updates = store.subscribe();
//!
//! store.set_user(Some(user));
//! store.fetch_bookmarks().await;
//! store.add_bookmark(NewBookmark::new("https://example.com", "Example")).await?;
//! ```
//!
//! State lives in a `watch` channel. Each mutation is one synchronous
//! `send_modify` step and no borrow is held across an await, so the steps
//! between suspension points never interleave.

mod state;

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::models::{Bookmark, BookmarkPatch, NewBookmark, User};
use crate::service::{
    AuthChangeKind, AuthEvent, AuthService, BookmarkService, ChangeEvent, OAuthProvider,
};

pub use state::StoreState;

/// What the caller should do after an auth event was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuthFollowUp {
    /// Load the collection for the (new) user
    pub fetch_bookmarks: bool,
    /// Where the UI should go
    pub navigation: Option<Navigation>,
}

/// Navigation hints for the UI shell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    /// Re-render the current view (after sign-in)
    Refresh,
    /// Go back to the landing page (after sign-out)
    Landing,
}

/// Process-wide client state for auth and bookmarks
pub struct BookmarkStore {
    state: watch::Sender<StoreState>,
    auth: Arc<dyn AuthService>,
    data: Arc<dyn BookmarkService>,
    /// OAuth return address
    redirect_to: String,
}

impl BookmarkStore {
    /// Create an empty store
    pub fn new(
        auth: Arc<dyn AuthService>,
        data: Arc<dyn BookmarkService>,
        redirect_to: impl Into<String>,
    ) -> Self {
        let (state, _) = watch::channel(StoreState::default());
        Self {
            state,
            auth,
            data,
            redirect_to: redirect_to.into(),
        }
    }

    /// Current state
    pub fn snapshot(&self) -> StoreState {
        self.state.borrow().clone()
    }

    /// Receive every new state
    pub fn subscribe(&self) -> watch::Receiver<StoreState> {
        self.state.subscribe()
    }

    /// Auth service this store signs in with
    pub fn auth(&self) -> Arc<dyn AuthService> {
        self.auth.clone()
    }

    /// Apply one synchronous step and return the resulting snapshot
    fn modify<F>(&self, f: F) -> StoreState
    where
        F: FnOnce(&mut StoreState),
    {
        let mut snapshot = StoreState::default();
        self.state.send_modify(|state| {
            f(state);
            snapshot = state.clone();
        });
        snapshot
    }

    fn set_error(&self, message: String) {
        self.modify(|state| state.error = Some(message));
    }

    /// Dismiss the error banner
    pub fn clear_error(&self) -> StoreState {
        self.modify(|state| state.error = None)
    }

    // ==================== Auth ====================

    /// Replace the held user
    pub fn set_user(&self, user: Option<User>) -> StoreState {
        self.modify(|state| state.user = user)
    }

    /// Start the Google OAuth redirect
    ///
    /// Failures are recorded in `error`; the caller should observe it.
    pub async fn sign_in_with_google(&self) {
        info!("Starting Google sign-in (redirect to {})", self.redirect_to);
        if let Err(e) = self
            .auth
            .sign_in_with_oauth(OAuthProvider::Google, &self.redirect_to)
            .await
        {
            warn!("Sign-in failed: {}", e);
            self.set_error(e.to_string());
        }
    }

    /// End the session and clear all user data
    ///
    /// On failure the user and bookmarks are left as they were.
    pub async fn sign_out(&self) {
        match self.auth.sign_out().await {
            Ok(()) => {
                info!("Signed out");
                self.modify(StoreState::clear_session);
            }
            Err(e) => {
                warn!("Sign-out failed: {}", e);
                self.set_error(e.to_string());
            }
        }
    }

    /// Apply a session change from the auth service
    pub fn apply_auth_event(&self, event: AuthEvent) -> AuthFollowUp {
        debug!("Auth event: {}", event.kind);
        let user = event.session.map(|s| s.user);
        let signed_in = user.is_some();
        self.modify(|state| {
            let same_user = state.user_id() == user.as_ref().map(|u| u.id.as_str());
            if !same_user {
                // nothing of the previous user's may survive the switch
                state.clear_session();
            }
            state.user = user;
        });

        let quiet = matches!(
            event.kind,
            AuthChangeKind::InitialSession | AuthChangeKind::TokenRefreshed
        );

        if signed_in {
            AuthFollowUp {
                fetch_bookmarks: !quiet,
                navigation: (event.kind == AuthChangeKind::SignedIn).then_some(Navigation::Refresh),
            }
        } else {
            AuthFollowUp {
                fetch_bookmarks: false,
                navigation: (event.kind == AuthChangeKind::SignedOut).then_some(Navigation::Landing),
            }
        }
    }

    // ==================== Bookmarks ====================

    /// Load the user's bookmarks, newest first
    ///
    /// On failure the previous bookmarks stay visible.
    pub async fn fetch_bookmarks(&self) {
        self.load_bookmarks().await;
    }

    /// Returns true when the collection was replaced from the service
    async fn load_bookmarks(&self) -> bool {
        let Some(user_id) = self.snapshot().user_id().map(str::to_string) else {
            debug!("Skipping fetch, no user");
            return false;
        };

        self.modify(|state| {
            state.loading = true;
            state.error = None;
        });

        match self.data.list(&user_id).await {
            Ok(bookmarks) => {
                debug!("Fetched {} bookmarks", bookmarks.len());
                let mut replaced = false;
                self.modify(|state| {
                    state.loading = false;
                    // signed out or switched user while the request was in flight
                    if state.user_id() == Some(user_id.as_str()) {
                        state.bookmarks = bookmarks;
                        replaced = true;
                    }
                });
                replaced
            }
            Err(e) => {
                warn!("Fetch failed: {}", e);
                self.modify(|state| {
                    state.loading = false;
                    state.error = Some(e.to_string());
                });
                false
            }
        }
    }

    /// Add a bookmark optimistically
    ///
    /// The placeholder is visible before the insert is sent. On failure it is
    /// rolled back, the error is recorded and also returned so the caller can
    /// react. A local or server-side duplicate yields [`StoreError::DuplicateUrl`].
    /// Without a user this is a no-op.
    pub async fn add_bookmark(&self, bookmark: NewBookmark) -> StoreResult<()> {
        if self.snapshot().user.is_none() {
            debug!("Ignoring add, no user");
            return Ok(());
        }

        let bookmark = bookmark.validated()?;
        let temp_id = temp_id();
        let now = Utc::now();

        let mut guard = Guard::NoUser;
        self.state.send_if_modified(|state| {
            let Some(user_id) = state.user_id().map(str::to_string) else {
                return false;
            };
            if state.contains_url(&bookmark.url) {
                guard = Guard::Duplicate;
                return false;
            }
            state.begin_insert(bookmark.to_placeholder(&temp_id, &user_id, now));
            guard = Guard::Applied(user_id);
            true
        });

        let user_id = match guard {
            Guard::Applied(user_id) => user_id,
            Guard::Duplicate => return Err(StoreError::DuplicateUrl),
            Guard::NoUser => return Ok(()),
        };
        debug!("Optimistic add {} for {}", temp_id, bookmark.url);

        match self.data.insert(&bookmark.to_row(&user_id)).await {
            Ok(canonical) => {
                let canonical_id = canonical.id.clone();
                let mut confirmed = false;
                self.modify(|state| {
                    if state.user_id() == Some(user_id.as_str()) {
                        confirmed = state.confirm_insert(&temp_id, canonical);
                    }
                });
                if confirmed {
                    info!("Added bookmark {} (was {})", canonical_id, temp_id);
                } else {
                    debug!("Dropped confirmation for {}, session changed", temp_id);
                }
                Ok(())
            }
            Err(e) => {
                let error = StoreError::from(e);
                warn!("Add failed, rolling back {}: {}", temp_id, error);
                let message = error.to_string();
                self.modify(|state| {
                    state.rollback_insert(&temp_id);
                    if state.user_id() == Some(user_id.as_str()) {
                        state.error = Some(message);
                    }
                });
                Err(error)
            }
        }
    }

    /// Patch a bookmark optimistically
    ///
    /// A failed update is not rolled back. The collection is refetched from
    /// the service instead and the error is recorded.
    pub async fn update_bookmark(&self, id: &str, updates: BookmarkPatch) {
        self.modify(|state| {
            state.patch(id, &updates);
        });

        if let Err(e) = self.data.update(id, &updates).await {
            warn!("Update of {} failed, refetching: {}", id, e);
            self.load_bookmarks().await;
            let message = e.to_string();
            // a failing refetch reports its own error
            self.modify(|state| {
                if state.error.is_none() {
                    state.error = Some(message);
                }
            });
        }
    }

    /// Delete a bookmark optimistically
    ///
    /// On failure the whole pre-deletion list is restored.
    pub async fn delete_bookmark(&self, id: &str) {
        let mut previous = Vec::new();
        self.modify(|state| {
            previous = state.bookmarks.clone();
            state.remove(id);
        });

        match self.data.delete(id).await {
            Ok(()) => info!("Deleted bookmark {}", id),
            Err(e) => {
                warn!("Delete of {} failed, restoring: {}", id, e);
                let message = e.to_string();
                self.modify(|state| {
                    state.bookmarks = previous;
                    state.error = Some(message);
                });
            }
        }
    }

    // ==================== Local mutators (push channel) ====================

    /// Replace the collection
    pub fn set_bookmarks(&self, bookmarks: Vec<Bookmark>) -> StoreState {
        self.modify(|state| state.bookmarks = bookmarks)
    }

    /// Replace in place by id, or prepend when new
    pub fn add_or_update_bookmark_local(&self, bookmark: Bookmark) -> StoreState {
        self.modify(|state| state.upsert(bookmark))
    }

    /// Remove by id
    pub fn remove_bookmark_local(&self, id: &str) -> StoreState {
        self.modify(|state| {
            state.remove(id);
        })
    }

    /// Merge a push event
    ///
    /// Ignored while nobody is signed in.
    pub fn apply_change(&self, event: ChangeEvent) -> StoreState {
        debug!("Realtime change: {:?}", event);
        let mut applied = false;
        self.state.send_if_modified(|state| {
            if state.user.is_none() {
                return false;
            }
            state.apply_change(event);
            applied = true;
            true
        });
        if !applied {
            debug!("Dropped realtime change, no user");
        }
        self.snapshot()
    }
}

/// Outcome of the synchronous part of an add
enum Guard {
    NoUser,
    Duplicate,
    Applied(String),
}

/// Temporary client-side id for an optimistic insert
fn temp_id() -> String {
    format!("temp-{}", &Uuid::new_v4().simple().to_string()[..8])
}

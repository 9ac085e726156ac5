//! Smartmark Core Library
//!
//! This crate provides the client state for Smartmark, a bookmark manager
//! backed by a hosted Postgres service (Supabase).
//!
//! # Architecture
//!
//! - **BookmarkStore**: single source of truth for the user and their bookmarks
//! - **Optimistic updates**: mutations are visible before the service confirms
//!   them and are reconciled (or rolled back) when it answers
//! - **Push sources**: auth state changes and realtime row changes are merged
//!   into the same state
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! let client = Arc::new(SupabaseClient::new(config.backend()?, SessionFile::new(config.session_path()))?);
//! let store = Arc::new(BookmarkStore::new(client.clone(), client.clone(), config.redirect_to()));
//!
//! let binding = SessionBinding::spawn(store.clone(), client.clone(), None);
//! store.add_bookmark(NewBookmark::new("https://example.com", "Example")).await?;
//! ```
//!
//! # Modules
//!
//! - `store`: state container and reducers (main entry point)
//! - `models`: bookmarks, users and sessions
//! - `service`: the auth/data service contract
//! - `binding`: wiring the store to auth and realtime events
//! - `supabase`: REST and auth client for the hosted backend
//! - `realtime`: change feed over Phoenix channels
//! - `config`: application configuration

pub mod binding;
pub mod config;
pub mod error;
pub mod models;
pub mod realtime;
pub mod service;
pub mod store;
pub mod supabase;

#[cfg(test)]
mod testing;

pub use binding::{BindingEvent, SessionBinding};
pub use config::{BackendConfig, Config};
pub use error::{ServiceError, StoreError, StoreResult, ValidationError};
pub use models::{Bookmark, BookmarkPatch, NewBookmark, Session, User};
pub use service::{AuthChangeKind, AuthEvent, AuthService, BookmarkService, ChangeEvent, OAuthProvider};
pub use store::{AuthFollowUp, BookmarkStore, Navigation, StoreState};
pub use supabase::{SessionFile, SupabaseClient};

//! In-memory auth/data service for tests
//!
//! Records call counts, can be told to fail any operation, and can hold an
//! insert in flight until the test releases it.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use tokio::sync::{broadcast, Notify};

use crate::error::ServiceError;
use crate::models::{Bookmark, BookmarkPatch, NewBookmarkRow, Session, User};
use crate::service::{AuthEvent, AuthService, BookmarkService, OAuthProvider};

/// A failure to hand back from the next calls of an operation
#[derive(Debug, Clone)]
pub struct Failure {
    pub status: u16,
    pub code: Option<String>,
    pub message: String,
}

impl Failure {
    pub fn new(status: u16, code: Option<&str>, message: &str) -> Self {
        Self {
            status,
            code: code.map(str::to_string),
            message: message.to_string(),
        }
    }

    fn to_error(&self) -> ServiceError {
        ServiceError::api(self.status, self.code.as_deref(), self.message.clone())
    }
}

/// Call counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Calls {
    pub get_session: usize,
    pub sign_in: usize,
    pub sign_out: usize,
    pub list: usize,
    pub insert: usize,
    pub update: usize,
    pub delete: usize,
}

#[derive(Default)]
struct Inner {
    session: Option<Session>,
    rows: Vec<Bookmark>,
    next_id: u64,
    calls: Calls,
    redirects: Vec<String>,
    fail_sign_in: Option<Failure>,
    fail_sign_out: Option<Failure>,
    fail_list: Option<Failure>,
    fail_insert: Option<Failure>,
    fail_update: Option<Failure>,
    fail_delete: Option<Failure>,
    insert_gate: Option<Arc<Notify>>,
    list_gate: Option<Arc<Notify>>,
}

/// Fake backend implementing both service traits
pub struct FakeBackend {
    inner: Mutex<Inner>,
    auth_tx: broadcast::Sender<AuthEvent>,
    insert_started: Arc<Notify>,
    list_started: Arc<Notify>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        let (auth_tx, _) = broadcast::channel(16);
        Arc::new(Self {
            inner: Mutex::new(Inner {
                next_id: 100,
                ..Inner::default()
            }),
            auth_tx,
            insert_started: Arc::new(Notify::new()),
            list_started: Arc::new(Notify::new()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    pub fn calls(&self) -> Calls {
        self.lock().calls
    }

    pub fn redirects(&self) -> Vec<String> {
        self.lock().redirects.clone()
    }

    pub fn set_session(&self, session: Option<Session>) {
        self.lock().session = session;
    }

    pub fn seed(&self, rows: Vec<Bookmark>) {
        self.lock().rows = rows;
    }

    pub fn rows(&self) -> Vec<Bookmark> {
        self.lock().rows.clone()
    }

    pub fn fail_sign_in(&self, failure: Option<Failure>) {
        self.lock().fail_sign_in = failure;
    }

    pub fn fail_sign_out(&self, failure: Option<Failure>) {
        self.lock().fail_sign_out = failure;
    }

    pub fn fail_list(&self, failure: Option<Failure>) {
        self.lock().fail_list = failure;
    }

    pub fn fail_insert(&self, failure: Option<Failure>) {
        self.lock().fail_insert = failure;
    }

    pub fn fail_update(&self, failure: Option<Failure>) {
        self.lock().fail_update = failure;
    }

    pub fn fail_delete(&self, failure: Option<Failure>) {
        self.lock().fail_delete = failure;
    }

    /// Hold every insert until the returned gate is notified
    pub fn gate_inserts(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.lock().insert_gate = Some(gate.clone());
        gate
    }

    /// Hold every list until the returned gate is notified
    pub fn gate_lists(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.lock().list_gate = Some(gate.clone());
        gate
    }

    /// Notified once an insert has reached the service
    pub fn insert_started(&self) -> Arc<Notify> {
        self.insert_started.clone()
    }

    /// Notified once a list has reached the service
    pub fn list_started(&self) -> Arc<Notify> {
        self.list_started.clone()
    }

    /// Id the next successful insert will be given
    pub fn next_id(&self) -> String {
        self.lock().next_id.to_string()
    }

    pub fn emit(&self, event: AuthEvent) {
        let _ = self.auth_tx.send(event);
    }

    pub fn auth_receivers(&self) -> usize {
        self.auth_tx.receiver_count()
    }
}

#[async_trait]
impl AuthService for FakeBackend {
    async fn get_session(&self) -> Result<Option<Session>, ServiceError> {
        let mut inner = self.lock();
        inner.calls.get_session += 1;
        Ok(inner.session.clone())
    }

    async fn sign_in_with_oauth(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
    ) -> Result<(), ServiceError> {
        let mut inner = self.lock();
        inner.calls.sign_in += 1;
        if let Some(ref failure) = inner.fail_sign_in {
            return Err(failure.to_error());
        }
        inner.redirects.push(format!("{}:{}", provider, redirect_to));
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), ServiceError> {
        let mut inner = self.lock();
        inner.calls.sign_out += 1;
        if let Some(ref failure) = inner.fail_sign_out {
            return Err(failure.to_error());
        }
        inner.session = None;
        Ok(())
    }

    fn auth_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.auth_tx.subscribe()
    }
}

#[async_trait]
impl BookmarkService for FakeBackend {
    async fn list(&self, user_id: &str) -> Result<Vec<Bookmark>, ServiceError> {
        let gate = {
            let mut inner = self.lock();
            inner.calls.list += 1;
            inner.list_gate.clone()
        };
        self.list_started.notify_one();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let inner = self.lock();
        if let Some(ref failure) = inner.fail_list {
            return Err(failure.to_error());
        }
        let mut rows: Vec<Bookmark> = inner
            .rows
            .iter()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn insert(&self, row: &NewBookmarkRow) -> Result<Bookmark, ServiceError> {
        let gate = {
            let mut inner = self.lock();
            inner.calls.insert += 1;
            inner.insert_gate.clone()
        };
        self.insert_started.notify_one();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let mut inner = self.lock();
        if let Some(ref failure) = inner.fail_insert {
            return Err(failure.to_error());
        }
        let id = inner.next_id.to_string();
        inner.next_id += 1;
        let now = Utc::now();
        let bookmark = Bookmark {
            id,
            user_id: row.user_id.clone(),
            url: row.bookmark.url.clone(),
            title: row.bookmark.title.clone(),
            description: row.bookmark.description.clone(),
            tags: row.bookmark.tags.clone(),
            favicon_url: row.bookmark.favicon_url.clone(),
            preview_image: row.bookmark.preview_image.clone(),
            created_at: now,
            updated_at: now,
        };
        inner.rows.insert(0, bookmark.clone());
        Ok(bookmark)
    }

    async fn update(&self, id: &str, patch: &BookmarkPatch) -> Result<(), ServiceError> {
        let mut inner = self.lock();
        inner.calls.update += 1;
        if let Some(ref failure) = inner.fail_update {
            return Err(failure.to_error());
        }
        if let Some(row) = inner.rows.iter_mut().find(|b| b.id == id) {
            patch.apply_to(row);
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), ServiceError> {
        let mut inner = self.lock();
        inner.calls.delete += 1;
        if let Some(ref failure) = inner.fail_delete {
            return Err(failure.to_error());
        }
        inner.rows.retain(|b| b.id != id);
        Ok(())
    }
}

/// A user for tests
pub fn user(id: &str) -> User {
    User::new(id)
}

/// A session for `user_id` valid for an hour
pub fn session(user_id: &str) -> Session {
    Session {
        access_token: format!("token-{}", user_id),
        refresh_token: Some("refresh".to_string()),
        token_type: "bearer".to_string(),
        expires_at: Some(Utc::now() + Duration::hours(1)),
        user: user(user_id),
    }
}

/// A confirmed bookmark created `minutes` past a fixed instant
pub fn bookmark(id: &str, user_id: &str, url: &str, minutes: i64) -> Bookmark {
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap() + Duration::minutes(minutes);
    Bookmark {
        id: id.to_string(),
        user_id: user_id.to_string(),
        url: url.to_string(),
        title: format!("Bookmark {}", id),
        description: None,
        tags: None,
        favicon_url: None,
        preview_image: None,
        created_at: at,
        updated_at: at,
    }
}

//! Store state and its reducers
//!
//! `StoreState` is a plain value. Every change the store makes is one of the
//! methods here applied inside a single synchronous step, so the reducers
//! can be tested without any service or runtime.

use std::collections::BTreeSet;

use crate::models::{url_key, Bookmark, BookmarkPatch, User};
use crate::service::ChangeEvent;

/// Snapshot of everything the UI renders
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreState {
    /// Newest first
    pub bookmarks: Vec<Bookmark>,
    /// The signed-in user, if any
    pub user: Option<User>,
    /// A full fetch is in flight
    pub loading: bool,
    /// Last recorded failure, for a persistent banner
    pub error: Option<String>,
    /// Temporary ids of inserts awaiting confirmation
    pub pending: BTreeSet<String>,
}

impl StoreState {
    /// Whether `id` is a placeholder awaiting confirmation
    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.contains(id)
    }

    /// Look up a bookmark by id
    pub fn find(&self, id: &str) -> Option<&Bookmark> {
        self.bookmarks.iter().find(|b| b.id == id)
    }

    /// Whether a bookmark with the same normalized URL is present
    pub fn contains_url(&self, url: &str) -> bool {
        let key = url_key(url);
        self.bookmarks.iter().any(|b| b.url_key() == key)
    }

    /// Id of the signed-in user
    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.id.as_str())
    }

    /// Replace in place when the id is known, otherwise prepend
    pub fn upsert(&mut self, bookmark: Bookmark) {
        match self.bookmarks.iter_mut().find(|b| b.id == bookmark.id) {
            Some(existing) => *existing = bookmark,
            None => self.bookmarks.insert(0, bookmark),
        }
    }

    /// Remove by id. Returns false when nothing matched.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.bookmarks.len();
        self.bookmarks.retain(|b| b.id != id);
        self.bookmarks.len() != before
    }

    /// Merge a patch into the matching record
    pub fn patch(&mut self, id: &str, patch: &BookmarkPatch) -> bool {
        match self.bookmarks.iter_mut().find(|b| b.id == id) {
            Some(bookmark) => {
                patch.apply_to(bookmark);
                true
            }
            None => false,
        }
    }

    /// Apply a push notification from the realtime channel
    pub fn apply_change(&mut self, event: ChangeEvent) {
        match event {
            ChangeEvent::Insert(bookmark) | ChangeEvent::Update(bookmark) => self.upsert(bookmark),
            ChangeEvent::Delete { id } => {
                self.remove(&id);
            }
        }
    }

    /// Prepend a placeholder and register it as pending
    pub(crate) fn begin_insert(&mut self, placeholder: Bookmark) {
        self.pending.insert(placeholder.id.clone());
        self.bookmarks.insert(0, placeholder);
    }

    /// Swap the placeholder for the canonical record
    ///
    /// A push for the same row may already have been applied, so both the
    /// temporary and the canonical id are filtered out before prepending.
    /// Returns false when the pending entry is gone (the session was
    /// cleared while the insert was in flight); the result is dropped.
    pub(crate) fn confirm_insert(&mut self, temp_id: &str, canonical: Bookmark) -> bool {
        if !self.pending.remove(temp_id) {
            return false;
        }
        self.bookmarks
            .retain(|b| b.id != temp_id && b.id != canonical.id);
        self.bookmarks.insert(0, canonical);
        true
    }

    /// Drop the placeholder and its pending entry
    pub(crate) fn rollback_insert(&mut self, temp_id: &str) {
        self.pending.remove(temp_id);
        self.remove(temp_id);
    }

    /// Forget the user and everything that belonged to them
    pub(crate) fn clear_session(&mut self) {
        self.user = None;
        self.bookmarks.clear();
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn bookmark(id: &str, url: &str) -> Bookmark {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        Bookmark {
            id: id.to_string(),
            user_id: "u1".to_string(),
            url: url.to_string(),
            title: id.to_uppercase(),
            description: None,
            tags: None,
            favicon_url: None,
            preview_image: None,
            created_at: at,
            updated_at: at,
        }
    }

    fn ids(state: &StoreState) -> Vec<&str> {
        state.bookmarks.iter().map(|b| b.id.as_str()).collect()
    }

    #[test]
    fn test_upsert_replaces_in_place() {
        let mut state = StoreState {
            bookmarks: vec![
                bookmark("a", "https://a.com"),
                bookmark("b", "https://b.com"),
                bookmark("c", "https://c.com"),
            ],
            ..StoreState::default()
        };

        let mut changed = bookmark("b", "https://b.com");
        changed.title = "Renamed".to_string();
        state.upsert(changed);

        assert_eq!(ids(&state), vec!["a", "b", "c"]);
        assert_eq!(state.bookmarks[1].title, "Renamed");
    }

    #[test]
    fn test_upsert_prepends_new_id() {
        let mut state = StoreState {
            bookmarks: vec![bookmark("a", "https://a.com")],
            ..StoreState::default()
        };
        state.upsert(bookmark("z", "https://z.com"));
        assert_eq!(ids(&state), vec!["z", "a"]);
    }

    #[test]
    fn test_remove_missing_id_is_noop() {
        let mut state = StoreState {
            bookmarks: vec![bookmark("a", "https://a.com")],
            ..StoreState::default()
        };
        let before = state.clone();
        assert!(!state.remove("nope"));
        assert_eq!(state, before);
    }

    #[test]
    fn test_contains_url_is_case_and_whitespace_insensitive() {
        let state = StoreState {
            bookmarks: vec![bookmark("a", "https://A.com/Path")],
            ..StoreState::default()
        };
        assert!(state.contains_url("  https://a.com/path "));
        assert!(!state.contains_url("https://a.com/other"));
    }

    #[test]
    fn test_apply_change_events() {
        let mut state = StoreState::default();
        state.apply_change(ChangeEvent::Insert(bookmark("a", "https://a.com")));
        state.apply_change(ChangeEvent::Insert(bookmark("b", "https://b.com")));
        assert_eq!(ids(&state), vec!["b", "a"]);

        let mut updated = bookmark("a", "https://a.com");
        updated.title = "New".to_string();
        state.apply_change(ChangeEvent::Update(updated));
        assert_eq!(ids(&state), vec!["b", "a"]);
        assert_eq!(state.find("a").unwrap().title, "New");

        state.apply_change(ChangeEvent::Delete { id: "b".to_string() });
        assert_eq!(ids(&state), vec!["a"]);
    }

    #[test]
    fn test_confirm_after_push_leaves_single_record() {
        let mut state = StoreState::default();
        state.begin_insert(bookmark("temp-1", "https://a.com"));
        assert!(state.is_pending("temp-1"));

        // push for the canonical row arrives before the insert response
        state.apply_change(ChangeEvent::Insert(bookmark("42", "https://a.com")));
        assert_eq!(ids(&state), vec!["42", "temp-1"]);

        assert!(state.confirm_insert("temp-1", bookmark("42", "https://a.com")));
        assert_eq!(ids(&state), vec!["42"]);
        assert!(state.pending.is_empty());
    }

    #[test]
    fn test_confirm_without_pending_entry_is_dropped() {
        let mut state = StoreState::default();
        state.begin_insert(bookmark("temp-1", "https://a.com"));
        state.clear_session();

        assert!(!state.confirm_insert("temp-1", bookmark("42", "https://a.com")));
        assert!(state.bookmarks.is_empty());
    }

    #[test]
    fn test_rollback_removes_placeholder_only() {
        let mut state = StoreState {
            bookmarks: vec![bookmark("a", "https://a.com")],
            ..StoreState::default()
        };
        state.begin_insert(bookmark("temp-1", "https://b.com"));
        state.rollback_insert("temp-1");
        assert_eq!(ids(&state), vec!["a"]);
        assert!(!state.is_pending("temp-1"));
    }

    #[test]
    fn test_patch_unknown_id() {
        let mut state = StoreState::default();
        assert!(!state.patch("x", &BookmarkPatch::title("T")));
    }
}

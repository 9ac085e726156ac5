//! Data models for smartmark
//!
//! Defines the bookmark record as stored in the `bookmarks` table, the
//! payloads used to create and patch it, and the signed-in user/session.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use url::Url;

use crate::error::ValidationError;

/// Maximum title length accepted by the add form
pub const MAX_TITLE_LEN: usize = 255;

/// A saved URL record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bookmark {
    /// Server-assigned identifier, or a temporary token while pending
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Owner, assigned by the service at insert time
    #[serde(deserialize_with = "string_or_number")]
    pub user_id: String,
    /// The URL
    pub url: String,
    /// Display title
    pub title: String,
    /// Optional description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Optional tags
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Optional favicon
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon_url: Option<String>,
    /// Optional preview image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_image: Option<String>,
    /// When this bookmark was created
    pub created_at: DateTime<Utc>,
    /// When this bookmark was last updated
    pub updated_at: DateTime<Utc>,
}

impl Bookmark {
    /// Normalized duplicate key for this bookmark's URL
    pub fn url_key(&self) -> String {
        url_key(&self.url)
    }

    /// Host part of the URL, for display
    pub fn hostname(&self) -> Option<String> {
        Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
    }

    /// Tags, or an empty slice when none are set
    pub fn tag_list(&self) -> &[String] {
        self.tags.as_deref().unwrap_or(&[])
    }
}

/// Normalized URL used for per-user uniqueness (trimmed, case-insensitive)
pub fn url_key(url: &str) -> String {
    url.trim().to_lowercase()
}

/// Payload for adding a bookmark
///
/// Everything except identity and timestamps, which the service assigns.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NewBookmark {
    pub url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_image: Option<String>,
}

impl NewBookmark {
    /// Create a payload with the required fields
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            ..Self::default()
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the tags
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = Some(tags);
        self
    }

    /// Trim and check the payload
    ///
    /// Both fields are required, the URL must be absolute with a host and
    /// the title is bounded by [`MAX_TITLE_LEN`].
    pub fn validated(mut self) -> Result<Self, ValidationError> {
        self.url = self.url.trim().to_string();
        self.title = self.title.trim().to_string();

        if self.url.is_empty() {
            return Err(ValidationError::MissingField("url"));
        }
        if self.title.is_empty() {
            return Err(ValidationError::MissingField("title"));
        }

        check_url(&self.url)?;
        check_title_len(&self.title)?;
        Ok(self)
    }

    /// Row sent to the service, owned by `user_id`
    pub fn to_row(&self, user_id: &str) -> NewBookmarkRow {
        NewBookmarkRow {
            bookmark: self.clone(),
            user_id: user_id.to_string(),
        }
    }

    /// Fully populated local placeholder shown while the insert is in flight
    pub(crate) fn to_placeholder(&self, temp_id: &str, user_id: &str, now: DateTime<Utc>) -> Bookmark {
        Bookmark {
            id: temp_id.to_string(),
            user_id: user_id.to_string(),
            url: self.url.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            tags: self.tags.clone(),
            favicon_url: self.favicon_url.clone(),
            preview_image: self.preview_image.clone(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Insert row: the payload plus its owner
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NewBookmarkRow {
    #[serde(flatten)]
    pub bookmark: NewBookmark,
    pub user_id: String,
}

/// Partial update. Only `Some` fields are merged or sent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BookmarkPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_image: Option<String>,
}

impl BookmarkPatch {
    /// Patch that only changes the title
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    /// True when no field is set
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Trim and check the set fields with the same rules as [`NewBookmark::validated`]
    pub fn validated(mut self) -> Result<Self, ValidationError> {
        if let Some(url) = self.url.as_mut() {
            *url = url.trim().to_string();
            if url.is_empty() {
                return Err(ValidationError::MissingField("url"));
            }
            check_url(url)?;
        }
        if let Some(title) = self.title.as_mut() {
            *title = title.trim().to_string();
            if title.is_empty() {
                return Err(ValidationError::MissingField("title"));
            }
            check_title_len(title)?;
        }
        Ok(self)
    }

    /// Merge the set fields into `bookmark`
    pub fn apply_to(&self, bookmark: &mut Bookmark) {
        if let Some(ref url) = self.url {
            bookmark.url = url.clone();
        }
        if let Some(ref title) = self.title {
            bookmark.title = title.clone();
        }
        if let Some(ref description) = self.description {
            bookmark.description = Some(description.clone());
        }
        if let Some(ref tags) = self.tags {
            bookmark.tags = Some(tags.clone());
        }
        if let Some(ref favicon_url) = self.favicon_url {
            bookmark.favicon_url = Some(favicon_url.clone());
        }
        if let Some(ref preview_image) = self.preview_image {
            bookmark.preview_image = Some(preview_image.clone());
        }
    }
}

fn check_url(url: &str) -> Result<(), ValidationError> {
    match Url::parse(url) {
        Ok(parsed) if parsed.host_str().is_some() => Ok(()),
        _ => Err(ValidationError::InvalidUrl(url.to_string())),
    }
}

fn check_title_len(title: &str) -> Result<(), ValidationError> {
    let len = title.chars().count();
    if len > MAX_TITLE_LEN {
        return Err(ValidationError::TitleTooLong {
            max: MAX_TITLE_LEN,
            actual: len,
        });
    }
    Ok(())
}

/// Profile fields supplied by the OAuth provider
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserMetadata {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// The signed-in user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: UserMetadata,
}

impl User {
    /// Create a user with only an id
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
            user_metadata: UserMetadata::default(),
        }
    }

    /// Full name, then email, then id
    pub fn display_name(&self) -> &str {
        self.user_metadata
            .full_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or(self.email.as_deref())
            .unwrap_or(&self.id)
    }
}

/// An authenticated session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Expiry, in seconds since the epoch on the wire
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub expires_at: Option<DateTime<Utc>>,
    pub user: User,
}

/// Sessions are treated as expired this long before their real expiry
const EXPIRY_MARGIN_SECS: i64 = 30;

impl Session {
    /// Whether the access token should be refreshed before use
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(at) => now + Duration::seconds(EXPIRY_MARGIN_SECS) >= at,
            None => false,
        }
    }
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// Accept ids stored as text or as integer columns
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Int(n) => n.to_string(),
    })
}

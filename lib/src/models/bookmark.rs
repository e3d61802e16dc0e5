use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

use crate::utils;

const FAVICON_SERVICE: &str = "https://www.google.com/s2/favicons";

/// Identifier of the signed-in user that owns a collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Identifier assigned by the store when an insert commits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(String);

impl ServerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServerId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Identifier the controller hands out to an entry before the store has seen it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalId(Uuid);

impl LocalId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "local-{}", self.0)
    }
}

/// The two id spaces that coexist in one collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BookmarkId {
    Provisional(LocalId),
    Committed(ServerId),
}

impl BookmarkId {
    pub fn is_provisional(&self) -> bool {
        matches!(self, BookmarkId::Provisional(_))
    }

    pub fn as_committed(&self) -> Option<&ServerId> {
        match self {
            BookmarkId::Committed(id) => Some(id),
            BookmarkId::Provisional(_) => None,
        }
    }
}

impl fmt::Display for BookmarkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookmarkId::Provisional(id) => id.fmt(f),
            BookmarkId::Committed(id) => id.fmt(f),
        }
    }
}

impl From<ServerId> for BookmarkId {
    fn from(id: ServerId) -> Self {
        BookmarkId::Committed(id)
    }
}

impl From<LocalId> for BookmarkId {
    fn from(id: LocalId) -> Self {
        BookmarkId::Provisional(id)
    }
}

// Provisional ids never reach the store, so every id read off the wire is a server id.
impl Serialize for BookmarkId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BookmarkId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(|id| BookmarkId::Committed(ServerId(id)))
    }
}

/// One saved link, in the store's field naming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: BookmarkId,
    #[serde(rename = "user_id")]
    pub owner: OwnerId,
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub favicon_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bookmark {
    pub fn is_provisional(&self) -> bool {
        self.id.is_provisional()
    }

    pub fn server_id(&self) -> Option<&ServerId> {
        self.id.as_committed()
    }

    /// Favicon to display: the stored one, or one derived from the url.
    pub fn favicon_or_default(&self) -> String {
        if let Some(favicon) = self.favicon_url.as_deref().filter(|f| !f.is_empty()) {
            return favicon.to_string();
        }
        reqwest::Url::parse_with_params(FAVICON_SERVICE, &[("domain", self.url.as_str()), ("sz", "32")])
            .map(|u| u.to_string())
            .unwrap_or_default()
    }

    /// Url without scheme, leading `www.` or trailing slash.
    pub fn display_url(&self) -> &str {
        let rest = utils::strip_scheme(&self.url);
        let rest = rest.strip_prefix("www.").unwrap_or(rest);
        rest.strip_suffix('/').unwrap_or(rest)
    }

    /// Apply the mutable fields of `patch`; id, owner and creation time never change.
    pub(crate) fn apply_patch(&mut self, patch: &BookmarkPatch, updated_at: DateTime<Utc>) {
        if let Some(url) = &patch.url {
            self.url = url.clone();
        }
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(favicon_url) = &patch.favicon_url {
            self.favicon_url = Some(favicon_url.clone());
        }
        self.updated_at = updated_at;
    }

    /// Take the mutable fields of a newer copy of the same record.
    pub(crate) fn absorb(&mut self, newer: &Bookmark) {
        self.url = newer.url.clone();
        self.title = newer.title.clone();
        self.favicon_url = newer.favicon_url.clone();
        self.updated_at = newer.updated_at;
    }
}

/// Input of an add: the url plus an optional title (empty means "not given").
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBookmark {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon_url: Option<String>,
}

impl NewBookmark {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            favicon_url: None,
        }
    }
}

/// Partial update of the mutable fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon_url: Option<String>,
}

impl BookmarkPatch {
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_favicon_url(mut self, favicon_url: impl Into<String>) -> Self {
        self.favicon_url = Some(favicon_url.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.url.is_none() && self.title.is_none() && self.favicon_url.is_none()
    }

    /// Drop blank fields and give the url a scheme.
    pub fn normalized(self, default_scheme: &str) -> Self {
        fn non_blank(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }

        Self {
            url: non_blank(self.url).map(|u| utils::normalize_url(&u, default_scheme)),
            title: non_blank(self.title),
            favicon_url: non_blank(self.favicon_url),
        }
    }
}

//! Wire types for the document-management API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Site identity returned by the session probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteInfo {
    pub url: String,
    pub title: String,
}

/// One library as listed by the site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryInfo {
    pub title: String,
    #[serde(default)]
    pub hidden: bool,
    pub kind: LibraryKind,
    /// Item count as reported by the server, when it reports one.
    #[serde(default)]
    pub item_count: Option<u64>,
}

/// Library kinds the trimmer distinguishes. Anything that is not a document
/// library is excluded from `all_libraries` selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LibraryKind {
    DocumentLibrary,
    #[serde(other)]
    Other,
}

/// A file within a library page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemRef {
    pub id: u64,
    pub name: String,
    /// Server-relative path, used as the file reference in exception records.
    pub path: String,
    #[serde(default)]
    pub size_bytes: u64,
}

/// One page of items plus the cursor for the next page, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemPage {
    pub items: Vec<ItemRef>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// A single entry in a file's version history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    /// Version label, e.g. "3.0". Deletion is addressed by label.
    pub label: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_current: bool,
    #[serde(default)]
    pub size_bytes: u64,
}

/// Versioning policy snapshot for the site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionPolicy {
    /// True while an administrative policy change is staged but not applied.
    #[serde(default)]
    pub pending_change: bool,
    #[serde(default)]
    pub major_version_limit: Option<u32>,
    /// When the policy last changed, if the server tracks it.
    #[serde(default)]
    pub changed_at: Option<DateTime<Utc>>,
}

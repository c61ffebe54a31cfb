//! Item-name skip filter and version eligibility.

use chrono::{DateTime, Utc};

use crate::remote::VersionInfo;

/// Case-insensitive substring filter over item names.
///
/// Tokens are normalized to lowercase at construction; empty tokens are
/// dropped. An empty filter matches nothing.
#[derive(Debug, Clone, Default)]
pub struct NameSkipFilter {
    tokens: Vec<String>,
}

impl NameSkipFilter {
    pub fn new(tokens: impl IntoIterator<Item = String>) -> Self {
        let tokens = tokens
            .into_iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        Self { tokens }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// The token that matches the name, if any. The token is reported in the
    /// exception record so skips can be traced back to configuration.
    pub fn matched_token(&self, name: &str) -> Option<&str> {
        if self.tokens.is_empty() {
            return None;
        }
        let name = name.to_lowercase();
        self.tokens
            .iter()
            .find(|t| name.contains(t.as_str()))
            .map(String::as_str)
    }
}

/// Versions strictly older than the cutoff.
///
/// The current version is never eligible, whatever its age.
pub fn eligible_versions(versions: &[VersionInfo], cutoff: DateTime<Utc>) -> Vec<&VersionInfo> {
    versions
        .iter()
        .filter(|v| !v.is_current && v.created_at < cutoff)
        .collect()
}

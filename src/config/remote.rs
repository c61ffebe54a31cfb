//! Remote API connection configuration.
//!
//! # Example
//!
//! ```toml
//! [remote]
//! base_url = "https://contoso.example.com"
//! auth_token_env = "VERTRIM_TOKEN"
//! request_timeout_secs = 120
//! page_size = 2000
//! ```

use serde::{Deserialize, Serialize};

/// Connection settings for the document-management API.
///
/// The bearer token itself never appears in the file; only the name of the
/// environment variable holding it does.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteConfig {
    /// Base URL of the remote API, e.g. `https://contoso.example.com`.
    /// Required for any command that talks to the API.
    #[serde(default)]
    pub base_url: String,

    /// Site identifier used for run-state keying and exception rows.
    /// Defaults to `base_url` when omitted.
    #[serde(default)]
    pub site: Option<String>,

    /// Environment variable holding the bearer token.
    /// Default: VERTRIM_TOKEN
    #[serde(default = "default_auth_token_env")]
    pub auth_token_env: String,

    /// Per-request timeout in seconds.
    /// Default: 120
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Items requested per listing page.
    /// Default: 2000
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            site: None,
            auth_token_env: default_auth_token_env(),
            request_timeout_secs: default_request_timeout_secs(),
            page_size: default_page_size(),
        }
    }
}

fn default_auth_token_env() -> String {
    "VERTRIM_TOKEN".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_page_size() -> u32 {
    2000
}

impl RemoteConfig {
    /// Site identifier for state keying: the configured `site`, else the
    /// base URL.
    pub fn site_identifier(&self) -> &str {
        match &self.site {
            Some(site) if !site.trim().is_empty() => site,
            _ => &self.base_url,
        }
    }

    /// Validate bounded-range settings. Out-of-range values are rejected,
    /// never clamped.
    pub fn validate(&self) -> Result<(), String> {
        if self.base_url.trim().is_empty() {
            return Err("remote.base_url is required".into());
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(format!(
                "remote.base_url must be an http(s) URL, got \"{}\"",
                self.base_url
            ));
        }
        if !(5..=600).contains(&self.request_timeout_secs) {
            return Err(format!(
                "remote.request_timeout_secs must be between 5 and 600, got {}",
                self.request_timeout_secs
            ));
        }
        if !(1..=5000).contains(&self.page_size) {
            return Err(format!(
                "remote.page_size must be between 1 and 5000, got {}",
                self.page_size
            ));
        }
        Ok(())
    }
}

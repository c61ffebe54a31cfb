//! HTTP client for the document-management API.
//!
//! [`RemoteApi`] is the seam the engine works against; [`RemoteClient`] is
//! the reqwest-backed implementation used in production. Tests drive the
//! engine through in-memory implementations of the same trait.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::config::RemoteConfig;
use crate::remote::error::{RemoteError, RemoteResult};
use crate::remote::types::{ItemPage, LibraryInfo, SiteInfo, VersionInfo, VersionPolicy};

/// Operations the trim engine needs from the remote site.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Probe the session: confirms the site exists and the token works.
    async fn site_info(&self) -> RemoteResult<SiteInfo>;

    /// All libraries on the site, hidden ones included.
    async fn list_libraries(&self) -> RemoteResult<Vec<LibraryInfo>>;

    /// One page of items from a library. `cursor` of `None` starts from the
    /// beginning; the returned page carries the cursor for the next call.
    async fn list_items_page(
        &self,
        library: &str,
        page_size: u32,
        cursor: Option<&str>,
    ) -> RemoteResult<ItemPage>;

    /// Full version history of one item.
    async fn load_versions(&self, library: &str, item_id: u64) -> RemoteResult<Vec<VersionInfo>>;

    /// Delete the named version labels from one item.
    async fn delete_versions(
        &self,
        library: &str,
        item_id: u64,
        labels: &[String],
    ) -> RemoteResult<()>;

    /// Current versioning policy for the site.
    async fn version_policy(&self) -> RemoteResult<VersionPolicy>;
}

/// Reqwest-backed [`RemoteApi`] implementation.
pub struct RemoteClient {
    http: reqwest::Client,
    base_url: Url,
    token: String,
}

#[derive(Debug, Deserialize)]
struct LibrariesResponse {
    libraries: Vec<LibraryInfo>,
}

#[derive(Debug, Deserialize)]
struct VersionsResponse {
    versions: Vec<VersionInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: Option<String>,
    message: String,
}

#[derive(Debug, serde::Serialize)]
struct DeleteVersionsBody<'a> {
    labels: &'a [String],
}

impl RemoteClient {
    /// Build a client from configuration, reading the bearer token from the
    /// configured environment variable.
    pub fn connect(config: &RemoteConfig) -> RemoteResult<Self> {
        let token = std::env::var(&config.auth_token_env)
            .map_err(|_| RemoteError::MissingToken(config.auth_token_env.clone()))?;

        let base_url = Url::parse(&config.base_url)
            .map_err(|e| RemoteError::InvalidBaseUrl(format!("{}: {}", config.base_url, e)))?;

        Self::new(base_url, token, Duration::from_secs(config.request_timeout_secs))
    }

    /// Build a client from parts. The base URL must be http(s).
    pub fn new(base_url: Url, token: String, timeout: Duration) -> RemoteResult<Self> {
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(RemoteError::InvalidBaseUrl(format!(
                "{} (expected an http or https URL)",
                base_url
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("vertrim/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { http, base_url, token })
    }

    /// Join path segments onto the base URL, percent-encoding each segment.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        {
            // Scheme is checked in `new`, so the URL is always hierarchical.
            let mut path = url.path_segments_mut().expect("http(s) URL has path segments");
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        url
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> RemoteResult<T> {
        let response = self.http.get(url).bearer_auth(&self.token).send().await?;
        let response = Self::check_response(response).await?;

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| RemoteError::InvalidResponse(e.to_string()))
    }

    /// Map non-success statuses to [`RemoteError::Api`], decoding the
    /// server's `{code, message}` body when it sends one.
    async fn check_response(response: reqwest::Response) -> RemoteResult<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("(empty body)"));

        let (code, message) = match serde_json::from_str::<ApiErrorBody>(&body) {
            Ok(err) => (err.code, err.message),
            Err(_) => (None, body),
        };

        Err(RemoteError::Api { status, code, message })
    }
}

#[async_trait]
impl RemoteApi for RemoteClient {
    async fn site_info(&self) -> RemoteResult<SiteInfo> {
        self.get_json(self.endpoint(&["api", "site"])).await
    }

    async fn list_libraries(&self) -> RemoteResult<Vec<LibraryInfo>> {
        let response: LibrariesResponse = self.get_json(self.endpoint(&["api", "libraries"])).await?;
        Ok(response.libraries)
    }

    async fn list_items_page(
        &self,
        library: &str,
        page_size: u32,
        cursor: Option<&str>,
    ) -> RemoteResult<ItemPage> {
        let mut url = self.endpoint(&["api", "libraries", library, "items"]);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("page_size", &page_size.to_string());
            if let Some(cursor) = cursor {
                query.append_pair("cursor", cursor);
            }
        }
        self.get_json(url).await
    }

    async fn load_versions(&self, library: &str, item_id: u64) -> RemoteResult<Vec<VersionInfo>> {
        let url = self.endpoint(&[
            "api",
            "libraries",
            library,
            "items",
            &item_id.to_string(),
            "versions",
        ]);
        let response: VersionsResponse = self.get_json(url).await?;
        Ok(response.versions)
    }

    async fn delete_versions(
        &self,
        library: &str,
        item_id: u64,
        labels: &[String],
    ) -> RemoteResult<()> {
        let url = self.endpoint(&[
            "api",
            "libraries",
            library,
            "items",
            &item_id.to_string(),
            "versions",
            "delete",
        ]);

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&DeleteVersionsBody { labels })
            .send()
            .await?;

        Self::check_response(response).await?;
        Ok(())
    }

    async fn version_policy(&self) -> RemoteResult<VersionPolicy> {
        self.get_json(self.endpoint(&["api", "policy", "versioning"])).await
    }
}

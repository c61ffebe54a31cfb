//! Error taxonomy for remote calls.
//!
//! Classification drives two decisions in a run: whether a failed call is
//! worth retrying, and whether a refused deletion was a policy hold (recorded
//! as `Blocked`) rather than an ordinary failure (recorded as `Failed`).

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::StatusCode;

/// Result alias for remote operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Errors from the remote management API.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// Transport-level failure (connect, timeout, TLS, body read).
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("server returned {status}: {message}")]
    Api {
        status: u16,
        /// Machine-readable error code, when the server sends one.
        code: Option<String>,
        message: String,
    },

    /// The server answered 2xx but the body did not decode.
    #[error("unexpected response from server: {0}")]
    InvalidResponse(String),

    /// The configured auth token environment variable is not set.
    #[error("auth token environment variable {0} is not set")]
    MissingToken(String),

    /// The configured base URL is not a usable http(s) URL.
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
}

/// Words that mark a refusal as a legal/records hold.
///
/// This is a vocabulary match over free-text server messages, used only as a
/// fallback when the server sends no structured `retention_hold` code.
static HOLD_VOCABULARY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(retention|hold|record|records)\b").expect("hold vocabulary regex is valid")
});

impl RemoteError {
    /// Whether the error is transient enough to retry.
    ///
    /// Connection errors, timeouts, rate limits (429), and server errors
    /// (5xx) are retryable. Everything else, including policy holds, fails
    /// the attempt immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Http(error) => {
                error.is_connect()
                    || error.is_timeout()
                    || error
                        .status()
                        .map(|s| s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS)
                        .unwrap_or(false)
            }
            RemoteError::Api { status, .. } => *status == 429 || *status >= 500,
            RemoteError::InvalidResponse(_)
            | RemoteError::MissingToken(_)
            | RemoteError::InvalidBaseUrl(_) => false,
        }
    }

    /// Whether a refusal was a retention/legal hold rather than a fault.
    ///
    /// Checks the structured error code first, then falls back to the hold
    /// vocabulary over the server's message text.
    pub fn is_policy_block(&self) -> bool {
        match self {
            RemoteError::Api { code: Some(code), .. } if code == "retention_hold" => true,
            RemoteError::Api { message, .. } => HOLD_VOCABULARY.is_match(message),
            _ => false,
        }
    }
}

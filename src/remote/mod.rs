//! Remote document-management API.
//!
//! `types` holds the wire structs, `error` the error taxonomy and its
//! retryable / policy-block classification, and `client` the [`RemoteApi`]
//! seam plus the reqwest-backed implementation.

pub mod client;
pub mod error;
pub mod types;

pub use client::{RemoteApi, RemoteClient};
pub use error::{RemoteError, RemoteResult};
pub use types::{ItemPage, ItemRef, LibraryInfo, LibraryKind, SiteInfo, VersionInfo, VersionPolicy};

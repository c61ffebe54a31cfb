//! vertrim trims historical file versions out of remote document libraries.
//!
//! The crate is organized around a streaming [`engine::TrimEngine`]: items
//! are enumerated page by page, each file's version history is filtered
//! against a cutoff, and eligible versions are deleted in chunks through a
//! bounded-backoff [`retry`] executor. Safety rails run through everything:
//! the first run against a site is always a dry run ([`state`]), a recent
//! versioning-policy change blocks the run ([`policy`]), a processed-items
//! ceiling stops runaway scans, and periodic checkpoints hand control to an
//! operator. Whatever could not be done lands in an append-only exception
//! CSV ([`exceptions`]).

pub mod config;
pub mod engine;
pub mod exceptions;
pub mod observability;
pub mod policy;
pub mod remote;
pub mod retry;
pub mod sizing;
pub mod state;

#[cfg(test)]
mod tests;

//! Consolidated test modules.
//!
//! End-to-end engine runs against an in-memory remote, and reqwest client
//! tests against wiremock.

mod engine_e2e;

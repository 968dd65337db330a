//! # Portero (accounts, bearer sessions, password recovery)
//!
//! `portero` registers accounts, authenticates credentials, issues and revokes
//! HS256 bearer tokens, gates admin-only operations by role and runs a
//! self-service password reset flow.
//!
//! ## Layers
//!
//! - [`auth`]: the core. Hashing, token issue/verify, login throttling and the
//!   `AuthService` that orchestrates every operation.
//! - [`store`]: the collaborator interfaces the core persists through, with
//!   in-memory and `PostgreSQL` implementations.
//! - [`portero`]: the HTTP surface (`axum`) exposing one route per operation.
//! - [`cli`]: argument parsing, telemetry and server startup.
//!
//! ## Revocation
//!
//! Tokens are self-contained and never stored on issuance. Logout writes the
//! token digest into the blacklist, and every operation that authorizes with
//! a bearer token consults the blacklist after the signature check.

pub mod auth;
pub mod cli;
pub mod portero;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

//! Error types for the handle binding service.
//!
//! This module defines the central `Error` enum, which captures every
//! recoverable and reportable failure of the handle workflow. The server crate
//! maps each variant onto an HTTP status so callers can tell a rejected name
//! from a broken datastore.
//!
//! ## Error Cases
//! - `InvalidRequest`: The caller sent an empty or unusable identity or name.
//! - `Denied`: The requested name is reserved by the operator's denylist.
//! - `Taken`: The requested name already resolves to an identity.
//! - `NotFound`: No identity is bound to (or resolvable from) the input.
//! - `Resolver`: The external identity resolver could not be reached or
//!   returned an undecodable body.
//! - `Database`: The relational store failed.

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the handle binding service.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The caller request was malformed.
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// The requested name matches an entry of the denylist.
    #[error("Handle {handle} is reserved")]
    Denied { handle: String },

    /// The requested name already resolves to an identity.
    #[error("Handle {handle} is already taken")]
    Taken { handle: String },

    /// Nothing is bound to the requested name or handle.
    #[error("Handle not found")]
    NotFound,

    /// Transport or decoding failure talking to the identity resolver.
    #[error("Resolver error: {context}")]
    Resolver { context: String },

    /// Underlying datastore failure.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Resolver {
            context: err.to_string(),
        }
    }
}

//! Error kinds shared across the crate.
//!
//! Validation failures are *not* errors: a roll-out that dies on a
//! constraint is an ordinary outcome recorded as node status 1. The
//! variants here are the genuinely exceptional paths from which an
//! iteration either recovers (oracle hiccups) or the process exits.

use thiserror::Error;

/// Errors surfaced by the search core.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or malformed vocabulary, oracle data, or puzzle setup.
    /// Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// The persistence layer failed. `SearchTree::open` retries once
    /// before letting this escape.
    #[error("search store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// An oracle call failed. The current roll-out is discarded; three
    /// consecutive failures abort the process.
    #[error("oracle failure: {0}")]
    Oracle(String),

    /// A programming-error precondition was violated (e.g. subtracting a
    /// word the bank does not contain). Never recoverable.
    #[error("invariant violation: {0}")]
    Invariant(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid oracle data: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

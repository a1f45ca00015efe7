// src/error.rs

//! Error types for pkgrecap
//!
//! Errors fall in three groups:
//! - user-facing failures (no match, lock held, engine refusal, permissions)
//! - invariant violations, raised when the engine hands over data this crate
//!   cannot interpret (`UnexpectedState`, `UnexpectedLevel`)
//! - plumbing (I/O, JSON)

use crate::lock::LockOwner;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while querying, recapping or locking
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A user pattern is not a valid glob
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A package identifier could not be parsed
    #[error("Invalid package identifier '{0}'")]
    InvalidPackage(String),

    /// Nothing matched the requested patterns
    #[error("{0}")]
    NoMatch(String),

    /// The package-transaction engine refused or failed an operation
    #[error("{0}")]
    Engine(String),

    /// The caller lacks the privileges a command requires
    #[error("{0}")]
    PermissionDenied(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// The global lock is held by another process
    #[error("{0}")]
    LockHeld(LockOwner),

    /// The lock file could not even be created
    #[error("Can't create the lock file {}: {source}", path.display())]
    LockCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The engine handed over a transaction this crate cannot classify
    #[error("Unexpected transaction state: {0}")]
    UnexpectedState(String),

    /// A record reached the event sink with a level outside the protocol
    #[error("Unexpected logging level: {0}")]
    UnexpectedLevel(String),
}

impl Error {
    /// True for errors meaning our assumptions about the engine's data were wrong
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::UnexpectedState(_) | Self::UnexpectedLevel(_))
    }
}

/// Result type alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;

//! The application-facing error taxonomy (spec §7): the kinds the Access Service and Sync
//! Controller classify failures into, as opposed to `ocfl::OcflError`, which only describes
//! how the narrower inventory/backing-store collaborators can fail.

use std::fmt;
use std::fmt::{Debug, Formatter};

use thiserror::Error;

use crate::ocfl::OcflError;

pub type Result<T, E = IndexError> = core::result::Result<T, E>;

#[derive(Error)]
pub enum IndexError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Index store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("Failed to acquire a database connection: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("{0}")]
    Backing(#[from] OcflError),
}

/// `IndexError` mirrors `OcflError`'s "single enum, `Display`-as-`Debug`" shape (spec §7
/// implementation note) rather than `anyhow::Error`.
impl Debug for IndexError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl IndexError {
    pub fn not_found(context: impl Into<String>) -> IndexError {
        IndexError::NotFound(context.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, IndexError::NotFound(_))
    }
}

impl From<toml::de::Error> for IndexError {
    fn from(e: toml::de::Error) -> Self {
        IndexError::InvalidConfiguration(e.to_string())
    }
}

impl From<std::io::Error> for IndexError {
    fn from(e: std::io::Error) -> Self {
        IndexError::InvalidConfiguration(e.to_string())
    }
}

use core::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::{error, io};

use thiserror::Error;

use crate::ocfl::VersionNum;

pub type Result<T, E = OcflError> = core::result::Result<T, E>;

/// Errors produced by the OCFL inventory/backing-store collaborators.
///
/// This is intentionally narrower than a general-purpose application error: it only
/// describes the ways reading an inventory or touching the backing filesystem can fail.
/// Callers that need the richer NotFound/BadRequest/Conflict/Cancelled taxonomy convert
/// these into `crate::error::IndexError`.
#[derive(Error)]
pub enum OcflError {
    #[error("Object {object_id} is corrupt: {message}")]
    CorruptObject { object_id: String, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Illegal argument: {0}")]
    IllegalArgument(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("{0}")]
    General(String),

    #[error("{0}")]
    Io(io::Error),

    #[error("{0}")]
    Wrapped(Box<dyn error::Error + Send + Sync>),
}

/// Constructs an `OcflError::NotFound` error
pub fn not_found(object_id: &str, version_num: Option<VersionNum>) -> OcflError {
    match version_num {
        Some(version) => OcflError::NotFound(format!("Object {} version {}", object_id, version)),
        None => OcflError::NotFound(format!("Object {}", object_id)),
    }
}

impl Debug for OcflError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl From<io::Error> for OcflError {
    fn from(e: io::Error) -> Self {
        OcflError::Io(e)
    }
}

impl From<serde_json::Error> for OcflError {
    fn from(e: serde_json::Error) -> Self {
        OcflError::Wrapped(Box::new(e))
    }
}

impl From<walkdir::Error> for OcflError {
    fn from(e: walkdir::Error) -> Self {
        OcflError::Wrapped(Box::new(e))
    }
}

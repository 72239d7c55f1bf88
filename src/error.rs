//! Error types for tag index operations

use crate::core::entry::FileId;
use std::collections::TryReserveError;
use thiserror::Error;

/// Tag index operation result type
pub type Result<T> = std::result::Result<T, TagError>;

/// Tag index errors
///
/// Every variant is recoverable: the index stays usable after any single
/// failed operation.
#[derive(Error, Debug)]
pub enum TagError {
    /// A set already holds an entry with this file id
    #[error("Duplicate entry: file {0} is already in this set")]
    Duplicate(FileId),

    /// Allocation failed while growing a container
    #[error("Out of memory: {0}")]
    NoMemory(String),

    /// Malformed input (bad tag string, oversized name, ...)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Mutation attempted on a derived query result
    #[error("Read-only set: derived query results cannot be mutated")]
    ReadOnly,

    /// No bucket exists for this tag
    #[error("Tag not found: {0}")]
    TagNotFound(String),

    /// Rename target already names a bucket
    #[error("Tag already exists: {0}")]
    AlreadyExists(String),

    /// Malformed tag expression
    #[error("Malformed expression at byte {position}: {reason}")]
    Parse { position: usize, reason: String },

    /// Persisted record is inconsistent
    #[error("Corrupt index data: {0}")]
    CorruptData(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TagError {
    pub(crate) fn parse(position: usize, reason: impl Into<String>) -> Self {
        TagError::Parse {
            position,
            reason: reason.into(),
        }
    }

    pub(crate) fn corrupt(reason: impl Into<String>) -> Self {
        TagError::CorruptData(reason.into())
    }
}

impl From<TryReserveError> for TagError {
    fn from(err: TryReserveError) -> Self {
        TagError::NoMemory(err.to_string())
    }
}

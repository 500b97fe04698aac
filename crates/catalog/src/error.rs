//! Catalog Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};

/// A catalog error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Ways a snapshot can fail validation.
///
/// All of these are fatal: a malformed catalog means the pipeline cannot
/// trust any of its reference remapping, so the run aborts before touching
/// the filesystem.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Two item records share the same key.
    #[display("duplicate item key: {_0}")]
    DuplicateItem(#[error(not(source))] String),
    /// Two attachment records share the same key.
    #[display("duplicate attachment key: {_0}")]
    DuplicateAttachment(#[error(not(source))] String),
    /// An attachment references an item key that isn't in the snapshot.
    #[display("attachment {_0} references unknown item {_1}")]
    OrphanAttachment(#[error(not(source))] String, String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}

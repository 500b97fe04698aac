//! Dedupe Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction. Only failures that make the whole run untrustworthy
//! surface here; per-attachment problems (missing files, hash failures,
//! copy failures) are reported in the [`RunReport`](crate::report::RunReport)
//! instead.

use std::path::PathBuf;

use derive_more::{Display, Error};

/// A dedupe error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for dedupe operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The storage root itself cannot be read. Individual missing
    /// attachment directories are fine; an unreadable root means every
    /// resolution would fail for the same reason.
    #[display("storage root is not accessible: \"{}\"", _0.display())]
    StorageRoot(#[error(not(source))] PathBuf),
    /// The destination root could not be created or written to.
    #[display("could not prepare destination directory: \"{}\"", _0.display())]
    Destination(#[error(not(source))] PathBuf),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}

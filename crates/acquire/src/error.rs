//! Acquisition Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};

/// An acquisition error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for acquisition operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a catalog snapshot could not be acquired.
///
/// Every acquisition failure is fatal to the run — there is nothing to
/// deduplicate without a catalog — but callers still want to tell a bad
/// credential apart from a dead network or a database whose schema we don't
/// recognize, because the fix is different for each.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The source rejected our credentials or configuration.
    #[display("authentication rejected by the catalog source")]
    Auth,
    /// The source could not be reached at all: network failure, missing
    /// database file, locked database.
    #[display("catalog source unreachable: {_0}")]
    Unreachable(#[error(not(source))] String),
    /// The source responded with data we could not interpret.
    #[display("malformed catalog data: {_0}")]
    Malformed(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}

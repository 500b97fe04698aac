//! Configuration Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Figment failed to read or merge a configuration source.
    #[display("could not load configuration")]
    Load(figment::Error),
    /// A value required by the chosen mode of operation is absent. These are
    /// startup-time failures: the run never begins without them.
    #[display("missing required configuration value `{_0}` (set it in the config file or as {_1})")]
    MissingValue(#[error(not(source))] &'static str, &'static str),
    /// The platform gave us no home directory to derive defaults from.
    #[display("could not determine a home directory for default paths")]
    NoHomeDir,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}

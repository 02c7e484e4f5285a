//! # Guard Error Types
//!
//! Every failure on the server side falls into one of four buckets:
//!
//! | Variant          | Cause                                   | Effect                         |
//! |------------------|-----------------------------------------|--------------------------------|
//! | `Configuration`  | reference dir missing/empty, bad config | subsystem disabled, fail closed |
//! | `MalformedInput` | oversized or garbled credentials        | that connection rejected       |
//! | `Crypto`         | tag mismatch, key derivation            | counted as a violation         |
//! | `Storage`        | artifact read/write I/O                 | that request rejected          |
//!
//! Inside the verification protocol none of these escape: each one turns
//! into a [`crate::Verdict`].

use crate::punishment::LadderError;
use modsentry_core::CoreError;
use modsentry_shared::PayloadError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in the server-side guard.
#[derive(Error, Debug)]
pub enum GuardError {
    /// Startup configuration is unusable.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Client-supplied data failed validation.
    #[error("malformed input: {0}")]
    MalformedInput(#[from] PayloadError),

    /// Key derivation, encryption or authenticated decryption failed.
    #[error("crypto failure: {0}")]
    Crypto(#[source] CoreError),

    /// Artifact I/O failed.
    #[error("storage failure on {}: {source}", path.display())]
    Storage {
        /// The path being read or written.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A ladder edit was rejected.
    #[error("ladder error: {0}")]
    Ladder(#[from] LadderError),

    /// No reference artifact is loaded.
    #[error("verification subsystem unavailable")]
    Unavailable,
}

impl GuardError {
    /// Wraps an I/O error with the path it happened on.
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }
}

impl From<CoreError> for GuardError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::DirectoryNotFound(_) | CoreError::EmptyReferenceSet => {
                Self::Configuration(err.to_string())
            }
            CoreError::Io { path, source } => Self::Storage { path, source },
            other => Self::Crypto(other),
        }
    }
}

/// Result type for guard operations.
pub type GuardResult<T> = Result<T, GuardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_map_onto_taxonomy() {
        assert!(matches!(
            GuardError::from(CoreError::EmptyReferenceSet),
            GuardError::Configuration(_)
        ));
        assert!(matches!(
            GuardError::from(CoreError::DirectoryNotFound(PathBuf::from("mods"))),
            GuardError::Configuration(_)
        ));
        assert!(matches!(
            GuardError::from(CoreError::Decryption),
            GuardError::Crypto(CoreError::Decryption)
        ));
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(matches!(
            GuardError::from(CoreError::io("x", io)),
            GuardError::Storage { .. }
        ));
    }
}

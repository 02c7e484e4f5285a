//! # Core Error Types
//!
//! All errors that can occur while fingerprinting or ciphering.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in the core primitives.
#[derive(Error, Debug)]
pub enum CoreError {
    /// The directory to fingerprint does not exist or is not a directory.
    #[error("directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    /// A fingerprint pass matched zero files.
    ///
    /// An empty reference set would let every client pass trivially,
    /// so it is a misconfiguration, never a valid state.
    #[error("no matching files to aggregate")]
    EmptyReferenceSet,

    /// Filesystem error while reading artifacts.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// The path being read or written.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Input was not valid base64 / UTF-8 / checksum text.
    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),

    /// Key material was empty or could not be derived.
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// Authenticated decryption failed (wrong key or tampered data).
    #[error("decryption failed: authentication tag mismatch")]
    Decryption,

    /// Encryption failed inside the AEAD.
    #[error("encryption failed")]
    Encryption,
}

impl CoreError {
    /// Wraps an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

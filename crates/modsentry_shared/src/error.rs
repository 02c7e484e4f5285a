//! # Payload Error Types

use modsentry_core::CoreError;
use std::fmt;
use thiserror::Error;

/// Which field of the payload an error refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadField {
    /// The claimed passkey.
    Passkey,
    /// The claimed checksum.
    Checksum,
}

impl fmt::Display for PayloadField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passkey => f.write_str("passkey"),
            Self::Checksum => f.write_str("checksum"),
        }
    }
}

/// Errors building or validating a sync payload.
#[derive(Error, Debug)]
pub enum PayloadError {
    /// A field was empty.
    #[error("{0} is empty")]
    Empty(PayloadField),

    /// A field exceeded its length bound.
    #[error("{field} too long: {len} > {max} bytes")]
    TooLong {
        /// The offending field.
        field: PayloadField,
        /// Actual length.
        len: usize,
        /// Allowed length.
        max: usize,
    },

    /// A field contained a byte outside its alphabet.
    #[error("{field} has an invalid character at byte {position}")]
    InvalidCharacter {
        /// The offending field.
        field: PayloadField,
        /// Byte offset of the first bad character.
        position: usize,
    },

    /// Fingerprinting or encryption failed while attesting.
    #[error("attestation failed: {0}")]
    Attestation(#[from] CoreError),
}

/// Result type for payload operations.
pub type PayloadResult<T> = Result<T, PayloadError>;

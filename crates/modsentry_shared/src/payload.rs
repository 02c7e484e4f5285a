//! Sync payload sent by the client exactly once per login.
//!
//! Every payload is validated when it is built or deserialized, so the
//! verification protocol never sees an oversized or garbled field.

use crate::constants::{is_base64_byte, is_passkey_byte, MAX_CHECKSUM_LEN, MAX_PASSKEY_LEN};
use crate::error::{PayloadError, PayloadField, PayloadResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Claimed passkey and claimed checksum from one client.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSyncPayload")]
pub struct SyncPayload {
    passkey: String,
    checksum: String,
}

#[derive(Deserialize)]
struct RawSyncPayload {
    passkey: String,
    checksum: String,
}

impl TryFrom<RawSyncPayload> for SyncPayload {
    type Error = PayloadError;

    fn try_from(raw: RawSyncPayload) -> Result<Self, Self::Error> {
        Self::new(raw.passkey, raw.checksum)
    }
}

impl SyncPayload {
    /// Validates and builds a payload.
    ///
    /// # Errors
    ///
    /// Rejects empty fields, fields over their byte bound, and characters
    /// outside each field's alphabet.
    pub fn new(passkey: impl Into<String>, checksum: impl Into<String>) -> PayloadResult<Self> {
        let passkey = passkey.into();
        let checksum = checksum.into();

        check_field(PayloadField::Passkey, &passkey, MAX_PASSKEY_LEN, is_passkey_byte)?;
        check_field(PayloadField::Checksum, &checksum, MAX_CHECKSUM_LEN, is_base64_byte)?;

        Ok(Self { passkey, checksum })
    }

    /// The claimed passkey.
    #[must_use]
    pub fn passkey(&self) -> &str {
        &self.passkey
    }

    /// The claimed checksum (base64 ciphertext).
    #[must_use]
    pub fn checksum(&self) -> &str {
        &self.checksum
    }
}

fn check_field(
    field: PayloadField,
    value: &str,
    max: usize,
    allowed: fn(u8) -> bool,
) -> PayloadResult<()> {
    if value.is_empty() {
        return Err(PayloadError::Empty(field));
    }
    if value.len() > max {
        return Err(PayloadError::TooLong {
            field,
            len: value.len(),
            max,
        });
    }
    if let Some(position) = value.bytes().position(|b| !allowed(b)) {
        return Err(PayloadError::InvalidCharacter { field, position });
    }
    Ok(())
}

impl fmt::Debug for SyncPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncPayload")
            .field("passkey_len", &self.passkey.len())
            .field("checksum_len", &self.checksum.len())
            .finish()
    }
}

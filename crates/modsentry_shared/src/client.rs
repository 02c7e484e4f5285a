//! Client-side attestation.
//!
//! What an honest client sends: fingerprint the local mods directory,
//! obfuscate the aggregate with the secret part of its passkey, encrypt
//! under the full passkey.

use crate::error::{PayloadError, PayloadResult};
use crate::payload::SyncPayload;
use modsentry_core::{ArtifactFilter, CoreError, DirectoryFingerprint, Passkey, PasskeyCipher};
use std::path::{Path, PathBuf};

/// Builds sync payloads from a local mods directory.
#[derive(Clone, Debug)]
pub struct ClientAttestor {
    mods_dir: PathBuf,
    filter: ArtifactFilter,
}

impl ClientAttestor {
    /// Creates an attestor for `mods_dir`.
    #[must_use]
    pub fn new(mods_dir: impl Into<PathBuf>, filter: ArtifactFilter) -> Self {
        Self {
            mods_dir: mods_dir.into(),
            filter,
        }
    }

    /// The directory being attested.
    #[must_use]
    pub fn mods_dir(&self) -> &Path {
        &self.mods_dir
    }

    /// Fingerprints the mods directory.
    ///
    /// # Errors
    ///
    /// Fails if the directory is missing or holds no matching files.
    pub fn fingerprint(&self) -> PayloadResult<DirectoryFingerprint> {
        Ok(DirectoryFingerprint::scan(&self.mods_dir, &self.filter)?)
    }

    /// Produces the payload to send for `passkey`.
    ///
    /// # Errors
    ///
    /// Fails if the passkey has no secret part, the directory cannot be
    /// fingerprinted, or the result does not fit the wire limits.
    pub fn attest(&self, passkey: &Passkey) -> PayloadResult<SyncPayload> {
        let secret = passkey.secret().ok_or_else(|| {
            PayloadError::Attestation(CoreError::KeyDerivation(
                "passkey has no secret part".into(),
            ))
        })?;

        let fingerprint = self.fingerprint()?;
        let checksum = PasskeyCipher::new(passkey.as_str())?
            .obfuscate_and_encrypt(fingerprint.digest.as_str(), secret)?;

        tracing::debug!(
            files = fingerprint.files.len(),
            dir = %self.mods_dir.display(),
            "attested mods directory"
        );

        SyncPayload::new(passkey.as_str(), checksum)
    }
}

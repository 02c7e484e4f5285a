//! # Reference Store
//!
//! Holds `CheckSum_init`, the obfuscated aggregate of the reference mods,
//! and turns it into per-player artifacts.
//!
//! ```text
//! mods_client/ ──scan──► digest ──obfuscate(secret)──► CheckSum_init
//!                                                        │  (atomic file replace
//!                                                        │   + in-memory snapshot)
//!                      ValidatedPasskey ──encrypt────────┘
//!                                          │
//!                                          ▼
//!                                   PlayerArtifact ("CheckSum")
//! ```
//!
//! Regeneration is serialized by its own lock and publishes a fresh
//! `Arc` snapshot. A verification that started earlier keeps reading the
//! snapshot it took; nobody ever sees a half-built artifact. A failed
//! regeneration leaves the previous artifact in place.

use crate::error::{GuardError, GuardResult};
use crate::persist::write_atomic;
use chrono::NaiveDateTime;
use modsentry_core::keys::identity_hash;
use modsentry_core::{
    cipher, ArtifactFilter, DirectoryFingerprint, FileChecksum, KeyDeriver, Passkey, PasskeyCipher,
};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File name of the reference artifact inside the state directory.
pub const REFERENCE_FILE: &str = "CheckSum_init";

/// File name prefix of persisted player artifacts.
pub const PLAYER_FILE_PREFIX: &str = "CheckSum-";

/// An immutable snapshot of the reference fingerprint.
#[derive(Clone, PartialEq, Eq)]
pub struct ReferenceArtifact {
    obfuscated: String,
    secret: String,
    files: Vec<FileChecksum>,
    generated_at: NaiveDateTime,
}

impl ReferenceArtifact {
    /// The obfuscated aggregate digest (`CheckSum_init`).
    #[must_use]
    pub fn obfuscated(&self) -> &str {
        &self.obfuscated
    }

    /// Per-file checksums of the reference set.
    #[must_use]
    pub fn files(&self) -> &[FileChecksum] {
        &self.files
    }

    /// When this snapshot was built.
    #[must_use]
    pub fn generated_at(&self) -> NaiveDateTime {
        self.generated_at
    }

    /// Recovers the aggregate digest from an obfuscated copy of this artifact.
    pub(crate) fn reveal(&self, obfuscated: &str) -> GuardResult<String> {
        Ok(cipher::deobfuscate(obfuscated, &self.secret)?)
    }
}

impl fmt::Debug for ReferenceArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceArtifact")
            .field("files", &self.files.len())
            .field("generated_at", &self.generated_at)
            .finish_non_exhaustive()
    }
}

/// A passkey that has already passed the constant-time check.
///
/// Only the verification protocol can build one, so a player artifact can
/// never come from an unchecked passkey.
pub struct ValidatedPasskey {
    passkey: Passkey,
    cipher: PasskeyCipher,
}

impl ValidatedPasskey {
    pub(crate) fn new(passkey: Passkey) -> GuardResult<Self> {
        let cipher = PasskeyCipher::new(passkey.as_str())?;
        Ok(Self { passkey, cipher })
    }

    /// The secret half of the passkey.
    pub(crate) fn secret(&self) -> GuardResult<&str> {
        self.passkey.secret().ok_or_else(|| {
            GuardError::Crypto(modsentry_core::CoreError::KeyDerivation(
                "passkey has no secret part".into(),
            ))
        })
    }

    /// Cipher keyed by this passkey.
    pub(crate) fn cipher(&self) -> &PasskeyCipher {
        &self.cipher
    }
}

impl fmt::Debug for ValidatedPasskey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ValidatedPasskey").field(&self.passkey).finish()
    }
}

/// A reference artifact encrypted for one player (`CheckSum`).
#[derive(Debug)]
pub struct PlayerArtifact {
    ciphertext: String,
    reference: Arc<ReferenceArtifact>,
}

impl PlayerArtifact {
    /// Base64 ciphertext.
    #[must_use]
    pub fn ciphertext(&self) -> &str {
        &self.ciphertext
    }

    /// The reference snapshot this artifact was built from.
    #[must_use]
    pub fn reference(&self) -> &Arc<ReferenceArtifact> {
        &self.reference
    }
}

/// Where the store reads and writes.
#[derive(Clone, Debug)]
pub struct StoreSettings {
    /// Expected client mods.
    pub reference_dir: PathBuf,
    /// Artifact directory.
    pub state_dir: PathBuf,
    /// Which files count.
    pub filter: ArtifactFilter,
    /// Also write player artifacts to disk.
    pub persist_player_artifacts: bool,
}

/// Server-side store of the reference artifact.
pub struct ReferenceStore {
    settings: StoreSettings,
    keys: KeyDeriver,
    current: RwLock<Option<Arc<ReferenceArtifact>>>,
    regeneration: Mutex<()>,
}

impl ReferenceStore {
    /// Creates an empty store. Nothing is loaded until
    /// [`ReferenceStore::generate_reference_artifact`] succeeds.
    #[must_use]
    pub fn new(settings: StoreSettings, keys: KeyDeriver) -> Self {
        Self {
            settings,
            keys,
            current: RwLock::new(None),
            regeneration: Mutex::new(()),
        }
    }

    /// Path of `CheckSum_init`.
    #[must_use]
    pub fn reference_path(&self) -> PathBuf {
        self.settings.state_dir.join(REFERENCE_FILE)
    }

    /// Directory being fingerprinted.
    #[must_use]
    pub fn reference_dir(&self) -> &Path {
        &self.settings.reference_dir
    }

    /// Returns true once a reference artifact is loaded.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.current.read().is_some()
    }

    /// The current snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::Unavailable`] before the first successful
    /// generation.
    pub fn current(&self) -> GuardResult<Arc<ReferenceArtifact>> {
        self.current.read().clone().ok_or(GuardError::Unavailable)
    }

    /// Rescans the reference directory and replaces `CheckSum_init`.
    ///
    /// # Errors
    ///
    /// Fails with [`GuardError::Configuration`] if the directory is missing
    /// or empty, or [`GuardError::Storage`] if the write fails. The previous
    /// artifact stays in place on any error.
    pub fn generate_reference_artifact(&self) -> GuardResult<Arc<ReferenceArtifact>> {
        let _regenerating = self.regeneration.lock();

        let fingerprint =
            DirectoryFingerprint::scan(&self.settings.reference_dir, &self.settings.filter)?;
        let secret = self.keys.current_secret();
        let obfuscated = cipher::obfuscate(fingerprint.digest.as_str(), &secret)?;

        write_atomic(&self.reference_path(), obfuscated.as_bytes())?;

        let artifact = Arc::new(ReferenceArtifact {
            obfuscated,
            secret,
            files: fingerprint.files,
            generated_at: self.keys.clock().now(),
        });
        *self.current.write() = Some(Arc::clone(&artifact));

        tracing::info!(
            files = artifact.files.len(),
            path = %self.reference_path().display(),
            "reference artifact generated"
        );
        Ok(artifact)
    }

    /// Encrypts the current reference for one player.
    ///
    /// # Errors
    ///
    /// Fails if no reference is loaded, encryption fails, or persisting
    /// the artifact fails.
    pub fn generate_player_artifact(
        &self,
        identity: &str,
        passkey: &ValidatedPasskey,
    ) -> GuardResult<PlayerArtifact> {
        let reference = self.current()?;
        let ciphertext = passkey.cipher().encrypt(reference.obfuscated())?;

        if self.settings.persist_player_artifacts {
            write_atomic(&self.player_path(identity), ciphertext.as_bytes())?;
        }

        Ok(PlayerArtifact {
            ciphertext,
            reference,
        })
    }

    /// Path a persisted player artifact for `identity` is written to.
    #[must_use]
    pub fn player_path(&self, identity: &str) -> PathBuf {
        let safe = identity_hash(identity).replace('/', "_").replace('+', "-");
        self.settings
            .state_dir
            .join(format!("{PLAYER_FILE_PREFIX}{safe}"))
    }
}

impl fmt::Debug for ReferenceStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceStore")
            .field("settings", &self.settings)
            .field("ready", &self.is_ready())
            .finish_non_exhaustive()
    }
}

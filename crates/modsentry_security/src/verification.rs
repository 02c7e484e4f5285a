//! # Verification Protocol
//!
//! One pass per login, strictly in order:
//!
//! ```text
//! AwaitingCredentials ──bad shape──────────────────────► Rejected(Malformed)
//!        │
//!        ▼
//! reference loaded? ──no───────────────────────────────► Rejected(Unavailable)
//!        │
//!        ▼
//! PasskeyCheck (constant time) ──mismatch / error──────► Rejected(Passkey)
//!        │
//!        ▼
//! ChecksumCheck: build player artifact, decrypt both,
//!                compare plaintexts (constant time) ──► Rejected(Checksum)
//!        │
//!        ▼
//!     Accepted
//! ```
//!
//! Ciphertexts are never compared: every encryption uses a fresh IV.

use crate::punishment::ViolationCategory;
use crate::store::{ReferenceStore, ValidatedPasskey};
use modsentry_core::{constant_time_eq, KeyDeriver};
use modsentry_shared::{SyncPayload, DISCONNECT_REASON};
use std::fmt;

/// A connecting player as the host knows them.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Player {
    /// Display name.
    pub name: String,
    /// Stable identity (UUID text). Counters and passkeys key on this.
    pub id: String,
}

impl Player {
    /// Creates a player.
    #[must_use]
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// Why a login was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    /// Credentials failed shape validation. Not counted.
    Malformed,
    /// Verification is disabled or no reference is loaded. Not counted.
    Unavailable,
    /// Passkey mismatch or passkey-stage failure.
    Passkey,
    /// Checksum mismatch or checksum-stage failure.
    Checksum,
}

impl RejectReason {
    /// Violation category this reason counts against, if any.
    #[must_use]
    pub const fn category(self) -> Option<ViolationCategory> {
        match self {
            Self::Passkey => Some(ViolationCategory::Passkey),
            Self::Checksum => Some(ViolationCategory::Checksum),
            Self::Malformed | Self::Unavailable => None,
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => f.write_str("malformed credentials"),
            Self::Unavailable => f.write_str("verification unavailable"),
            Self::Passkey => f.write_str("passkey"),
            Self::Checksum => f.write_str("checksum"),
        }
    }
}

/// Outcome handed back to the connection handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Both checks passed.
    Accepted,
    /// The player must be disconnected.
    Rejected {
        /// Which stage failed.
        reason: RejectReason,
        /// Violation count for the category after this attempt
        /// (0 for uncounted reasons).
        violations: u32,
    },
}

impl Verdict {
    /// Returns true for [`Verdict::Accepted`].
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    /// The text to show the client, if it must be disconnected.
    ///
    /// Always the same generic string, whatever failed.
    #[must_use]
    pub const fn disconnect_reason(&self) -> Option<&'static str> {
        match self {
            Self::Accepted => None,
            Self::Rejected { .. } => Some(DISCONNECT_REASON),
        }
    }
}

/// Internal failure detail; goes to the audit log only.
#[derive(Debug)]
pub(crate) struct Failure {
    pub(crate) reason: RejectReason,
    pub(crate) detail: String,
}

impl Failure {
    fn new(reason: RejectReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }
}

/// Runs the protocol for one login. Never panics, never propagates.
pub(crate) fn run(
    store: &ReferenceStore,
    keys: &KeyDeriver,
    identity: &str,
    claimed_passkey: &str,
    claimed_checksum: &str,
) -> Result<(), Failure> {
    let payload = SyncPayload::new(claimed_passkey, claimed_checksum)
        .map_err(|e| Failure::new(RejectReason::Malformed, e.to_string()))?;

    if !store.is_ready() {
        return Err(Failure::new(
            RejectReason::Unavailable,
            "reference artifact not loaded",
        ));
    }

    let expected = keys.passkey_for(identity);
    if !expected.matches(payload.passkey()) {
        return Err(Failure::new(RejectReason::Passkey, "Passkey mismatch"));
    }
    let validated = ValidatedPasskey::new(expected)
        .map_err(|e| Failure::new(RejectReason::Passkey, format!("key derivation: {e}")))?;

    let checksum_failure = |stage: &str, e: &dyn fmt::Display| {
        Failure::new(RejectReason::Checksum, format!("{stage}: {e}"))
    };

    let player_artifact = store
        .generate_player_artifact(identity, &validated)
        .map_err(|e| checksum_failure("player artifact", &e))?;

    let secret = validated
        .secret()
        .map_err(|e| checksum_failure("passkey secret", &e))?;
    let client_digest = validated
        .cipher()
        .decrypt_and_deobfuscate(payload.checksum(), secret)
        .map_err(|e| checksum_failure("client checksum", &e))?;
    let server_obfuscated = validated
        .cipher()
        .decrypt(player_artifact.ciphertext())
        .map_err(|e| checksum_failure("player artifact decrypt", &e))?;
    let server_digest = player_artifact
        .reference()
        .reveal(&server_obfuscated)
        .map_err(|e| checksum_failure("reference digest", &e))?;

    if !constant_time_eq(client_digest.as_bytes(), server_digest.as_bytes()) {
        return Err(Failure::new(RejectReason::Checksum, "Checksum mismatch"));
    }
    Ok(())
}

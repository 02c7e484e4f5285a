//! # MODSENTRY Core
//!
//! Primitives shared by the server verifier and the client attestor.
//!
//! ## Design Principles
//!
//! 1. **Deterministic fingerprints** - Files sorted by name, one SHA-256 over the lot
//! 2. **Fail closed** - Every decryption failure is an error, never a default value
//! 3. **Constant time** - Secret-dependent comparisons never short-circuit
//! 4. **Injectable time** - Secret rotation reads a [`Clock`], not the system
//!
//! ## Example
//!
//! ```rust,ignore
//! use modsentry_core::{cipher, keys, ArtifactFilter, DirectoryFingerprint};
//!
//! let fp = DirectoryFingerprint::scan(Path::new("mods"), &ArtifactFilter::default())?;
//! let secret = keys::permanent_secret(today);
//! let passkey = keys::derive_passkey(&secret, player_uuid);
//! let wire = cipher::obfuscate_and_encrypt(fp.digest.as_str(), &secret, passkey.as_str())?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod cipher;
pub mod clock;
pub mod error;
pub mod fingerprint;
pub mod keys;

pub use cipher::PasskeyCipher;
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{CoreError, CoreResult};
pub use fingerprint::{
    aggregate, compute_directory_fingerprint, AggregateDigest, ArtifactFilter,
    DirectoryFingerprint, FileChecksum,
};
pub use keys::{constant_time_eq, derive_passkey, permanent_secret, KeyDeriver, Passkey};

//! # MODSENTRY Security - The Gatekeeper
//!
//! Server-side verification that a connecting client runs exactly the
//! expected mod set.
//!
//! ## Features
//!
//! - **Reference Store**: obfuscated aggregate of the expected mods, rebuilt atomically
//! - **Verification Protocol**: passkey first, then checksum, fail closed
//! - **Punishment Ladders**: per-player counters mapped to warn / temp ban / permanent ban
//! - **Sensitivity Analysis**: how different a rejected mod set is (advisory)
//! - **Audit Log**: masked, queued, never blocks a login
//!
//! ## Architecture
//!
//! ```text
//! CLIENT                               SERVER (Guard)
//!   │                                     │
//!   │◄── passkey ─────────────────────────│ issue_passkey()
//!   │                                     │
//!   │─── SyncPayload(passkey, checksum) ─►│ verify()
//!   │                                     │   ├─ passkey check (ct)
//!   │                                     │   ├─ player artifact from CheckSum_init
//!   │                                     │   └─ digest check (ct)
//!   │                                     │
//!   │◄── Accepted / "Mod verification ────│──► violation counter ─► ladder
//!   │     failed"                         │──► cheat.log
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod admin;
pub mod audit;
pub mod config;
pub mod error;
pub mod guard;
mod persist;
pub mod punishment;
pub mod refresh;
pub mod sensitivity;
pub mod store;
pub mod verification;

pub use admin::{AdminCommand, AdminError};
pub use audit::{mask_passkey, AuditKind, AuditLog, AuditRecord};
pub use config::GuardConfig;
pub use error::{GuardError, GuardResult};
pub use guard::Guard;
pub use punishment::{
    Enforcement, LadderError, PunishmentLadder, PunishmentPolicy, ViolationCategory,
    ViolationTracker,
};
pub use refresh::{RefreshOutcome, RefreshScheduler, RefreshTarget};
pub use sensitivity::{classify, recommends_punishment, SensitivityLevel, SensitivityReport};
pub use store::{PlayerArtifact, ReferenceArtifact, ReferenceStore, StoreSettings};
pub use verification::{Player, RejectReason, Verdict};

//! # Guard
//!
//! The one context object a host creates at startup. Owns the config,
//! the reference store, both ladders, the violation counters and the audit
//! log, and exposes them as plain method calls:
//!
//! ```text
//! host                         Guard
//! ────                         ─────
//! on player login   ─────────► verify()        ─► Verdict
//! on violation      ─────────► enforcement()   ─► Enforcement
//! on admin command  ─────────► AdminCommand::execute(&guard, ..)
//! at midnight       ─────────► RefreshScheduler (RefreshTarget for Guard)
//! ```
//!
//! If the reference cannot be built at boot the guard stays up but
//! disabled, and every login is rejected until a regeneration succeeds.

use crate::audit::{AuditKind, AuditLog, AuditRecord};
use crate::config::GuardConfig;
use crate::error::GuardResult;
use crate::punishment::{
    format_duration, Enforcement, LadderError, PunishmentLadder, PunishmentPolicy,
    ViolationCategory, ViolationTracker,
};
use crate::refresh::{RefreshScheduler, RefreshTarget};
use crate::sensitivity::{classify, recommends_punishment, SensitivityReport};
use crate::store::{ReferenceStore, StoreSettings};
use crate::verification::{self, Player, RejectReason, Verdict};
use modsentry_core::{ArtifactFilter, Clock, FileChecksum, KeyDeriver, Passkey};
use modsentry_shared::SyncPayload;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Server-side verification context.
pub struct Guard {
    config: RwLock<GuardConfig>,
    config_path: Option<PathBuf>,
    keys: KeyDeriver,
    store: ReferenceStore,
    policy: RwLock<PunishmentPolicy>,
    tracker: ViolationTracker,
    audit: AuditLog,
    enabled: AtomicBool,
}

impl Guard {
    /// Loads the config at `path` (creating it if missing) and boots.
    ///
    /// # Errors
    ///
    /// Fails only if the config file exists but cannot be parsed or read.
    /// A missing or empty reference directory does not fail; the guard
    /// boots disabled.
    pub fn boot_from_file(path: &Path, clock: Arc<dyn Clock>) -> GuardResult<Self> {
        let config = GuardConfig::load(path)?;
        let mut guard = Self::boot(config, clock);
        guard.config_path = Some(path.to_path_buf());
        Ok(guard)
    }

    /// Boots from an in-memory config. Ladder edits are not persisted.
    #[must_use]
    pub fn boot(mut config: GuardConfig, clock: Arc<dyn Clock>) -> Self {
        config.validate();

        let audit = AuditLog::open(
            &config.paths.audit_log,
            config.audit.queue_capacity,
            Arc::clone(&clock),
        )
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "cannot open audit log, audit records will be discarded");
            AuditLog::discard(Arc::clone(&clock))
        });
        audit.separator("Server Started");

        let keys = KeyDeriver::new(clock);
        let store = ReferenceStore::new(
            StoreSettings {
                reference_dir: config.paths.reference_dir.clone(),
                state_dir: config.paths.state_dir.clone(),
                filter: ArtifactFilter::new(&config.fingerprint.extension),
                persist_player_artifacts: config.artifacts.persist_player_artifacts,
            },
            keys.clone(),
        );
        let policy = policy_from(&config);

        let guard = Self {
            config: RwLock::new(config),
            config_path: None,
            keys,
            store,
            policy: RwLock::new(policy),
            tracker: ViolationTracker::new(),
            audit,
            enabled: AtomicBool::new(false),
        };

        match guard.regenerate("boot") {
            Ok(()) => tracing::info!("mod verification enabled"),
            Err(e) => {
                tracing::error!(error = %e, "mod verification disabled, all logins will be rejected");
            }
        }
        guard
    }

    /// Returns true if verification is operational.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Today's passkey for `player`, to be sent to their client.
    #[must_use]
    pub fn issue_passkey(&self, player: &Player) -> Passkey {
        let passkey = self.keys.passkey_for(&player.id);
        self.audit.record(
            AuditRecord::new(AuditKind::Generation, true)
                .player(&player.name, &player.id)
                .passkey(passkey.as_str())
                .details("Passkey generated for player"),
        );
        passkey
    }

    /// Verifies a validated sync payload.
    #[must_use]
    pub fn verify_payload(&self, player: &Player, payload: &SyncPayload) -> Verdict {
        self.verify(player, payload.passkey(), payload.checksum())
    }

    /// Runs the verification protocol for one login.
    ///
    /// Always returns a definite verdict. Mismatches and crypto failures
    /// count as violations; malformed input and a disabled guard do not.
    #[must_use]
    pub fn verify(&self, player: &Player, claimed_passkey: &str, claimed_checksum: &str) -> Verdict {
        let outcome = if self.is_enabled() {
            verification::run(
                &self.store,
                &self.keys,
                &player.id,
                claimed_passkey,
                claimed_checksum,
            )
        } else {
            Err(verification::Failure {
                reason: RejectReason::Unavailable,
                detail: "verification subsystem disabled".into(),
            })
        };

        match outcome {
            Ok(()) => {
                self.audit.record(
                    AuditRecord::new(AuditKind::PasskeyValidation, true)
                        .player(&player.name, &player.id)
                        .passkey(claimed_passkey)
                        .details("Client and server passkeys match"),
                );
                self.audit.record(
                    AuditRecord::new(AuditKind::ChecksumValidation, true)
                        .player(&player.name, &player.id)
                        .details("Client checksum matches reference"),
                );
                tracing::info!(player = %player, "mod verification passed");
                Verdict::Accepted
            }
            Err(failure) => {
                let violations = failure
                    .reason
                    .category()
                    .map_or(0, |category| self.tracker.record(&player.id, category));

                let kind = match failure.reason {
                    RejectReason::Checksum => AuditKind::ChecksumValidation,
                    RejectReason::Passkey | RejectReason::Malformed => AuditKind::PasskeyValidation,
                    RejectReason::Unavailable => AuditKind::Error,
                };
                self.audit.record(
                    AuditRecord::new(kind, false)
                        .player(&player.name, &player.id)
                        .passkey(claimed_passkey)
                        .reason(failure.detail.clone())
                        .details(format!("Rejected ({}). Violations: {violations}", failure.reason)),
                );
                tracing::warn!(
                    player = %player,
                    reason = %failure.reason,
                    violations,
                    "mod verification failed"
                );

                Verdict::Rejected {
                    reason: failure.reason,
                    violations,
                }
            }
        }
    }

    /// Increments a violation counter; returns the new count.
    pub fn record_violation(&self, player: &Player, category: ViolationCategory) -> u32 {
        self.tracker.record(&player.id, category)
    }

    /// Records a violation on an admin's behalf and audits it.
    pub fn record_manual_violation(
        &self,
        player: &Player,
        category: ViolationCategory,
        admin: &str,
    ) -> (u32, Enforcement) {
        let count = self.record_violation(player, category);
        let duration = self.resolve_duration(category, count);
        let enforcement = self.enforcement(category, count);

        self.audit.record(
            AuditRecord::new(AuditKind::ManualViolation, false)
                .player(&player.name, &player.id)
                .reason("Admin triggered")
                .details(format!(
                    "Manual {category} violation triggered by admin '{admin}'. \
                     Total violations: {count}. Punishment: {}",
                    format_duration(duration)
                )),
        );
        tracing::warn!(player = %player, %category, admin, count, "manual violation");
        (count, enforcement)
    }

    /// Current violation count, without modifying it.
    #[must_use]
    pub fn violation_count(&self, identity: &str, category: ViolationCategory) -> u32 {
        self.tracker.count(identity, category)
    }

    /// Ladder duration for the `count`th violation.
    #[must_use]
    pub fn resolve_duration(&self, category: ViolationCategory, count: u32) -> i64 {
        self.policy.read().ladder(category).resolve_duration(count)
    }

    /// Action for the `count`th violation (warning if the category is off).
    #[must_use]
    pub fn enforcement(&self, category: ViolationCategory, count: u32) -> Enforcement {
        self.policy.read().enforcement_for(category, count)
    }

    /// Snapshot of a ladder.
    #[must_use]
    pub fn ladder(&self, category: ViolationCategory) -> PunishmentLadder {
        self.policy.read().ladder(category).clone()
    }

    /// One ladder step.
    ///
    /// # Errors
    ///
    /// Fails if `index` is outside `[0, 29]` or past the end.
    pub fn get_step(&self, category: ViolationCategory, index: usize) -> Result<i64, LadderError> {
        self.policy.read().ladder(category).get(index)
    }

    /// Sets one ladder step and persists the config.
    ///
    /// # Errors
    ///
    /// Fails on an invalid index or duration, or if the config cannot be
    /// saved. On any error the ladder and config are left as they were.
    pub fn set_step(
        &self,
        category: ViolationCategory,
        index: usize,
        duration: i64,
    ) -> GuardResult<()> {
        let mut policy = self.policy.write();
        let previous = policy.ladder(category).clone();

        let ladder = policy.ladder_mut(category);
        ladder.set(index, duration)?;
        let steps = ladder.steps().to_vec();

        let mut config = self.config.write();
        let saved_steps = std::mem::replace(config.steps_mut(category), steps);

        if let Some(path) = &self.config_path {
            if let Err(e) = config.save(path) {
                *config.steps_mut(category) = saved_steps;
                *policy.ladder_mut(category) = previous;
                tracing::error!(%category, index, error = %e, "punishment step not saved, reverted");
                return Err(e);
            }
        }
        tracing::info!(%category, index, duration, "punishment step updated");
        Ok(())
    }

    /// Writes the current config back to its file, if it came from one.
    ///
    /// # Errors
    ///
    /// Fails if the write fails.
    pub fn save_config(&self) -> GuardResult<()> {
        match &self.config_path {
            Some(path) => self.config.read().save(path),
            None => Ok(()),
        }
    }

    /// Snapshot of the current config.
    #[must_use]
    pub fn config(&self) -> GuardConfig {
        self.config.read().clone()
    }

    /// Regenerates the reference artifact now.
    ///
    /// Success re-enables a guard that booted disabled.
    ///
    /// # Errors
    ///
    /// Fails if the reference directory is missing or empty, or the
    /// artifact cannot be written. The previous artifact stays in place.
    pub fn force_regenerate(&self) -> GuardResult<()> {
        self.regenerate("manual")
    }

    fn regenerate(&self, trigger: &str) -> GuardResult<()> {
        match self.store.generate_reference_artifact() {
            Ok(artifact) => {
                self.enabled.store(true, Ordering::Release);
                self.audit.record(AuditRecord::new(AuditKind::Refresh, true).details(format!(
                    "Reference regenerated ({trigger}), {} files",
                    artifact.files().len()
                )));
                Ok(())
            }
            Err(e) => {
                self.audit.record(
                    AuditRecord::new(AuditKind::Refresh, false)
                        .reason(e.to_string())
                        .details(format!("Reference regeneration failed ({trigger})")),
                );
                Err(e)
            }
        }
    }

    /// Compares a client's file list against the reference and, when
    /// sensitivity checks are on, writes the analysis to the audit log.
    ///
    /// The result is context for operators; it never changes a verdict.
    ///
    /// # Errors
    ///
    /// Returns [`crate::GuardError::Unavailable`] if no reference is loaded.
    pub fn audit_mismatch(
        &self,
        player: &Player,
        client_files: &[FileChecksum],
    ) -> GuardResult<SensitivityReport> {
        let reference = self.store.current()?;
        let sensitivity = self.config.read().sensitivity.clone();
        let (low, high) = sensitivity.thresholds();

        let report = classify(client_files, reference.files(), low, high);

        if sensitivity.enabled {
            let recommend = recommends_punishment(report.level, sensitivity.strict);
            self.audit.record(
                AuditRecord::new(AuditKind::Sensitivity, report.total_differences() == 0)
                    .player(&player.name, &player.id)
                    .reason(report.level.label())
                    .details(format!(
                        "{} | added: {:?} | removed: {:?} | modified: {:?} | punishment recommended: {recommend}",
                        report.message(),
                        report.added,
                        report.removed,
                        report.modified
                    )),
            );
        }
        Ok(report)
    }

    /// Audit separator for a connecting player.
    pub fn player_connected(&self, player: &Player) {
        self.audit.separator(format!("Player Connected: {player}"));
    }

    /// Audit separator for a leaving player.
    pub fn player_disconnected(&self, player: &Player) {
        self.audit.separator(format!("Player Disconnected: {player}"));
    }

    /// The audit log.
    #[must_use]
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// The reference store.
    #[must_use]
    pub fn store(&self) -> &ReferenceStore {
        &self.store
    }

    /// Builds the midnight scheduler for this guard, or `None` if the
    /// refresh is disabled in the config.
    #[must_use]
    pub fn scheduler(self: &Arc<Self>) -> Option<RefreshScheduler> {
        let refresh = self.config.read().refresh.clone();
        if !refresh.enabled {
            return None;
        }
        let target: Arc<dyn RefreshTarget> = Arc::clone(self) as Arc<dyn RefreshTarget>;
        Some(RefreshScheduler::new(
            target,
            Arc::clone(self.keys.clock()),
            Duration::from_secs(refresh.cooldown_secs),
        ))
    }
}

impl RefreshTarget for Guard {
    fn refresh(&self) -> GuardResult<()> {
        self.regenerate("scheduled")
    }
}

impl Drop for Guard {
    fn drop(&mut self) {
        self.audit.separator("Server Stopped");
    }
}

impl std::fmt::Debug for Guard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guard")
            .field("enabled", &self.is_enabled())
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

fn policy_from(config: &GuardConfig) -> PunishmentPolicy {
    let ladder = |name: &str, steps: &[i64]| {
        PunishmentLadder::new(steps.to_vec()).unwrap_or_else(|e| {
            tracing::error!(ladder = name, error = %e, "invalid ladder, using warnings only");
            PunishmentLadder::default()
        })
    };
    PunishmentPolicy::new(
        ladder("checksum", &config.punishment.checksum_steps),
        ladder("passkey", &config.punishment.passkey_steps),
        config.punishment.enabled,
        config.punishment.passkey_enabled,
    )
}

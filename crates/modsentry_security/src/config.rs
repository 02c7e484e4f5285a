//! # Guard Configuration
//!
//! Loaded once at startup from TOML, written back when an admin edits a
//! ladder. Every section has defaults, so a partial file is fine and a
//! missing file is created with the defaults.
//!
//! ```toml
//! [paths]
//! reference_dir = "mods_client"
//! state_dir = "config/modsentry"
//! audit_log = "logs/cheat.log"
//!
//! [punishment]
//! enabled = true
//! checksum_steps = [60, 300, 600, 1800, 3600, 7200, 14400, 28800, 86400, -1]
//! ```

use crate::error::{GuardError, GuardResult};
use crate::persist::write_atomic;
use crate::punishment::{ViolationCategory, MAX_LADDER_STEPS, PERMANENT};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Low threshold used when the configured one is negative.
pub const DEFAULT_LOW_THRESHOLD: i64 = 2;

/// High threshold used when the configured one is below the low threshold.
pub const DEFAULT_HIGH_THRESHOLD: i64 = 10;

/// Complete server-side configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Filesystem locations.
    #[serde(default)]
    pub paths: PathsConfig,
    /// Fingerprint settings.
    #[serde(default)]
    pub fingerprint: FingerprintConfig,
    /// Punishment ladders.
    #[serde(default)]
    pub punishment: PunishmentConfig,
    /// Sensitivity analysis.
    #[serde(default)]
    pub sensitivity: SensitivityConfig,
    /// Scheduled refresh.
    #[serde(default)]
    pub refresh: RefreshConfig,
    /// Audit log.
    #[serde(default)]
    pub audit: AuditConfig,
    /// Player artifact handling.
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
}

/// Filesystem locations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding the expected client mods.
    #[serde(default = "default_reference_dir")]
    pub reference_dir: PathBuf,
    /// Directory for `CheckSum_init` and player artifacts.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    /// Audit log file.
    #[serde(default = "default_audit_log")]
    pub audit_log: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            reference_dir: default_reference_dir(),
            state_dir: default_state_dir(),
            audit_log: default_audit_log(),
        }
    }
}

fn default_reference_dir() -> PathBuf {
    PathBuf::from("mods_client")
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("config/modsentry")
}

fn default_audit_log() -> PathBuf {
    PathBuf::from("logs/cheat.log")
}

/// Fingerprint settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintConfig {
    /// Artifact extension, matched case-insensitively.
    #[serde(default = "default_extension")]
    pub extension: String,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            extension: default_extension(),
        }
    }
}

fn default_extension() -> String {
    modsentry_core::fingerprint::DEFAULT_EXTENSION.to_string()
}

/// Punishment ladders, in seconds (`-1` permanent, `0` warning).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PunishmentConfig {
    /// Punish checksum violations.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Checksum ladder.
    #[serde(default = "default_checksum_steps")]
    pub checksum_steps: Vec<i64>,
    /// Punish passkey violations.
    #[serde(default = "default_true")]
    pub passkey_enabled: bool,
    /// Passkey ladder.
    #[serde(default = "default_passkey_steps")]
    pub passkey_steps: Vec<i64>,
}

impl Default for PunishmentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            checksum_steps: default_checksum_steps(),
            passkey_enabled: true,
            passkey_steps: default_passkey_steps(),
        }
    }
}

fn default_checksum_steps() -> Vec<i64> {
    vec![60, 300, 600, 1800, 3600, 7200, 14400, 28800, 86400, PERMANENT]
}

fn default_passkey_steps() -> Vec<i64> {
    vec![300, 1800, 7200, 86400, PERMANENT]
}

/// Sensitivity analysis thresholds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensitivityConfig {
    /// Write mismatch analyses to the audit log.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Differences up to this count are LOW.
    #[serde(default = "default_low_threshold")]
    pub low_threshold: i64,
    /// Differences from this count are HIGH.
    #[serde(default = "default_high_threshold")]
    pub high_threshold: i64,
    /// Recommend punishment for LOW differences too.
    #[serde(default)]
    pub strict: bool,
}

impl Default for SensitivityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            low_threshold: DEFAULT_LOW_THRESHOLD,
            high_threshold: DEFAULT_HIGH_THRESHOLD,
            strict: false,
        }
    }
}

impl SensitivityConfig {
    /// Thresholds as counts. Call after [`GuardConfig::validate`].
    #[must_use]
    pub fn thresholds(&self) -> (usize, usize) {
        let low = usize::try_from(self.low_threshold).unwrap_or(2);
        let high = usize::try_from(self.high_threshold).unwrap_or(10);
        (low, high)
    }
}

fn default_low_threshold() -> i64 {
    DEFAULT_LOW_THRESHOLD
}

fn default_high_threshold() -> i64 {
    DEFAULT_HIGH_THRESHOLD
}

/// Scheduled refresh of the reference artifact.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Regenerate after local midnight.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Minimum seconds between two refreshes.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

fn default_cooldown_secs() -> u64 {
    300
}

/// Audit log queue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Records buffered before new ones are dropped.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_queue_capacity() -> usize {
    1024
}

/// Player artifact handling.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    /// Also write each player artifact to `state_dir`.
    #[serde(default)]
    pub persist_player_artifacts: bool,
}

fn default_true() -> bool {
    true
}

impl GuardConfig {
    /// The configured ladder for `category`.
    pub(crate) fn steps_mut(&mut self, category: ViolationCategory) -> &mut Vec<i64> {
        match category {
            ViolationCategory::Checksum => &mut self.punishment.checksum_steps,
            ViolationCategory::Passkey => &mut self.punishment.passkey_steps,
        }
    }

    /// Loads `path`, or writes and returns defaults if it does not exist.
    ///
    /// The result is validated; repairs are logged.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::Configuration`] for unparsable TOML and
    /// [`GuardError::Storage`] for I/O failures.
    pub fn load(path: &Path) -> GuardResult<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "no config found, writing defaults");
            let config = Self::default();
            config.save(path)?;
            return Ok(config);
        }

        let content = fs::read_to_string(path).map_err(|e| GuardError::storage(path, e))?;
        let mut config = Self::from_toml(&content)?;
        config.validate();
        Ok(config)
    }

    /// Parses a TOML document without validating it.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::Configuration`] if the document is invalid.
    pub fn from_toml(content: &str) -> GuardResult<Self> {
        toml::from_str(content).map_err(|e| GuardError::Configuration(e.to_string()))
    }

    /// Writes the config to `path` atomically.
    ///
    /// # Errors
    ///
    /// Fails if serialization or the write fails.
    pub fn save(&self, path: &Path) -> GuardResult<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| GuardError::Configuration(e.to_string()))?;
        write_atomic(path, content.as_bytes())
    }

    /// Repairs out-of-range values in place. Returns the number of repairs.
    ///
    /// - ladder steps below `-1` become `0`
    /// - ladders longer than 30 steps are truncated
    /// - a negative low threshold becomes 2
    /// - a high threshold below the low threshold becomes 10
    pub fn validate(&mut self) -> usize {
        let mut repairs = repair_ladder("checksum", &mut self.punishment.checksum_steps);
        repairs += repair_ladder("passkey", &mut self.punishment.passkey_steps);

        let sensitivity = &mut self.sensitivity;
        if sensitivity.low_threshold < 0 {
            tracing::warn!(
                value = sensitivity.low_threshold,
                "negative low threshold, using {DEFAULT_LOW_THRESHOLD}"
            );
            sensitivity.low_threshold = DEFAULT_LOW_THRESHOLD;
            repairs += 1;
        }
        if sensitivity.high_threshold < sensitivity.low_threshold {
            tracing::warn!(
                low = sensitivity.low_threshold,
                high = sensitivity.high_threshold,
                "high threshold below low threshold, using {DEFAULT_HIGH_THRESHOLD}"
            );
            sensitivity.high_threshold = DEFAULT_HIGH_THRESHOLD;
            repairs += 1;
        }

        repairs
    }
}

fn repair_ladder(name: &str, steps: &mut Vec<i64>) -> usize {
    let mut repairs = 0;
    for (index, step) in steps.iter_mut().enumerate() {
        if *step < PERMANENT {
            tracing::warn!(ladder = name, index, value = *step, "invalid step, using 0");
            *step = 0;
            repairs += 1;
        }
    }
    if steps.len() > MAX_LADDER_STEPS {
        tracing::warn!(ladder = name, len = steps.len(), "ladder too long, truncating to {MAX_LADDER_STEPS}");
        steps.truncate(MAX_LADDER_STEPS);
        repairs += 1;
    }
    repairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_gets_defaults() {
        let config = GuardConfig::from_toml("[sensitivity]\nstrict = true\n").unwrap();
        assert!(config.sensitivity.strict);
        assert_eq!(config.sensitivity.low_threshold, 2);
        assert_eq!(config.punishment.passkey_steps, vec![300, 1800, 7200, 86400, -1]);
        assert_eq!(config.paths.reference_dir, PathBuf::from("mods_client"));
        assert_eq!(config.fingerprint.extension, "jar");
    }

    #[test]
    fn test_malformed_file_is_configuration_error() {
        let result = GuardConfig::from_toml("[punishment\nenabled = ");
        assert!(matches!(result, Err(GuardError::Configuration(_))));
    }

    #[test]
    fn test_validate_repairs_ladders() {
        let mut config = GuardConfig::default();
        config.punishment.checksum_steps = vec![60, -5, -1];
        config.punishment.passkey_steps = vec![1; 40];

        let repairs = config.validate();

        assert_eq!(config.punishment.checksum_steps, vec![60, 0, -1]);
        assert_eq!(config.punishment.passkey_steps.len(), MAX_LADDER_STEPS);
        assert_eq!(repairs, 2);
    }

    #[test]
    fn test_validate_repairs_thresholds() {
        let mut config = GuardConfig::default();
        config.sensitivity.low_threshold = -3;
        config.sensitivity.high_threshold = 1;
        config.validate();

        assert_eq!(config.sensitivity.thresholds(), (2, 10));
    }

    #[test]
    fn test_load_creates_defaults_then_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("modsentry.toml");

        let created = GuardConfig::load(&path).unwrap();
        assert!(path.exists());
        assert_eq!(created, GuardConfig::default());

        let mut edited = created.clone();
        edited.punishment.checksum_steps = vec![10, 20, -1];
        edited.save(&path).unwrap();

        assert_eq!(GuardConfig::load(&path).unwrap(), edited);
    }
}

//! # Sensitivity Analyzer
//!
//! Characterizes *how different* a client's mods are from the reference.
//! Advisory only: the verdict is decided by the verification protocol, this
//! just gives operators context in the audit log.
//!
//! ```text
//! d = added + removed + modified
//!
//! d == 0              NO_DIFFERENCE
//! d <= low            LOW             (testing one mod?)
//! d <  high           MEDIUM          (suspicious)
//! d <  0.8 * |ref|    HIGH            (wrong modpack?)
//! otherwise           TOTAL_MISMATCH  (different install)
//! ```

use modsentry_core::FileChecksum;
use std::collections::HashMap;
use std::fmt;

/// Severity band of a mismatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SensitivityLevel {
    /// Identical file sets.
    NoDifference,
    /// A handful of files differ.
    Low,
    /// Between the thresholds.
    Medium,
    /// At or above the high threshold.
    High,
    /// At least 80% of the reference set differs.
    TotalMismatch,
}

impl SensitivityLevel {
    /// Upper-case label used in the audit log.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::NoDifference => "NO_DIFFERENCE",
            Self::Low => "LOW_DIFFERENCE",
            Self::Medium => "MEDIUM_DIFFERENCE",
            Self::High => "HIGH_DIFFERENCE",
            Self::TotalMismatch => "TOTAL_MISMATCH",
        }
    }
}

impl fmt::Display for SensitivityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of comparing two file sets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SensitivityReport {
    /// Files only the client has, sorted.
    pub added: Vec<String>,
    /// Files only the reference has, sorted.
    pub removed: Vec<String>,
    /// Files both have with different SHA-256, sorted.
    pub modified: Vec<String>,
    /// Severity band.
    pub level: SensitivityLevel,
}

impl SensitivityReport {
    /// Added + removed + modified.
    #[must_use]
    pub fn total_differences(&self) -> usize {
        self.added.len() + self.removed.len() + self.modified.len()
    }

    /// One-line summary for operators.
    #[must_use]
    pub fn message(&self) -> String {
        let d = self.total_differences();
        match self.level {
            SensitivityLevel::NoDifference => "No differences detected".to_string(),
            SensitivityLevel::Low => {
                format!("Low difference ({d} files) - possible intentional testing")
            }
            SensitivityLevel::Medium => {
                format!("Medium difference ({d} files) - suspicious activity")
            }
            SensitivityLevel::High => {
                format!("High difference ({d} files) - possible wrong modpack")
            }
            SensitivityLevel::TotalMismatch => {
                format!("Total mismatch ({d} files) - completely different mod list")
            }
        }
    }
}

impl fmt::Display for SensitivityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: added={} removed={} modified={}",
            self.level,
            self.added.len(),
            self.removed.len(),
            self.modified.len()
        )
    }
}

/// Compares a client file set against the reference set.
///
/// Name-keyed maps keep this linear in the number of files.
#[must_use]
pub fn classify(
    client: &[FileChecksum],
    reference: &[FileChecksum],
    low_threshold: usize,
    high_threshold: usize,
) -> SensitivityReport {
    let client_map: HashMap<&str, &FileChecksum> =
        client.iter().map(|c| (c.file_name.as_str(), c)).collect();
    let reference_map: HashMap<&str, &FileChecksum> =
        reference.iter().map(|c| (c.file_name.as_str(), c)).collect();

    let mut added = Vec::new();
    let mut modified = Vec::new();
    for (name, client_sum) in &client_map {
        match reference_map.get(name) {
            None => added.push((*name).to_string()),
            Some(reference_sum) if reference_sum.sha256 != client_sum.sha256 => {
                modified.push((*name).to_string());
            }
            Some(_) => {}
        }
    }
    let mut removed: Vec<String> = reference_map
        .keys()
        .filter(|name| !client_map.contains_key(*name))
        .map(|name| (*name).to_string())
        .collect();

    added.sort_unstable();
    removed.sort_unstable();
    modified.sort_unstable();

    let d = added.len() + removed.len() + modified.len();
    let level = level_for(d, reference_map.len(), low_threshold, high_threshold);

    SensitivityReport {
        added,
        removed,
        modified,
        level,
    }
}

fn level_for(d: usize, reference_len: usize, low: usize, high: usize) -> SensitivityLevel {
    if d == 0 {
        SensitivityLevel::NoDifference
    } else if d <= low {
        SensitivityLevel::Low
    } else if d < high {
        SensitivityLevel::Medium
    } else if d.saturating_mul(5) < reference_len.saturating_mul(4) {
        SensitivityLevel::High
    } else {
        SensitivityLevel::TotalMismatch
    }
}

/// Whether a mismatch of this severity would merit punishment.
///
/// Advisory metadata for the audit log; verification never consults it.
#[must_use]
pub const fn recommends_punishment(level: SensitivityLevel, strict: bool) -> bool {
    match level {
        SensitivityLevel::Low => strict,
        SensitivityLevel::Medium => true,
        SensitivityLevel::NoDifference | SensitivityLevel::High | SensitivityLevel::TotalMismatch => {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sum(name: &str, sha: &str) -> FileChecksum {
        FileChecksum {
            file_name: name.to_string(),
            crc32: 0,
            sha256: sha.to_string(),
            md5: String::new(),
        }
    }

    fn reference(n: usize) -> Vec<FileChecksum> {
        (0..n).map(|i| sum(&format!("mod{i:02}.jar"), "ref")).collect()
    }

    #[test]
    fn test_identical_sets() {
        let r = reference(5);
        let report = classify(&r, &r, 2, 10);
        assert_eq!(report.level, SensitivityLevel::NoDifference);
        assert_eq!(report.total_differences(), 0);
    }

    #[test]
    fn test_single_modified_file() {
        let server = vec![sum("A.jar", "aaa"), sum("B.jar", "bbb")];
        let client = vec![sum("A.jar", "aaa"), sum("B.jar", "evil")];

        let report = classify(&client, &server, 2, 10);
        assert!(report.added.is_empty());
        assert!(report.removed.is_empty());
        assert_eq!(report.modified, vec!["B.jar".to_string()]);
        assert_eq!(report.level, SensitivityLevel::Low);
    }

    #[test]
    fn test_added_and_removed() {
        let server = vec![sum("A.jar", "a"), sum("B.jar", "b")];
        let client = vec![sum("A.jar", "a"), sum("X.jar", "x"), sum("Y.jar", "y")];

        let report = classify(&client, &server, 2, 10);
        assert_eq!(report.added, vec!["X.jar".to_string(), "Y.jar".to_string()]);
        assert_eq!(report.removed, vec!["B.jar".to_string()]);
        assert_eq!(report.level, SensitivityLevel::Medium);
    }

    #[test]
    fn test_bands_over_a_large_reference() {
        let server = reference(50);
        let band = |changed: usize| {
            let mut client = server.clone();
            for c in client.iter_mut().take(changed) {
                c.sha256 = "changed".to_string();
            }
            classify(&client, &server, 2, 10).level
        };

        assert_eq!(band(1), SensitivityLevel::Low);
        assert_eq!(band(2), SensitivityLevel::Low);
        assert_eq!(band(3), SensitivityLevel::Medium);
        assert_eq!(band(9), SensitivityLevel::Medium);
        assert_eq!(band(10), SensitivityLevel::High);
        assert_eq!(band(39), SensitivityLevel::High);
        assert_eq!(band(40), SensitivityLevel::TotalMismatch);
    }

    #[test]
    fn test_completely_different_install() {
        let server = reference(5);
        let client: Vec<_> = (0..5).map(|i| sum(&format!("other{i}.jar"), "x")).collect();
        let report = classify(&client, &server, 2, 10);
        assert_eq!(report.total_differences(), 10);
        assert_eq!(report.level, SensitivityLevel::TotalMismatch);
    }

    #[test]
    fn test_recommendation_table() {
        assert!(!recommends_punishment(SensitivityLevel::NoDifference, true));
        assert!(!recommends_punishment(SensitivityLevel::Low, false));
        assert!(recommends_punishment(SensitivityLevel::Low, true));
        assert!(recommends_punishment(SensitivityLevel::Medium, false));
        assert!(!recommends_punishment(SensitivityLevel::High, true));
        assert!(!recommends_punishment(SensitivityLevel::TotalMismatch, true));
    }

    #[test]
    fn test_message() {
        let server = vec![sum("A.jar", "a")];
        let report = classify(&[], &server, 2, 10);
        assert_eq!(report.message(), "Low difference (1 files) - possible intentional testing");
        assert_eq!(report.to_string(), "LOW_DIFFERENCE: added=0 removed=1 modified=0");
    }
}

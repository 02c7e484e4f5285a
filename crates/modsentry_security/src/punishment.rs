//! # Punishment Escalation
//!
//! Policy only: this module says *what* the ladder prescribes for a
//! player's Nth violation. Kicking and banning belong to the host.
//!
//! ```text
//! violations:   1     2     3     4     5     6 ...
//! ladder:     [ 60,  300,   -1 ]
//! duration:     60   300    -1    -1    -1    -1      (last step repeats)
//! ```
//!
//! Counters are per (player, category), only ever go up, and live until
//! the process exits.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Ladder value for a permanent ban.
pub const PERMANENT: i64 = -1;

/// Ladder value for a warning (kick only).
pub const WARNING: i64 = 0;

/// Maximum ladder length.
pub const MAX_LADDER_STEPS: usize = 30;

/// Kind of violation being counted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ViolationCategory {
    /// Client fingerprint did not match the reference.
    Checksum,
    /// Client passkey did not match the expected one.
    Passkey,
}

impl fmt::Display for ViolationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Checksum => f.write_str("checksum"),
            Self::Passkey => f.write_str("passkey"),
        }
    }
}

impl FromStr for ViolationCategory {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "checksum" => Ok(Self::Checksum),
            "passkey" => Ok(Self::Passkey),
            _ => Err(()),
        }
    }
}

/// Ladder mutation errors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum LadderError {
    /// Index outside `[0, 29]`.
    #[error("step index {0} out of range (0-{})", MAX_LADDER_STEPS - 1)]
    IndexOutOfRange(usize),

    /// Index within range but past the end of the ladder.
    #[error("no step at index {index} (ladder has {len} steps)")]
    NoSuchStep {
        /// Requested index.
        index: usize,
        /// Current ladder length.
        len: usize,
    },

    /// Duration below `-1`.
    #[error("invalid duration {0}: must be -1, 0 or positive")]
    InvalidDuration(i64),

    /// More than 30 steps.
    #[error("ladder has {0} steps, maximum is {MAX_LADDER_STEPS}")]
    TooLong(usize),
}

/// Renders a ladder value for operators.
#[must_use]
pub fn format_duration(duration: i64) -> String {
    match duration {
        PERMANENT => "PERMANENT BAN".to_string(),
        WARNING => "WARNING only".to_string(),
        secs => format!("{secs} seconds"),
    }
}

/// Ordered list of escalating durations.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PunishmentLadder {
    steps: Vec<i64>,
}

impl PunishmentLadder {
    /// Creates a validated ladder.
    ///
    /// # Errors
    ///
    /// Fails on more than 30 steps or any step below `-1`.
    pub fn new(steps: Vec<i64>) -> Result<Self, LadderError> {
        if steps.len() > MAX_LADDER_STEPS {
            return Err(LadderError::TooLong(steps.len()));
        }
        if let Some(&bad) = steps.iter().find(|&&s| s < PERMANENT) {
            return Err(LadderError::InvalidDuration(bad));
        }
        Ok(Self { steps })
    }

    /// All steps in order.
    #[must_use]
    pub fn steps(&self) -> &[i64] {
        &self.steps
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if the ladder has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Step at `index`.
    ///
    /// # Errors
    ///
    /// Fails if `index` is outside `[0, 29]` or past the end.
    pub fn get(&self, index: usize) -> Result<i64, LadderError> {
        if index >= MAX_LADDER_STEPS {
            return Err(LadderError::IndexOutOfRange(index));
        }
        self.steps
            .get(index)
            .copied()
            .ok_or(LadderError::NoSuchStep {
                index,
                len: self.steps.len(),
            })
    }

    /// Sets the step at `index`. Gaps past the end are filled with warnings.
    ///
    /// # Errors
    ///
    /// Fails if `index` is outside `[0, 29]` or `duration < -1`. The ladder
    /// is untouched on error.
    pub fn set(&mut self, index: usize, duration: i64) -> Result<(), LadderError> {
        if index >= MAX_LADDER_STEPS {
            return Err(LadderError::IndexOutOfRange(index));
        }
        if duration < PERMANENT {
            return Err(LadderError::InvalidDuration(duration));
        }
        if index >= self.steps.len() {
            self.steps.resize(index + 1, WARNING);
        }
        self.steps[index] = duration;
        Ok(())
    }

    /// Duration for the `count`th violation.
    ///
    /// Zero violations or an empty ladder give `0`. Counts past the end
    /// repeat the last step.
    #[must_use]
    pub fn resolve_duration(&self, count: u32) -> i64 {
        if count == 0 {
            return WARNING;
        }
        let Some(last) = self.steps.len().checked_sub(1) else {
            return WARNING;
        };
        let index = usize::try_from(count - 1).map_or(last, |i| i.min(last));
        self.steps[index]
    }
}

impl fmt::Display for PunishmentLadder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, step) in self.steps.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "[{index}] {}", format_duration(*step))?;
        }
        Ok(())
    }
}

/// What the host should do to a player.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Enforcement {
    /// Kick with a warning.
    Warning,
    /// Ban for a fixed time.
    TemporaryBan(Duration),
    /// Ban forever.
    PermanentBan,
}

impl Enforcement {
    /// Maps a ladder value onto an action.
    #[must_use]
    pub fn from_duration(duration: i64) -> Self {
        match duration {
            PERMANENT => Self::PermanentBan,
            secs if secs > 0 => Self::TemporaryBan(Duration::from_secs(secs.unsigned_abs())),
            _ => Self::Warning,
        }
    }
}

impl fmt::Display for Enforcement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => f.write_str("warning"),
            Self::TemporaryBan(d) => write!(f, "temporary ban ({}s)", d.as_secs()),
            Self::PermanentBan => f.write_str("permanent ban"),
        }
    }
}

/// Both ladders plus their on/off switches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PunishmentPolicy {
    checksum: PunishmentLadder,
    passkey: PunishmentLadder,
    checksum_enabled: bool,
    passkey_enabled: bool,
}

impl PunishmentPolicy {
    /// Creates a policy.
    #[must_use]
    pub fn new(
        checksum: PunishmentLadder,
        passkey: PunishmentLadder,
        checksum_enabled: bool,
        passkey_enabled: bool,
    ) -> Self {
        Self {
            checksum,
            passkey,
            checksum_enabled,
            passkey_enabled,
        }
    }

    /// Ladder for `category`.
    #[must_use]
    pub fn ladder(&self, category: ViolationCategory) -> &PunishmentLadder {
        match category {
            ViolationCategory::Checksum => &self.checksum,
            ViolationCategory::Passkey => &self.passkey,
        }
    }

    /// Mutable ladder for `category`.
    pub fn ladder_mut(&mut self, category: ViolationCategory) -> &mut PunishmentLadder {
        match category {
            ViolationCategory::Checksum => &mut self.checksum,
            ViolationCategory::Passkey => &mut self.passkey,
        }
    }

    /// Returns true if punishment is enabled for `category`.
    #[must_use]
    pub fn is_enabled(&self, category: ViolationCategory) -> bool {
        match category {
            ViolationCategory::Checksum => self.checksum_enabled,
            ViolationCategory::Passkey => self.passkey_enabled,
        }
    }

    /// Action for the `count`th violation. Disabled categories only warn.
    #[must_use]
    pub fn enforcement_for(&self, category: ViolationCategory, count: u32) -> Enforcement {
        if !self.is_enabled(category) {
            return Enforcement::Warning;
        }
        Enforcement::from_duration(self.ladder(category).resolve_duration(count))
    }
}

/// Per-player, per-category violation counters.
#[derive(Debug, Default)]
pub struct ViolationTracker {
    counters: RwLock<HashMap<(String, ViolationCategory), Arc<AtomicU32>>>,
}

impl ViolationTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the counter and returns the new count.
    pub fn record(&self, identity: &str, category: ViolationCategory) -> u32 {
        let counter = self.counter(identity, category);
        let previous = counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| Some(c.saturating_add(1)))
            .unwrap_or_else(|c| c);
        previous.saturating_add(1)
    }

    /// Current count without modifying it.
    #[must_use]
    pub fn count(&self, identity: &str, category: ViolationCategory) -> u32 {
        self.counters
            .read()
            .get(&(identity.to_string(), category))
            .map_or(0, |c| c.load(Ordering::Acquire))
    }

    fn counter(&self, identity: &str, category: ViolationCategory) -> Arc<AtomicU32> {
        let key = (identity.to_string(), category);
        if let Some(counter) = self.counters.read().get(&key) {
            return Arc::clone(counter);
        }
        Arc::clone(self.counters.write().entry(key).or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ladder(steps: &[i64]) -> PunishmentLadder {
        PunishmentLadder::new(steps.to_vec()).unwrap()
    }

    #[test]
    fn test_resolve_duration_repeats_last_step() {
        let l = ladder(&[60, 300, -1]);
        assert_eq!(l.resolve_duration(0), 0);
        assert_eq!(l.resolve_duration(1), 60);
        assert_eq!(l.resolve_duration(2), 300);
        assert_eq!(l.resolve_duration(3), -1);
        assert_eq!(l.resolve_duration(5), -1);
        assert_eq!(l.resolve_duration(u32::MAX), -1);
    }

    #[test]
    fn test_empty_ladder_only_warns() {
        let l = ladder(&[]);
        assert_eq!(l.resolve_duration(7), 0);
    }

    #[test]
    fn test_ladder_rejects_invalid_values() {
        assert_eq!(
            PunishmentLadder::new(vec![60, -2]),
            Err(LadderError::InvalidDuration(-2))
        );
        assert_eq!(
            PunishmentLadder::new(vec![1; 31]),
            Err(LadderError::TooLong(31))
        );
    }

    #[test]
    fn test_set_validates_and_pads() {
        let mut l = ladder(&[60]);

        assert_eq!(l.set(30, 10), Err(LadderError::IndexOutOfRange(30)));
        assert_eq!(l.set(0, -2), Err(LadderError::InvalidDuration(-2)));
        assert_eq!(l.steps(), &[60]);

        l.set(3, -1).unwrap();
        assert_eq!(l.steps(), &[60, 0, 0, -1]);

        l.set(29, 5).unwrap();
        assert_eq!(l.len(), MAX_LADDER_STEPS);
    }

    #[test]
    fn test_get_bounds() {
        let l = ladder(&[60, 300]);
        assert_eq!(l.get(1), Ok(300));
        assert_eq!(l.get(2), Err(LadderError::NoSuchStep { index: 2, len: 2 }));
        assert_eq!(l.get(30), Err(LadderError::IndexOutOfRange(30)));
    }

    #[test]
    fn test_enforcement_mapping() {
        assert_eq!(Enforcement::from_duration(-1), Enforcement::PermanentBan);
        assert_eq!(Enforcement::from_duration(0), Enforcement::Warning);
        assert_eq!(
            Enforcement::from_duration(60),
            Enforcement::TemporaryBan(Duration::from_secs(60))
        );
    }

    #[test]
    fn test_disabled_category_only_warns() {
        let policy = PunishmentPolicy::new(ladder(&[-1]), ladder(&[-1]), true, false);
        assert_eq!(
            policy.enforcement_for(ViolationCategory::Checksum, 1),
            Enforcement::PermanentBan
        );
        assert_eq!(
            policy.enforcement_for(ViolationCategory::Passkey, 1),
            Enforcement::Warning
        );
    }

    #[test]
    fn test_tracker_counts_per_player_and_category() {
        let tracker = ViolationTracker::new();
        assert_eq!(tracker.record("alice", ViolationCategory::Checksum), 1);
        assert_eq!(tracker.record("alice", ViolationCategory::Checksum), 2);
        assert_eq!(tracker.record("alice", ViolationCategory::Passkey), 1);
        assert_eq!(tracker.record("bob", ViolationCategory::Checksum), 1);

        assert_eq!(tracker.count("alice", ViolationCategory::Checksum), 2);
        assert_eq!(tracker.count("carol", ViolationCategory::Passkey), 0);
    }

    #[test]
    fn test_tracker_concurrent_increments() {
        let tracker = Arc::new(ViolationTracker::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        tracker.record("alice", ViolationCategory::Checksum);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(tracker.count("alice", ViolationCategory::Checksum), 8000);
    }

    #[test]
    fn test_display_strings() {
        assert_eq!(format_duration(-1), "PERMANENT BAN");
        assert_eq!(format_duration(0), "WARNING only");
        assert_eq!(format_duration(60), "60 seconds");
        assert_eq!(ladder(&[60, -1]).to_string(), "[0] 60 seconds, [1] PERMANENT BAN");
        assert_eq!("passkey".parse::<ViolationCategory>(), Ok(ViolationCategory::Passkey));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::collection::vec;
    use proptest::prelude::*;

    fn arb_ladder() -> impl Strategy<Value = PunishmentLadder> {
        vec(PERMANENT..=30 * 86_400, 1..=MAX_LADDER_STEPS)
            .prop_map(|steps| PunishmentLadder::new(steps).unwrap())
    }

    proptest! {
        #[test]
        fn resolve_duration_clamps_to_last_step(ladder in arb_ladder(), count in 1..=u32::MAX) {
            let last = ladder.len() - 1;
            let index = usize::try_from(count - 1).map_or(last, |i| i.min(last));
            prop_assert_eq!(ladder.resolve_duration(count), ladder.steps()[index]);
            prop_assert_eq!(ladder.resolve_duration(0), WARNING);
        }

        #[test]
        fn small_counts_hit_their_own_step(ladder in arb_ladder(), offset in 0usize..MAX_LADDER_STEPS) {
            prop_assume!(offset < ladder.len());
            let count = u32::try_from(offset + 1).unwrap();
            prop_assert_eq!(ladder.resolve_duration(count), ladder.steps()[offset]);
        }

        #[test]
        fn set_rejects_out_of_range_without_change(
            mut ladder in arb_ladder(),
            index in MAX_LADDER_STEPS..usize::MAX,
            duration in i64::MIN..PERMANENT,
        ) {
            let before = ladder.clone();
            prop_assert_eq!(ladder.set(index, 60), Err(LadderError::IndexOutOfRange(index)));
            prop_assert_eq!(ladder.set(0, duration), Err(LadderError::InvalidDuration(duration)));
            prop_assert_eq!(ladder, before);
        }

        #[test]
        fn set_then_get_returns_value(
            mut ladder in arb_ladder(),
            index in 0usize..MAX_LADDER_STEPS,
            duration in PERMANENT..=30 * 86_400,
        ) {
            let old_len = ladder.len();
            ladder.set(index, duration).unwrap();
            prop_assert_eq!(ladder.get(index), Ok(duration));
            prop_assert_eq!(ladder.len(), old_len.max(index + 1));
            for gap in old_len..index {
                prop_assert_eq!(ladder.get(gap), Ok(WARNING));
            }
        }
    }
}

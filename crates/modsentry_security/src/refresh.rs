//! # Scheduled Refresh
//!
//! Regenerates the reference artifact once per day, just after local
//! midnight, so it follows the rotating secret.
//!
//! ```text
//!   23:59:59        00:00:00                    00:05:00
//!      │               │ poll() ─► refresh      │
//!      │               │ poll() ─► CoolingDown  │ poll() ─► NotDue
//!      │               │  (in-flight flag held  │  (boundary already done)
//!      │               │   for the cooldown)    │
//! ```
//!
//! [`RefreshScheduler::poll`] is idempotent per day: a second call for the
//! same boundary never fires twice. [`RefreshScheduler::run`] is the timer
//! that drives it.

use crate::error::GuardResult;
use crate::store::ReferenceStore;
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use modsentry_core::Clock;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Something that can be refreshed on schedule.
pub trait RefreshTarget: Send + Sync {
    /// Regenerates the reference artifact.
    ///
    /// # Errors
    ///
    /// Any error leaves the boundary pending; it is retried after the
    /// cooldown.
    fn refresh(&self) -> GuardResult<()>;
}

impl RefreshTarget for ReferenceStore {
    fn refresh(&self) -> GuardResult<()> {
        self.generate_reference_artifact().map(|_| ())
    }
}

/// Result of one [`RefreshScheduler::poll`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Today's boundary is already handled.
    NotDue,
    /// A refresh ran recently; waiting out the cooldown.
    CoolingDown,
    /// Another caller is refreshing right now.
    InFlight,
    /// The reference was regenerated.
    Refreshed,
    /// Regeneration failed; will retry after the cooldown.
    Failed,
}

/// Fires a refresh once per rotation boundary.
pub struct RefreshScheduler {
    target: Arc<dyn RefreshTarget>,
    clock: Arc<dyn Clock>,
    cooldown: Duration,
    in_flight: AtomicBool,
    cooldown_until: Mutex<Option<NaiveDateTime>>,
    last_boundary: Mutex<NaiveDate>,
}

impl RefreshScheduler {
    /// Creates a scheduler. Today's boundary counts as done (boot just
    /// generated the reference).
    #[must_use]
    pub fn new(target: Arc<dyn RefreshTarget>, clock: Arc<dyn Clock>, cooldown: Duration) -> Self {
        let today = clock.today();
        Self {
            target,
            clock,
            cooldown,
            in_flight: AtomicBool::new(false),
            cooldown_until: Mutex::new(None),
            last_boundary: Mutex::new(today),
        }
    }

    /// Checks the clock and refreshes if a new day has started.
    pub fn poll(&self) -> RefreshOutcome {
        let now = self.clock.now();

        {
            let mut until = self.cooldown_until.lock();
            match *until {
                Some(deadline) if now < deadline => return RefreshOutcome::CoolingDown,
                Some(_) => {
                    *until = None;
                    self.in_flight.store(false, Ordering::Release);
                }
                None => {}
            }
        }

        if *self.last_boundary.lock() >= now.date() {
            return RefreshOutcome::NotDue;
        }

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return RefreshOutcome::InFlight;
        }

        let result = self.target.refresh();
        let cooldown = TimeDelta::from_std(self.cooldown).unwrap_or(TimeDelta::zero());
        *self.cooldown_until.lock() = Some(now + cooldown);

        match result {
            Ok(()) => {
                *self.last_boundary.lock() = now.date();
                tracing::info!(date = %now.date(), "scheduled refresh complete");
                RefreshOutcome::Refreshed
            }
            Err(e) => {
                tracing::error!(error = %e, "scheduled refresh failed");
                RefreshOutcome::Failed
            }
        }
    }

    /// How long to sleep before the next poll.
    #[must_use]
    pub fn next_wait(&self) -> Duration {
        let now = self.clock.now();

        if *self.last_boundary.lock() < now.date() {
            // Boundary still pending: retry once the cooldown allows.
            let remaining = self
                .cooldown_until
                .lock()
                .map_or(TimeDelta::zero(), |deadline| deadline - now);
            return remaining.to_std().unwrap_or_default().max(Duration::from_secs(1));
        }

        let next_midnight = now
            .date()
            .succ_opt()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map_or(TimeDelta::days(1), |midnight| midnight - now);
        next_midnight
            .to_std()
            .unwrap_or_default()
            .max(Duration::from_secs(1))
    }

    /// Timer loop: sleeps until the next boundary, polls, repeats.
    ///
    /// Each poll scans the mods directory and rewrites the artifact file,
    /// so it runs on the blocking pool, never on a runtime worker.
    ///
    /// Returns when `shutdown` turns `true` or its sender is dropped.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("refresh scheduler started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            let wait = self.next_wait();
            tokio::select! {
                () = tokio::time::sleep(wait) => {
                    let scheduler = Arc::clone(&self);
                    match tokio::task::spawn_blocking(move || scheduler.poll()).await {
                        Ok(outcome) => tracing::debug!(?outcome, "refresh poll"),
                        Err(e) => tracing::error!(error = %e, "refresh poll did not complete"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::info!("refresh scheduler stopped");
    }
}

impl std::fmt::Debug for RefreshScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshScheduler")
            .field("cooldown", &self.cooldown)
            .field("in_flight", &self.in_flight.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GuardError;
    use modsentry_core::FixedClock;
    use std::sync::atomic::AtomicU32;

    #[derive(Default)]
    struct Counter {
        calls: AtomicU32,
        fail: AtomicBool,
    }

    impl RefreshTarget for Counter {
        fn refresh(&self) -> GuardResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(GuardError::Configuration("empty".into()));
            }
            Ok(())
        }
    }

    fn late_evening() -> Arc<FixedClock> {
        let at = NaiveDate::from_ymd_opt(2026, 10, 19)
            .unwrap()
            .and_hms_opt(23, 59, 58)
            .unwrap();
        Arc::new(FixedClock::new(at))
    }

    #[test]
    fn test_fires_once_per_boundary() {
        let clock = late_evening();
        let target = Arc::new(Counter::default());
        let scheduler = RefreshScheduler::new(target.clone(), clock.clone(), Duration::from_secs(300));

        assert_eq!(scheduler.poll(), RefreshOutcome::NotDue);

        clock.advance(5);
        assert_eq!(scheduler.poll(), RefreshOutcome::Refreshed);
        assert_eq!(scheduler.poll(), RefreshOutcome::CoolingDown);

        clock.advance(301);
        assert_eq!(scheduler.poll(), RefreshOutcome::NotDue);
        assert_eq!(target.calls.load(Ordering::SeqCst), 1);

        clock.advance(24 * 3600);
        assert_eq!(scheduler.poll(), RefreshOutcome::Refreshed);
        assert_eq!(target.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failure_retries_after_cooldown() {
        let clock = late_evening();
        let target = Arc::new(Counter::default());
        target.fail.store(true, Ordering::SeqCst);
        let scheduler = RefreshScheduler::new(target.clone(), clock.clone(), Duration::from_secs(60));

        clock.advance(5);
        assert_eq!(scheduler.poll(), RefreshOutcome::Failed);
        assert_eq!(scheduler.poll(), RefreshOutcome::CoolingDown);
        assert_eq!(scheduler.next_wait(), Duration::from_secs(60));

        target.fail.store(false, Ordering::SeqCst);
        clock.advance(60);
        assert_eq!(scheduler.poll(), RefreshOutcome::Refreshed);
        assert_eq!(target.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_concurrent_polls_fire_once() {
        let clock = late_evening();
        let target = Arc::new(Counter::default());
        let scheduler = Arc::new(RefreshScheduler::new(
            target.clone(),
            clock.clone(),
            Duration::from_secs(300),
        ));
        clock.advance(5);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let scheduler = Arc::clone(&scheduler);
                std::thread::spawn(move || scheduler.poll())
            })
            .collect();
        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let refreshed = outcomes
            .iter()
            .filter(|o| **o == RefreshOutcome::Refreshed)
            .count();
        assert_eq!(refreshed, 1);
        assert_eq!(target.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_next_wait_targets_midnight() {
        let clock = late_evening();
        let scheduler = RefreshScheduler::new(
            Arc::new(Counter::default()),
            clock.clone(),
            Duration::from_secs(300),
        );
        assert_eq!(scheduler.next_wait(), Duration::from_secs(2));

        clock.advance(2 + 3600);
        scheduler.poll();
        assert_eq!(scheduler.next_wait(), Duration::from_secs(23 * 3600));
    }

    struct ThreadRecorder(Mutex<Option<std::thread::ThreadId>>);

    impl RefreshTarget for ThreadRecorder {
        fn refresh(&self) -> GuardResult<()> {
            *self.0.lock() = Some(std::thread::current().id());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_run_refreshes_off_the_runtime_thread() {
        let clock = late_evening();
        let target = Arc::new(ThreadRecorder(Mutex::new(None)));
        let scheduler = Arc::new(RefreshScheduler::new(
            target.clone(),
            clock.clone(),
            Duration::from_secs(300),
        ));
        let (stop, stopped) = watch::channel(false);

        let task = tokio::spawn(Arc::clone(&scheduler).run(stopped));
        clock.advance(5);
        tokio::time::sleep(Duration::from_millis(3500)).await;

        let refreshed_on = *target.0.lock();
        assert!(refreshed_on.is_some());
        assert_ne!(refreshed_on, Some(std::thread::current().id()));

        stop.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_run_refreshes_and_stops() {
        let clock = late_evening();
        let target = Arc::new(Counter::default());
        let scheduler = Arc::new(RefreshScheduler::new(
            target.clone(),
            clock.clone(),
            Duration::from_secs(300),
        ));
        let (stop, stopped) = watch::channel(false);

        let task = tokio::spawn(Arc::clone(&scheduler).run(stopped));
        clock.advance(5);

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(target.calls.load(Ordering::SeqCst), 1);

        stop.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }
}

//! Drift-corrected periodic scheduling.
//!
//! The scheduler does not own a thread or a callback. The owner polls
//! it from the cooperative loop and runs its tick body whenever `poll`
//! reports a due tick. Each due tick advances the target from the
//! previous target, never from the current time, so a late tick does
//! not shift the rest of the schedule.

use flipper_common::error::StateError;
use std::time::{Duration, Instant};
use tracing::{error, warn};

/// Timing statistics for one scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    /// Ticks executed since creation.
    pub ticks: u64,
    /// Ticks that ran a full interval or more behind their target.
    pub late_ticks: u64,
    /// Largest observed distance between target and actual tick.
    pub max_lateness: Duration,
}

/// Periodic tick source with a fixed logical interval.
#[derive(Debug)]
pub struct IntervalScheduler {
    name: &'static str,
    interval: Duration,
    target: Option<Instant>,
    stats: TickStats,
}

impl IntervalScheduler {
    /// Stopped scheduler. `name` appears in errors and log lines.
    pub fn new(name: &'static str, interval: Duration) -> Self {
        Self {
            name,
            interval,
            target: None,
            stats: TickStats::default(),
        }
    }

    /// Configured interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether the scheduler is running.
    pub fn is_running(&self) -> bool {
        self.target.is_some()
    }

    /// Instant of the next due tick while running.
    pub fn next_target(&self) -> Option<Instant> {
        self.target
    }

    /// Timing statistics.
    pub fn stats(&self) -> TickStats {
        self.stats
    }

    /// Start ticking. The first tick is due one full interval after `now`.
    ///
    /// # Errors
    ///
    /// Returns `StateError::AlreadyRunning` if already running, or
    /// `StateError::ScheduleOverflow` if the first target is not
    /// representable.
    pub fn start(&mut self, now: Instant) -> Result<(), StateError> {
        if self.target.is_some() {
            return Err(StateError::AlreadyRunning(self.name));
        }
        let target = now
            .checked_add(self.interval)
            .ok_or(StateError::ScheduleOverflow(self.name))?;
        self.target = Some(target);
        Ok(())
    }

    /// Stop ticking. Later polls report nothing.
    ///
    /// # Errors
    ///
    /// Returns `StateError::NotRunning` if not running.
    pub fn stop(&mut self) -> Result<(), StateError> {
        match self.target.take() {
            Some(_) => Ok(()),
            None => Err(StateError::NotRunning(self.name)),
        }
    }

    /// Report whether a tick is due at `now`.
    ///
    /// At most one tick is reported per call. After a stall, successive
    /// polls keep reporting due ticks until the schedule has caught up.
    /// If the following target is not representable the scheduler stops
    /// after this tick.
    pub fn poll(&mut self, now: Instant) -> bool {
        let Some(target) = self.target else {
            return false;
        };
        if now < target {
            return false;
        }
        self.target = target.checked_add(self.interval);
        if self.target.is_none() {
            error!("{} stopped: next tick target overflows the clock", self.name);
        }
        self.record(now - target);
        true
    }

    fn record(&mut self, lateness: Duration) {
        self.stats.ticks += 1;
        if lateness > self.stats.max_lateness {
            self.stats.max_lateness = lateness;
        }
        if lateness >= self.interval {
            self.stats.late_ticks += 1;
            let late = self.stats.late_ticks;
            if late <= 10 || late % 1000 == 0 {
                warn!(
                    "{} slipped #{}: tick ran {}us behind target (interval {}us)",
                    self.name,
                    late,
                    lateness.as_micros(),
                    self.interval.as_micros()
                );
            }
        }
    }
}

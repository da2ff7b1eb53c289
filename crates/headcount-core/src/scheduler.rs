//! Sampling-loop pacing.
//!
//! [`TickScheduler`] does two jobs for the live loop: it paces ticks to the
//! sampling interval, and it debounces readings that arrive faster than that
//! interval (for sources that push instead of being polled).

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::event::Timestamp;

/// Longest single sleep while waiting for a deadline, so a cleared running
/// flag is noticed quickly.
const SLEEP_SLICE: Duration = Duration::from_millis(10);

pub struct TickScheduler {
    sampling_interval: Duration,
    next_deadline: Option<Instant>,
    last_admitted: Option<Timestamp>,
    scheduled: u64,
    rejected: u64,
    missed_deadlines: u64,
    worst_lateness: Duration,
}

impl TickScheduler {
    pub fn new(sampling_interval: Duration) -> Self {
        Self {
            sampling_interval,
            next_deadline: None,
            last_admitted: None,
            scheduled: 0,
            rejected: 0,
            missed_deadlines: 0,
            worst_lateness: Duration::ZERO,
        }
    }

    pub fn sampling_interval(&self) -> Duration {
        self.sampling_interval
    }

    /// Accept a reading observed at `now` unless it comes less than one
    /// sampling interval after the last accepted one.
    ///
    /// A reading timestamped before the last accepted one (clock stepped
    /// back) is accepted and becomes the new reference.
    pub fn admit(&mut self, now: Timestamp) -> bool {
        if let Some(last) = self.last_admitted {
            if now >= last && now.saturating_since(last) < self.sampling_interval {
                self.rejected += 1;
                return false;
            }
        }
        self.last_admitted = Some(now);
        true
    }

    /// Block until the next tick is due.
    ///
    /// The first call returns immediately. Returns `false` as soon as
    /// `running` is cleared. A tick that is already late re-anchors the
    /// schedule to now instead of firing the missed ticks back to back.
    pub fn wait_next(&mut self, running: &AtomicBool) -> bool {
        if !running.load(Ordering::SeqCst) {
            return false;
        }

        let now = Instant::now();
        let deadline = match self.next_deadline {
            None => now,
            Some(deadline) if now > deadline => {
                let lateness = now - deadline;
                self.missed_deadlines += 1;
                self.worst_lateness = self.worst_lateness.max(lateness);
                log::debug!("tick late by {lateness:?}; re-anchoring schedule");
                now
            }
            Some(deadline) => deadline,
        };

        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            if !running.load(Ordering::SeqCst) {
                return false;
            }
            thread::sleep((deadline - now).min(SLEEP_SLICE));
        }

        self.next_deadline = Some(deadline + self.sampling_interval);
        self.scheduled += 1;
        running.load(Ordering::SeqCst)
    }

    /// Ticks released by [`wait_next`](Self::wait_next).
    pub fn scheduled(&self) -> u64 {
        self.scheduled
    }

    /// Readings turned away by [`admit`](Self::admit).
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    pub fn missed_deadlines(&self) -> u64 {
        self.missed_deadlines
    }

    pub fn worst_lateness(&self) -> Duration {
        self.worst_lateness
    }
}

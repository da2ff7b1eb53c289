//! Emission controller: decides, tick by tick, which counts reach the store.
//!
//! The controller is a pure decision function closing over a handful of
//! timestamps. It performs no I/O and cannot fail. Each tick runs the same
//! four comparisons:
//!
//! - **changed**: the count differs from the last emitted count.
//! - **suppressed zero**: the count is zero but the last nonzero reading is
//!   younger than `zero_timeout`. Detector flicker must not flip the series
//!   to zero, so nothing is sent and the last stored point stays as it is.
//! - **settled zero**: the count is zero and the suppression window is over.
//! - **forced**: `force_save_interval` has passed since the last emission.
//!
//! A force-save always emits, carrying the raw count even when that count is
//! a suppressed zero. Otherwise a suppressed zero emits nothing, and the tick
//! emits when the count changed or is a settled zero.
//!
//! Elapsed times are computed with [`Timestamp::saturating_since`], so a clock
//! that steps backwards reads as "no time has passed".

use std::time::Duration;

use crate::config::ControllerConfig;
use crate::event::{TelemetryEvent, Timestamp};

/// Mutable state carried between ticks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerState {
    /// Count of the most recent emission; `None` until the first one.
    pub last_emitted_count: Option<u32>,
    /// Last tick with a count above zero (controller start until then).
    pub last_nonzero_at: Timestamp,
    /// Last emission of any kind; the force-save timer runs from here.
    pub last_forced_at: Timestamp,
}

impl ControllerState {
    fn new(started_at: Timestamp) -> Self {
        Self {
            last_emitted_count: None,
            last_nonzero_at: started_at,
            last_forced_at: started_at,
        }
    }
}

/// The comparisons evaluated for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickDecision {
    pub changed: bool,
    pub suppressed_zero: bool,
    pub settled_zero: bool,
    pub forced: bool,
}

impl TickDecision {
    /// Whether this tick produces an event.
    pub fn emits(&self) -> bool {
        self.forced || (!self.suppressed_zero && (self.changed || self.settled_zero))
    }

    /// Short label for logs.
    pub fn reason(&self) -> &'static str {
        if self.suppressed_zero {
            if self.forced { "force_save" } else { "suppressed" }
        } else if self.changed {
            "changed"
        } else if self.settled_zero {
            "settled_zero"
        } else if self.forced {
            "force_save"
        } else {
            "unchanged"
        }
    }
}

/// Single-owner emission controller.
#[derive(Debug, Clone)]
pub struct EmissionController {
    config: ControllerConfig,
    state: ControllerState,
}

impl EmissionController {
    /// Create a controller whose timers all start at `started_at`.
    pub fn new(config: ControllerConfig, started_at: Timestamp) -> Self {
        Self {
            config,
            state: ControllerState::new(started_at),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    /// Process one tick, returning the event to enqueue if the count is
    /// worth persisting.
    pub fn process_tick(&mut self, raw_count: u32, now: Timestamp) -> Option<TelemetryEvent> {
        if raw_count > 0 {
            self.state.last_nonzero_at = now;
        }

        let decision = self.evaluate(raw_count, now);
        if !decision.emits() {
            return None;
        }

        log::debug!(
            "emit count={raw_count} reason={} previous={:?}",
            decision.reason(),
            self.state.last_emitted_count
        );

        self.state.last_emitted_count = Some(raw_count);
        self.state.last_forced_at = now;

        Some(TelemetryEvent {
            count: raw_count,
            timestamp: now,
        })
    }

    /// Evaluate the tick comparisons against the current state without
    /// mutating it. `last_nonzero_at` is expected to already reflect
    /// `raw_count` when called from [`process_tick`](Self::process_tick).
    pub fn evaluate(&self, raw_count: u32, now: Timestamp) -> TickDecision {
        let since_nonzero = elapsed(self.state.last_nonzero_at, now);
        let since_forced = elapsed(self.state.last_forced_at, now);

        let is_zero = raw_count == 0;
        let suppressed_zero = is_zero && since_nonzero < self.config.zero_timeout;
        let changed = self.state.last_emitted_count != Some(raw_count);
        let settled_zero = is_zero && !suppressed_zero && self.config.reaffirm_settled_zero;
        let forced = since_forced >= self.config.force_save_interval;

        TickDecision {
            changed,
            suppressed_zero,
            settled_zero,
            forced,
        }
    }
}

fn elapsed(since: Timestamp, now: Timestamp) -> Duration {
    now.saturating_since(since)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Timestamp {
        Timestamp::from_nanos(s * 1_000_000_000)
    }

    fn millis(ms: u64) -> Timestamp {
        Timestamp::from_nanos(ms * 1_000_000)
    }

    fn controller(zero_timeout: u64, force_save: u64) -> EmissionController {
        EmissionController::new(
            ControllerConfig {
                zero_timeout: Duration::from_secs(zero_timeout),
                force_save_interval: Duration::from_secs(force_save),
                ..Default::default()
            },
            secs(0),
        )
    }

    /// Feed `(t_secs, count)` ticks and collect what was emitted.
    fn run(ctl: &mut EmissionController, ticks: &[(u64, u32)]) -> Vec<Option<u32>> {
        ticks
            .iter()
            .map(|&(t, c)| ctl.process_tick(c, secs(t)).map(|e| e.count))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Change detection
    // -----------------------------------------------------------------------

    #[test]
    fn first_nonzero_tick_always_emits() {
        let mut ctl = controller(5, 600);
        let event = ctl.process_tick(4, secs(0)).unwrap();
        assert_eq!(event.count, 4);
        assert_eq!(event.timestamp, secs(0));
        assert_eq!(ctl.state().last_emitted_count, Some(4));
    }

    #[test]
    fn every_distinct_consecutive_value_emits() {
        let mut ctl = controller(5, 600);
        let counts = [1, 2, 5, 3, 7, 1, 2];
        for (i, &c) in counts.iter().enumerate() {
            let event = ctl.process_tick(c, millis(i as u64 * 500));
            assert_eq!(event.map(|e| e.count), Some(c), "tick {i}");
        }
    }

    #[test]
    fn unchanged_nonzero_emits_once() {
        let mut ctl = controller(5, 600);
        let emitted: Vec<_> = (0..200)
            .filter_map(|i| ctl.process_tick(3, millis(i * 500)))
            .collect();
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].timestamp, secs(0));
    }

    #[test]
    fn event_timestamp_keeps_nanoseconds() {
        let mut ctl = controller(5, 600);
        let now = Timestamp::from_nanos(1_700_000_000_123_456_789);
        let event = ctl.process_tick(1, now).unwrap();
        assert_eq!(event.timestamp.as_nanos(), 1_700_000_000_123_456_789);
    }

    // -----------------------------------------------------------------------
    // Zero suppression
    // -----------------------------------------------------------------------

    #[test]
    fn reference_scenario() {
        let mut ctl = controller(2, 600);
        let emitted = run(&mut ctl, &[(0, 3), (1, 3), (2, 0), (3, 0)]);
        assert_eq!(emitted, vec![Some(3), None, None, Some(0)]);
    }

    #[test]
    fn zeros_withheld_until_timeout_then_emitted() {
        let mut ctl = controller(5, 600);
        assert!(ctl.process_tick(2, secs(10)).is_some());

        // Half-second zeros inside the window.
        for ms in (10_500..15_000).step_by(500) {
            assert!(ctl.process_tick(0, millis(ms)).is_none(), "t={ms}ms");
        }
        let event = ctl.process_tick(0, secs(15)).unwrap();
        assert_eq!(event.count, 0);
    }

    #[test]
    fn timeout_boundary_is_inclusive() {
        let mut ctl = controller(5, 600);
        ctl.process_tick(1, secs(0));
        assert!(ctl.process_tick(0, millis(4_999)).is_none());
        assert_eq!(ctl.process_tick(0, secs(5)).map(|e| e.count), Some(0));
    }

    #[test]
    fn flicker_inside_window_is_invisible() {
        let mut ctl = controller(5, 600);
        let emitted = run(&mut ctl, &[(0, 2), (1, 0), (2, 0), (3, 2), (4, 0), (5, 2)]);
        assert_eq!(emitted, vec![Some(2), None, None, None, None, None]);
    }

    #[test]
    fn suppression_does_not_resend_last_nonzero() {
        let mut ctl = controller(5, 600);
        ctl.process_tick(4, secs(0));
        for t in 1..5 {
            assert!(ctl.process_tick(0, secs(t)).is_none());
        }
        assert_eq!(ctl.state().last_emitted_count, Some(4));
    }

    #[test]
    fn zero_at_startup_is_suppressed_from_start_time() {
        let mut ctl = controller(5, 600);
        assert!(ctl.process_tick(0, secs(1)).is_none());
        assert!(ctl.process_tick(0, secs(4)).is_none());
        assert_eq!(ctl.process_tick(0, secs(5)).map(|e| e.count), Some(0));
    }

    #[test]
    fn settled_zero_reaffirmed_every_tick_by_default() {
        let mut ctl = controller(5, 600);
        ctl.process_tick(1, secs(0));
        let emitted = run(&mut ctl, &[(5, 0), (6, 0), (7, 0)]);
        assert_eq!(emitted, vec![Some(0), Some(0), Some(0)]);
    }

    #[test]
    fn settled_zero_emitted_once_when_not_reaffirming() {
        let mut ctl = EmissionController::new(
            ControllerConfig {
                reaffirm_settled_zero: false,
                ..Default::default()
            },
            secs(0),
        );
        ctl.process_tick(1, secs(0));
        let emitted = run(&mut ctl, &[(5, 0), (6, 0), (7, 0)]);
        assert_eq!(emitted, vec![Some(0), None, None]);
    }

    // -----------------------------------------------------------------------
    // Force-save
    // -----------------------------------------------------------------------

    #[test]
    fn constant_value_is_force_saved_once_per_interval() {
        let mut ctl = controller(5, 600);
        let emitted: Vec<_> = (0..1200)
            .filter_map(|t| ctl.process_tick(3, secs(t)))
            .map(|e| e.timestamp)
            .collect();
        assert_eq!(emitted, vec![secs(0), secs(600)]);
    }

    #[test]
    fn change_resets_force_save_timer() {
        let mut ctl = controller(5, 10);
        let emitted = run(&mut ctl, &[(0, 1), (6, 2), (15, 2), (16, 2)]);
        // Forced at t=16: ten seconds after the change at t=6.
        assert_eq!(emitted, vec![Some(1), Some(2), None, Some(2)]);
    }

    #[test]
    fn force_save_fires_while_zero_suppressed() {
        let mut ctl = controller(5, 10);
        ctl.process_tick(2, secs(0));
        assert!(ctl.process_tick(2, secs(8)).is_none());

        // Forced is due at t=10 with the zero still inside the window: the
        // raw zero goes out anyway.
        assert_eq!(ctl.evaluate(0, secs(10)).reason(), "force_save");
        let event = ctl.process_tick(0, secs(10)).unwrap();
        assert_eq!(event.count, 0);
        assert_eq!(event.timestamp, secs(10));
        assert_eq!(ctl.state().last_forced_at, secs(10));

        // Back to plain suppression until the window ends at t=13.
        assert!(ctl.process_tick(0, secs(12)).is_none());
        assert_eq!(ctl.process_tick(0, secs(13)).map(|e| e.count), Some(0));
    }

    #[test]
    fn suppressed_zero_without_force_save_stays_silent() {
        let decision = TickDecision {
            changed: true,
            suppressed_zero: true,
            settled_zero: false,
            forced: false,
        };
        assert!(!decision.emits());
        assert!(TickDecision { forced: true, ..decision }.emits());
    }

    // -----------------------------------------------------------------------
    // Clock regression
    // -----------------------------------------------------------------------

    #[test]
    fn clock_regression_reads_as_no_elapsed_time() {
        let mut ctl = controller(5, 600);
        ctl.process_tick(2, secs(100));
        // Clock jumps back: the zero must stay suppressed, not read as "timed out".
        assert!(ctl.process_tick(0, secs(50)).is_none());
        // And must not read as a force-save either.
        assert!(ctl.process_tick(2, secs(40)).is_none());
    }

    #[test]
    fn decision_reason_labels() {
        let ctl = controller(5, 600);
        assert_eq!(ctl.evaluate(3, secs(0)).reason(), "changed");
        assert_eq!(ctl.evaluate(0, secs(1)).reason(), "suppressed");
        assert_eq!(ctl.evaluate(0, secs(9)).reason(), "changed");
        assert_eq!(ctl.evaluate(3, secs(700)).reason(), "changed");
    }

    #[test]
    fn independent_controllers_do_not_interfere() {
        let mut a = controller(5, 600);
        let mut b = controller(5, 600);
        assert!(a.process_tick(1, secs(0)).is_some());
        assert!(b.process_tick(1, secs(0)).is_some());
        assert!(a.process_tick(1, secs(1)).is_none());
        assert_eq!(b.state().last_emitted_count, Some(1));
    }
}

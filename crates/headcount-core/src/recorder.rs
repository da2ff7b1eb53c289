//! Recorder: controller + pending batch + storage sink.
//!
//! Architecture:
//! 1. A raw sample arrives once per tick
//! 2. The [`EmissionController`] decides whether it becomes an event
//! 3. Events accumulate in a [`PendingBatch`]
//! 4. When the batch interval has elapsed and the batch is non-empty, the
//!    batch goes to the [`TelemetrySink`] as one write
//! 5. A refused write is retained or dropped per [`FlushFailurePolicy`]
//!
//! Everything runs on the caller's thread. The flush is the only call that
//! may block, bounded by the sink's own timeout.

use serde::Serialize;

use crate::batch::PendingBatch;
use crate::config::{FlushFailurePolicy, RecorderConfig};
use crate::controller::EmissionController;
use crate::error::SinkError;
use crate::event::{RawSample, TelemetryEvent, Timestamp};
use crate::sink::TelemetrySink;

/// Running totals for status lines and the shutdown summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecorderStats {
    pub ticks: u64,
    pub emitted: u64,
    pub flushes: u64,
    pub points_written: u64,
    pub failed_writes: u64,
    pub dropped_events: u64,
}

/// What a flush attempt did.
#[derive(Debug, Clone, PartialEq)]
pub enum FlushOutcome {
    /// The store accepted this many points.
    Written(usize),
    /// The store refused the batch.
    Failed {
        error: String,
        /// Events kept for the next attempt.
        retained: usize,
        /// Events discarded by the policy or the pending cap.
        dropped: usize,
    },
}

/// Result of one tick.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TickOutcome {
    pub emitted: Option<TelemetryEvent>,
    pub flush: Option<FlushOutcome>,
}

/// Drives one controller and one sink.
pub struct Recorder<S: TelemetrySink> {
    controller: EmissionController,
    batch: PendingBatch,
    sink: S,
    policy: FlushFailurePolicy,
    stats: RecorderStats,
}

impl<S: TelemetrySink> Recorder<S> {
    /// Create a recorder whose timers all start at `started_at`.
    pub fn new(config: RecorderConfig, sink: S, started_at: Timestamp) -> Self {
        let batch = PendingBatch::new(
            config.controller.batch_interval,
            config.max_pending_events,
            started_at,
        );
        Self {
            controller: EmissionController::new(config.controller, started_at),
            batch,
            sink,
            policy: config.on_write_failure,
            stats: RecorderStats::default(),
        }
    }

    /// Process one sample: decide, enqueue, and flush if due.
    pub fn tick(&mut self, sample: RawSample) -> TickOutcome {
        let now = sample.observed_at;
        self.stats.ticks += 1;

        let emitted = self.controller.process_tick(sample.count, now);
        if let Some(event) = emitted {
            self.stats.emitted += 1;
            let evicted = self.batch.push(event);
            self.note_evicted(evicted);
        }

        let flush = if self.batch.is_due(now) {
            Some(self.flush_at(now))
        } else {
            None
        };

        TickOutcome { emitted, flush }
    }

    /// Flush now regardless of the interval. Returns `None` when nothing is
    /// pending.
    pub fn flush_now(&mut self, now: Timestamp) -> Option<FlushOutcome> {
        if self.batch.is_empty() {
            None
        } else {
            Some(self.flush_at(now))
        }
    }

    /// Stop recording: optionally flush what is pending, then close the sink.
    ///
    /// Pending events are lost when `final_flush` is false or the final write
    /// fails; both cases are counted in `dropped_events`.
    pub fn shutdown(mut self, final_flush: bool) -> Result<RecorderStats, SinkError> {
        let now = Timestamp::now().max(self.batch.last_flush_at());
        if final_flush {
            if let Some(FlushOutcome::Failed { .. }) = self.flush_now(now) {
                log::warn!("final flush failed; {} event(s) lost", self.batch.len());
            }
        }

        let lost = self.batch.take().len();
        if lost > 0 {
            self.stats.dropped_events += lost as u64;
            log::info!("discarding {lost} unflushed event(s) at shutdown");
        }

        self.sink.close()?;
        Ok(self.stats)
    }

    pub fn stats(&self) -> RecorderStats {
        self.stats
    }

    pub fn pending(&self) -> usize {
        self.batch.len()
    }

    pub fn controller(&self) -> &EmissionController {
        &self.controller
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    fn flush_at(&mut self, now: Timestamp) -> FlushOutcome {
        let events = self.batch.take();
        let n = events.len();
        self.batch.mark_flushed(now);

        match self.sink.write_batch(&events) {
            Ok(()) => {
                self.stats.flushes += 1;
                self.stats.points_written += n as u64;
                log::info!("flushed {n} point(s) to {}", self.sink.name());
                FlushOutcome::Written(n)
            }
            Err(e) => {
                self.stats.failed_writes += 1;
                let (retained, dropped) = match self.policy {
                    FlushFailurePolicy::Retain => {
                        let evicted = self.batch.restore(events);
                        (n.saturating_sub(evicted), evicted)
                    }
                    FlushFailurePolicy::Drop => (0, n),
                };
                self.stats.dropped_events += dropped as u64;
                log::warn!(
                    "write to {} failed ({e}); policy={} retained={retained} dropped={dropped}",
                    self.sink.name(),
                    self.policy
                );
                FlushOutcome::Failed {
                    error: e.to_string(),
                    retained,
                    dropped,
                }
            }
        }
    }

    fn note_evicted(&mut self, evicted: usize) {
        if evicted > 0 {
            self.stats.dropped_events += evicted as u64;
            log::warn!("pending batch full; evicted {evicted} oldest event(s)");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Pending batch of emitted events and its flush timer.
//!
//! Events are kept in emission order. A flush is due once `batch_interval`
//! has elapsed since the last flush *and* there is something to send; an
//! empty batch never resets the timer.

use std::time::Duration;

use crate::event::{TelemetryEvent, Timestamp};

/// In-memory batch awaiting a write to the store.
#[derive(Debug)]
pub struct PendingBatch {
    events: Vec<TelemetryEvent>,
    interval: Duration,
    last_flush_at: Timestamp,
    max_events: usize,
}

impl PendingBatch {
    /// Create an empty batch whose flush timer starts at `started_at`.
    /// `max_events` bounds the batch; it is clamped to at least one.
    pub fn new(interval: Duration, max_events: usize, started_at: Timestamp) -> Self {
        Self {
            events: Vec::new(),
            interval,
            last_flush_at: started_at,
            max_events: max_events.max(1),
        }
    }

    /// Append an event. Returns how many of the oldest events were evicted
    /// to stay within the cap.
    pub fn push(&mut self, event: TelemetryEvent) -> usize {
        self.events.push(event);
        self.enforce_cap()
    }

    /// True when the interval has elapsed and there is something to send.
    pub fn is_due(&self, now: Timestamp) -> bool {
        !self.events.is_empty() && now.saturating_since(self.last_flush_at) >= self.interval
    }

    /// Move the pending events out, leaving the batch empty. The flush timer
    /// is not touched; call [`mark_flushed`](Self::mark_flushed) or
    /// [`restore`](Self::restore) once the write has been attempted.
    pub fn take(&mut self) -> Vec<TelemetryEvent> {
        std::mem::take(&mut self.events)
    }

    /// Record a flush attempt at `now`, restarting the interval.
    pub fn mark_flushed(&mut self, now: Timestamp) {
        self.last_flush_at = now;
    }

    /// Put a failed batch back in front of anything emitted since it was
    /// taken. Returns how many of the oldest events were evicted.
    pub fn restore(&mut self, mut failed: Vec<TelemetryEvent>) -> usize {
        failed.append(&mut self.events);
        self.events = failed;
        self.enforce_cap()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[TelemetryEvent] {
        &self.events
    }

    pub fn last_flush_at(&self) -> Timestamp {
        self.last_flush_at
    }

    fn enforce_cap(&mut self) -> usize {
        let excess = self.events.len().saturating_sub(self.max_events);
        if excess > 0 {
            self.events.drain(..excess);
        }
        excess
    }
}

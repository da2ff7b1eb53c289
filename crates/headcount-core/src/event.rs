//! Samples, telemetry events, and the wall-clock timestamp they carry.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Wall-clock instant as nanoseconds since the Unix epoch.
///
/// Elapsed-time arithmetic saturates: if the clock steps backwards, the
/// elapsed time between two timestamps is zero rather than negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The Unix epoch.
    pub const EPOCH: Timestamp = Timestamp(0);

    /// Current wall-clock time.
    pub fn now() -> Self {
        let since = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self::from_duration(since)
    }

    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Build from fractional seconds since the epoch. `None` for negative or
    /// non-finite input and for instants past `u64::MAX` ns (year 2554).
    pub fn try_from_secs_f64(secs: f64) -> Option<Self> {
        let since_epoch = Duration::try_from_secs_f64(secs).ok()?;
        u64::try_from(since_epoch.as_nanos()).ok().map(Self)
    }

    /// Build from a duration since the epoch, saturating at `u64::MAX` ns.
    pub fn from_duration(since_epoch: Duration) -> Self {
        Self(u64::try_from(since_epoch.as_nanos()).unwrap_or(u64::MAX))
    }

    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    pub const fn as_duration(self) -> Duration {
        Duration::from_nanos(self.0)
    }

    /// Time elapsed from `earlier` to `self`, clamped to zero on regression.
    pub fn saturating_since(self, earlier: Timestamp) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }

    pub fn saturating_add(self, d: Duration) -> Self {
        let nanos = u64::try_from(d.as_nanos()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(nanos))
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One raw detector reading, consumed immediately by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSample {
    pub count: u32,
    pub observed_at: Timestamp,
}

impl RawSample {
    pub fn new(count: u32, observed_at: Timestamp) -> Self {
        Self { count, observed_at }
    }
}

/// A count the controller decided is worth persisting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub count: u32,
    pub timestamp: Timestamp,
}

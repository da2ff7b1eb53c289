//! # headcount-core
//!
//! **Occupancy counts in, sparse time-series out.**
//!
//! `headcount-core` turns a stream of per-tick people counts from a camera
//! detector into a compact stream of telemetry events and writes them to a
//! time-series store in periodic batches.
//!
//! ## Quick Start
//!
//! ```
//! use headcount_core::{MemorySink, RawSample, Recorder, RecorderConfig, Timestamp};
//!
//! let start = Timestamp::from_nanos(0);
//! let mut recorder = Recorder::new(RecorderConfig::default(), MemorySink::new(), start);
//!
//! // Someone walks in: a change, so an event is emitted.
//! let outcome = recorder.tick(RawSample::new(1, Timestamp::from_nanos(1_000_000_000)));
//! assert!(outcome.emitted.is_some());
//!
//! let stats = recorder.shutdown(true).unwrap();
//! assert_eq!(stats.points_written, 1);
//! ```
//!
//! ## Architecture
//!
//! Source → Controller (emit?) → Pending batch → Sink
//!
//! The [`EmissionController`] emits on:
//! - **change**: the count differs from the last emitted count
//! - **settled zero**: a zero that outlasted the suppression window
//! - **force-save**: nothing emitted for `force_save_interval`
//!
//! A zero inside the suppression window (a brief detection dropout right after
//! people were seen) is not emitted as a change. The store keeps showing the
//! last nonzero count until the zero has persisted for `zero_timeout` or a
//! force-save comes due.
//!
//! Every detector adapter implements [`OccupancySource`]; every store
//! implements [`TelemetrySink`]. The [`Recorder`] ties controller, batch and
//! sink together with a write-failure policy.

pub mod batch;
pub mod config;
pub mod controller;
pub mod error;
pub mod event;
pub mod influx;
pub mod line_protocol;
pub mod recorder;
pub mod scheduler;
pub mod session;
pub mod sink;
pub mod source;
pub mod sources;

pub use batch::PendingBatch;
pub use config::{
    ControllerConfig, DEFAULT_MEASUREMENT, FileConfig, FlushFailurePolicy, RecorderConfig,
    StoreConfig, parse_duration, parse_tags,
};
pub use controller::{ControllerState, EmissionController, TickDecision};
pub use error::{ConfigError, SinkError, SourceError};
pub use event::{RawSample, TelemetryEvent, Timestamp};
pub use influx::InfluxSink;
pub use line_protocol::LineFormat;
pub use recorder::{FlushOutcome, Recorder, RecorderStats, TickOutcome};
pub use scheduler::TickScheduler;
pub use session::{MachineInfo, SessionConfig, SessionMeta, SessionSink, detect_machine_info};
pub use sink::{MemorySink, TelemetrySink, WriterSink};
pub use source::{OccupancySource, SourceInfo, SourceKind};
pub use sources::{
    DEFAULT_STALE_AFTER, DetectorCommandConfig, DetectorCommandSource, ReplaySource,
};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

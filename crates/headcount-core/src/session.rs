//! Local durable store: one directory per recording session.
//!
//! Used when no time-series database is reachable, or to keep a replayable
//! copy of what would have been written.
//!
//! # Storage Format
//!
//! Each session is a directory containing:
//! - `points.lp` — every flushed point as InfluxDB line protocol
//! - `flushes.csv` — one row per flush (`flushed_at_ns,points`)
//! - `session.json` — metadata written when the sink is closed

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SinkError;
use crate::event::{TelemetryEvent, Timestamp};
use crate::line_protocol::LineFormat;
use crate::sink::TelemetrySink;

// ---------------------------------------------------------------------------
// Machine info
// ---------------------------------------------------------------------------

/// Host information captured at session start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineInfo {
    pub os: String,
    pub arch: String,
    pub hostname: String,
}

/// Detect host information (best-effort).
pub fn detect_machine_info() -> MachineInfo {
    MachineInfo {
        os: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        hostname: detect_hostname().unwrap_or_else(|| "unknown".to_string()),
    }
}

fn detect_hostname() -> Option<String> {
    if let Some(name) = std::env::var("HOSTNAME").ok().filter(|n| !n.is_empty()) {
        return Some(name);
    }
    #[cfg(target_os = "linux")]
    {
        fs::read_to_string("/etc/hostname")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

// ---------------------------------------------------------------------------
// Session metadata (session.json)
// ---------------------------------------------------------------------------

/// Session metadata written to session.json when the sink is closed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMeta {
    pub version: u32,
    pub id: String,
    pub started_at: String,
    pub ended_at: String,
    pub duration_ms: u64,
    pub measurement: String,
    pub total_points: u64,
    pub total_flushes: u64,
    pub first_point_ns: Option<u64>,
    pub last_point_ns: Option<u64>,
    pub machine: MachineInfo,
    pub tags: BTreeMap<String, String>,
    pub note: Option<String>,
    pub headcount_version: String,
}

// ---------------------------------------------------------------------------
// Session config
// ---------------------------------------------------------------------------

/// Configuration for a session sink.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub output_dir: PathBuf,
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub note: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("sessions"),
            measurement: crate::config::DEFAULT_MEASUREMENT.to_string(),
            tags: BTreeMap::new(),
            note: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Session sink
// ---------------------------------------------------------------------------

/// Appends every flushed batch to the session files.
pub struct SessionSink {
    session_dir: PathBuf,
    points_writer: BufWriter<File>,
    flush_writer: BufWriter<File>,
    format: LineFormat,
    total_points: u64,
    total_flushes: u64,
    first_point: Option<Timestamp>,
    last_point: Option<Timestamp>,
    started_at: SystemTime,
    started_instant: Instant,
    session_id: String,
    config: SessionConfig,
    machine: MachineInfo,
    closed: bool,
}

impl SessionSink {
    /// Create the session directory and its files.
    pub fn new(config: SessionConfig) -> std::io::Result<Self> {
        let machine = detect_machine_info();
        let session_id = Uuid::new_v4().to_string();
        let started_at = SystemTime::now();

        // {timestamp}-{measurement}-{short id}; the id keeps two sessions
        // started in the same second apart.
        let ts = started_at.duration_since(UNIX_EPOCH).unwrap_or_default();
        let dir_name = format!(
            "{}-{}-{}",
            format_iso8601_compact(ts),
            slug(&config.measurement),
            &session_id[..8]
        );

        let session_dir = config.output_dir.join(dir_name);
        fs::create_dir_all(&session_dir)?;

        let points_writer = BufWriter::new(File::create(session_dir.join("points.lp"))?);

        let mut flush_writer = BufWriter::new(File::create(session_dir.join("flushes.csv"))?);
        writeln!(flush_writer, "flushed_at_ns,points")?;
        flush_writer.flush()?;

        let format = LineFormat::new(&config.measurement, &config.tags);

        Ok(Self {
            session_dir,
            points_writer,
            flush_writer,
            format,
            total_points: 0,
            total_flushes: 0,
            first_point: None,
            last_point: None,
            started_at,
            started_instant: Instant::now(),
            session_id,
            config,
            machine,
            closed: false,
        })
    }

    /// Get the session directory path.
    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    pub fn total_points(&self) -> u64 {
        self.total_points
    }

    pub fn total_flushes(&self) -> u64 {
        self.total_flushes
    }

    /// Get elapsed time since the session started.
    pub fn elapsed(&self) -> Duration {
        self.started_instant.elapsed()
    }

    fn append_flush_row(&mut self, points: usize) -> std::io::Result<()> {
        writeln!(self.flush_writer, "{},{points}", Timestamp::now().as_nanos())?;
        self.flush_writer.flush()
    }

    fn write_meta(&self) -> Result<(), SinkError> {
        let ended_at = SystemTime::now();
        let meta = SessionMeta {
            version: 1,
            id: self.session_id.clone(),
            started_at: format_iso8601(
                self.started_at.duration_since(UNIX_EPOCH).unwrap_or_default(),
            ),
            ended_at: format_iso8601(ended_at.duration_since(UNIX_EPOCH).unwrap_or_default()),
            duration_ms: u64::try_from(self.elapsed().as_millis()).unwrap_or(u64::MAX),
            measurement: self.config.measurement.clone(),
            total_points: self.total_points,
            total_flushes: self.total_flushes,
            first_point_ns: self.first_point.map(Timestamp::as_nanos),
            last_point_ns: self.last_point.map(Timestamp::as_nanos),
            machine: self.machine.clone(),
            tags: self.config.tags.clone(),
            note: self.config.note.clone(),
            headcount_version: crate::VERSION.to_string(),
        };

        let json = serde_json::to_string_pretty(&meta)?;
        fs::write(self.session_dir.join("session.json"), json)?;
        Ok(())
    }
}

impl TelemetrySink for SessionSink {
    fn name(&self) -> &'static str {
        "session"
    }

    fn write_batch(&mut self, batch: &[TelemetryEvent]) -> Result<(), SinkError> {
        if self.closed {
            return Err(SinkError::Closed);
        }

        self.points_writer
            .write_all(self.format.encode(batch).as_bytes())?;
        self.points_writer.flush()?;

        // The points are stored from here on. A failed index row must not
        // fail the batch, or a retry would write the points twice.
        if let Err(e) = self.append_flush_row(batch.len()) {
            log::warn!(
                "session {}: points stored but flushes.csv not updated: {e}",
                self.session_id
            );
        }

        if self.first_point.is_none() {
            self.first_point = batch.first().map(|e| e.timestamp);
        }
        if let Some(last) = batch.last() {
            self.last_point = Some(last.timestamp);
        }
        self.total_points += batch.len() as u64;
        self.total_flushes += 1;
        Ok(())
    }

    /// Finalize the session, writing session.json.
    fn close(&mut self) -> Result<(), SinkError> {
        if self.closed {
            return Ok(());
        }
        self.points_writer.flush()?;
        if let Err(e) = self.flush_writer.flush() {
            log::warn!("session {}: flushes.csv incomplete: {e}", self.session_id);
        }
        self.write_meta()?;
        self.closed = true;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Keep directory names shell-friendly.
fn slug(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '-' })
        .collect()
}

/// Format a duration-since-epoch as a compact ISO-8601 timestamp for directory names.
/// Example: `2026-02-15T013000Z`
fn format_iso8601_compact(since_epoch: Duration) -> String {
    let (year, month, day, hour, min, sec) = secs_to_utc(since_epoch.as_secs());
    format!("{year:04}-{month:02}-{day:02}T{hour:02}{min:02}{sec:02}Z")
}

/// Format a duration-since-epoch as a full ISO-8601 timestamp.
/// Example: `2026-02-15T01:30:00Z`
fn format_iso8601(since_epoch: Duration) -> String {
    let (year, month, day, hour, min, sec) = secs_to_utc(since_epoch.as_secs());
    format!("{year:04}-{month:02}-{day:02}T{hour:02}:{min:02}:{sec:02}Z")
}

/// Convert seconds since Unix epoch to (year, month, day, hour, minute, second) UTC.
/// No leap second handling.
fn secs_to_utc(secs: u64) -> (u64, u64, u64, u64, u64, u64) {
    let sec = secs % 60;
    let min = (secs / 60) % 60;
    let hour = (secs / 3600) % 24;

    let mut days = secs / 86400;
    let mut year = 1970u64;
    loop {
        let days_in_year = if is_leap(year) { 366 } else { 365 };
        if days < days_in_year {
            break;
        }
        days -= days_in_year;
        year += 1;
    }

    let feb = if is_leap(year) { 29 } else { 28 };
    let months_days: [u64; 12] = [31, feb, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

    let mut month = 12u64;
    for (i, &md) in months_days.iter().enumerate() {
        if days < md {
            month = i as u64 + 1;
            break;
        }
        days -= md;
    }

    (year, month, days + 1, hour, min, sec)
}

fn is_leap(year: u64) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

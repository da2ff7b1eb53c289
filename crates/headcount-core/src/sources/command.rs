//! DetectorCommandSource — people count from an external detector process.
//!
//! The detector (camera capture + object detection) runs as a persistent
//! subprocess launched through `sh -c`. It prints one non-negative integer per
//! processed frame on stdout:
//!
//! ```text
//! 0
//! 2
//! 2
//! ```
//!
//! A reader thread parses each line and keeps only the most recent count, so
//! a tick always sees the freshest reading no matter how fast the detector
//! runs. Malformed lines are logged and skipped. A count older than
//! `stale_after` is not served: a detector that hangs without exiting reads as
//! `NotReady` instead of repeating its last occupancy forever.
//!
//! If the process exits, the next read reports it and the read after that
//! respawns it. [`release`](OccupancySource::release) kills and reaps the child.

use std::io::{BufRead, BufReader};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::SourceError;
use crate::source::{OccupancySource, SourceInfo, SourceKind, parse_count};

use super::helpers::{command_exists, lock, program_name};

static DETECTOR_COMMAND_INFO: SourceInfo = SourceInfo {
    name: "detector_command",
    description: "People count printed line-by-line by an external detector process",
    kind: SourceKind::Live,
};

/// Default age after which the latest count is no longer served.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(10);

/// Configuration for the detector subprocess.
#[derive(Debug, Clone)]
pub struct DetectorCommandConfig {
    /// Shell command line, e.g. `python3 detect.py --camera 0`.
    pub command: String,
    /// Oldest count `read_count` will return.
    pub stale_after: Duration,
}

impl Default for DetectorCommandConfig {
    fn default() -> Self {
        let command = std::env::var("HEADCOUNT_DETECTOR").unwrap_or_default();
        Self {
            command,
            stale_after: DEFAULT_STALE_AFTER,
        }
    }
}

// ---------------------------------------------------------------------------
// Persistent detector subprocess
// ---------------------------------------------------------------------------

/// What the reader thread has seen so far.
#[derive(Debug, Default)]
struct ReaderState {
    latest: Option<u32>,
    latest_at: Option<Instant>,
    lines: u64,
    malformed: u64,
    exited: bool,
}

/// A long-lived detector process and the thread draining its stdout.
struct PersistentDetector {
    child: Child,
    state: Arc<Mutex<ReaderState>>,
    _reader: JoinHandle<()>,
}

impl PersistentDetector {
    fn spawn(command_line: &str) -> Result<Self, SourceError> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command_line)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| SourceError::Unavailable(format!("{command_line}: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SourceError::Unavailable("detector stdout not captured".into()))?;

        let state = Arc::new(Mutex::new(ReaderState::default()));
        let state_ref = Arc::clone(&state);
        let reader = thread::spawn(move || Self::reader_loop(stdout, state_ref));

        log::info!("started detector (pid {}): {command_line}", child.id());
        Ok(Self {
            child,
            state,
            _reader: reader,
        })
    }

    /// Read lines until EOF, keeping the newest valid count.
    fn reader_loop(stdout: ChildStdout, state: Arc<Mutex<ReaderState>>) {
        for line in BufReader::new(stdout).lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            let mut guard = lock(&state);
            guard.lines += 1;
            match parse_count(&line) {
                Ok(count) => {
                    guard.latest = Some(count);
                    guard.latest_at = Some(Instant::now());
                }
                Err(e) => {
                    guard.malformed += 1;
                    log::warn!("ignoring detector line: {e}");
                }
            }
        }
        lock(&state).exited = true;
    }

    /// Latest count with its age.
    fn latest(&self) -> Option<(u32, Duration)> {
        let guard = lock(&self.state);
        guard.latest.zip(guard.latest_at.map(|at| at.elapsed()))
    }

    fn has_exited(&self) -> bool {
        lock(&self.state).exited
    }
}

impl Drop for PersistentDetector {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        // The reader thread exits on its own once the pipe closes.
    }
}

// ---------------------------------------------------------------------------
// DetectorCommandSource
// ---------------------------------------------------------------------------

/// Occupancy source backed by an external detector process.
pub struct DetectorCommandSource {
    pub config: DetectorCommandConfig,
    detector: Option<PersistentDetector>,
    restarts: u64,
    stale: bool,
}

impl DetectorCommandSource {
    pub fn new(config: DetectorCommandConfig) -> Self {
        Self {
            config,
            detector: None,
            restarts: 0,
            stale: false,
        }
    }

    /// Start the detector if needed and wait up to `timeout` for its first
    /// count. Model loading can take a while; call this once before the
    /// sampling loop so the first ticks are not spent on `NotReady`.
    ///
    /// Gives up with `NotReady` as soon as `running` is cleared.
    pub fn wait_ready(
        &mut self,
        timeout: Duration,
        running: &AtomicBool,
    ) -> Result<u32, SourceError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.read_count() {
                Err(SourceError::NotReady)
                    if Instant::now() < deadline && running.load(Ordering::SeqCst) =>
                {
                    thread::sleep(Duration::from_millis(25));
                }
                other => return other,
            }
        }
    }

    /// Number of times the detector had to be respawned.
    pub fn restarts(&self) -> u64 {
        self.restarts
    }

    /// Non-empty lines read from the current detector process.
    pub fn lines_read(&self) -> u64 {
        self.detector.as_ref().map_or(0, |d| lock(&d.state).lines)
    }

    /// Malformed lines seen from the current detector process.
    pub fn malformed_lines(&self) -> u64 {
        self.detector
            .as_ref()
            .map_or(0, |d| lock(&d.state).malformed)
    }

    fn ensure_running(&mut self) -> Result<&PersistentDetector, SourceError> {
        if self.detector.is_none() {
            if self.config.command.trim().is_empty() {
                return Err(SourceError::Unavailable("no detector command configured".into()));
            }
            self.detector = Some(PersistentDetector::spawn(&self.config.command)?);
        }
        self.detector
            .as_ref()
            .ok_or_else(|| SourceError::Unavailable("detector not running".into()))
    }
}

impl OccupancySource for DetectorCommandSource {
    fn info(&self) -> &SourceInfo {
        &DETECTOR_COMMAND_INFO
    }

    fn is_available(&self) -> bool {
        program_name(&self.config.command).is_some_and(command_exists)
    }

    fn read_count(&mut self) -> Result<u32, SourceError> {
        let (exited, latest) = {
            let detector = self.ensure_running()?;
            (detector.has_exited(), detector.latest())
        };
        if exited {
            // Drop reaps the child; the next read respawns.
            self.detector = None;
            self.restarts += 1;
            log::warn!("detector exited; restarting on next read");
            return Err(SourceError::Unavailable("detector exited".into()));
        }
        match latest {
            Some((count, age)) if age <= self.config.stale_after => {
                if self.stale {
                    self.stale = false;
                    log::info!("detector output resumed");
                }
                Ok(count)
            }
            Some((_, age)) => {
                if !self.stale {
                    self.stale = true;
                    log::warn!("detector silent for {age:?}; holding ticks until it reports again");
                }
                Err(SourceError::NotReady)
            }
            None => Err(SourceError::NotReady),
        }
    }

    fn release(&mut self) {
        if let Some(detector) = self.detector.take() {
            log::info!("stopping detector (pid {})", detector.child.id());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(command: &str) -> DetectorCommandSource {
        DetectorCommandSource::new(DetectorCommandConfig {
            command: command.to_string(),
            stale_after: DEFAULT_STALE_AFTER,
        })
    }

    fn running() -> AtomicBool {
        AtomicBool::new(true)
    }

    /// Poll until `pred` accepts a read result or two seconds pass.
    fn poll_until(
        src: &mut DetectorCommandSource,
        pred: impl Fn(&Result<u32, SourceError>) -> bool,
    ) -> Result<u32, SourceError> {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            let r = src.read_count();
            if pred(&r) || Instant::now() >= deadline {
                return r;
            }
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn detector_command_info() {
        let src = source("true");
        assert_eq!(src.name(), "detector_command");
        assert_eq!(src.info().kind, SourceKind::Live);
    }

    #[test]
    fn availability_checks_program() {
        assert!(source("sh -c 'echo 1'").is_available());
        assert!(!source("nonexistent_detector_xyz --cam 0").is_available());
        assert!(!source("").is_available());
    }

    #[test]
    fn availability_accepts_shell_command_lines() {
        assert!(source("CAM=0 python3 detect.py").is_available());
        assert!(source("cd /opt && ./detect").is_available());
    }

    #[test]
    fn empty_command_is_unavailable() {
        let mut src = source("   ");
        assert!(matches!(src.read_count(), Err(SourceError::Unavailable(_))));
    }

    #[test]
    #[cfg(unix)]
    fn reads_latest_count_and_skips_garbage() {
        let mut src = source("echo 3; echo oops; echo 5; exec sleep 5");
        let first = src.wait_ready(Duration::from_secs(2), &running());
        assert!(matches!(first, Ok(3) | Ok(5)));
        let latest = poll_until(&mut src, |r| matches!(r, Ok(5)));
        assert_eq!(latest.unwrap(), 5);
        assert_eq!(src.malformed_lines(), 1);
        assert_eq!(src.lines_read(), 3);
        src.release();
    }

    #[test]
    #[cfg(unix)]
    fn not_ready_before_first_line() {
        let mut src = source("exec sleep 5");
        assert!(matches!(src.read_count(), Err(SourceError::NotReady)));
        src.release();
    }

    #[test]
    #[cfg(unix)]
    fn wait_ready_returns_when_stopped() {
        let mut src = source("exec sleep 30");
        let stopped = AtomicBool::new(false);
        let begin = Instant::now();
        let r = src.wait_ready(Duration::from_secs(20), &stopped);
        assert!(matches!(r, Err(SourceError::NotReady)));
        assert!(begin.elapsed() < Duration::from_secs(5));
        src.release();
    }

    #[test]
    #[cfg(unix)]
    fn hung_detector_goes_stale() {
        let mut src = DetectorCommandSource::new(DetectorCommandConfig {
            command: "echo 3; exec sleep 30".to_string(),
            stale_after: Duration::from_millis(300),
        });
        assert_eq!(src.wait_ready(Duration::from_secs(2), &running()).unwrap(), 3);

        // Nothing new arrives, so the count ages out instead of repeating.
        let r = poll_until(&mut src, |r| matches!(r, Err(SourceError::NotReady)));
        assert!(matches!(r, Err(SourceError::NotReady)));
        assert!(src.stale);
        assert_eq!(src.restarts(), 0);
        src.release();
    }

    #[test]
    #[cfg(unix)]
    fn exited_detector_is_reported_and_respawned() {
        let mut src = source("echo 2; sleep 0.3");
        let r = poll_until(&mut src, |r| matches!(r, Err(SourceError::Unavailable(_))));
        assert!(matches!(r, Err(SourceError::Unavailable(_))));
        assert_eq!(src.restarts(), 1);
        // Next read starts a fresh process.
        let r = poll_until(&mut src, |r| matches!(r, Ok(2)));
        assert_eq!(r.unwrap(), 2);
        src.release();
    }

    #[test]
    #[cfg(unix)]
    fn release_stops_process() {
        let mut src = source("exec sleep 30");
        let _ = src.read_count();
        src.release();
        assert!(src.detector.is_none());
    }

    #[test]
    fn source_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<DetectorCommandSource>();
    }
}

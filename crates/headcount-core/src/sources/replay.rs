//! ReplaySource — recorded counts fed back through the controller.
//!
//! Input is CSV with two columns, `timestamp,count`:
//!
//! ```text
//! # lobby camera, Monday morning
//! timestamp,count
//! 1700000000000000000,0
//! 1700000000.5,1
//! ```
//!
//! An integer timestamp is nanoseconds since the epoch. A timestamp with a
//! decimal point is seconds since the epoch. A header row and `#` comments are
//! skipped.

use std::collections::VecDeque;
use std::io::BufRead;
use std::path::Path;

use crate::error::SourceError;
use crate::event::{RawSample, Timestamp};
use crate::source::{OccupancySource, SourceInfo, SourceKind, parse_count};

static REPLAY_INFO: SourceInfo = SourceInfo {
    name: "replay",
    description: "Recorded timestamp,count samples from a CSV file",
    kind: SourceKind::Replay,
};

/// Occupancy source over a finite list of recorded samples.
#[derive(Debug, Clone, Default)]
pub struct ReplaySource {
    samples: VecDeque<RawSample>,
}

impl ReplaySource {
    pub fn from_samples(samples: impl IntoIterator<Item = RawSample>) -> Self {
        Self {
            samples: samples.into_iter().collect(),
        }
    }

    /// Parse CSV from any buffered reader.
    pub fn from_reader(reader: impl BufRead) -> Result<Self, SourceError> {
        let mut samples = VecDeque::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            if samples.is_empty() && is_header(trimmed) {
                continue;
            }
            samples.push_back(parse_row(trimmed, i + 1)?);
        }
        Ok(Self { samples })
    }

    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    /// Next recorded sample with its original timestamp.
    pub fn next_sample(&mut self) -> Option<RawSample> {
        self.samples.pop_front()
    }

    pub fn remaining(&self) -> usize {
        self.samples.len()
    }

    /// Timestamp of the first remaining sample.
    pub fn first_timestamp(&self) -> Option<Timestamp> {
        self.samples.front().map(|s| s.observed_at)
    }
}

impl Iterator for ReplaySource {
    type Item = RawSample;

    fn next(&mut self) -> Option<RawSample> {
        self.next_sample()
    }
}

impl OccupancySource for ReplaySource {
    fn info(&self) -> &SourceInfo {
        &REPLAY_INFO
    }

    fn is_available(&self) -> bool {
        !self.samples.is_empty()
    }

    fn read_count(&mut self) -> Result<u32, SourceError> {
        self.next_sample()
            .map(|s| s.count)
            .ok_or(SourceError::Exhausted)
    }
}

fn is_header(line: &str) -> bool {
    line.split(',')
        .next()
        .is_some_and(|first| first.trim().parse::<f64>().is_err())
}

fn parse_row(line: &str, line_no: usize) -> Result<RawSample, SourceError> {
    let malformed = || SourceError::Malformed(format!("line {line_no}: {line}"));

    let (ts, count) = line.split_once(',').ok_or_else(malformed)?;
    let ts = ts.trim();
    let observed_at = if ts.contains('.') {
        let secs: f64 = ts.parse().map_err(|_| malformed())?;
        Timestamp::try_from_secs_f64(secs).ok_or_else(malformed)?
    } else {
        Timestamp::from_nanos(ts.parse().map_err(|_| malformed())?)
    };
    let count = parse_count(count).map_err(|_| malformed())?;

    Ok(RawSample::new(count, observed_at))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<ReplaySource, SourceError> {
        ReplaySource::from_reader(text.as_bytes())
    }

    #[test]
    fn parses_header_comments_and_both_timestamp_forms() {
        let src = parse(
            "# recorded in the lobby\n\
             timestamp,count\n\
             1700000000000000000,0\n\
             \n\
             1700000000.5,2\n",
        )
        .unwrap();
        let samples: Vec<RawSample> = src.collect();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].observed_at.as_nanos(), 1_700_000_000_000_000_000);
        assert_eq!(samples[0].count, 0);
        assert_eq!(samples[1].observed_at.as_nanos(), 1_700_000_000_500_000_000);
        assert_eq!(samples[1].count, 2);
    }

    #[test]
    fn headerless_input() {
        let src = parse("10,1\n20,3\n").unwrap();
        assert_eq!(src.remaining(), 2);
        assert_eq!(src.first_timestamp(), Some(Timestamp::from_nanos(10)));
    }

    #[test]
    fn malformed_row_reports_line_number() {
        let err = parse("timestamp,count\n10,1\n20,minus one\n").unwrap_err();
        match err {
            SourceError::Malformed(msg) => assert!(msg.starts_with("line 3:"), "{msg}"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn out_of_range_seconds_are_malformed() {
        for text in ["100000000000000000000.5,1\n", "1.0e300,1\n", "10,1\n99999999999.5,1\n"] {
            assert!(
                matches!(parse(text), Err(SourceError::Malformed(_))),
                "{text:?}"
            );
        }
    }

    #[test]
    fn header_only_allowed_before_data() {
        assert!(parse("10,1\ntimestamp,count\n").is_err());
    }

    #[test]
    fn negative_count_is_malformed() {
        assert!(parse("10,-1\n").is_err());
        assert!(parse("-5.0,1\n").is_err());
        assert!(parse("10\n").is_err());
    }

    #[test]
    fn read_count_until_exhausted() {
        let mut src = ReplaySource::from_samples([
            RawSample::new(1, Timestamp::from_nanos(1)),
            RawSample::new(0, Timestamp::from_nanos(2)),
        ]);
        assert!(src.is_available());
        assert_eq!(src.read_count().unwrap(), 1);
        assert_eq!(src.read_count().unwrap(), 0);
        assert!(!src.is_available());
        assert!(matches!(src.read_count(), Err(SourceError::Exhausted)));
        assert_eq!(src.name(), "replay");
    }

    #[test]
    fn open_reads_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("samples.csv");
        std::fs::write(&path, "timestamp,count\n5,4\n").unwrap();
        let mut src = ReplaySource::open(&path).unwrap();
        assert_eq!(src.next_sample(), Some(RawSample::new(4, Timestamp::from_nanos(5))));
    }
}

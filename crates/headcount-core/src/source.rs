//! Abstract occupancy source trait.
//!
//! Every detector adapter implements [`OccupancySource`], which provides
//! metadata via [`SourceInfo`], availability checking, and one count per call.
//! Frame capture and inference happen behind this seam.

use crate::error::SourceError;

/// How an adapter obtains its counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// Live counts from a running detector.
    Live,
    /// Previously recorded counts.
    Replay,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::Replay => write!(f, "replay"),
        }
    }
}

/// Metadata about an occupancy source.
#[derive(Debug, Clone)]
pub struct SourceInfo {
    /// Unique identifier (e.g. `"detector_command"`).
    pub name: &'static str,
    /// One-line human-readable description.
    pub description: &'static str,
    pub kind: SourceKind,
}

/// Trait that every occupancy source must implement.
pub trait OccupancySource: Send {
    /// Source metadata.
    fn info(&self) -> &SourceInfo;

    /// Check if this source can operate on the current machine.
    fn is_available(&self) -> bool;

    /// Latest people count.
    fn read_count(&mut self) -> Result<u32, SourceError>;

    /// Release the underlying acquisition resource (camera, subprocess).
    fn release(&mut self) {}

    /// Convenience: name from info.
    fn name(&self) -> &'static str {
        self.info().name
    }
}

/// Parse one line of detector output as a people count.
///
/// Accepts surrounding whitespace and a trailing `.0` from detectors that
/// print floats. Anything else, including negatives, is malformed.
pub fn parse_count(line: &str) -> Result<u32, SourceError> {
    let trimmed = line.trim();
    let digits = trimmed.strip_suffix(".0").unwrap_or(trimmed);
    digits
        .parse::<u32>()
        .map_err(|_| SourceError::Malformed(trimmed.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_count_accepts_integers() {
        assert_eq!(parse_count("0").unwrap(), 0);
        assert_eq!(parse_count(" 12\n").unwrap(), 12);
        assert_eq!(parse_count("3.0").unwrap(), 3);
    }

    #[test]
    fn parse_count_rejects_garbage() {
        assert!(matches!(parse_count("-1"), Err(SourceError::Malformed(_))));
        assert!(matches!(parse_count("2.5"), Err(SourceError::Malformed(_))));
        assert!(matches!(parse_count("people"), Err(SourceError::Malformed(_))));
        assert!(matches!(parse_count(""), Err(SourceError::Malformed(_))));
    }

    #[test]
    fn source_kind_display() {
        assert_eq!(SourceKind::Live.to_string(), "live");
        assert_eq!(SourceKind::Replay.to_string(), "replay");
    }
}

//! Tunables for the emission controller, the recorder, and the store.
//!
//! Every struct has a `Default` carrying the production defaults. A
//! [`FileConfig`] can be loaded from JSON and layered underneath CLI flags.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Thresholds driving the emit-or-skip decision.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// Grace period after the last nonzero reading during which zeros are withheld.
    pub zero_timeout: Duration,
    /// Longest a value may go without being re-sent.
    pub force_save_interval: Duration,
    /// Longest pending events may sit before a flush.
    pub batch_interval: Duration,
    /// Emit a zero on every tick once it has outlived the suppression window.
    pub reaffirm_settled_zero: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            zero_timeout: Duration::from_secs(5),
            force_save_interval: Duration::from_secs(600),
            batch_interval: Duration::from_secs(10),
            reaffirm_settled_zero: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Recorder
// ---------------------------------------------------------------------------

/// What happens to a batch the store refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushFailurePolicy {
    /// Keep the batch and retry at the next flush boundary.
    #[default]
    Retain,
    /// Discard the batch and carry on.
    Drop,
}

impl std::fmt::Display for FlushFailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Retain => write!(f, "retain"),
            Self::Drop => write!(f, "drop"),
        }
    }
}

impl std::str::FromStr for FlushFailurePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "retain" | "retry" => Ok(Self::Retain),
            "drop" => Ok(Self::Drop),
            other => Err(ConfigError::Invalid {
                field: "on_write_failure",
                value: other.to_string(),
            }),
        }
    }
}

/// Batching and failure handling around the controller.
#[derive(Debug, Clone, PartialEq)]
pub struct RecorderConfig {
    pub controller: ControllerConfig,
    pub on_write_failure: FlushFailurePolicy,
    /// Upper bound on events held while the store is failing.
    pub max_pending_events: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            controller: ControllerConfig::default(),
            on_write_failure: FlushFailurePolicy::Retain,
            max_pending_events: 10_000,
        }
    }
}

impl RecorderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_pending_events == 0 {
            return Err(ConfigError::Zero {
                field: "max_pending_events",
            });
        }
        if self.controller.batch_interval.is_zero() {
            return Err(ConfigError::Zero {
                field: "batch_interval",
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Measurement name written for every point.
pub const DEFAULT_MEASUREMENT: &str = "occupancy_count";

/// Connection parameters for the InfluxDB v2 write API.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    pub url: String,
    pub token: String,
    pub org: String,
    pub bucket: String,
    pub measurement: String,
    /// Static tags attached to every point.
    pub tags: BTreeMap<String, String>,
    pub timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8086".to_string(),
            token: String::new(),
            org: String::new(),
            bucket: String::new(),
            measurement: DEFAULT_MEASUREMENT.to_string(),
            tags: BTreeMap::new(),
            timeout: Duration::from_secs(5),
        }
    }
}

impl StoreConfig {
    /// Check the fields the write API needs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::Missing("url"));
        }
        if self.org.trim().is_empty() {
            return Err(ConfigError::Missing("org"));
        }
        if self.bucket.trim().is_empty() {
            return Err(ConfigError::Missing("bucket"));
        }
        if self.measurement.is_empty() {
            return Err(ConfigError::Missing("measurement"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config file
// ---------------------------------------------------------------------------

/// On-disk JSON configuration. Every field is optional; durations are
/// humane strings such as `"500ms"` or `"10m"`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub sampling_interval: Option<String>,
    pub zero_timeout: Option<String>,
    pub force_save_interval: Option<String>,
    pub batch_interval: Option<String>,
    pub reaffirm_settled_zero: Option<bool>,
    pub on_write_failure: Option<FlushFailurePolicy>,
    pub max_pending_events: Option<usize>,
    pub url: Option<String>,
    pub token: Option<String>,
    pub org: Option<String>,
    pub bucket: Option<String>,
    pub measurement: Option<String>,
    pub tags: BTreeMap<String, String>,
    pub detector: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

/// Parse a duration string like "5m", "30s", "1h", "100ms". A bare number is
/// taken as seconds.
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let s = s.trim();

    let (numeric, multiplier) = if let Some(rest) = s.strip_suffix("ms") {
        (rest, 1u64)
    } else if let Some(rest) = s.strip_suffix('s') {
        (rest, 1000)
    } else if let Some(rest) = s.strip_suffix('m') {
        (rest, 60_000)
    } else if let Some(rest) = s.strip_suffix('h') {
        (rest, 3_600_000)
    } else {
        (s, 1000)
    };

    let numeric = numeric.trim();
    if let Ok(whole) = numeric.parse::<u64>() {
        return whole
            .checked_mul(multiplier)
            .map(Duration::from_millis)
            .ok_or_else(|| ConfigError::Duration(s.to_string()));
    }

    let value: f64 = numeric
        .parse()
        .map_err(|_| ConfigError::Duration(s.to_string()))?;
    // Rejects negative, NaN and anything past `Duration::MAX`.
    Duration::try_from_secs_f64(value * multiplier as f64 / 1000.0)
        .map_err(|_| ConfigError::Duration(s.to_string()))
}

/// Parse `key:value` tag arguments. Keys must be non-empty.
pub fn parse_tags(tags: &[String]) -> Result<BTreeMap<String, String>, ConfigError> {
    let mut map = BTreeMap::new();
    for tag in tags {
        match tag.split_once(':') {
            Some((k, v)) if !k.trim().is_empty() => {
                map.insert(k.trim().to_string(), v.trim().to_string());
            }
            _ => {
                return Err(ConfigError::Invalid {
                    field: "tag",
                    value: tag.clone(),
                });
            }
        }
    }
    Ok(map)
}

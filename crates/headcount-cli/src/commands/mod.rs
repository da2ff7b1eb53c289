pub mod replay;
pub mod run;

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use headcount_core::{
    ConfigError, ControllerConfig, DEFAULT_MEASUREMENT, FileConfig, FlushFailurePolicy, InfluxSink,
    LineFormat, RecorderConfig, SessionConfig, SessionSink, StoreConfig, TelemetrySink,
    WriterSink, parse_duration, parse_tags,
};

/// Ticks are at least this far apart unless overridden.
pub const DEFAULT_SAMPLING_INTERVAL: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// Shared flags
// ---------------------------------------------------------------------------

/// Controller and recorder tunables.
#[derive(Args, Debug, Clone, Default)]
pub struct TuningArgs {
    /// JSON config file; flags given here override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Minimum spacing between ticks (e.g. "500ms", "1s") [default: 500ms]
    #[arg(long)]
    pub sampling_interval: Option<String>,

    /// How long zeros are withheld after the last nonzero count [default: 5s]
    #[arg(long)]
    pub zero_timeout: Option<String>,

    /// Re-send an unchanged count after this long [default: 10m]
    #[arg(long)]
    pub force_save_interval: Option<String>,

    /// How often pending events are written to the sink [default: 10s]
    #[arg(long)]
    pub batch_interval: Option<String>,

    /// Emit a settled zero once instead of on every tick
    #[arg(long)]
    pub no_reaffirm_zero: bool,

    /// What to do with a batch the sink refused: retain (retry later) or drop
    #[arg(long, value_parser = ["retain", "drop"])]
    pub on_write_failure: Option<String>,

    /// Cap on events held while the sink is failing [default: 10000]
    #[arg(long)]
    pub max_pending_events: Option<usize>,
}

/// Sink selection and store connection.
#[derive(Args, Debug, Clone)]
pub struct SinkArgs {
    /// Where emitted counts go: influx (write API), session (local files), stdout (line protocol)
    #[arg(long, default_value = "influx", value_parser = ["influx", "session", "stdout"])]
    pub sink: String,

    /// InfluxDB base URL
    #[arg(long, env = "HEADCOUNT_INFLUX_URL")]
    pub url: Option<String>,

    /// InfluxDB API token
    #[arg(long, env = "HEADCOUNT_INFLUX_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// InfluxDB organization
    #[arg(long, env = "HEADCOUNT_INFLUX_ORG")]
    pub org: Option<String>,

    /// InfluxDB bucket
    #[arg(long, env = "HEADCOUNT_INFLUX_BUCKET")]
    pub bucket: Option<String>,

    /// Measurement name [default: occupancy_count]
    #[arg(long)]
    pub measurement: Option<String>,

    /// Static tags as key:value pairs (repeatable)
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// Output directory for the session sink (default: ./sessions/)
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Session note (session sink)
    #[arg(long)]
    pub note: Option<String>,
}

// ---------------------------------------------------------------------------
// Resolution: flags > environment > config file > defaults
// ---------------------------------------------------------------------------

/// Everything a command needs after merging flags, file and defaults.
#[derive(Debug, Clone)]
pub struct Settings {
    pub sampling_interval: Duration,
    pub recorder: RecorderConfig,
    pub store: StoreConfig,
    pub sink: String,
    pub output_dir: PathBuf,
    pub note: Option<String>,
    /// Detector command from the config file, used when no flag is given.
    pub detector: Option<String>,
}

pub fn resolve_settings(tuning: &TuningArgs, sink: &SinkArgs) -> Result<Settings, ConfigError> {
    let file = match &tuning.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let defaults = ControllerConfig::default();

    let duration = |flag: &Option<String>, from_file: &Option<String>, default: Duration| {
        flag.as_ref()
            .or(from_file.as_ref())
            .map_or(Ok(default), |s| parse_duration(s))
    };

    let sampling_interval = duration(
        &tuning.sampling_interval,
        &file.sampling_interval,
        DEFAULT_SAMPLING_INTERVAL,
    )?;
    if sampling_interval.is_zero() {
        return Err(ConfigError::Zero {
            field: "sampling_interval",
        });
    }

    let controller = ControllerConfig {
        zero_timeout: duration(&tuning.zero_timeout, &file.zero_timeout, defaults.zero_timeout)?,
        force_save_interval: duration(
            &tuning.force_save_interval,
            &file.force_save_interval,
            defaults.force_save_interval,
        )?,
        batch_interval: duration(
            &tuning.batch_interval,
            &file.batch_interval,
            defaults.batch_interval,
        )?,
        reaffirm_settled_zero: !tuning.no_reaffirm_zero
            && file
                .reaffirm_settled_zero
                .unwrap_or(defaults.reaffirm_settled_zero),
    };

    let on_write_failure = match &tuning.on_write_failure {
        Some(s) => s.parse::<FlushFailurePolicy>()?,
        None => file.on_write_failure.unwrap_or_default(),
    };

    let recorder = RecorderConfig {
        controller,
        on_write_failure,
        max_pending_events: tuning
            .max_pending_events
            .or(file.max_pending_events)
            .unwrap_or(RecorderConfig::default().max_pending_events),
    };
    recorder.validate()?;

    let mut tags = file.tags.clone();
    tags.extend(parse_tags(&sink.tags)?);

    let store_defaults = StoreConfig::default();
    let pick = |flag: &Option<String>, from_file: &Option<String>| {
        flag.clone().or_else(|| from_file.clone())
    };
    let store = StoreConfig {
        url: pick(&sink.url, &file.url).unwrap_or(store_defaults.url),
        token: pick(&sink.token, &file.token).unwrap_or_default(),
        org: pick(&sink.org, &file.org).unwrap_or_default(),
        bucket: pick(&sink.bucket, &file.bucket).unwrap_or_default(),
        measurement: pick(&sink.measurement, &file.measurement)
            .unwrap_or_else(|| DEFAULT_MEASUREMENT.to_string()),
        tags,
        timeout: store_defaults.timeout,
    };

    Ok(Settings {
        sampling_interval,
        recorder,
        store,
        sink: sink.sink.clone(),
        output_dir: sink
            .output
            .clone()
            .unwrap_or_else(|| PathBuf::from("sessions")),
        note: sink.note.clone(),
        detector: file.detector,
    })
}

// ---------------------------------------------------------------------------
// Sink construction
// ---------------------------------------------------------------------------

/// Open the sink named in `settings`. Returns the sink and a one-line
/// description of where the data goes, for the start banner.
pub fn open_sink(settings: &Settings) -> Result<(Box<dyn TelemetrySink>, String), String> {
    match settings.sink.as_str() {
        "influx" => {
            let sink = InfluxSink::new(settings.store.clone()).map_err(|e| e.to_string())?;
            let target = format!(
                "{} (org {}, bucket {})",
                settings.store.url, settings.store.org, settings.store.bucket
            );
            if let Err(e) = sink.ping() {
                log::warn!("store health check failed: {e}");
            }
            Ok((Box::new(sink), target))
        }
        "session" => {
            let sink = SessionSink::new(SessionConfig {
                output_dir: settings.output_dir.clone(),
                measurement: settings.store.measurement.clone(),
                tags: settings.store.tags.clone(),
                note: settings.note.clone(),
            })
            .map_err(|e| format!("creating session: {e}"))?;
            let target = sink.session_dir().display().to_string();
            Ok((Box::new(sink), target))
        }
        "stdout" => {
            let format = LineFormat::new(&settings.store.measurement, &settings.store.tags);
            Ok((
                Box::new(WriterSink::new(std::io::stdout(), format)),
                "stdout".to_string(),
            ))
        }
        other => Err(ConfigError::Invalid {
            field: "sink",
            value: other.to_string(),
        }
        .to_string()),
    }
}

/// Human-readable duration for banners: "500ms", "5s", "10m", "1h".
pub fn format_duration(d: Duration) -> String {
    let ms = d.as_millis();
    if ms == 0 || ms % 1000 != 0 {
        format!("{ms}ms")
    } else if ms % 3_600_000 == 0 {
        format!("{}h", ms / 3_600_000)
    } else if ms % 60_000 == 0 {
        format!("{}m", ms / 60_000)
    } else {
        format!("{}s", ms / 1000)
    }
}

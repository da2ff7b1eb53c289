//! `headcount replay` — push a recorded CSV through the recorder.

use std::path::Path;

use headcount_core::{
    FlushOutcome, Recorder, RecorderStats, ReplaySource, TickScheduler, Timestamp,
};
use serde::Serialize;

use super::{SinkArgs, TuningArgs, format_duration, open_sink, resolve_settings};

/// Machine-readable replay summary (`--json`).
#[derive(Serialize)]
struct ReplaySummary {
    input: String,
    samples: u64,
    debounced: u64,
    first_sample_ns: Option<u64>,
    last_sample_ns: Option<u64>,
    #[serde(flatten)]
    stats: RecorderStats,
}

/// Run the replay command. The final flush always happens.
pub fn run(input: &Path, tuning: &TuningArgs, sinks: &SinkArgs, json: bool) {
    let settings = resolve_settings(tuning, sinks).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    let mut source = ReplaySource::open(input).unwrap_or_else(|e| {
        eprintln!("Error reading {}: {e}", input.display());
        std::process::exit(1);
    });
    let total = source.remaining();
    let Some(first) = source.first_timestamp() else {
        eprintln!("Error: {} contains no samples", input.display());
        std::process::exit(1);
    };

    let (sink, target) = open_sink(&settings).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    log::info!(
        "replaying {total} sample(s) from {} into {} ({target}), sampling interval {}",
        input.display(),
        settings.sink,
        format_duration(settings.sampling_interval)
    );

    let mut recorder = Recorder::new(settings.recorder.clone(), sink, first);
    let mut scheduler = TickScheduler::new(settings.sampling_interval);
    let mut last: Option<Timestamp> = None;

    while let Some(sample) = source.next_sample() {
        // Recorded rows faster than the sampling interval would never have
        // reached the controller live.
        if !scheduler.admit(sample.observed_at) {
            continue;
        }
        if last.is_some_and(|prev| sample.observed_at < prev) {
            log::warn!(
                "timestamp goes backwards at {} (previous {})",
                sample.observed_at,
                last.map_or(0, Timestamp::as_nanos)
            );
        }
        last = Some(sample.observed_at);

        let outcome = recorder.tick(sample);
        if let Some(event) = outcome.emitted {
            log::debug!("t={} emit {}", event.timestamp, event.count);
        }
        if let Some(FlushOutcome::Failed { error, .. }) = outcome.flush {
            log::warn!("flush at {} failed: {error}", sample.observed_at);
        }
    }

    let stats = match recorder.shutdown(true) {
        Ok(stats) => stats,
        Err(e) => {
            eprintln!("Error closing sink: {e}");
            std::process::exit(1);
        }
    };

    let summary = ReplaySummary {
        input: input.display().to_string(),
        samples: total as u64,
        debounced: scheduler.rejected(),
        first_sample_ns: Some(first.as_nanos()),
        last_sample_ns: last.map(Timestamp::as_nanos),
        stats,
    };

    if json {
        match serde_json::to_string_pretty(&summary) {
            // Line protocol owns stdout when the stdout sink is selected.
            Ok(s) if settings.sink == "stdout" => eprintln!("{s}"),
            Ok(s) => println!("{s}"),
            Err(e) => eprintln!("Error serializing summary: {e}"),
        }
        return;
    }

    let span = last.unwrap_or(first).saturating_since(first);
    eprintln!("Replayed {}", summary.input);
    eprintln!("  Samples:        {} ({} debounced)", summary.samples, summary.debounced);
    eprintln!("  Span:           {}", format_duration(span));
    eprintln!("  Emitted:        {}", stats.emitted);
    eprintln!("  Flushes:        {}", stats.flushes);
    eprintln!("  Points written: {}", stats.points_written);
    if stats.failed_writes > 0 {
        eprintln!("  Failed writes:  {}", stats.failed_writes);
    }
    if stats.dropped_events > 0 {
        eprintln!("  Dropped events: {}", stats.dropped_events);
    }
    eprintln!("  Sink:           {} → {target}", settings.sink);
}

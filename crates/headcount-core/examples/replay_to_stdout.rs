//! Replay a short recorded session and print what would be written.
//!
//! Pipes a synthetic lobby recording through the recorder and writes the
//! resulting line protocol to stdout instead of a store.
//!
//! Run: `cargo run --example replay_to_stdout`

use std::collections::BTreeMap;
use std::io;
use std::time::Duration;

use headcount_core::{
    ControllerConfig, DEFAULT_MEASUREMENT, LineFormat, RawSample, Recorder, RecorderConfig,
    ReplaySource, Timestamp, WriterSink,
};

fn main() {
    // Ten minutes, one sample per second: a visitor at 1:00, a second one at
    // 2:00, a dropped frame at 2:30, both gone by 6:00.
    let start = 1_700_000_000u64;
    let samples = (0..600u64).map(|t| {
        let count = match t {
            60..=119 => 1,
            150 => 0,
            120..=359 => 2,
            _ => 0,
        };
        RawSample::new(count, Timestamp::from_nanos((start + t) * 1_000_000_000))
    });
    let mut source = ReplaySource::from_samples(samples);

    let config = RecorderConfig {
        controller: ControllerConfig {
            zero_timeout: Duration::from_secs(5),
            force_save_interval: Duration::from_secs(120),
            batch_interval: Duration::from_secs(30),
            ..ControllerConfig::default()
        },
        ..RecorderConfig::default()
    };

    let mut tags = BTreeMap::new();
    tags.insert("room".to_string(), "lobby".to_string());
    let sink = WriterSink::new(io::stdout(), LineFormat::new(DEFAULT_MEASUREMENT, &tags));

    let started_at = source
        .first_timestamp()
        .unwrap_or(Timestamp::from_nanos(start * 1_000_000_000));
    let mut recorder = Recorder::new(config, sink, started_at);
    while let Some(sample) = source.next_sample() {
        recorder.tick(sample);
    }

    match recorder.shutdown(true) {
        Ok(stats) => eprintln!(
            "\n{} ticks, {} emitted, {} flushes, {} points written",
            stats.ticks, stats.emitted, stats.flushes, stats.points_written
        ),
        Err(e) => eprintln!("final flush failed: {e}"),
    }
}

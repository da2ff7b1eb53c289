//! `headcount run` — sample a live detector and stream counts to a sink.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use headcount_core::{
    DetectorCommandConfig, DetectorCommandSource, FlushOutcome, OccupancySource, RawSample,
    Recorder, RecorderStats, SourceError, TickScheduler, Timestamp, parse_duration,
};

use super::{Settings, SinkArgs, TuningArgs, format_duration, open_sink, resolve_settings};

pub struct RunCommandConfig<'a> {
    pub tuning: &'a TuningArgs,
    pub sinks: &'a SinkArgs,
    pub detector: Option<&'a str>,
    pub duration: Option<&'a str>,
    pub ready_timeout: &'a str,
    pub stale_after: &'a str,
    pub final_flush: bool,
}

/// Run the live sampling loop until Ctrl+C or the duration limit.
#[allow(clippy::too_many_lines)]
pub fn run(cfg: RunCommandConfig<'_>) {
    let settings = resolve_settings(cfg.tuning, cfg.sinks).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    let Some(command) = cfg
        .detector
        .map(str::to_string)
        .or_else(|| settings.detector.clone())
        .filter(|c| !c.trim().is_empty())
    else {
        eprintln!("Error: no detector command (use --detector or HEADCOUNT_DETECTOR)");
        std::process::exit(1);
    };

    let max_duration = cfg.duration.map(parse_or_exit);
    let ready_timeout = parse_or_exit(cfg.ready_timeout);
    let stale_after = parse_or_exit(cfg.stale_after);

    let mut source = DetectorCommandSource::new(DetectorCommandConfig {
        command,
        stale_after,
    });
    if !source.is_available() {
        eprintln!(
            "Error: detector program not found: {}",
            source.config.command
        );
        std::process::exit(1);
    }

    let (sink, target) = open_sink(&settings).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    // Set up Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Error setting Ctrl+C handler: {e}");
        std::process::exit(1);
    }

    // Line protocol owns stdout when the stdout sink is selected.
    let interactive = settings.sink != "stdout";

    if interactive {
        print_banner(&source, &settings, &target, max_duration);
    } else {
        log::info!("streaming {} to stdout", source.config.command);
    }

    match source.wait_ready(ready_timeout, &running) {
        Ok(count) => log::info!("detector ready, first count {count}"),
        Err(SourceError::NotReady) if !running.load(Ordering::SeqCst) => {
            log::info!("interrupted during detector warm-up");
        }
        Err(SourceError::NotReady) => log::warn!(
            "detector produced no count within {}; starting anyway",
            format_duration(ready_timeout)
        ),
        Err(e) => {
            eprintln!("Error: {e}");
            source.release();
            std::process::exit(1);
        }
    }

    let mut recorder = Recorder::new(settings.recorder.clone(), sink, Timestamp::now());
    let mut scheduler = TickScheduler::new(settings.sampling_interval);
    let start = Instant::now();
    let mut read_errors: u64 = 0;
    let mut last_count: Option<u32> = None;
    let mut store_failing = false;

    while scheduler.wait_next(&running) {
        if max_duration.is_some_and(|max| start.elapsed() >= max) {
            break;
        }

        let count = match source.read_count() {
            Ok(count) => count,
            Err(SourceError::NotReady) => continue,
            Err(e) => {
                read_errors += 1;
                log::warn!("detector read failed: {e}");
                continue;
            }
        };
        last_count = Some(count);
        let now = Timestamp::now();

        match recorder.tick(RawSample::new(count, now)).flush {
            Some(FlushOutcome::Failed { .. }) => store_failing = true,
            Some(FlushOutcome::Written(_)) => store_failing = false,
            None => {}
        }

        if interactive {
            print_status(
                &recorder.stats(),
                recorder.pending(),
                last_count,
                start.elapsed(),
                store_failing,
            );
        }
    }

    if interactive {
        println!();
        println!();
    }

    source.release();

    let missed = scheduler.missed_deadlines();
    if missed > 0 {
        log::warn!(
            "{missed} tick(s) ran late (worst {:?})",
            scheduler.worst_lateness()
        );
    }

    match recorder.shutdown(cfg.final_flush) {
        Ok(stats) => {
            // Summary goes to stderr so piped line protocol stays clean.
            eprintln!("Stopped after {:.1}s", start.elapsed().as_secs_f64());
            eprintln!("  Ticks:          {}", stats.ticks);
            eprintln!("  Emitted:        {}", stats.emitted);
            eprintln!("  Flushes:        {}", stats.flushes);
            eprintln!("  Points written: {}", stats.points_written);
            if stats.failed_writes > 0 {
                eprintln!("  Failed writes:  {}", stats.failed_writes);
            }
            if stats.dropped_events > 0 {
                eprintln!("  Dropped events: {}", stats.dropped_events);
            }
            if read_errors > 0 {
                eprintln!("  Read errors:    {read_errors}");
            }
            if source.restarts() > 0 {
                eprintln!("  Restarts:       {}", source.restarts());
            }
        }
        Err(e) => {
            eprintln!("Error closing sink: {e}");
            std::process::exit(1);
        }
    }
}

fn print_banner(
    source: &DetectorCommandSource,
    settings: &Settings,
    target: &str,
    max_duration: Option<Duration>,
) {
    let controller = &settings.recorder.controller;
    println!("Streaming occupancy");
    println!("  Detector:  {}", source.config.command);
    println!("  Sink:      {} → {target}", settings.sink);
    println!(
        "  Interval:  {} (zeros held {}, force-save {}, batch {})",
        format_duration(settings.sampling_interval),
        format_duration(controller.zero_timeout),
        format_duration(controller.force_save_interval),
        format_duration(controller.batch_interval),
    );
    match max_duration {
        Some(d) => println!("  Duration:  {}", format_duration(d)),
        None => println!("  Duration:  until Ctrl+C"),
    }
    println!();
}

fn print_status(
    stats: &RecorderStats,
    pending: usize,
    last_count: Option<u32>,
    elapsed: Duration,
    store_failing: bool,
) {
    let last = last_count.map_or_else(|| "-".to_string(), |c| c.to_string());
    print!(
        "\r  Count: {last:<4} Ticks: {:<8} Emitted: {:<6} Written: {:<6} Pending: {pending:<5} Elapsed: {:.1}s{}",
        stats.ticks,
        stats.emitted,
        stats.points_written,
        elapsed.as_secs_f64(),
        if store_failing { "  [store failing]" } else { "" }
    );
    let _ = std::io::stdout().flush();
}

fn parse_or_exit(s: &str) -> Duration {
    parse_duration(s).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    })
}

//! CLI for headcount — stream a live people count into a time-series store.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use commands::{SinkArgs, TuningArgs};

#[derive(Parser)]
#[command(name = "headcount")]
#[command(about = "headcount — change-driven occupancy telemetry from a camera detector")]
#[command(version = headcount_core::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sample a live detector and stream emitted counts to a sink.
    /// Zeros right after people were seen are held back for --zero-timeout;
    /// unchanged counts are re-sent every --force-save-interval.
    Run {
        /// Detector command printing one people count per line on stdout
        #[arg(long, env = "HEADCOUNT_DETECTOR")]
        detector: Option<String>,

        /// Maximum run time (e.g. "5m", "30s", "1h"); default: until Ctrl+C
        #[arg(long)]
        duration: Option<String>,

        /// How long to wait for the detector's first count before starting
        #[arg(long, default_value = "30s")]
        ready_timeout: String,

        /// Skip ticks once the detector's latest count is older than this
        #[arg(long, default_value = "10s")]
        stale_after: String,

        /// Discard pending events on exit instead of writing them
        #[arg(long)]
        no_final_flush: bool,

        #[command(flatten)]
        tuning: TuningArgs,

        #[command(flatten)]
        sinks: SinkArgs,
    },

    /// Replay a recorded timestamp,count CSV through the same pipeline
    Replay {
        /// CSV file: integer timestamps are ns since epoch, decimals are seconds
        input: PathBuf,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        tuning: TuningArgs,

        #[command(flatten)]
        sinks: SinkArgs,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            detector,
            duration,
            ready_timeout,
            stale_after,
            no_final_flush,
            tuning,
            sinks,
        } => commands::run::run(commands::run::RunCommandConfig {
            tuning: &tuning,
            sinks: &sinks,
            detector: detector.as_deref(),
            duration: duration.as_deref(),
            ready_timeout: &ready_timeout,
            stale_after: &stale_after,
            final_flush: !no_final_flush,
        }),
        Commands::Replay {
            input,
            json,
            tuning,
            sinks,
        } => commands::replay::run(&input, &tuning, &sinks, json),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::try_parse_from([
            "headcount",
            "run",
            "--detector",
            "python3 detect.py",
            "--sink",
            "session",
            "--zero-timeout",
            "3s",
            "--tag",
            "room:lobby",
            "--no-final-flush",
            "--stale-after",
            "3s",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                detector,
                stale_after,
                no_final_flush,
                tuning,
                sinks,
                ..
            } => {
                assert_eq!(detector.as_deref(), Some("python3 detect.py"));
                assert_eq!(stale_after, "3s");
                assert!(no_final_flush);
                assert_eq!(tuning.zero_timeout.as_deref(), Some("3s"));
                assert_eq!(sinks.sink, "session");
                assert_eq!(sinks.tags, vec!["room:lobby".to_string()]);
            }
            Commands::Replay { .. } => panic!("expected run"),
        }
    }

    #[test]
    fn test_parse_replay() {
        let cli = Cli::try_parse_from([
            "headcount",
            "replay",
            "lobby.csv",
            "--sink",
            "stdout",
            "--json",
        ])
        .unwrap();
        match cli.command {
            Commands::Replay {
                input, json, sinks, ..
            } => {
                assert_eq!(input, PathBuf::from("lobby.csv"));
                assert!(json);
                assert_eq!(sinks.sink, "stdout");
            }
            Commands::Run { .. } => panic!("expected replay"),
        }
    }

    #[test]
    fn test_unknown_sink_rejected() {
        assert!(Cli::try_parse_from(["headcount", "replay", "x.csv", "--sink", "kafka"]).is_err());
    }
}

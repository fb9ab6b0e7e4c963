// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use ccw_config::EngineConfig;
use ccw_logging::CliLoggingArgs;
use clap::Subcommand;
use std::path::PathBuf;

pub mod classify;
pub mod replay;
pub mod watch;

pub use clap::Parser;

#[derive(clap::Parser, Debug)]
#[command(
    name = "ccw",
    about = "Reconstruct and inspect streamed CLI executions",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Configuration file merged over the standard locations
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[command(flatten)]
    pub logging: CliLoggingArgs,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay a captured JSONL event stream and print the resulting panes
    Replay(replay::ReplayArgs),
    /// Follow a live execution server and print store changes
    Watch(watch::WatchArgs),
    /// Classify output lines and print the result as JSON
    Classify(classify::ClassifyArgs),
}

impl Commands {
    pub async fn run(self, config: EngineConfig) -> anyhow::Result<()> {
        match self {
            Commands::Replay(args) => args.run(config),
            Commands::Watch(args) => args.run(config).await,
            Commands::Classify(args) => args.run(config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccw_logging::CliLogLevel;

    #[test]
    fn test_parse_replay_with_global_flags() {
        let cli = Cli::try_parse_from([
            "ccw",
            "replay",
            "--file",
            "events.jsonl",
            "--panes",
            "3",
            "--close",
            "a",
            "--close",
            "b",
            "--log-level",
            "debug",
            "--config",
            "ccw.toml",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("ccw.toml")));
        assert_eq!(cli.logging.log_level, Some(CliLogLevel::Debug));
        match cli.command {
            Commands::Replay(args) => {
                assert_eq!(args.file, PathBuf::from("events.jsonl"));
                assert_eq!(args.panes, Some(3));
                assert_eq!(args.close, vec!["a", "b"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_watch_and_classify() {
        let cli = Cli::try_parse_from(["ccw", "watch", "--server", "http://10.0.0.5:3456"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Watch(ref args) if args.server.as_deref() == Some("http://10.0.0.5:3456")
        ));

        let cli = Cli::try_parse_from(["ccw", "classify", "{\"a\":1}", "plain"]).unwrap();
        match cli.command {
            Commands::Classify(args) => assert_eq!(args.lines.len(), 2),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_replay_requires_file() {
        assert!(Cli::try_parse_from(["ccw", "replay"]).is_err());
    }
}

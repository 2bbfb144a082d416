//! CLI interface for kelly-gate
//!
//! Provides subcommands for:
//! - `run`: Size signals from an event stream
//! - `check`: Validate the configuration
//! - `config`: Show the effective configuration

mod events;
mod run;

pub use events::{parse_line, InputEvent};
pub use run::RunArgs;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "kelly-gate")]
#[command(about = "Kelly position sizing gated by portfolio risk limits")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Size signals read as JSON lines and print decisions
    Run(RunArgs),
    /// Validate the configuration and exit
    Check,
    /// Show the effective configuration
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_args() {
        let cli = Cli::try_parse_from([
            "kelly-gate",
            "-c",
            "risk.toml",
            "run",
            "--input",
            "events.jsonl",
            "--history",
            "prices.json",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("risk.toml"));
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.input, Some(PathBuf::from("events.jsonl")));
                assert_eq!(args.history, Some(PathBuf::from("prices.json")));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_default_config_path() {
        let cli = Cli::try_parse_from(["kelly-gate", "check"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("config.toml"));
        assert!(matches!(cli.command, Commands::Check));
    }
}

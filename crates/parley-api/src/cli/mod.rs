//! CLI command definitions for the `parley` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod config;
pub mod demo;
pub mod flood;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Exercise the Parley in-process message broker.
#[derive(Parser)]
#[command(name = "parley", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for broker debug logs, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Data directory holding config.toml (defaults to ~/.parley).
    #[arg(long, global = true, env = "PARLEY_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Tracing filter directives implied by the verbosity flags.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 if self.quiet => "error",
            0 => "warn",
            1 => "info,parley_core=debug",
            _ => "trace",
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Route a short alice/bob/carol conversation and show every delivery.
    Demo,

    /// Push load through the broker and report delivery statistics.
    Flood {
        /// Number of concurrent producer tasks.
        #[arg(long, default_value = "4")]
        producers: usize,

        /// Messages sent by each producer.
        #[arg(long, default_value = "1000")]
        messages: usize,

        /// Number of registered subscribers.
        #[arg(long, default_value = "8")]
        subscribers: usize,

        /// Delay each subscriber takes per received message, in milliseconds.
        #[arg(long, default_value = "0")]
        slow_ms: u64,

        /// Send every Nth message as a broadcast (0 disables broadcasts).
        #[arg(long, default_value = "0")]
        broadcast_every: usize,

        /// Buffer size of each subscriber endpoint.
        #[arg(long, default_value = "16")]
        endpoint_capacity: usize,
    },

    /// Print the effective broker configuration.
    Config,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn verbosity_maps_to_filter() {
        let cli = Cli::parse_from(["parley", "-v", "demo"]);
        assert_eq!(cli.log_filter(), "info,parley_core=debug");

        let cli = Cli::parse_from(["parley", "--quiet", "demo"]);
        assert_eq!(cli.log_filter(), "error");
    }

    #[test]
    fn flood_defaults() {
        let cli = Cli::parse_from(["parley", "flood", "--producers", "2"]);
        match cli.command {
            Commands::Flood {
                producers,
                messages,
                broadcast_every,
                ..
            } => {
                assert_eq!(producers, 2);
                assert_eq!(messages, 1000);
                assert_eq!(broadcast_every, 0);
            }
            _ => panic!("expected flood"),
        }
    }
}

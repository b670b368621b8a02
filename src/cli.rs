// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, Subcommand, ValueEnum};

use crate::types::SequenceNumber;

/// Command-line arguments for `cadence`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "cadence",
    version,
    about = "Run recurring task pipelines with durable, resumable status.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    #[arg(long, value_name = "PATH", default_value = "Cadence.toml", global = true)]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `CADENCE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run the pipeline schedulers until Ctrl-C.
    Run {
        /// Only schedule this pipeline.
        #[arg(long, value_name = "NAME")]
        pipeline: Option<String>,

        /// Parse + validate, print pipelines and tasks, but don't schedule anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Drive a single pipeline instance in the foreground until it completes.
    Exec {
        #[arg(long, value_name = "NAME")]
        pipeline: String,

        #[arg(long, value_name = "N", allow_negative_numbers = true)]
        sequence: SequenceNumber,

        /// Do not persist ERROR markers; failed tasks count as done for this run.
        #[arg(long)]
        adhoc: bool,

        /// Re-run every task: clear the instance's task markers first and gate
        /// readiness on this run's in-memory completion map only.
        #[arg(long)]
        overwrite: bool,

        /// Task argument, repeatable: `--arg extract.region=eu`.
        #[arg(long = "arg", value_name = "TASK.KEY=VALUE")]
        args: Vec<String>,
    },

    /// Print the status of every task of a pipeline instance.
    Status {
        #[arg(long, value_name = "NAME")]
        pipeline: String,

        #[arg(long, value_name = "N", allow_negative_numbers = true)]
        sequence: SequenceNumber,
    },

    /// Remove every status marker of a task for one sequence number.
    Clear {
        #[arg(long, value_name = "NAME")]
        task: String,

        #[arg(long, value_name = "N", allow_negative_numbers = true)]
        sequence: SequenceNumber,
    },
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Pipechain - run supervised pipelines of external processes
#[derive(Parser, Debug)]
#[command(
    name = "pipechain",
    author,
    version,
    about = "Supervised process pipelines with failure classification",
    long_about = "Runs a chain of external processes joined by pipes, as described by a JSON \n\
                  specification. Stage failures are classified so that broken pipes caused \n\
                  by a failing downstream stage are reported as secondary, and a partially \n\
                  written output file is removed when the pipeline fails."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "PIPECHAIN_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose", env = "PIPECHAIN_QUIET")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "PIPECHAIN_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Default log level for the verbosity flags.
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a pipeline
    Run(RunArgs),

    /// Validate a specification and print the command line it would run
    Check(CheckArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to the pipeline specification (JSON)
    #[arg(short, long, env = "PIPECHAIN_SPEC")]
    pub spec: PathBuf,

    /// Write the last stage's output to this file instead
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Feed this file to the first stage instead
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Per-stage time limit in seconds (0 = no limit)
    #[arg(long, env = "PIPECHAIN_STAGE_TIMEOUT")]
    pub stage_timeout: Option<f64>,

    /// Overall time limit in seconds (0 = no limit)
    #[arg(long, env = "PIPECHAIN_OVERALL_TIMEOUT")]
    pub overall_timeout: Option<f64>,

    /// Print the result as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `check` command
#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Path to the pipeline specification (JSON)
    #[arg(short, long, env = "PIPECHAIN_SPEC")]
    pub spec: PathBuf,

    /// Print the normalized specification as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

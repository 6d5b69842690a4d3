// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::types::BackendKind;

/// Command-line arguments for `gridrun`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "gridrun",
    version,
    about = "Run a file-dependency task pipeline on a compute grid (Slurm, LSF, SGE).",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the pipeline file (TOML).
    #[arg(long, value_name = "PATH", default_value = "gridrun.toml")]
    pub config: PathBuf,

    /// Batch system to submit to; overrides `[config].backend`.
    #[arg(long, value_name = "KIND", value_parser = parse_backend)]
    pub backend: Option<BackendKind>,

    /// Number of tasks in flight at once; overrides `[config].threads`.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub threads: Option<u32>,

    /// Partition / queue; overrides `[config].partition`.
    #[arg(long, value_name = "NAME")]
    pub partition: Option<String>,

    /// Skip tasks whose name matches GLOB, and everything downstream of them.
    /// May be given more than once.
    #[arg(long, value_name = "GLOB")]
    pub exclude: Vec<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `GRIDRUN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse, validate and print the pipeline and predicted requests without
    /// submitting anything.
    #[arg(long)]
    pub dry_run: bool,
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

fn parse_backend(s: &str) -> Result<BackendKind, String> {
    s.parse()
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

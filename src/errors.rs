// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GridError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Duplicate task name: {0}")]
    DuplicateTask(String),

    #[error("Cycle detected in DAG: {0}")]
    DagCycle(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// A submission exited non-zero and the backend did not recognise the
    /// failure as recoverable.
    #[error("Command failed (exit code {code}): {command}\n{stdout}\n{stderr}")]
    JobFailed {
        command: String,
        code: i32,
        stdout: String,
        stderr: String,
    },

    /// Scheduler output did not contain an expected pattern.
    #[error("Unable to parse scheduler output: {0}")]
    ParseError(String),

    #[error("Task '{task}' still failing after {attempts} attempts: {last}")]
    AttemptsExhausted {
        task: String,
        attempts: u32,
        last: Box<GridError>,
    },

    /// A required system capability is missing; raised before any submission.
    #[error("Environment error: {0}")]
    Environment(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GridError {
    /// Build a [`GridError::JobFailed`] from a finished submission.
    pub fn job_failed(command: &str, code: i32, stdout: &str, stderr: &str) -> Self {
        GridError::JobFailed {
            command: command.to_string(),
            code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, GridError>;

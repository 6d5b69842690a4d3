// src/config/validate.rs

use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::dag::assemble;
use crate::errors::{GridError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::GridError;

    /// Validate with relative paths resolved against the working directory.
    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let cwd = std::env::current_dir()?;
        ConfigFile::from_raw(raw, cwd)
    }
}

impl ConfigFile {
    /// Validate `raw`, resolving relative paths against `base_dir`.
    pub fn from_raw(raw: RawConfigFile, base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        validate_raw_config(&raw)?;
        let cfg = ConfigFile::new_unchecked(raw, base_dir);
        validate_dag(&cfg, &cfg.base_dir)?;
        Ok(cfg)
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_global_config(cfg)?;
    validate_defaults(cfg)?;
    validate_task_names(cfg)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(GridError::ConfigError(
            "config must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    // backend is strongly typed and validated during deserialization.

    if cfg.config.threads == 0 {
        return Err(GridError::ConfigError(
            "[config].threads must be >= 1 (got 0)".to_string(),
        ));
    }

    if cfg.config.max_attempts == 0 {
        return Err(GridError::ConfigError(
            "[config].max_attempts must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(())
}

fn validate_defaults(cfg: &RawConfigFile) -> Result<()> {
    let d = &cfg.defaults;
    for (key, value) in [("mem", d.mem), ("time", d.time), ("threads", d.threads)] {
        if value < 1 {
            return Err(GridError::ConfigError(format!(
                "[defaults].{key} must be >= 1 (got {value})"
            )));
        }
    }
    Ok(())
}

fn validate_task_names(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        if name.trim().is_empty() {
            return Err(GridError::ConfigError(
                "task names must not be empty".to_string(),
            ));
        }
        if let Some(cmd) = &task.cmd
            && cmd.trim().is_empty()
        {
            return Err(GridError::ConfigError(format!(
                "task '{}' has an empty `cmd`; omit it for a task without an action",
                name
            )));
        }
    }
    Ok(())
}

/// Assemble the dependency graph once to reject cycles up front.
fn validate_dag(cfg: &ConfigFile, base_dir: &Path) -> Result<()> {
    let nodes = cfg
        .descriptors()
        .into_iter()
        .map(|d| d.normalize(base_dir).into_task_node(base_dir))
        .collect();
    assemble(nodes)?;
    Ok(())
}

// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::dag::path_utils::absolute;
use crate::errors::{GridError, Result};

/// Read and deserialize a configuration file without validating it.
///
/// Use [`load_and_validate`] to get a [`ConfigFile`] the rest of the crate
/// can rely on.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| {
        GridError::ConfigError(format!("cannot read config {}: {e}", path.display()))
    })?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file and validate it.
///
/// Relative artifact paths, `tmpdir` and `performance_file` resolve against
/// the directory containing the file, so a pipeline behaves the same
/// wherever it is launched from.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let raw_config = load_from_path(path)?;
    ConfigFile::from_raw(raw_config, config_base_dir(path))
}

fn config_base_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => absolute(parent),
        _ => absolute(Path::new(".")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_resolve_next_to_the_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        fs::write(
            &path,
            "[config]\ntmpdir = \"scratch\"\nperformance_file = \"perf.json\"\n\
             [task.a]\ncmd = \"true\"\n",
        )
        .unwrap();

        let cfg = load_and_validate(&path).unwrap();
        assert_eq!(cfg.base_dir, dir.path());
        assert_eq!(cfg.tmpdir(), dir.path().join("scratch"));
        assert_eq!(cfg.performance_path(), Some(dir.path().join("perf.json")));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = load_from_path("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, GridError::ConfigError(m) if m.contains("here.toml")));
    }
}

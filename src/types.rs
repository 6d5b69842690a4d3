// src/types.rs

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Which batch system jobs are dispatched to.
///
/// - `Dummy`: run each task locally under `/usr/bin/time`; used for testing the
///   engine without a cluster.
/// - `Slurm`, `Lsf`, `Sge`: submit through `srun`, `bsub` and `qsub`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Dummy,
    Slurm,
    Lsf,
    Sge,
}

impl Default for BackendKind {
    fn default() -> Self {
        BackendKind::Dummy
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dummy" | "local" => Ok(BackendKind::Dummy),
            "slurm" => Ok(BackendKind::Slurm),
            "lsf" => Ok(BackendKind::Lsf),
            "sge" => Ok(BackendKind::Sge),
            other => Err(format!(
                "invalid backend: {other} (expected \"dummy\", \"slurm\", \"lsf\" or \"sge\")"
            )),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackendKind::Dummy => "dummy",
            BackendKind::Slurm => "slurm",
            BackendKind::Lsf => "lsf",
            BackendKind::Sge => "sge",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_backend_names_case_insensitively() {
        assert_eq!("SLURM".parse::<BackendKind>(), Ok(BackendKind::Slurm));
        assert_eq!(" lsf ".parse::<BackendKind>(), Ok(BackendKind::Lsf));
        assert_eq!("local".parse::<BackendKind>(), Ok(BackendKind::Dummy));
        assert!("pbs".parse::<BackendKind>().is_err());
    }
}

// src/grid/mod.rs

//! Job submission to batch systems.
//!
//! - [`runner`] holds the submit/retry loop and usage collection shared by
//!   every backend.
//! - [`backend`] defines the `GridBackend` trait a batch system implements.
//! - [`dummy`], [`slurm`], [`lsf`] and [`sge`] are the concrete backends.
//! - [`escalation`] computes bigger requests after resource failures.
//! - [`opts`] and [`shell`] build and run command lines.

pub mod backend;
pub mod dummy;
pub mod escalation;
pub mod lsf;
pub mod opts;
pub mod runner;
pub mod sge;
pub mod shell;
pub mod slurm;

pub use backend::{BoxFuture, FailureAction, GridBackend, JobUsage, Submission, SubmitRequest};
pub use dummy::DummyBackend;
pub use lsf::LsfBackend;
pub use runner::{FinishSummary, GridRunner, GridSettings, STATS_BATCH};
pub use sge::SgeBackend;
pub use slurm::SlurmBackend;

// tests/cli_run.rs

use clap::Parser;

use gridrun::cli::CliArgs;
use gridrun::config::load_and_validate;
use gridrun::types::BackendKind;
use gridrun::{apply_overrides, run};
use gridrun_test_utils::{init_tracing, with_timeout, write_pipeline};

const PIPELINE: &str = r#"
[config]
backend = "slurm"
threads = 2

[task.make]
cmd = "echo hi > a.txt"
targets = ["a.txt"]

[task.use]
cmd = "cat a.txt > b.txt"
deps = ["a.txt"]
targets = ["b.txt"]
"#;

#[test]
fn cli_values_override_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_pipeline(dir.path(), PIPELINE);

    let args = CliArgs::parse_from([
        "gridrun",
        "--config",
        path.to_str().unwrap(),
        "--backend",
        "lsf",
        "--threads",
        "6",
        "--partition",
        "long",
    ]);
    let mut cfg = load_and_validate(&path).unwrap();
    apply_overrides(&mut cfg, &args);

    assert_eq!(cfg.config.backend, BackendKind::Lsf);
    assert_eq!(cfg.config.threads, 6);
    assert_eq!(cfg.config.partition, "long");
}

#[tokio::test]
async fn dry_run_submits_nothing() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = write_pipeline(dir.path(), PIPELINE);

    // Slurm is configured but never reached in a dry run.
    let args = CliArgs::parse_from(["gridrun", "--config", path.to_str().unwrap(), "--dry-run"]);
    let summary = run(args).await.unwrap();
    assert!(summary.completed.is_empty());
    assert!(summary.is_success());
}

#[tokio::test]
async fn missing_config_is_an_error() {
    let args = CliArgs::parse_from(["gridrun", "--config", "/nope/gridrun.toml"]);
    let err = run(args).await.unwrap_err();
    assert!(format!("{err:#}").contains("/nope/gridrun.toml"));
}

#[tokio::test]
#[ignore = "needs GNU time at /usr/bin/time"]
async fn dummy_backend_runs_a_pipeline_locally() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = write_pipeline(dir.path(), PIPELINE);

    let args = CliArgs::parse_from([
        "gridrun",
        "--config",
        path.to_str().unwrap(),
        "--backend",
        "dummy",
    ]);
    let summary = with_timeout(run(args)).await.unwrap();

    assert_eq!(summary.completed, vec!["make".to_string(), "use".to_string()]);
    let b = std::fs::read_to_string(dir.path().join("b.txt")).unwrap();
    assert_eq!(b.trim(), "hi");
}

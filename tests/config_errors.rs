// tests/config_errors.rs

use gridrun::config::load_and_validate;
use gridrun::errors::GridError;
use gridrun::types::BackendKind;
use gridrun_test_utils::write_pipeline as write_config;

#[test]
fn full_config_round_trips_through_the_loader() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        dir.path(),
        r#"
[config]
backend = "lsf"
partition = "short"
threads = 8
extra_grid_args = "-P lab"

[defaults]
mem = 2048
time = 30

[task.align]
cmd = "bwa mem ref.fa reads.fq > aln.sam"
file_dep = ["reads.fq"]
targets = ["aln.sam"]
mem = 16000
"#,
    );

    let cfg = load_and_validate(&path).unwrap();
    assert_eq!(cfg.config.backend, BackendKind::Lsf);
    assert_eq!(cfg.config.partition, "short");
    assert_eq!(cfg.config.threads, 8);
    assert_eq!(cfg.config.extra_grid_args, "-P lab");
    assert_eq!(cfg.default_request().memory_mb, 2048);
    assert_eq!(cfg.default_request().threads, 1);

    let descriptors = cfg.descriptors();
    assert_eq!(descriptors.len(), 1);
    assert_eq!(descriptors[0].file_dep, vec!["reads.fq".to_string()]);
    assert!(descriptors[0].fields.contains_key("mem"));
}

#[test]
fn cycle_is_reported_with_a_task_name() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        dir.path(),
        r#"
[task.a]
cmd = "cp b.txt a.txt"
deps = ["b.txt"]
targets = ["a.txt"]

[task.b]
cmd = "cp a.txt b.txt"
deps = ["a.txt"]
targets = ["b.txt"]
"#,
    );

    match load_and_validate(&path) {
        Err(GridError::DagCycle(msg)) => assert!(msg.contains("'a'") || msg.contains("'b'")),
        other => panic!("expected DagCycle, got {other:?}"),
    }
}

#[test]
fn empty_cmd_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), "[task.a]\ncmd = \"  \"\n");
    assert!(matches!(
        load_and_validate(&path),
        Err(GridError::ConfigError(m)) if m.contains("empty `cmd`")
    ));
}

#[test]
fn malformed_toml_is_a_toml_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), "[task.a\ncmd = 1\n");
    assert!(matches!(load_and_validate(&path), Err(GridError::TomlError(_))));
}

#[test]
fn task_without_cmd_is_allowed() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        dir.path(),
        "[task.all]\ndeps = [\"x.txt\"]\n[task.x]\ncmd = \"touch x.txt\"\ntargets = [\"x.txt\"]\n",
    );
    let cfg = load_and_validate(&path).unwrap();
    assert!(cfg.task["all"].cmd.is_none());
}

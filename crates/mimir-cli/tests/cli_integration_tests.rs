//! CLI integration tests for mimir
//!
//! Exercise the commands that need no model server or graph store.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Command with its configuration isolated in `config_dir`
#[allow(deprecated)]
fn mimir_cmd(config_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("mimir").unwrap();
    cmd.env("MIMIR_CONFIG_DIR", config_dir.path());
    cmd.env_remove("MIMIR_API_KEY");
    cmd
}

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();
    mimir_cmd(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ask"))
        .stdout(predicate::str::contains("ingest"))
        .stdout(predicate::str::contains("doctor"));
}

#[test]
fn test_config_path_uses_override() {
    let dir = TempDir::new().unwrap();
    mimir_cmd(&dir)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"))
        .stdout(predicate::str::contains(
            dir.path().to_string_lossy().to_string(),
        ));
}

#[test]
fn test_config_list_shows_defaults() {
    let dir = TempDir::new().unwrap();
    mimir_cmd(&dir)
        .args(["config", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("retrieval.top_k = 3"))
        .stdout(predicate::str::contains("retrieval.row_cap = 25"));
}

#[test]
fn test_config_set_then_get() {
    let dir = TempDir::new().unwrap();
    mimir_cmd(&dir)
        .args(["config", "set", "retrieval.top_k", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Set retrieval.top_k = 5"));

    assert!(dir.path().join("config.toml").exists());

    mimir_cmd(&dir)
        .args(["config", "get", "retrieval.top_k"])
        .assert()
        .success()
        .stdout(predicate::str::diff("5\n"));

    mimir_cmd(&dir).args(["config", "reset"]).assert().success();
    assert!(!dir.path().join("config.toml").exists());
}

#[test]
fn test_config_rejects_invalid_values() {
    let dir = TempDir::new().unwrap();
    mimir_cmd(&dir)
        .args(["config", "set", "retrieval.row_cap", "0"])
        .assert()
        .failure();

    mimir_cmd(&dir)
        .args(["config", "get", "no.such.key"])
        .assert()
        .failure();
}

#[test]
fn test_clear_requires_force() {
    let dir = TempDir::new().unwrap();
    mimir_cmd(&dir)
        .arg("clear")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
}

#[test]
fn test_ingest_rejects_unsupported_format() {
    let dir = TempDir::new().unwrap();
    let pdf = dir.path().join("paper.pdf");
    std::fs::write(&pdf, "%PDF-1.4").unwrap();

    mimir_cmd(&dir)
        .arg("ingest")
        .arg(&pdf)
        .assert()
        .failure()
        .stderr(predicate::str::contains(".pdf"));
}

#[test]
fn test_doctor_fails_on_invalid_config() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("config.toml"), "[retrieval]\nrow_cap = 0\n").unwrap();

    mimir_cmd(&dir)
        .arg("doctor")
        .assert()
        .failure()
        .stdout(predicate::str::contains("[!!] Configuration"))
        .stderr(predicate::str::contains("Configuration is invalid"));
}

#[test]
fn test_doctor_fails_when_services_unreachable() {
    let dir = TempDir::new().unwrap();
    let vectors = dir.path().join("vectors.db");
    for (key, value) in [
        ("llm.base_url", "http://127.0.0.1:9/v1"),
        ("llm.timeout_secs", "2"),
        ("graph.endpoint", "http://127.0.0.1:9"),
        ("graph.timeout_secs", "2"),
        ("vector.path", vectors.to_str().unwrap()),
    ] {
        mimir_cmd(&dir)
            .args(["config", "set", key, value])
            .assert()
            .success();
    }

    mimir_cmd(&dir)
        .arg("doctor")
        .assert()
        .failure()
        .stdout(predicate::str::contains("[OK] Configuration: Valid"))
        .stdout(predicate::str::contains("[!!] Model server"))
        .stdout(predicate::str::contains("Some checks failed"))
        .stderr(predicate::str::contains("Some health checks failed"));
}

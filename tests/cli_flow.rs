// SPDX-License-Identifier: MIT OR Apache-2.0

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(path, content).expect("write file");
}

/// Vault with one note plus a config using the offline hashing embedder.
fn setup() -> (TempDir, std::path::PathBuf) {
    let dir = TempDir::new().expect("tempdir");
    write_file(
        &dir.path().join("vault/notes/a.md"),
        "Drones carry payloads. [[Battery]] life matters.",
    );
    let config = dir.path().join("config.toml");
    write_file(
        &config,
        &format!(
            "vault_path = {:?}\nindex_dir = {:?}\n\n[embeddings]\nprovider = \"hashing\"\n",
            dir.path().join("vault").display().to_string(),
            dir.path().join("data").display().to_string(),
        ),
    );
    (dir, config)
}

fn vault_rag(config: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("vault-rag"));
    cmd.env("NO_COLOR", "1").arg("--config").arg(config);
    cmd
}

#[test]
fn index_then_query() {
    let (_dir, config) = setup();

    vault_rag(&config)
        .arg("index")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 notes found: 1 indexed"));

    vault_rag(&config)
        .args(["query", "battery life"])
        .assert()
        .success()
        .stdout(predicate::str::contains("notes/a.md_chunk_0"))
        .stdout(predicate::str::contains("Drones carry payloads. Battery life matters."));
}

#[test]
fn second_index_run_skips_unchanged() {
    let (_dir, config) = setup();
    vault_rag(&config).arg("index").assert().success();

    let output = vault_rag(&config)
        .args(["--format", "json", "index"])
        .output()
        .expect("run index");
    assert!(output.status.success());
    let summary: Value = serde_json::from_slice(&output.stdout).expect("json summary");
    assert_eq!(summary["unchanged"], 1);
    assert_eq!(summary["indexed"], 0);
}

#[test]
fn query_json_lists_hits() {
    let (_dir, config) = setup();
    vault_rag(&config).arg("index").assert().success();

    let output = vault_rag(&config)
        .args(["--format", "json", "query", "battery life", "-k", "2"])
        .output()
        .expect("run query");
    assert!(output.status.success());
    let result: Value = serde_json::from_slice(&output.stdout).expect("json result");
    let hits = result["hits"].as_array().expect("hits array");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["id"], "notes/a.md_chunk_0");
    assert_eq!(hits[0]["metadata"]["source"], "notes/a.md");
}

#[test]
fn context_on_empty_index_reports_no_match() {
    let (_dir, config) = setup();
    vault_rag(&config)
        .args(["context", "battery"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No matching content found in your notes."));
}

#[test]
fn context_includes_prompt_and_passage() {
    let (_dir, config) = setup();
    vault_rag(&config).arg("index").assert().success();
    vault_rag(&config)
        .args(["context", "battery life"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Context from your notes:"))
        .stdout(predicate::str::contains("Battery life matters."));
}

#[test]
fn blank_query_fails() {
    let (_dir, config) = setup();
    vault_rag(&config)
        .args(["query", "   "])
        .assert()
        .failure()
        .stderr(predicate::str::contains("query must not be empty"));
}

#[test]
fn status_reports_counts() {
    let (_dir, config) = setup();
    vault_rag(&config).arg("index").assert().success();
    vault_rag(&config)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("documents:  1"))
        .stdout(predicate::str::contains("model:      hashing-384"));
}

#[test]
fn missing_vault_is_reported() {
    let dir = TempDir::new().expect("tempdir");
    vault_rag(&dir.path().join("none.toml"))
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration error"));
}

#[test]
fn completions_do_not_need_config() {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("vault-rag"));
    cmd.args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("vault-rag"));
}

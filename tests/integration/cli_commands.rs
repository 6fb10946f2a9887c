#![allow(missing_docs)]

use std::fs;
use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use tempfile::TempDir;

fn run_json(db: &Path, args: &[&str]) -> Value {
    let output = cargo_bin_cmd!("misql")
        .args(["--format", "json"])
        .arg(db)
        .args(args)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    serde_json::from_slice(&output).expect("json output")
}

#[test]
fn set_get_del_round_trip() {
    let dir = TempDir::new().expect("tempdir");
    let db = dir.path().join("cli.db");

    cargo_bin_cmd!("misql")
        .arg(&db)
        .args(["set", "beatles", "abbey road"])
        .assert()
        .success();

    let got = run_json(&db, &["get", "beatles"]);
    assert_eq!(got["found"], true);
    assert_eq!(got["value"], "abbey road");

    let output = cargo_bin_cmd!("misql")
        .arg(&db)
        .args(["get", "beatles"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert_eq!(String::from_utf8_lossy(&output).trim(), "abbey road");

    let deleted = run_json(&db, &["del", "beatles"]);
    assert_eq!(deleted["deleted"], true);
    let missing = run_json(&db, &["get", "beatles"]);
    assert_eq!(missing["found"], false);
    assert!(missing["value"].is_null());
}

#[test]
fn stats_and_verify_report_json() {
    let dir = TempDir::new().expect("tempdir");
    let db = dir.path().join("admin.db");
    for i in 0..40 {
        cargo_bin_cmd!("misql")
            .arg(&db)
            .args(["set", &format!("key{i:02}"), "value"])
            .assert()
            .success();
    }

    let stats = run_json(&db, &["stats"]);
    assert_eq!(stats["tree"]["keys"], 40);
    assert_eq!(stats["pager"]["page_size"], 4096);

    let verify = run_json(&db, &["verify"]);
    assert_eq!(verify["success"], true);
    assert_eq!(verify["counts"]["keys"], 40);
}

#[test]
fn options_file_limits_key_size() {
    let dir = TempDir::new().expect("tempdir");
    let db = dir.path().join("limits.db");
    let config = dir.path().join("misql.toml");
    fs::write(&config, "max_key_size = 4\n").expect("write config");

    cargo_bin_cmd!("misql")
        .arg("--config")
        .arg(&config)
        .arg(&db)
        .args(["set", "toolong", "v"])
        .assert()
        .failure()
        .code(1);

    cargo_bin_cmd!("misql")
        .arg("--config")
        .arg(&config)
        .arg(&db)
        .args(["set", "ok", "v"])
        .assert()
        .success();
}

#[test]
fn corrupt_file_fails_to_open() {
    let dir = TempDir::new().expect("tempdir");
    let db = dir.path().join("garbage.db");
    fs::write(&db, vec![0xAB; 4096 * 2]).expect("write garbage");

    let output = cargo_bin_cmd!("misql")
        .arg(&db)
        .arg("stats")
        .assert()
        .failure()
        .code(1)
        .get_output()
        .stderr
        .clone();
    assert!(String::from_utf8_lossy(&output).contains("error:"));
}

//! End-to-end tests for the `rc` binary.
//!
//! Drives the full pipeline: replay → logs → export → status → push,
//! against an on-disk SQLite store in a temporary home directory.

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn rc_binary() -> String {
    env!("CARGO_BIN_EXE_rc").to_string()
}

const SCRIPT: &str = r#"{"at":"2024-05-01T03:00:00Z","action":"start","owner":"owner","guild":"guild","channel":"voice","members":["A"]}
{"at":"2024-05-01T03:50:00Z","action":"join","user":"B","guild":"guild","channel":"voice"}
{"at":"2024-05-01T04:00:00Z","action":"stop","guild":"guild","channel":"voice","members":["A","B"]}
"#;

/// Runs `rc` isolated in `home`.
fn rc(home: &Path, args: &[&str]) -> Output {
    Command::new(rc_binary())
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env("XDG_DATA_HOME", home.join(".local/share"))
        .env_remove("RC_DATABASE_PATH")
        .env_remove("RC_LOG_STORE")
        .env_remove("RC_PUSHLOG_ENDPOINT")
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .expect("failed to run rc")
}

fn stdout(output: &Output) -> String {
    assert!(
        output.status.success(),
        "rc should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout.clone()).unwrap()
}

fn replay_script(home: &Path) {
    let script = home.join("session.jsonl");
    std::fs::write(&script, SCRIPT).unwrap();
    let output = stdout(&rc(home, &["replay", script.to_str().unwrap()]));
    assert!(output.contains("stored log"));
}

fn only_log_id(home: &Path) -> String {
    let listed = stdout(&rc(home, &["logs", "list", "--json"]));
    let logs: serde_json::Value = serde_json::from_str(&listed).unwrap();
    let logs = logs.as_array().unwrap();
    assert_eq!(logs.len(), 1);
    logs[0]["id"].as_str().unwrap().to_string()
}

#[test]
fn replayed_session_is_persisted_and_exportable() {
    let temp = TempDir::new().unwrap();
    replay_script(temp.path());

    assert!(temp.path().join(".local/share/rollcall/rollcall.db").exists());
    let id = only_log_id(temp.path());

    let shown = stdout(&rc(temp.path(), &["logs", "show", &id]));
    assert!(shown.contains("A,1,Hadir,60"));
    assert!(shown.contains("B,0.16666666666666666,Absen,10"));

    let out_dir = temp.path().join("reports");
    stdout(&rc(
        temp.path(),
        &["export", &id, "--out", out_dir.to_str().unwrap()],
    ));
    for suffix in ["sesinfo", "attdet", "procdet"] {
        assert!(out_dir.join(format!("{id}-{suffix}.csv")).exists(), "{suffix}");
    }
    let sesinfo = std::fs::read_to_string(out_dir.join(format!("{id}-sesinfo.csv"))).unwrap();
    assert_eq!(sesinfo, "date,owner,start,duration\n2024-05-01,owner,10:00,60\n");
}

#[test]
fn status_tracks_unpushed_logs() {
    let temp = TempDir::new().unwrap();
    let empty = stdout(&rc(temp.path(), &["status"]));
    assert!(empty.contains("Logs stored: 0 (0 pushed)"));
    assert!(empty.contains("Latest unpushed: none"));

    replay_script(temp.path());
    let id = only_log_id(temp.path());
    let status = stdout(&rc(temp.path(), &["status"]));
    assert!(status.contains("Logs stored: 1 (0 pushed)"));
    assert!(status.contains(&format!("Latest unpushed: {id}")));
}

#[test]
fn delete_removes_log() {
    let temp = TempDir::new().unwrap();
    replay_script(temp.path());
    let id = only_log_id(temp.path());

    let deleted = stdout(&rc(temp.path(), &["logs", "delete", &id]));
    assert_eq!(deleted, format!("Deleted session log {id}\n"));

    let listed = stdout(&rc(temp.path(), &["logs", "list"]));
    assert_eq!(listed, "No session logs stored.\n");
}

#[test]
fn push_without_endpoint_fails() {
    let temp = TempDir::new().unwrap();
    replay_script(temp.path());

    let output = rc(
        temp.path(),
        &["push", "--topic", "t", "--recorder", "r", "--mentor", "m"],
    );
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("missing pushlog endpoint"), "{stderr}");
}

#[test]
fn push_requires_a_mentor() {
    let temp = TempDir::new().unwrap();
    let output = rc(
        temp.path(),
        &[
            "push",
            "--topic",
            "t",
            "--recorder",
            "r",
            "--endpoint",
            "http://127.0.0.1:9/pushlog",
        ],
    );
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--mentor"), "{stderr}");
}

#[test]
fn push_to_unreachable_endpoint_keeps_log_unpushed() {
    let temp = TempDir::new().unwrap();
    replay_script(temp.path());
    let id = only_log_id(temp.path());

    // Port 9 (discard) on localhost is closed in test environments.
    let output = rc(
        temp.path(),
        &[
            "push",
            "--topic",
            "t",
            "--recorder",
            "r",
            "--mentor",
            "m",
            "--endpoint",
            "http://127.0.0.1:9/pushlog",
        ],
    );
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("push unsuccessful"), "{stderr}");

    let status = stdout(&rc(temp.path(), &["status"]));
    assert!(status.contains(&format!("Latest unpushed: {id}")));
}

#[test]
fn memory_store_via_environment_keeps_nothing() {
    let temp = TempDir::new().unwrap();
    let script = temp.path().join("session.jsonl");
    std::fs::write(&script, SCRIPT).unwrap();

    let output = Command::new(rc_binary())
        .env("HOME", temp.path())
        .env("XDG_CONFIG_HOME", temp.path().join(".config"))
        .env("XDG_DATA_HOME", temp.path().join(".local/share"))
        .env("RC_LOG_STORE", "memory")
        .args(["replay", script.to_str().unwrap()])
        .output()
        .unwrap();
    let replayed = stdout(&output);
    assert!(replayed.contains("Replay finished: 1 stored, 0 failed, 0 still ongoing"));
    assert!(!temp.path().join(".local/share/rollcall/rollcall.db").exists());
}

#[test]
fn no_subcommand_prints_help() {
    let temp = TempDir::new().unwrap();
    let help = stdout(&rc(temp.path(), &[]));
    assert!(help.contains("Usage: rc"));
}

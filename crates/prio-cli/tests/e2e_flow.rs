//! End-to-end tests driving the `prio` binary.
//!
//! Tests the full pipeline: import → lists → duel → standings → status.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use tempfile::TempDir;

fn prio_binary() -> String {
    env!("CARGO_BIN_EXE_prio").to_string()
}

/// Runs `prio` isolated inside `temp`, feeding `stdin`.
fn prio(temp: &Path, args: &[&str], stdin: &str) -> Output {
    let mut child = Command::new(prio_binary())
        .env("HOME", temp)
        .env("XDG_CONFIG_HOME", temp.join("config"))
        .env("XDG_DATA_HOME", temp.join("data"))
        .env("PRIO_DATABASE_PATH", temp.join("prio.db"))
        .env("PRIO_DAILY_LIMIT", "2")
        .env("PRIO_SEED", "11")
        .env_remove("RUST_LOG")
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn prio");
    // Commands that never read stdin may exit before the write lands.
    let _ = child
        .stdin
        .take()
        .expect("stdin is piped")
        .write_all(stdin.as_bytes());
    child.wait_with_output().expect("failed to wait for prio")
}

fn stdout_of(output: &Output) -> String {
    assert!(
        output.status.success(),
        "prio should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout.clone()).expect("stdout is UTF-8")
}

const ITEMS: &str = r#"{"list": "work", "title": "Write report"}
{"list": "work", "title": "Review budget"}
{"list": "work", "title": "Answer email"}
{"list": "home", "title": "Fix sink"}
"#;

#[test]
fn test_import_then_duel_updates_standings() {
    let temp = TempDir::new().unwrap();

    let imported = stdout_of(&prio(temp.path(), &["import"], ITEMS));
    assert_eq!(
        imported.trim(),
        "Imported 4 items (0 already present, 2 new lists)"
    );

    let disabled = stdout_of(&prio(temp.path(), &["lists", "disable", "home"], ""));
    assert_eq!(disabled.trim(), "Duels disabled for home");

    let duel = stdout_of(&prio(temp.path(), &["duel", "--mode", "ranking"], "1 2 3\n"));
    assert!(duel.contains("Round (ranking mode):"), "{duel}");
    assert!(duel.contains("Duels left today: 1"), "{duel}");
    assert!(!duel.contains("Fix sink"), "disabled list must not be drawn: {duel}");

    let standings = stdout_of(&prio(temp.path(), &["standings", "--json"], ""));
    let standings: serde_json::Value = serde_json::from_str(&standings).unwrap();
    let entries = standings.as_array().unwrap();
    assert_eq!(entries.len(), 4);
    let ratings: Vec<f64> = entries
        .iter()
        .map(|entry| entry["rating"].as_f64().unwrap())
        .collect();
    assert!((ratings[0] - 1232.0).abs() < 1e-9);
    assert!((ratings[3] - 1168.0).abs() < 1e-9);
    assert!(
        entries
            .iter()
            .filter(|entry| entry["list_id"] == "work")
            .all(|entry| entry.get("last_dueled_at").is_some())
    );

    let status = stdout_of(&prio(temp.path(), &["status"], ""));
    assert!(status.contains("Duels left today: 1 of 2"), "{status}");
    assert!(status.contains("- work (3 items)"), "{status}");
}

#[test]
fn test_daily_limit_blocks_further_duels() {
    let temp = TempDir::new().unwrap();
    stdout_of(&prio(temp.path(), &["import"], ITEMS));

    for _ in 0..2 {
        let duel = stdout_of(&prio(temp.path(), &["duel"], "r\n"));
        assert!(duel.contains("Winner: "), "{duel}");
    }

    let blocked = stdout_of(&prio(temp.path(), &["duel"], "1\n"));
    assert_eq!(blocked.trim(), "No duels left today. Come back tomorrow.");
}

#[test]
fn test_skipped_round_changes_nothing() {
    let temp = TempDir::new().unwrap();
    stdout_of(&prio(temp.path(), &["import"], ITEMS));

    let duel = stdout_of(&prio(temp.path(), &["duel"], "s\n"));
    assert!(duel.trim_end().ends_with("Round skipped."), "{duel}");

    let status = stdout_of(&prio(temp.path(), &["status"], ""));
    assert!(status.contains("Duels left today: 2 of 2"), "{status}");
}

#[test]
fn test_unknown_list_fails() {
    let temp = TempDir::new().unwrap();
    let output = prio(temp.path(), &["lists", "enable", "garden"], "");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown list: garden"));
}

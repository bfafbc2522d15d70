use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn group_tabs(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("group-tabs").unwrap();
    cmd.env("HOME", dir.path())
        .env_remove("RUST_LOG")
        .env("GROUP_TABS_STORE", dir.path().join("store.json"));
    cmd
}

const SCRIPT: &str = r#"{
    "settings": { "clickWindowMs": 0 },
    "windows": [
        { "id": 1, "tabs": [ { "id": 1 }, { "id": 2 }, { "id": 3 } ] }
    ],
    "steps": [
        { "action": "create_group", "name": "Work", "tabs": [2, 3] },
        { "action": "activate", "tab": 4 },
        { "action": "move", "tab": 1, "index": 2 }
    ]
}"#;

#[test]
fn test_version() {
    let dir = TempDir::new().unwrap();
    group_tabs(&dir)
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("group-tabs v"));
}

#[test]
fn test_replay_json() {
    let dir = TempDir::new().unwrap();
    let script = dir.path().join("session.json");
    std::fs::write(&script, SCRIPT).unwrap();

    group_tabs(&dir)
        .args(["replay", "--ephemeral", "--json"])
        .arg(&script)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\": \"Work\""))
        // The focused tab dropped into the closed group joined it and opened it
        .stdout(predicate::str::contains("\"isOpen\": true"))
        .stdout(predicate::str::contains("\"innerTabs\": [\n        2,\n        1,\n        3"));
}

#[test]
fn test_replay_persists_groups() {
    let dir = TempDir::new().unwrap();
    let script = dir.path().join("session.json");
    std::fs::write(&script, SCRIPT).unwrap();

    group_tabs(&dir).arg("replay").arg(&script).assert().success();

    group_tabs(&dir)
        .arg("groups")
        .assert()
        .success()
        .stdout(predicate::str::contains("Work"))
        .stdout(predicate::str::contains("Total: 1 groups"));
}

#[test]
fn test_groups_empty_store() {
    let dir = TempDir::new().unwrap();
    group_tabs(&dir)
        .arg("groups")
        .assert()
        .success()
        .stdout(predicate::str::contains("No groups found."));
}

#[test]
fn test_settings_set_and_show() {
    let dir = TempDir::new().unwrap();
    group_tabs(&dir)
        .args(["settings", "set", "defaultGroupName", "Stack"])
        .assert()
        .success();

    group_tabs(&dir)
        .args(["settings", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"defaultGroupName\": \"Stack\""));
}

#[test]
fn test_unknown_setting_fails() {
    let dir = TempDir::new().unwrap();
    group_tabs(&dir)
        .args(["settings", "set", "noSuchKey", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_replay_missing_script_fails() {
    let dir = TempDir::new().unwrap();
    group_tabs(&dir)
        .args(["replay", "--ephemeral"])
        .arg(dir.path().join("missing.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("reading script"));
}

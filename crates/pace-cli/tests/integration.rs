#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn pace(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("pace").unwrap();
    cmd.current_dir(dir.path())
        .env("PACE_ROOT", dir.path())
        .env_remove("RUST_LOG");
    cmd
}

const BACKLOG: &str = r#"{
  "features": [
    {
      "id": "UI-001",
      "category": "ui",
      "description": "Dark mode toggle",
      "priority": "low",
      "steps": ["Toggle the switch", "Colors invert"],
      "passes": false
    },
    {
      "id": "AUTH-001",
      "category": "auth",
      "description": "Login with email and password",
      "priority": "critical",
      "steps": ["Open /login", "Submit valid credentials"],
      "passes": false
    },
    {
      "id": "CORE-001",
      "category": "core",
      "description": "Project scaffolding",
      "priority": "high",
      "steps": ["cargo build succeeds"],
      "passes": true
    }
  ],
  "metadata": {
    "project_name": "demo",
    "total_features": 3,
    "passing": 1,
    "failing": 2,
    "last_updated": "2025-12-15T17:00:00.000Z"
  }
}
"#;

fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("feature_list.json"), BACKLOG).unwrap();
    dir
}

fn read_json(dir: &TempDir, name: &str) -> serde_json::Value {
    let raw = std::fs::read_to_string(dir.path().join(name)).unwrap();
    serde_json::from_str(&raw).unwrap()
}

// ---------------------------------------------------------------------------
// pace status / next
// ---------------------------------------------------------------------------

#[test]
fn status_shows_progress_and_next_features() {
    let dir = project();
    pace(&dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("1/3 passing (33.3%)"))
        .stdout(predicate::str::contains("AUTH-001"))
        .stdout(predicate::str::contains("UI-001"));
}

#[test]
fn status_json_includes_breakdown_when_verbose() {
    let dir = project();
    let out = pace(&dir)
        .args(["status", "--verbose", "--json"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(report["progress"]["passing"], 1);
    assert_eq!(report["next"][0]["id"], "AUTH-001");
    assert_eq!(report["by_category"].as_array().unwrap().len(), 3);
}

#[test]
fn status_without_feature_list_fails() {
    let dir = TempDir::new().unwrap();
    pace(&dir)
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("feature_list.json"));
}

#[test]
fn next_picks_highest_priority() {
    let dir = project();
    pace(&dir)
        .args(["next", "--id"])
        .assert()
        .success()
        .stdout("AUTH-001\n");
}

#[test]
fn next_reports_completion() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("feature_list.json"),
        r#"{"features": [], "metadata": {}}"#,
    )
    .unwrap();
    pace(&dir)
        .arg("next")
        .assert()
        .success()
        .stdout(predicate::str::contains("All features passing"));
}

// ---------------------------------------------------------------------------
// pace update
// ---------------------------------------------------------------------------

#[test]
fn update_flips_status_and_recomputes_metadata() {
    let dir = project();
    pace(&dir)
        .args(["update", "AUTH-001", "pass"])
        .assert()
        .success()
        .stdout(predicate::str::contains("AUTH-001: failing -> passing"));

    let doc = read_json(&dir, "feature_list.json");
    assert_eq!(doc["features"][1]["passes"], true);
    assert_eq!(doc["metadata"]["passing"], 2);
    assert_eq!(doc["metadata"]["failing"], 1);
    assert_eq!(doc["metadata"]["project_name"], "demo");
    assert!(dir.path().join("feature_list.json.bak").exists());
}

#[test]
fn update_to_same_status_writes_nothing() {
    let dir = project();
    pace(&dir)
        .args(["update", "CORE-001", "pass"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already passing"));
    assert!(!dir.path().join("feature_list.json.bak").exists());
    let raw = std::fs::read_to_string(dir.path().join("feature_list.json")).unwrap();
    assert_eq!(raw, BACKLOG);
}

#[test]
fn update_unknown_feature_fails() {
    let dir = project();
    pace(&dir)
        .args(["update", "NOPE-404", "pass"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("NOPE-404"));
}

// ---------------------------------------------------------------------------
// pace validate
// ---------------------------------------------------------------------------

#[test]
fn validate_accepts_good_backlog() {
    let dir = project();
    pace(&dir)
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("is valid: 3 feature(s)"));
}

#[test]
fn validate_rejects_bad_backlog() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("feature_list.json"),
        r#"{"features": [
            {"id": "A", "category": "x", "description": "a", "priority": "urgent", "passes": false, "steps": ["s"]},
            {"id": "A", "category": "x", "description": "b", "priority": "low", "passes": "no", "steps": ["s"]}
        ]}"#,
    )
    .unwrap();
    let out = pace(&dir).args(["validate", "--json"]).output().unwrap();
    assert_eq!(out.status.code(), Some(1));
    let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(report["valid"], false);
    let fields: Vec<&str> = report["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap())
        .collect();
    assert!(fields.contains(&"priority"));
    assert!(fields.contains(&"passes"));
    assert!(fields.contains(&"id"));
}

// ---------------------------------------------------------------------------
// pace archive / archives
// ---------------------------------------------------------------------------

#[test]
fn archive_moves_files_under_timestamped_dir() {
    let dir = project();
    std::fs::write(dir.path().join("progress.txt"), "### Session 1 - CORE-001\ndone\n").unwrap();

    pace(&dir)
        .args(["archive", "--reason", "new-plan"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2025-12-15_17-00-00"));

    let archive = dir.path().join(".pace/archives/2025-12-15_17-00-00");
    assert!(archive.join("feature_list.json").is_file());
    assert!(archive.join("progress.txt").is_file());
    assert!(!dir.path().join("feature_list.json").exists());

    let info: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(archive.join(".archive-info.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(info["archive"]["reason"], "new-plan");
    assert_eq!(info["originalMetadata"]["project_name"], "demo");
}

#[test]
fn second_archive_gets_suffix() {
    let dir = project();
    pace(&dir).arg("archive").assert().success();
    std::fs::write(dir.path().join("feature_list.json"), BACKLOG).unwrap();
    pace(&dir).arg("archive").assert().success();

    assert!(dir.path().join(".pace/archives/2025-12-15_17-00-00-1").is_dir());
}

#[test]
fn archive_with_nothing_present() {
    let dir = TempDir::new().unwrap();
    pace(&dir)
        .arg("archive")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to archive"));
    assert!(!dir.path().join(".pace/archives").exists());
}

#[test]
fn archives_list_validate_and_clean() {
    let dir = project();
    pace(&dir).arg("archive").assert().success();
    std::fs::write(dir.path().join("feature_list.json"), BACKLOG).unwrap();
    pace(&dir).arg("archive").assert().success();

    pace(&dir)
        .args(["archives", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2025-12-15_17-00-00-1"));

    pace(&dir)
        .args(["archives", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("valid"));

    // Preview only.
    pace(&dir)
        .args(["archives", "clean", "--keep", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Would remove 2 archive(s)"));
    assert_eq!(
        std::fs::read_dir(dir.path().join(".pace/archives")).unwrap().count(),
        2
    );

    let out = pace(&dir)
        .args(["archives", "clean", "--keep", "1", "--yes"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8(out.stdout).unwrap();
    let listed = stdout.find("Removing 1 archive(s):").expect("deletion set shown");
    let named = stdout.find("  2025-12-15_17-00-00\n").expect("archive named");
    let done = stdout.find("Removed 1 archive(s), kept 1").expect("result shown");
    assert!(listed < named && named < done, "{stdout}");
    assert_eq!(
        std::fs::read_dir(dir.path().join(".pace/archives")).unwrap().count(),
        1
    );
}

#[test]
fn archives_clean_json_with_yes_reports_plan() {
    let dir = project();
    pace(&dir).arg("archive").assert().success();
    let out = pace(&dir)
        .args(["archives", "clean", "--keep", "0", "--yes", "--json"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(report["plan"]["remove"][0]["name"], "2025-12-15_17-00-00");
    assert_eq!(report["removed"][0], "2025-12-15_17-00-00");
}

#[test]
fn archives_clean_rejects_bad_ages() {
    let dir = project();
    pace(&dir).arg("archive").assert().success();

    pace(&dir)
        .args(["archives", "clean", "--older-than-days", "-5"])
        .assert()
        .failure()
        .code(2);

    pace(&dir)
        .args(["archives", "clean", "--older-than-days", "4000000000", "--yes"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("out of range"));

    // Past the earliest representable date: nothing qualifies.
    pace(&dir)
        .args(["archives", "clean", "--older-than-days", "100000000", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to remove (1 archive(s) kept)"));
    assert!(dir.path().join(".pace/archives/2025-12-15_17-00-00").is_dir());
}

#[test]
fn archives_clean_requires_a_policy() {
    let dir = TempDir::new().unwrap();
    pace(&dir)
        .args(["archives", "clean"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--keep"));
}

// ---------------------------------------------------------------------------
// pace run
// ---------------------------------------------------------------------------

#[test]
fn run_dry_run_shows_prompt_without_agent() {
    let dir = project();
    pace(&dir)
        .args(["run", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Dry run: next feature is AUTH-001 [critical]"))
        .stdout(predicate::str::contains("Implement feature AUTH-001"));

    let raw = std::fs::read_to_string(dir.path().join("feature_list.json")).unwrap();
    assert_eq!(raw, BACKLOG);
}

#[test]
fn run_dry_run_json_summary() {
    let dir = project();
    let out = pace(&dir).args(["run", "--dry-run", "--json"]).output().unwrap();
    assert!(out.status.success());
    let summary: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(summary["stop_reason"], "dry_run");
    assert_eq!(summary["sessions_run"], 0);
    assert_eq!(summary["dry_run"]["feature_id"], "AUTH-001");
}

#[test]
fn run_on_complete_backlog_exits_zero() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("feature_list.json"),
        r#"{"features": [{"id": "A", "category": "c", "description": "d", "priority": "low", "steps": [], "passes": true}], "metadata": {}}"#,
    )
    .unwrap();
    let out = pace(&dir).args(["run", "--dry-run", "--json"]).output().unwrap();
    assert!(out.status.success());
    let summary: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(summary["stop_reason"], "complete");
}

#[test]
fn run_with_missing_agent_binary_fails() {
    let dir = project();
    std::fs::create_dir_all(dir.path().join(".pace")).unwrap();
    std::fs::write(
        dir.path().join(".pace/config.yaml"),
        "agent:\n  command: definitely-not-an-agent-binary\n",
    )
    .unwrap();
    pace(&dir)
        .arg("run")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("not found on PATH"));
}

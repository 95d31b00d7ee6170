//! Integration tests for CLI

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// `ws` running inside `dir` against `dir/ws.db`, isolated from WS_* variables.
fn ws(dir: &TempDir) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("ws"));
    cmd.current_dir(dir.path())
        .env_remove("WS_DB_PATH")
        .env_remove("WS_DEFAULT_USER")
        .env_remove("RUST_LOG")
        .arg("--db")
        .arg(dir.path().join("ws.db"));
    cmd
}

#[test]
fn test_cli_version() {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("ws"));
    cmd.arg("--version");
    cmd.assert().success().stdout(predicate::str::contains("ws"));
}

#[test]
fn test_cli_help() {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("ws"));
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("propose"))
        .stdout(predicate::str::contains("workflow"))
        .stdout(predicate::str::contains("dedup"))
        .stdout(predicate::str::contains("git-backup"));
}

#[test]
fn test_status_on_fresh_workspace() {
    let dir = TempDir::new().expect("temp dir");
    ws(&dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("WORKSPACE STATUS"))
        .stdout(predicate::str::contains("0 open"));
    assert!(dir.path().join("ws.db").exists());
}

#[test]
fn test_todo_add_list_and_update() {
    let dir = TempDir::new().expect("temp dir");
    ws(&dir)
        .args(["todo", "add", "Write release notes", "-p", "high", "--project", "docs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("✓ Todo #1 added"));

    ws(&dir)
        .args(["todo", "list", "--project", "docs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Write release notes"))
        .stdout(predicate::str::contains("[high] [todo]"));

    ws(&dir).args(["todo", "update", "1", "--status", "done"]).assert().success();
    ws(&dir)
        .args(["todo", "list", "--status", "done"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[high] [done]"));
}

#[test]
fn test_todo_without_subcommand_groups_by_priority() {
    let dir = TempDir::new().expect("temp dir");
    ws(&dir).args(["todo", "add", "Fix crash on startup", "-p", "urgent"]).assert().success();
    ws(&dir).args(["todo", "add", "Tidy imports", "-p", "low"]).assert().success();
    ws(&dir)
        .arg("todo")
        .assert()
        .success()
        .stdout(predicate::str::contains("URGENT (1):"))
        .stdout(predicate::str::contains("LOW (1):"));
}

#[test]
fn test_todo_rejects_unknown_priority() {
    let dir = TempDir::new().expect("temp dir");
    ws(&dir)
        .args(["todo", "add", "Something", "-p", "whenever"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown priority 'whenever'"));
}

#[test]
fn test_propose_approves_and_converts() {
    let dir = TempDir::new().expect("temp dir");
    ws(&dir)
        .args([
            "propose",
            "Cache search results",
            "--description",
            "Keep the last hundred search results in memory to avoid repeated scans",
            "--impact",
            "high",
            "--effort",
            "low",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("✓ Validation: APPROVED"))
        .stdout(predicate::str::contains("✓ Converted to todo #1"));

    ws(&dir)
        .args(["proposal", "show", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[converted]"))
        .stdout(predicate::str::contains("system"));
    ws(&dir).args(["todo", "list"]).assert().success().stdout(predicate::str::contains("Cache search results"));
}

#[test]
fn test_propose_low_value_needs_revision() {
    let dir = TempDir::new().expect("temp dir");
    ws(&dir)
        .args(["propose", "Rename a variable", "-d", "Short", "--impact", "low", "--effort", "high"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Needs revision"));
    ws(&dir).args(["todo", "list"]).assert().success().stdout(predicate::str::contains("No todos."));
}

#[test]
fn test_workflow_requires_approval_before_conversion() {
    let dir = TempDir::new().expect("temp dir");
    ws(&dir)
        .args(["idea", "add", "Add caching to the search index", "-d", "Repeated queries rescan the whole table"])
        .assert()
        .success();
    ws(&dir)
        .args(["workflow", "idea-to-proposal", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("✓ Created proposal #1"));

    ws(&dir)
        .args(["workflow", "proposal-to-todo", "1"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Blocked"));

    ws(&dir).args(["workflow", "review", "1", "approve", "--feedback", "ok"]).assert().success();
    ws(&dir)
        .args(["workflow", "proposal-to-todo", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("✓ Created todo #1"));

    ws(&dir)
        .args(["workflow", "idea-to-proposal", "1"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Already converted to proposal"));
}

#[test]
fn test_workflow_force_needs_reason() {
    let dir = TempDir::new().expect("temp dir");
    ws(&dir).args(["workflow", "proposal-to-todo", "1", "--force"]).assert().failure();
}

#[test]
fn test_workflow_check_missing_idea() {
    let dir = TempDir::new().expect("temp dir");
    ws(&dir)
        .args(["workflow", "check-idea", "42"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Blocked: Idea not found"));
}

#[test]
fn test_dedup_exit_codes() {
    let dir = TempDir::new().expect("temp dir");
    ws(&dir).args(["todo", "add", "Implement caching layer"]).assert().success();

    ws(&dir)
        .args(["dedup", "Implement caching layers"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("possible duplicates"))
        .stdout(predicate::str::contains("todos #1"));

    ws(&dir)
        .args(["dedup", "Translate the manual"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No duplicates found"));
}

#[test]
fn test_dedup_rejects_threshold_out_of_range() {
    let dir = TempDir::new().expect("temp dir");
    ws(&dir).args(["dedup", "anything", "--threshold", "1.5"]).assert().failure();
}

#[test]
fn test_config_reads_workspace_file() {
    let dir = TempDir::new().expect("temp dir");
    fs::write(dir.path().join("ws.toml"), "default_user = \"alice\"\ndedup_threshold = 0.6\n")
        .expect("write config");
    ws(&dir)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("default_user = \"alice\""))
        .stdout(predicate::str::contains("dedup_threshold = 0.6"));
    ws(&dir).args(["config", "--yaml"]).assert().success().stdout(predicate::str::contains("default_user: alice"));
}

#[test]
fn test_config_rejects_unknown_extension() {
    let dir = TempDir::new().expect("temp dir");
    let file = dir.path().join("settings.ini");
    fs::write(&file, "x=1").expect("write config");
    ws(&dir)
        .arg("--config")
        .arg(&file)
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported config extension"));
}

#[test]
fn test_health_reports_issues() {
    let dir = TempDir::new().expect("temp dir");
    ws(&dir)
        .arg("health")
        .assert()
        .success()
        .stdout(predicate::str::contains("HEALTH: WARNING"))
        .stdout(predicate::str::contains("Few tools active"));
    ws(&dir)
        .args(["health", "--history", "1", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\": \"warning\""));
}

#[test]
fn test_session_state_round_trip() {
    let dir = TempDir::new().expect("temp dir");
    ws(&dir).args(["session", "start", "--title", "Planning"]).assert().success();
    ws(&dir).args(["session", "state", "set", "focus", "{\"area\":\"search\"}"]).assert().success();
    ws(&dir)
        .args(["session", "state", "get", "focus"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"area\": \"search\""));
    ws(&dir).args(["session", "end"]).assert().success();
    ws(&dir)
        .args(["session", "state", "get", "focus"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No active session"));
}

#[test]
fn test_tool_exec_records_usage() {
    let dir = TempDir::new().expect("temp dir");
    ws(&dir).args(["tool", "register", "greet", "echo hello"]).assert().success();
    ws(&dir)
        .args(["tool", "exec", "greet", "world"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hello world"));
    ws(&dir)
        .args(["tool", "stats", "greet"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Runs:         1"))
        .stdout(predicate::str::contains("100.0%"));
}

#[test]
fn test_disabled_tool_refuses_to_run() {
    let dir = TempDir::new().expect("temp dir");
    ws(&dir).args(["tool", "register", "greet", "echo hello"]).assert().success();
    ws(&dir).args(["tool", "admin", "disable", "greet", "--reason", "broken"]).assert().success();
    ws(&dir).args(["tool", "exec", "greet"]).assert().failure().stderr(predicate::str::contains("disabled"));
    ws(&dir)
        .args(["tool", "admin", "log"])
        .assert()
        .success()
        .stdout(predicate::str::contains("broken"));
}

#[test]
fn test_wiki_create_and_get_by_title() {
    let dir = TempDir::new().expect("temp dir");
    ws(&dir)
        .args(["wiki", "create", "Release Process", "Tag, build, publish."])
        .assert()
        .success()
        .stdout(predicate::str::contains("release-process"));
    ws(&dir)
        .args(["wiki", "get", "Release"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Tag, build, publish."));
}

#[test]
fn test_wiki_populate_imports_docs() {
    let dir = TempDir::new().expect("temp dir");
    fs::write(dir.path().join("README.md"), "# Project\n\nStart here.\n").expect("write readme");
    ws(&dir)
        .args(["wiki", "populate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("✓ Added Quick Start"))
        .stdout(predicate::str::contains("⊘ Missing SETUP.md"));
}

#[test]
fn test_backup_create_and_list() {
    let dir = TempDir::new().expect("temp dir");
    ws(&dir).args(["todo", "add", "Keep me"]).assert().success();
    ws(&dir).args(["backup", "create"]).assert().success().stdout(predicate::str::contains("✓ Backup created"));
    ws(&dir).args(["backup", "list"]).assert().success().stdout(predicate::str::contains("workspace_"));
}

#[test]
fn test_git_backup_outside_repository_fails() {
    let dir = TempDir::new().expect("temp dir");
    ws(&dir)
        .args(["git-backup", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("git repository"));
}

#[test]
fn test_search_finds_across_sources() {
    let dir = TempDir::new().expect("temp dir");
    ws(&dir).args(["todo", "add", "Profile the indexer"]).assert().success();
    ws(&dir).args(["kb", "add", "perf", "Indexer notes", "Batch inserts help"]).assert().success();
    ws(&dir)
        .args(["search", "indexer"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Todos (1):"))
        .stdout(predicate::str::contains("Knowledge base (1):"));
    ws(&dir).args(["search", "zebra"]).assert().success().stdout(predicate::str::contains("No results found."));
}

#[test]
fn test_missing_proposal_is_an_error() {
    let dir = TempDir::new().expect("temp dir");
    ws(&dir)
        .args(["proposal", "show", "99"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Proposal #99 not found"));
}

#[test]
fn test_report_schedule_is_idempotent() {
    let dir = TempDir::new().expect("temp dir");
    ws(&dir)
        .args(["report", "schedule"])
        .assert()
        .success()
        .stdout(predicate::str::contains("✓ Scheduled daily_review"));
    ws(&dir)
        .args(["report", "schedule"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already scheduled"));
}

#[test]
fn test_converted_proposal_cannot_be_reviewed_again() {
    let dir = TempDir::new().expect("temp dir");
    ws(&dir)
        .args([
            "propose",
            "Cache search results",
            "--description",
            "Keep the last hundred search results in memory to avoid repeated scans",
            "--impact",
            "high",
            "--effort",
            "low",
        ])
        .assert()
        .success();
    ws(&dir)
        .args(["proposal", "review", "1", "converted"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown review decision 'converted'"));
    ws(&dir)
        .args(["proposal", "review", "1", "approved", "--score", "90"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("from 'converted' to 'approved'"));
    ws(&dir)
        .args(["proposal", "convert", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already converted"));
}

#[test]
fn test_task_add_rejects_oversized_schedule() {
    let dir = TempDir::new().expect("temp dir");
    ws(&dir)
        .args(["task", "add", "huge", "true", "--schedule", "every_4294967295_hours"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid value for schedule"));
    ws(&dir).args(["task", "list"]).assert().success().stdout(predicate::str::contains("huge").not());
}

#[test]
fn test_evolution_snapshots_show_growth() {
    let dir = TempDir::new().expect("temp dir");
    ws(&dir)
        .args(["evolution", "snapshot", "baseline"])
        .assert()
        .success()
        .stdout(predicate::str::contains("todos_total"));
    ws(&dir).args(["todo", "add", "Write release notes"]).assert().success();
    ws(&dir).args(["evolution", "snapshot"]).assert().success();
    ws(&dir)
        .args(["evolution", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(baseline)"))
        .stdout(predicate::str::contains("Growth since"))
        .stdout(predicate::str::is_match(r"todos_total\s+\+1").expect("regex"));
}

#[test]
fn test_workflow_populate_on_empty_workspace() {
    let dir = TempDir::new().expect("temp dir");
    ws(&dir)
        .args(["workflow", "populate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 proposals created"))
        .stdout(predicate::str::contains("Workspace now holds:"));
}

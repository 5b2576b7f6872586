use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

fn notes_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_notes"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let config_dir = tmp.path().join("config");
    fs::create_dir_all(&config_dir).unwrap();
    (tmp, config_dir)
}

fn notes_command(config_dir: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::new(notes_binary());
    cmd.args(args)
        .env("CLI_UNITES_CONFIG_DIR", config_dir)
        .env("CLI_UNITES_DISABLE_GIT", "1")
        .env("CLI_UNITES_SKIP_ONBOARDING", "1")
        .env_remove("CLI_UNITES_DB_PATH")
        .env_remove("SUPABASE_URL")
        .env_remove("SUPABASE_KEY")
        .env_remove("RUST_LOG");
    cmd
}

fn finish(output: std::process::Output) -> (String, String, bool) {
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn run_notes(config_dir: &Path, args: &[&str]) -> (String, String, bool) {
    let output = notes_command(config_dir, args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run notes binary: {}", e));
    finish(output)
}

fn run_notes_with_stdin(config_dir: &Path, args: &[&str], input: &str) -> (String, String, bool) {
    let mut child = notes_command(config_dir, args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(input.as_bytes())
        .unwrap();
    finish(child.wait_with_output().unwrap())
}

/// Add a note and return its id from the "Saved note <id>" line.
fn add_note(config_dir: &Path, title: &str, body: &str, extra: &[&str]) -> String {
    let mut args = vec!["add", title, "--body", body];
    args.extend_from_slice(extra);
    let (stdout, stderr, success) = run_notes(config_dir, &args);
    assert!(success, "add failed: {}", stderr);
    saved_id(&stdout)
}

fn saved_id(stdout: &str) -> String {
    stdout
        .lines()
        .find_map(|l| l.strip_prefix("Saved note "))
        .and_then(|rest| rest.split_whitespace().next())
        .unwrap_or_else(|| panic!("no saved note id in: {}", stdout))
        .to_string()
}

fn write_config(config_dir: &Path, json: &str) {
    fs::write(config_dir.join("config.json"), json).unwrap();
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_dir) = setup_test_env();

    let (stdout, stderr, success) = run_notes(&config_dir, &["init"]);
    assert!(success, "init failed: {}", stderr);
    assert!(stdout.contains("Database initialized"));
    assert!(config_dir.join("notes.db").exists());

    // Idempotent
    let (_, _, success) = run_notes(&config_dir, &["init"]);
    assert!(success);
}

#[test]
fn test_add_and_list() {
    let (_tmp, config_dir) = setup_test_env();

    let (stdout, stderr, success) = run_notes(
        &config_dir,
        &["add", "Deploy fix", "--body", "Pinned the runner image", "-t", "ci"],
    );
    assert!(success, "add failed: {}", stderr);
    assert!(stdout.starts_with("Saved note"));

    let (stdout, _, success) = run_notes(&config_dir, &["list"]);
    assert!(success);
    assert!(stdout.contains("Deploy fix"));
    assert!(stdout.contains("[ci]"));
    assert!(stdout.contains("Pinned the runner image"));
}

#[test]
fn test_list_tag_filter() {
    let (_tmp, config_dir) = setup_test_env();
    add_note(&config_dir, "Tagged", "one", &["-t", "ops"]);
    add_note(&config_dir, "Untagged", "two", &[]);

    let (stdout, _, success) = run_notes(&config_dir, &["list", "-t", "ops"]);
    assert!(success);
    assert!(stdout.contains("Tagged"));
    assert!(!stdout.contains("Untagged"));

    let (stdout, _, _) = run_notes(&config_dir, &["list", "--tag", "op"]);
    assert!(stdout.contains("No notes found."));
}

#[test]
fn test_empty_body_requires_allow_empty() {
    let (_tmp, config_dir) = setup_test_env();

    let (_, stderr, success) = run_notes(&config_dir, &["add", "Nothing here"]);
    assert!(!success);
    assert!(stderr.contains("No note content provided"), "stderr: {}", stderr);

    let (stdout, stderr, success) =
        run_notes(&config_dir, &["add", "Nothing here", "--allow-empty"]);
    assert!(success, "add --allow-empty failed: {}", stderr);
    assert!(stdout.contains("Saved note"));
}

#[test]
fn test_body_from_stdin_and_show_by_prefix() {
    let (_tmp, config_dir) = setup_test_env();

    let (stdout, stderr, success) = run_notes_with_stdin(
        &config_dir,
        &["add", "Piped"],
        "line one from stdin\nline two\n",
    );
    assert!(success, "add failed: {}", stderr);
    let id = saved_id(&stdout);

    let (stdout, stderr, success) = run_notes(&config_dir, &["show", &id[..8]]);
    assert!(success, "show failed: {}", stderr);
    assert!(stdout.contains(&id));
    assert!(stdout.contains("line one from stdin\nline two"));

    let (_, stderr, success) = run_notes(&config_dir, &["show", "ffffffff-none"]);
    assert!(!success);
    assert!(stderr.contains("note not found"));
}

#[test]
fn test_auth_update_and_show() {
    let (_tmp, config_dir) = setup_test_env();

    let (stdout, stderr, success) = run_notes(
        &config_dir,
        &[
            "auth",
            "--token",
            "abcdefghijklmnopqrstuvwxyz",
            "--supabase-key",
            "topsecretkey",
            "--team-id",
            "team-123",
            "--show",
        ],
    );
    assert!(success, "auth failed: {}", stderr);
    assert!(stdout.contains("Updated auth_token, team_id, supabase_key."));
    assert!(stdout.contains("abcdefghijkl..."));
    assert!(!stdout.contains("abcdefghijklm"));
    assert!(stdout.contains("***"));
    assert!(!stdout.contains("topsecretkey"));
    assert!(stdout.contains("team-123"));

    let saved = fs::read_to_string(config_dir.join("config.json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&saved).unwrap();
    assert_eq!(json["auth_token"], "abcdefghijklmnopqrstuvwxyz");
    assert_eq!(json["current_team_id"], "team-123");
    assert_eq!(json["team_id"], "team-123");
    assert_eq!(json["config_version"], 2);

    let (stdout, _, success) = run_notes(&config_dir, &["logout"]);
    assert!(success);
    assert!(stdout.contains("Logged out"));
    let (stdout, _, _) = run_notes(&config_dir, &["auth"]);
    assert!(!stdout.contains("abcdefghijkl..."));
}

#[test]
fn test_team_set_and_recent() {
    let (_tmp, config_dir) = setup_test_env();

    let (stdout, _, success) =
        run_notes(&config_dir, &["team", "--set", "t1", "--name", "Alpha"]);
    assert!(success);
    assert!(stdout.contains("Current team set to t1 (Alpha)"));
    run_notes(&config_dir, &["team", "--set", "t2"]);
    run_notes(&config_dir, &["team", "--set", "t1"]);

    let (stdout, _, _) = run_notes(&config_dir, &["team"]);
    assert!(stdout.contains("Current team: t1"));

    let (stdout, _, _) = run_notes(&config_dir, &["team", "--recent"]);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("1. t1 (Alpha)"));
    assert!(lines[0].starts_with('*'));
    assert!(lines[1].contains("2. t2"));

    let (stdout, _, _) = run_notes(&config_dir, &["team", "--clear"]);
    assert!(stdout.contains("Cleared current team."));
    let (stdout, _, _) = run_notes(&config_dir, &["team"]);
    assert!(stdout.contains("No team configured"));
}

#[test]
fn test_activity_scoped_to_team() {
    let (_tmp, config_dir) = setup_test_env();

    run_notes(&config_dir, &["team", "--set", "t1"]);
    add_note(&config_dir, "Alpha work", "first team", &[]);
    run_notes(&config_dir, &["team", "--set", "t2"]);
    add_note(&config_dir, "Beta work", "second team", &[]);

    let (stdout, _, success) = run_notes(&config_dir, &["activity"]);
    assert!(success);
    assert!(stdout.contains("Recent activity for team t2"));
    assert!(stdout.contains("Beta work"));
    assert!(!stdout.contains("Alpha work"));

    let (stdout, _, _) = run_notes(&config_dir, &["activity", "--team", "t1"]);
    assert!(stdout.contains("Alpha work"));

    let (stdout, _, _) = run_notes(&config_dir, &["activity", "--team", "t9"]);
    assert!(stdout.contains("No notes found for team t9."));

    run_notes(&config_dir, &["team", "--clear"]);
    let (stdout, stderr, success) = run_notes(&config_dir, &["activity", "-n", "1"]);
    assert!(success);
    assert!(stdout.contains("Recent activity (all teams)"));
    assert!(stderr.contains("No team selected"));
}

#[test]
fn test_keyword_search() {
    let (_tmp, config_dir) = setup_test_env();
    add_note(&config_dir, "Deploy", "Rollback procedure for staging", &[]);
    add_note(&config_dir, "Lunch", "Pizza on Friday", &["-t", "social"]);

    let (stdout, _, success) = run_notes(&config_dir, &["search", "rollback"]);
    assert!(success);
    assert!(stdout.contains("Deploy"));
    assert!(!stdout.contains("Lunch"));

    let (stdout, _, _) = run_notes(&config_dir, &["search", "social"]);
    assert!(stdout.contains("Lunch"));

    let (stdout, _, _) = run_notes(&config_dir, &["search", "kubernetes"]);
    assert!(stdout.contains("No notes matched"));
}

#[test]
fn test_semantic_search_with_hash_embeddings() {
    let (_tmp, config_dir) = setup_test_env();
    let (stdout, _, _) = run_notes(
        &config_dir,
        &["add", "Database migration", "--body", "the migration failed on staging"],
    );
    assert!(stdout.contains("embedding: stored"));
    add_note(&config_dir, "Lunch", "pizza on friday", &[]);

    let (stdout, stderr, success) = run_notes(
        &config_dir,
        &["semantic-search", "database migration failed", "--threshold", "0.4"],
    );
    assert!(success, "semantic-search failed: {}", stderr);
    let first = stdout.lines().next().unwrap_or_default();
    assert!(first.contains("Database migration"), "stdout: {}", stdout);
    assert!(first.contains('%'));
    assert!(!stdout.contains("Lunch"));

    let (stdout, _, success) =
        run_notes(&config_dir, &["semantic-search", "database migration", "-l", "0"]);
    assert!(success);
    assert!(stdout.contains("No notes above"));
}

#[test]
fn test_embed_pending_backfills() {
    let (_tmp, config_dir) = setup_test_env();
    write_config(
        &config_dir,
        r#"{"config_version": 2, "embedding": {"embed_on_write": false}}"#,
    );
    let id = add_note(&config_dir, "Release checklist", "tag the release branch", &[]);

    let (stdout, _, _) = run_notes(&config_dir, &["semantic-search", "release checklist"]);
    assert!(stdout.contains("No notes above"));

    let (stdout, _, success) = run_notes(&config_dir, &["embed", "pending", "--dry-run"]);
    assert!(success);
    assert!(stdout.contains("notes needing embeddings: 1"));

    let (stdout, stderr, success) = run_notes(&config_dir, &["embed", "pending"]);
    assert!(success, "embed pending failed: {}", stderr);
    assert!(stdout.contains("embedded: 1"));

    let (stdout, _, _) = run_notes(&config_dir, &["embed", "pending"]);
    assert!(stdout.contains("all notes up to date"));

    let (stdout, _, _) = run_notes(&config_dir, &["semantic-search", "release checklist"]);
    assert!(stdout.contains("Release checklist"));

    // Editing the body drops the stored embedding
    let (stdout, _, _) = run_notes(&config_dir, &["show", &id]);
    assert!(stdout.contains("embedding:  yes"));
    let (stdout, stderr, success) =
        run_notes(&config_dir, &["edit", &id, "--body", "something else entirely"]);
    assert!(success, "edit failed: {}", stderr);
    assert!(stdout.contains("Updated note"));
    assert!(stdout.contains("embedding: cleared"));
    let (stdout, _, _) = run_notes(&config_dir, &["show", &id]);
    assert!(stdout.contains("embedding:  pending"));
    assert!(stdout.contains("something else entirely"));
}

#[test]
fn test_corrupt_config_does_not_fail() {
    let (_tmp, config_dir) = setup_test_env();
    write_config(&config_dir, "{ this is not json");

    let (stdout, stderr, success) = run_notes(&config_dir, &["list"]);
    assert!(success, "list failed: {}", stderr);
    assert!(stdout.contains("No notes found."));
    assert!(stderr.contains("corrupt"));
}

#[test]
fn test_onboarding_seeds_once() {
    let (_tmp, config_dir) = setup_test_env();

    let run = |args: &[&str]| {
        let output = notes_command(&config_dir, args)
            .env_remove("CLI_UNITES_SKIP_ONBOARDING")
            .output()
            .unwrap();
        finish(output)
    };

    let (stdout, stderr, success) = run(&["list"]);
    assert!(success, "list failed: {}", stderr);
    assert!(stdout.contains("Sample workspace ready"));
    assert!(stdout.contains("Welcome to cli-unites"));

    let (stdout, _, _) = run(&["list"]);
    assert!(!stdout.contains("Sample workspace ready"));
    assert_eq!(stdout.matches("Welcome to cli-unites").count(), 1);

    let saved = fs::read_to_string(config_dir.join("config.json")).unwrap();
    assert!(saved.contains("\"first_run_completed\": true"));
}

#[test]
fn test_completions() {
    let (_tmp, config_dir) = setup_test_env();
    let (stdout, _, success) = run_notes(&config_dir, &["completions", "bash"]);
    assert!(success);
    assert!(stdout.contains("notes"));
}

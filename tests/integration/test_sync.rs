//! Tests for the `sync` command

use crate::helpers::*;
use anyhow::Result;

/// Upstream edits the same line the fork rebranded and adds a new file
fn diverge_upstream(fork: &TestFork) -> Result<()> {
  let package = UPSTREAM_PACKAGE_JSON.replace(
    "\"name\": \"@openai/codex\",",
    "\"name\": \"@openai/codex\", \"type\": \"module\",",
  );
  fork.upstream_change("codex-cli/package.json", &package, "Mark package as ESM")?;
  fork.upstream_change("codex-rs/src/exec.rs", "pub fn exec() {}\n", "Add exec module")
}

#[test]
fn test_sync_apply_reapplies_customizations() -> Result<()> {
  let fork = TestFork::customized("")?;
  diverge_upstream(&fork)?;
  let before = fork.head()?;

  let output = run_fork_rail(&fork.path, &["sync", "--apply", "--json"])?;
  let result = stdout_json(&output)?;

  assert_eq!(result["upstream_ref"], "upstream/main");
  assert_eq!(result["up_to_date"], false);
  assert!(result["commit"].is_string());
  assert_eq!(result["report"]["conflicts_resolved"][0], "codex-cli/package.json");

  let rules = &result["report"]["rules"];
  assert_eq!(rules[0]["id"], "readme-name");
  assert_eq!(rules[0]["status"], "satisfied");
  assert_eq!(rules[1]["id"], "npm-scope");
  assert_eq!(rules[1]["status"], "reapplied");

  // Upstream change kept, downstream identity restored
  let package = fork.read_file("codex-cli/package.json")?;
  assert!(package.contains("\"name\": \"@echoflux537/codex\", \"type\": \"module\","));
  assert!(package.contains("github.com/wenwen12345/codex"));
  assert!(!package.contains("@openai"));
  assert!(!package.contains("<<<<<<<"));
  assert!(fork.file_exists("codex-rs/src/exec.rs"));

  // A real merge commit on top of the previous head
  let parents = git(&fork.path, &["rev-list", "--parents", "-n", "1", "HEAD"])?;
  let parents = String::from_utf8(parents.stdout)?;
  let shas: Vec<&str> = parents.split_whitespace().collect();
  assert_eq!(shas.len(), 3);
  assert_eq!(shas[1], before);

  let message = git(&fork.path, &["log", "-1", "--format=%B"])?;
  let message = String::from_utf8(message.stdout)?;
  assert!(message.starts_with("Merge upstream/main into main"));
  assert!(message.contains("npm-scope"));

  // Nothing left uncommitted
  let status = git(&fork.path, &["status", "--porcelain", "--untracked-files=no"])?;
  assert!(status.stdout.is_empty());

  Ok(())
}

#[test]
fn test_sync_dry_run_leaves_branch_untouched() -> Result<()> {
  let fork = TestFork::customized("")?;
  diverge_upstream(&fork)?;
  let before = fork.head()?;
  let package_before = fork.read_file("codex-cli/package.json")?;

  let output = run_fork_rail(&fork.path, &["sync"])?;
  let text = stdout(&output);
  assert!(text.contains("Dry-run"));
  assert!(text.contains("npm-scope"));

  assert_eq!(fork.head()?, before);
  assert_eq!(fork.read_file("codex-cli/package.json")?, package_before);
  assert!(!fork.file_exists("codex-rs/src/exec.rs"));
  assert!(!fork.path.join(".git/MERGE_HEAD").exists());

  Ok(())
}

#[test]
fn test_sync_twice_is_up_to_date() -> Result<()> {
  let fork = TestFork::customized("")?;
  diverge_upstream(&fork)?;

  run_fork_rail(&fork.path, &["sync", "--apply"])?;
  let merged = fork.head()?;

  let output = run_fork_rail(&fork.path, &["sync", "--apply", "--json"])?;
  let result = stdout_json(&output)?;
  assert_eq!(result["up_to_date"], true);
  assert!(result["commit"].is_null());
  assert_eq!(fork.head()?, merged);

  Ok(())
}

#[test]
fn test_sync_stops_on_ungoverned_conflict() -> Result<()> {
  let fork = TestFork::customized("")?;
  fork.write("codex-rs/src/lib.rs", "pub fn hello() { println!(\"fork\") }\n")?;
  fork.commit("Fork-only behavior")?;
  fork.upstream_change(
    "codex-rs/src/lib.rs",
    "pub fn hello() { println!(\"upstream\") }\n",
    "Upstream behavior",
  )?;
  let before = fork.head()?;

  let output = run_fork_rail_raw(&fork.path, &["sync", "--apply"])?;
  assert_eq!(output.status.code(), Some(7));
  assert!(stderr(&output).contains("codex-rs/src/lib.rs"));

  // Merge left in progress for the maintainer, branch not moved
  assert!(fork.path.join(".git/MERGE_HEAD").exists());
  assert_eq!(fork.head()?, before);

  Ok(())
}

#[test]
fn test_sync_refuses_dirty_tree() -> Result<()> {
  let fork = TestFork::customized("")?;
  diverge_upstream(&fork)?;
  fork.write("README.md", "# Codex Cometix\n\nLocal edit.\n")?;

  let output = run_fork_rail_raw(&fork.path, &["sync", "--apply"])?;
  assert!(!output.status.success());
  assert!(stderr(&output).contains("uncommitted changes"));

  Ok(())
}

#[test]
fn test_sync_unknown_upstream_ref() -> Result<()> {
  let fork = TestFork::customized("")?;

  let output = run_fork_rail_raw(&fork.path, &["sync", "--upstream", "nowhere/main"])?;
  assert_eq!(output.status.code(), Some(1));
  assert!(stderr(&output).contains("does not exist"));

  Ok(())
}

#[test]
fn test_sync_keeps_stale_marks_when_a_later_anchor_is_missing() -> Result<()> {
  let fork = TestFork::customized("")?;
  // The lib.rs rule runs before the package rules
  let ledger = format!(
    "[[rule]]\nid = \"lib-hello\"\npath = \"codex-rs/src/lib.rs\"\nmatcher = {{ literal = \"fn hello_upstream\" }}\nreplacement = \"fn hello\"\ncategory = \"rebrand\"\n\n{}",
    FORK_LEDGER
  );
  fork.write(".fork-rail/ledger.toml", &ledger)?;
  fork.commit("Govern lib.rs")?;

  git(&fork.upstream, &["rm", "-q", "codex-rs/src/lib.rs"])?;
  git(&fork.upstream, &["commit", "-q", "-m", "Drop lib.rs"])?;
  let renamed = UPSTREAM_PACKAGE_JSON.replace("\"@openai/codex\"", "\"@openai/codex-cli\"");
  fork.upstream_change("codex-cli/package.json", &renamed, "Rename package")?;

  let output = run_fork_rail_raw(&fork.path, &["sync", "--apply"])?;
  assert_eq!(output.status.code(), Some(7));
  assert!(stderr(&output).contains("npm-scope"));

  let state: serde_json::Value = serde_json::from_str(&fork.read_file(".fork-rail/state.json")?)?;
  assert_eq!(state["stale"]["lib-hello"]["path"], "codex-rs/src/lib.rs");

  Ok(())
}

#[test]
fn test_sync_reapply_without_upstream_changes_says_so() -> Result<()> {
  let fork = TestFork::customized("")?;
  fork.write("README.md", "# OpenAI Codex\n\nLightweight coding agent.\n")?;
  fork.commit("Accidentally revert the rebrand")?;

  let output = run_fork_rail(&fork.path, &["sync", "--apply", "--json"])?;
  let result = stdout_json(&output)?;
  assert_eq!(result["up_to_date"], true);
  assert!(result["commit"].is_string());
  assert!(fork.read_file("README.md")?.contains("Codex Cometix"));

  let message = git(&fork.path, &["log", "-1", "--format=%B"])?;
  let message = String::from_utf8(message.stdout)?;
  assert!(message.starts_with("Reapply fork customizations on main (already at upstream/main)"));
  assert!(message.contains("readme-name"));

  Ok(())
}

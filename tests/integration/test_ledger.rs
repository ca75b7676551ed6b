//! Tests for the `ledger` commands

use crate::helpers::*;
use anyhow::Result;

fn add_rule(fork: &TestFork, id: &str, path: &str, literal: &str, replacement: &str) -> Result<std::process::Output> {
  run_fork_rail_raw(
    &fork.path,
    &[
      "ledger",
      "add",
      "--id",
      id,
      "--path",
      path,
      "--literal",
      literal,
      "--replacement",
      replacement,
      "--category",
      "feature",
    ],
  )
}

fn rule_ids(value: &serde_json::Value) -> Vec<String> {
  value
    .as_array()
    .map(|rules| {
      rules
        .iter()
        .filter_map(|r| r["id"].as_str().map(str::to_string))
        .collect()
    })
    .unwrap_or_default()
}

#[test]
fn test_ledger_list_preserves_file_order() -> Result<()> {
  let fork = TestFork::customized("")?;

  let output = run_fork_rail(&fork.path, &["ledger", "list", "--json"])?;
  let rules = stdout_json(&output)?;
  assert_eq!(rule_ids(&rules), ["readme-name", "npm-scope", "repo-url"]);
  assert_eq!(rules[1]["path"], "codex-cli/package.json");
  assert_eq!(rules[1]["category"], "distribution");
  assert_eq!(rules[2]["matcher"]["regex"], "github\\.com/openai/codex");

  let output = run_fork_rail(&fork.path, &["ledger", "list", "--category", "ownership", "--json"])?;
  assert_eq!(rule_ids(&stdout_json(&output)?), ["repo-url"]);

  Ok(())
}

#[test]
fn test_ledger_add_appends_and_remove_deletes() -> Result<()> {
  let fork = TestFork::customized("")?;

  let output = add_rule(&fork, "lib-greeting", "codex-rs/src/lib.rs", "hello", "hello_cometix")?;
  assert!(output.status.success(), "{}", stderr(&output));

  let output = run_fork_rail(&fork.path, &["ledger", "list", "--json"])?;
  assert_eq!(
    rule_ids(&stdout_json(&output)?),
    ["readme-name", "npm-scope", "repo-url", "lib-greeting"]
  );

  // Comments written by maintainers survive edits
  assert!(fork.read_file(".fork-rail/ledger.toml")?.starts_with("# Downstream customizations"));

  run_fork_rail(&fork.path, &["ledger", "remove", "npm-scope"])?;
  let output = run_fork_rail(&fork.path, &["ledger", "list", "--json"])?;
  assert_eq!(rule_ids(&stdout_json(&output)?), ["readme-name", "repo-url", "lib-greeting"]);

  let output = run_fork_rail_raw(&fork.path, &["ledger", "remove", "npm-scope"])?;
  assert_eq!(output.status.code(), Some(1));

  Ok(())
}

#[test]
fn test_ledger_add_rejects_duplicate_id() -> Result<()> {
  let fork = TestFork::customized("")?;

  let output = add_rule(&fork, "readme-name", "README.md", "agent", "assistant")?;
  assert_eq!(output.status.code(), Some(3));
  assert!(stderr(&output).contains("duplicate rule id"));

  // The ledger file is untouched
  assert_eq!(fork.read_file(".fork-rail/ledger.toml")?, FORK_LEDGER);

  Ok(())
}

#[test]
fn test_ledger_add_requires_one_matcher() -> Result<()> {
  let fork = TestFork::customized("")?;

  let output = run_fork_rail_raw(
    &fork.path,
    &[
      "ledger",
      "add",
      "--id",
      "no-matcher",
      "--path",
      "README.md",
      "--replacement",
      "x",
      "--category",
      "rebrand",
    ],
  )?;
  assert!(!output.status.success());

  Ok(())
}

#[test]
fn test_ledger_check_passes_on_customized_tree() -> Result<()> {
  let fork = TestFork::customized("")?;

  let output = run_fork_rail(&fork.path, &["ledger", "check", "--json"])?;
  let report = stdout_json(&output)?;
  let statuses: Vec<&str> = report
    .as_array()
    .map(|rules| rules.iter().filter_map(|r| r["status"].as_str()).collect())
    .unwrap_or_default();
  assert_eq!(statuses, ["satisfied", "satisfied", "satisfied"]);

  Ok(())
}

#[test]
fn test_ledger_check_reports_stale_rule_without_failing() -> Result<()> {
  let fork = TestFork::customized("")?;

  let output = add_rule(&fork, "install-docs", "docs/install.md", "npm i -g @openai/codex", "npm i -g @echoflux537/codex")?;
  assert!(output.status.success());
  assert!(stdout(&output).contains("reported stale"));

  let output = run_fork_rail(&fork.path, &["ledger", "check", "--json"])?;
  let report = stdout_json(&output)?;
  assert_eq!(report[3]["id"], "install-docs");
  assert_eq!(report[3]["status"], "stale");

  Ok(())
}

#[test]
fn test_ledger_check_fails_on_missing_anchor() -> Result<()> {
  let fork = TestFork::customized("")?;

  add_rule(&fork, "tagline", "README.md", "Heavyweight coding agent", "Cometix coding agent")?;

  let output = run_fork_rail_raw(&fork.path, &["ledger", "check"])?;
  assert_eq!(output.status.code(), Some(7));
  assert!(stdout(&output).contains("anchor missing"));
  assert!(stderr(&output).contains("rule 'tagline'"));

  Ok(())
}

#[test]
fn test_ledger_check_reports_pending_rewrite() -> Result<()> {
  let fork = TestFork::customized("")?;

  // Undo the README rebrand by hand
  fork.write("README.md", "# OpenAI Codex\n\nLightweight coding agent.\n")?;

  let output = run_fork_rail(&fork.path, &["ledger", "check", "--json"])?;
  let report = stdout_json(&output)?;
  assert_eq!(report[0]["status"], "reapplied");
  assert_eq!(report[0]["hits"], 1);

  // check never writes
  assert!(fork.read_file("README.md")?.contains("OpenAI Codex"));

  Ok(())
}

#[test]
fn test_ledger_review_of_unheld_rule() -> Result<()> {
  let fork = TestFork::customized("")?;

  let output = run_fork_rail(&fork.path, &["ledger", "review", "readme-name"])?;
  assert!(stdout(&output).contains("is not held"));

  let output = run_fork_rail_raw(&fork.path, &["ledger", "review", "no-such-rule"])?;
  assert_eq!(output.status.code(), Some(1));

  Ok(())
}

//! Tests for the `targets` commands

use crate::helpers::*;
use anyhow::Result;

fn triples(fork: &TestFork, all: bool) -> Result<Vec<String>> {
  let mut args = vec!["targets", "list", "--json"];
  if all {
    args.push("--all");
  }
  let output = run_fork_rail(&fork.path, &args)?;
  let listed = stdout_json(&output)?;
  Ok(
    listed
      .as_array()
      .map(|targets| {
        targets
          .iter()
          .filter_map(|t| t["triple"].as_str().map(str::to_string))
          .collect()
      })
      .unwrap_or_default(),
  )
}

#[test]
fn test_targets_list_hides_unsupported_by_default() -> Result<()> {
  let fork = TestFork::customized(TARGETS_CONFIG)?;

  assert_eq!(
    triples(&fork, false)?,
    ["x86_64-unknown-linux-musl", "aarch64-apple-darwin"]
  );
  assert_eq!(
    triples(&fork, true)?,
    [
      "x86_64-unknown-linux-musl",
      "aarch64-apple-darwin",
      "aarch64-unknown-linux-gnu"
    ]
  );

  let output = run_fork_rail(&fork.path, &["targets", "list"])?;
  assert!(stdout(&output).contains("2 active, 3 recorded"));

  Ok(())
}

#[test]
fn test_targets_disable_keeps_target_recorded() -> Result<()> {
  let fork = TestFork::customized(TARGETS_CONFIG)?;

  run_fork_rail(&fork.path, &["targets", "disable", "aarch64-apple-darwin"])?;
  assert_eq!(triples(&fork, false)?, ["x86_64-unknown-linux-musl"]);
  assert_eq!(triples(&fork, true)?.len(), 3);

  run_fork_rail(&fork.path, &["targets", "enable", "aarch64-apple-darwin"])?;
  assert_eq!(triples(&fork, false)?.len(), 2);

  // The rest of the config survives the rewrite
  let config = fork.read_file("fork-rail.toml")?;
  assert!(config.contains("[upstream]"));
  assert!(config.contains(&fork.upstream.display().to_string()));

  Ok(())
}

#[test]
fn test_targets_enable_paid_target_fails() -> Result<()> {
  let fork = TestFork::customized(TARGETS_CONFIG)?;

  let output = run_fork_rail_raw(&fork.path, &["targets", "enable", "aarch64-unknown-linux-gnu"])?;
  assert_eq!(output.status.code(), Some(3));
  assert!(stderr(&output).contains("no free runner"));
  assert_eq!(triples(&fork, false)?.len(), 2);

  Ok(())
}

#[test]
fn test_targets_remove_is_explicit() -> Result<()> {
  let fork = TestFork::customized(TARGETS_CONFIG)?;

  run_fork_rail(&fork.path, &["targets", "remove", "aarch64-unknown-linux-gnu"])?;
  assert_eq!(
    triples(&fork, true)?,
    ["x86_64-unknown-linux-musl", "aarch64-apple-darwin"]
  );

  let output = run_fork_rail_raw(&fork.path, &["targets", "remove", "aarch64-unknown-linux-gnu"])?;
  assert_eq!(output.status.code(), Some(1));
  assert!(stderr(&output).contains("not registered"));

  Ok(())
}

#[test]
fn test_config_rejects_supported_paid_target() -> Result<()> {
  let fork = TestFork::customized(&TARGETS_CONFIG.replace(
    "runner = \"paid\"\nsupported = false",
    "runner = \"paid\"\nsupported = true",
  ))?;

  let output = run_fork_rail_raw(&fork.path, &["targets", "list"])?;
  assert_eq!(output.status.code(), Some(3));
  assert!(stderr(&output).contains("paid runner"));

  Ok(())
}

#[test]
fn test_targets_add_records_new_targets() -> Result<()> {
  let fork = TestFork::customized(TARGETS_CONFIG)?;

  run_fork_rail(
    &fork.path,
    &["targets", "add", "--os", "windows", "--arch", "x86_64", "--libc", "msvc", "--enable"],
  )?;
  assert_eq!(
    triples(&fork, false)?,
    ["x86_64-unknown-linux-musl", "aarch64-apple-darwin", "x86_64-pc-windows-msvc"]
  );

  // A paid target asked to build is still recorded, but unsupported
  let output = run_fork_rail(
    &fork.path,
    &["targets", "add", "--os", "windows", "--arch", "aarch64", "--runner", "paid", "--enable"],
  )?;
  assert!(stdout(&output).contains("no free runner"));
  assert_eq!(triples(&fork, false)?.len(), 3);
  assert_eq!(triples(&fork, true)?.len(), 5);
  assert!(fork.read_file("fork-rail.toml")?.contains("arch = \"aarch64\"\nrunner = \"paid\"\nsupported = false"));

  let output = run_fork_rail_raw(
    &fork.path,
    &["targets", "add", "--os", "macos", "--arch", "aarch64"],
  )?;
  assert_eq!(output.status.code(), Some(3));
  assert!(stderr(&output).contains("already registered"));

  Ok(())
}

//! Tests for the `release` commands

use crate::helpers::*;
use anyhow::Result;
use std::path::PathBuf;

const BUILD_OK: &str =
  "mkdir -p out && printf 'codex {target}' > out/codex && printf 'proxy {target}' > out/proxy";

/// Config with a shell build, a publish command that appends its arguments to
/// `publish.log`, and the two-free-target matrix
fn release_config(fork_path: &std::path::Path, build_script: &str) -> String {
  format!(
    r#"[build]
command = ["sh", "-c", "{build}"]
working_dir = "."
artifacts = [
  {{ package = "codex", path = "out/codex" }},
  {{ package = "codex-responses-api-proxy", path = "out/proxy" }},
]

[publish]
command = ["sh", "-c", 'echo "$@" >> "$0"', "{log}"]
{targets}"#,
    build = build_script,
    log = publish_log(fork_path).display(),
    targets = TARGETS_CONFIG,
  )
}

fn publish_log(fork_path: &std::path::Path) -> PathBuf {
  fork_path.join("publish.log")
}

/// A customized fork whose build script is `build_script`, with `rust-v0.46.0` cut
fn released_fork(build_script: &str) -> Result<TestFork> {
  let fork = TestFork::new()?;
  fork.write_config(&release_config(&fork.path, build_script))?;
  fork.customize()?;
  run_fork_rail(&fork.path, &["release", "cut", "0.46.0"])?;
  Ok(fork)
}

#[test]
fn test_release_cut_tags_release_and_restores_sentinel() -> Result<()> {
  let fork = TestFork::customized("")?;
  let before = fork.head()?;

  let output = run_fork_rail(&fork.path, &["release", "cut", "0.46.0"])?;
  assert!(stdout(&output).contains("rust-v0.46.0"));

  // Tag holds the real version on a commit whose parent is the old head
  let tagged = fork.tag_commit("rust-v0.46.0")?;
  assert!(fork.show("rust-v0.46.0", "codex-rs/Cargo.toml")?.contains("version = \"0.46.0\""));
  assert_eq!(fork.tag_commit(&format!("{}^", tagged))?, before);

  // Base branch is back on the sentinel and nothing is left dirty
  assert!(fork.read_file("codex-rs/Cargo.toml")?.contains("version = \"0.0.0\""));
  let status = git(&fork.path, &["status", "--porcelain", "--untracked-files=no"])?;
  assert!(status.stdout.is_empty());

  // Other manifest content is preserved
  let released = fork.show("rust-v0.46.0", "codex-rs/Cargo.toml")?;
  assert!(released.contains("members = [\"cli\"]"));
  assert!(released.contains("edition = \"2024\""));

  Ok(())
}

#[test]
fn test_release_stamp_and_reset() -> Result<()> {
  let fork = TestFork::customized("")?;
  let prior = fork.head()?;

  run_fork_rail(&fork.path, &["release", "stamp", "0.46.0-alpha.1"])?;
  let stamped = fork.head()?;
  assert_ne!(stamped, prior);
  assert!(fork.read_file("codex-rs/Cargo.toml")?.contains("version = \"0.46.0-alpha.1\""));
  assert_eq!(fork.tag_commit("rust-v0.46.0-alpha.1")?, stamped);
  assert!(fork.file_exists(".fork-rail/stamp.json"));

  // Only one stamp may be open at a time
  let output = run_fork_rail_raw(&fork.path, &["release", "stamp", "0.46.0-alpha.2"])?;
  assert_eq!(output.status.code(), Some(1));
  assert!(stderr(&output).contains("still stamped"));

  run_fork_rail(&fork.path, &["release", "reset"])?;
  assert_eq!(fork.head()?, prior);
  assert!(fork.read_file("codex-rs/Cargo.toml")?.contains("version = \"0.0.0\""));
  assert!(!fork.file_exists(".fork-rail/stamp.json"));

  // The tag keeps pointing at the release commit
  assert_eq!(fork.tag_commit("rust-v0.46.0-alpha.1")?, stamped);

  let output = run_fork_rail_raw(&fork.path, &["release", "reset"])?;
  assert_eq!(output.status.code(), Some(1));
  assert!(stderr(&output).contains("No stamped release"));

  Ok(())
}

#[test]
fn test_release_stamp_refuses_dirty_tree() -> Result<()> {
  let fork = TestFork::customized("")?;
  fork.write("README.md", "# Codex Cometix\n\nUncommitted.\n")?;

  let output = run_fork_rail_raw(&fork.path, &["release", "stamp", "0.46.0"])?;
  assert!(!output.status.success());
  assert!(stderr(&output).contains("uncommitted changes"));
  assert!(git(&fork.path, &["tag", "--list"])?.stdout.is_empty());

  Ok(())
}

#[test]
fn test_release_stamp_rejects_bad_version() -> Result<()> {
  let fork = TestFork::customized("")?;

  let output = run_fork_rail_raw(&fork.path, &["release", "stamp", "0.46"])?;
  assert_eq!(output.status.code(), Some(4));

  Ok(())
}

#[test]
fn test_release_validate() -> Result<()> {
  let fork = TestFork::customized("")?;
  run_fork_rail(&fork.path, &["release", "cut", "0.46.0-cometix.2"])?;

  let output = run_fork_rail(&fork.path, &["release", "validate", "rust-v0.46.0-cometix.2", "--json"])?;
  let parsed = stdout_json(&output)?;
  assert_eq!(parsed["raw"], "rust-v0.46.0-cometix.2");
  assert_eq!(parsed["minor"], 46);
  assert_eq!(parsed["channel"], "cometix");
  assert_eq!(parsed["channel_sequence"], 2);

  // Malformed
  let output = run_fork_rail_raw(&fork.path, &["release", "validate", "v0.46.0"])?;
  assert_eq!(output.status.code(), Some(4));

  // Missing
  let output = run_fork_rail_raw(&fork.path, &["release", "validate", "rust-v9.9.9"])?;
  assert_eq!(output.status.code(), Some(1));
  assert!(stderr(&output).contains("does not exist"));

  // Tag on a commit that still carries the sentinel
  git(&fork.path, &["tag", "-a", "rust-v0.47.0", "-m", "not a release commit"])?;
  let output = run_fork_rail_raw(&fork.path, &["release", "validate", "rust-v0.47.0"])?;
  assert_eq!(output.status.code(), Some(4));
  assert!(stderr(&output).contains("0.0.0"));

  Ok(())
}

#[test]
fn test_release_decide_maps_channels_to_dist_tags() -> Result<()> {
  let fork = TestFork::customized("")?;

  for (tag, dist_tag, version) in [
    ("rust-v0.46.0", "latest", "0.46.0"),
    ("rust-v0.46.0-cometix", "latest", "0.46.0-cometix"),
    ("rust-v0.46.0-alpha.3", "alpha", "0.46.0-alpha.3"),
    ("rust-v0.46.0-beta.1", "beta", "0.46.0-beta.1"),
  ] {
    let output = run_fork_rail(&fork.path, &["release", "decide", tag, "--json"])?;
    let decision = stdout_json(&output)?;
    assert_eq!(decision["dist_tag"], dist_tag, "{}", tag);
    assert_eq!(decision["version"], version, "{}", tag);
    assert_eq!(decision["package_name"], "@echoflux537/codex");
    assert_eq!(decision["allowed_packages"], serde_json::json!(["codex"]));
  }

  Ok(())
}

#[test]
fn test_release_run_dry_run_builds_without_publishing() -> Result<()> {
  let fork = released_fork(BUILD_OK)?;

  let output = run_fork_rail(&fork.path, &["release", "run", "rust-v0.46.0"])?;
  assert!(stdout(&output).contains("dry run"));
  assert!(!publish_log(&fork.path).exists());

  let dist = fork.path.join("dist/rust-v0.46.0");
  for triple in ["x86_64-unknown-linux-musl", "aarch64-apple-darwin"] {
    let built = std::fs::read_to_string(dist.join(triple).join("codex"))?;
    assert_eq!(built, format!("codex {}", triple));
  }
  // Disabled targets never build
  assert!(!dist.join("aarch64-unknown-linux-gnu").exists());

  let record: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(dist.join("release.json"))?)?;
  assert_eq!(record["outcome"]["status"], "built-not-published");
  assert_eq!(record["version"], "0.46.0");
  assert_eq!(record["artifacts"].as_array().map(Vec::len), Some(4));
  assert_eq!(record["withheld"], serde_json::json!(["codex-responses-api-proxy"]));

  Ok(())
}

#[test]
fn test_release_run_publishes_only_allowed_package() -> Result<()> {
  let fork = released_fork(BUILD_OK)?;

  let output = run_fork_rail(&fork.path, &["release", "run", "rust-v0.46.0", "--publish", "--json"])?;
  let record = stdout_json(&output)?;
  assert_eq!(record["outcome"]["status"], "succeeded");
  assert_eq!(record["published"], serde_json::json!(["@echoflux537/codex"]));
  assert_eq!(record["withheld"], serde_json::json!(["codex-responses-api-proxy"]));
  assert_eq!(record["decision"]["dist_tag"], "latest");

  let log = std::fs::read_to_string(publish_log(&fork.path))?;
  let lines: Vec<&str> = log.lines().collect();
  assert_eq!(lines.len(), 1, "exactly one package is published: {}", log);
  assert!(lines[0].contains("npm/codex --tag latest --access public --registry https://registry.npmjs.org/"));

  let staged = fork.path.join("dist/rust-v0.46.0/npm/codex");
  let manifest: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(staged.join("package.json"))?)?;
  assert_eq!(manifest["name"], "@echoflux537/codex");
  assert_eq!(manifest["version"], "0.46.0");
  assert!(staged.join("vendor/x86_64-unknown-linux-musl/codex").exists());
  assert!(staged.join("vendor/aarch64-apple-darwin/codex").exists());
  assert!(!fork.path.join("dist/rust-v0.46.0/npm/codex-responses-api-proxy").exists());

  Ok(())
}

#[test]
fn test_release_run_rejects_version_mismatch_before_building() -> Result<()> {
  let fork = released_fork(BUILD_OK)?;
  git(&fork.path, &["tag", "-a", "rust-v0.47.0", "-m", "not a release commit"])?;

  let output = run_fork_rail_raw(&fork.path, &["release", "run", "rust-v0.47.0", "--publish"])?;
  assert_eq!(output.status.code(), Some(4));
  assert!(stdout(&output).contains("rejected"));
  assert!(!fork.path.join("dist/rust-v0.47.0").exists());
  assert!(!publish_log(&fork.path).exists());

  let output = run_fork_rail_raw(&fork.path, &["release", "run", "rust-v0.46", "--publish"])?;
  assert_eq!(output.status.code(), Some(4));

  Ok(())
}

#[test]
fn test_release_run_failed_target_blocks_publish() -> Result<()> {
  let script = format!("test {{target}} != aarch64-apple-darwin && {}", BUILD_OK);
  let fork = released_fork(&script)?;

  let output = run_fork_rail_raw(&fork.path, &["release", "run", "rust-v0.46.0", "--publish", "--json"])?;
  assert_eq!(output.status.code(), Some(5));
  assert!(!publish_log(&fork.path).exists());

  let record = stdout_json(&output)?;
  assert_eq!(record["outcome"]["status"], "built-not-published");
  assert!(
    record["outcome"]["reason"]
      .as_str()
      .is_some_and(|r| r.contains("aarch64-apple-darwin"))
  );
  assert!(record["published"].as_array().is_some_and(Vec::is_empty));

  // The healthy target still ran to completion
  assert!(fork.path.join("dist/rust-v0.46.0/x86_64-unknown-linux-musl/codex").exists());

  Ok(())
}

#[test]
fn test_release_run_detects_non_reproducible_rebuild() -> Result<()> {
  let script = BUILD_OK.replace("printf 'codex {target}'", "printf codex-$$");
  let fork = released_fork(&script)?;

  run_fork_rail(&fork.path, &["release", "run", "rust-v0.46.0"])?;
  assert!(fork.file_exists(".fork-rail/checksums.json"));

  let output = run_fork_rail_raw(&fork.path, &["release", "run", "rust-v0.46.0", "--publish"])?;
  assert_eq!(output.status.code(), Some(5));
  assert!(stdout(&output).contains("non-reproducible"));
  assert!(!publish_log(&fork.path).exists());

  Ok(())
}

#[test]
fn test_release_run_checks_rebuild_on_fresh_clone_against_reference() -> Result<()> {
  let script = BUILD_OK.replace("printf 'codex {target}'", "printf codex-$$");
  let fork = released_fork(&script)?;
  run_fork_rail(&fork.path, &["release", "run", "rust-v0.46.0"])?;
  let reference = fork.path.join("dist/rust-v0.46.0/release.json");
  assert!(reference.exists());

  // A fresh runner has neither the local checksum store nor the dist directory
  let fresh = fork.path.with_file_name("fresh");
  git(&fork.path, &["clone", fork.path.to_str().unwrap_or_default(), fresh.to_str().unwrap_or_default()])?;
  git(&fresh, &["fetch", "origin", "+refs/tags/*:refs/tags/*"])?;
  assert!(!fresh.join(".fork-rail/checksums.json").exists());

  let output = run_fork_rail_raw(
    &fresh,
    &["release", "run", "rust-v0.46.0", "--reference", reference.to_str().unwrap_or_default()],
  )?;
  assert_eq!(output.status.code(), Some(5));
  assert!(stdout(&output).contains("non-reproducible"));

  Ok(())
}

#[test]
fn test_release_run_reads_checksums_from_previous_record_in_dist() -> Result<()> {
  let script = BUILD_OK.replace("printf 'codex {target}'", "printf codex-$$");
  let fork = released_fork(&script)?;
  run_fork_rail(&fork.path, &["release", "run", "rust-v0.46.0"])?;

  // Only the uploaded record survives; the local store is gone
  std::fs::remove_file(fork.path.join(".fork-rail/checksums.json"))?;

  let output = run_fork_rail_raw(&fork.path, &["release", "run", "rust-v0.46.0"])?;
  assert_eq!(output.status.code(), Some(5));
  assert!(stdout(&output).contains("non-reproducible"));

  Ok(())
}

//! Test helpers for integration tests

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

pub const UPSTREAM_PACKAGE_JSON: &str = r#"{
  "name": "@openai/codex",
  "version": "0.0.0",
  "repository": "https://github.com/openai/codex"
}
"#;

pub const WORKSPACE_MANIFEST: &str = r#"[workspace]
members = ["cli"]

[workspace.package]
version = "0.0.0"
edition = "2024"
"#;

/// Ledger matching the customizations `TestFork::customize` commits
pub const FORK_LEDGER: &str = r#"# Downstream customizations
[[rule]]
id = "readme-name"
path = "README.md"
matcher = { literal = "OpenAI Codex" }
replacement = "Codex Cometix"
category = "rebrand"

[[rule]]
id = "npm-scope"
path = "codex-cli/package.json"
matcher = { literal = "\"@openai/codex\"" }
replacement = "\"@echoflux537/codex\""
category = "distribution"

[[rule]]
id = "repo-url"
path = "codex-cli/package.json"
matcher = { regex = "github\\.com/openai/codex" }
replacement = "github.com/wenwen12345/codex"
category = "ownership"
"#;

/// An upstream repository and a fork cloned from it, side by side in a temp dir
pub struct TestFork {
  _root: TempDir,
  pub upstream: PathBuf,
  pub path: PathBuf,
}

impl TestFork {
  /// Create the upstream repo with an initial commit and clone it as the fork
  pub fn new() -> Result<Self> {
    let root = TempDir::new()?;
    let upstream = root.path().join("upstream");
    let path = root.path().join("fork");

    fs::create_dir_all(&upstream)?;
    git(&upstream, &["init", "--initial-branch=main"])?;
    configure_identity(&upstream)?;
    write_file(&upstream, "README.md", "# OpenAI Codex\n\nLightweight coding agent.\n")?;
    write_file(&upstream, "codex-cli/package.json", UPSTREAM_PACKAGE_JSON)?;
    write_file(&upstream, "codex-rs/Cargo.toml", WORKSPACE_MANIFEST)?;
    write_file(&upstream, "codex-rs/src/lib.rs", "pub fn hello() {}\n")?;
    commit_all(&upstream, "Initial upstream commit")?;

    git(root.path(), &["clone", "upstream", "fork"])?;
    configure_identity(&path)?;

    Ok(Self {
      _root: root,
      upstream,
      path,
    })
  }

  /// Fork with config, ledger and the customizations committed on main
  pub fn customized(extra_config: &str) -> Result<Self> {
    let fork = Self::new()?;
    fork.write_config(extra_config)?;
    fork.customize()?;
    Ok(fork)
  }

  /// Write `fork-rail.toml` pointing the upstream remote at the local upstream repo
  pub fn write_config(&self, extra: &str) -> Result<()> {
    let config = format!(
      "[upstream]\nremote = \"upstream\"\nurl = \"{}\"\nbranch = \"main\"\n\n{}",
      self.upstream.display(),
      extra
    );
    self.write("fork-rail.toml", &config)
  }

  /// Rebrand the fork by hand, record the ledger and commit both
  pub fn customize(&self) -> Result<()> {
    self.write("README.md", "# Codex Cometix\n\nLightweight coding agent.\n")?;
    let package = UPSTREAM_PACKAGE_JSON
      .replace("\"@openai/codex\"", "\"@echoflux537/codex\"")
      .replace("github.com/openai/codex", "github.com/wenwen12345/codex");
    self.write("codex-cli/package.json", &package)?;
    self.write(".fork-rail/ledger.toml", FORK_LEDGER)?;
    self.write(".fork-rail/.gitignore", "state.json\nchecksums.json\nstamp.json\n")?;
    self.commit("Customize fork")
  }

  pub fn write(&self, rel: &str, content: &str) -> Result<()> {
    write_file(&self.path, rel, content)
  }

  pub fn read_file(&self, rel: &str) -> Result<String> {
    fs::read_to_string(self.path.join(rel)).with_context(|| format!("Failed to read {}", rel))
  }

  pub fn file_exists(&self, rel: &str) -> bool {
    self.path.join(rel).exists()
  }

  pub fn commit(&self, message: &str) -> Result<()> {
    commit_all(&self.path, message)
  }

  /// Commit a change on the upstream repository
  pub fn upstream_change(&self, rel: &str, content: &str, message: &str) -> Result<()> {
    write_file(&self.upstream, rel, content)?;
    commit_all(&self.upstream, message)
  }

  pub fn head(&self) -> Result<String> {
    git_stdout(&self.path, &["rev-parse", "HEAD"])
  }

  /// Commit a tag points at (peeled)
  pub fn tag_commit(&self, tag: &str) -> Result<String> {
    git_stdout(&self.path, &["rev-parse", &format!("{}^{{commit}}", tag)])
  }

  /// Contents of `rel` at `rev`
  pub fn show(&self, rev: &str, rel: &str) -> Result<String> {
    git_stdout(&self.path, &["show", &format!("{}:{}", rev, rel)])
  }
}

fn configure_identity(repo: &Path) -> Result<()> {
  git(repo, &["config", "user.name", "Test User"])?;
  git(repo, &["config", "user.email", "test@example.com"])?;
  git(repo, &["config", "commit.gpgsign", "false"])?;
  git(repo, &["config", "tag.gpgsign", "false"])?;
  Ok(())
}

fn write_file(repo: &Path, rel: &str, content: &str) -> Result<()> {
  let path = repo.join(rel);
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent)?;
  }
  fs::write(&path, content)?;
  Ok(())
}

fn commit_all(repo: &Path, message: &str) -> Result<()> {
  git(repo, &["add", "-A"])?;
  git(repo, &["commit", "-m", message])?;
  Ok(())
}

/// Run a git command in the given directory
pub fn git(cwd: &Path, args: &[&str]) -> Result<Output> {
  let output = Command::new("git").current_dir(cwd).args(args).output()?;

  if !output.status.success() {
    anyhow::bail!(
      "git {} failed: {}",
      args.join(" "),
      String::from_utf8_lossy(&output.stderr)
    );
  }

  Ok(output)
}

fn git_stdout(cwd: &Path, args: &[&str]) -> Result<String> {
  let output = git(cwd, args)?;
  Ok(String::from_utf8(output.stdout)?.trim_end().to_string())
}

/// Run fork-rail and fail the test if it exits non-zero
pub fn run_fork_rail(cwd: &Path, args: &[&str]) -> Result<Output> {
  let output = run_fork_rail_raw(cwd, args)?;

  if !output.status.success() {
    anyhow::bail!(
      "fork-rail {} failed:\nstdout: {}\nstderr: {}",
      args.join(" "),
      String::from_utf8_lossy(&output.stdout),
      String::from_utf8_lossy(&output.stderr)
    );
  }

  Ok(output)
}

/// Run fork-rail and hand back the output whatever the exit status
pub fn run_fork_rail_raw(cwd: &Path, args: &[&str]) -> Result<Output> {
  let bin = env!("CARGO_BIN_EXE_fork-rail");
  let output = Command::new(bin)
    .current_dir(cwd)
    .env_remove("FORK_RAIL_LOG")
    .args(args)
    .output()?;
  Ok(output)
}

/// Parse a command's stdout as JSON
pub fn stdout_json(output: &Output) -> Result<serde_json::Value> {
  serde_json::from_slice(&output.stdout).context("stdout is not JSON")
}

pub fn stdout(output: &Output) -> String {
  String::from_utf8_lossy(&output.stdout).to_string()
}

pub fn stderr(output: &Output) -> String {
  String::from_utf8_lossy(&output.stderr).to_string()
}

/// Two free targets that build and one paid target kept on record
pub const TARGETS_CONFIG: &str = r#"
[[targets]]
os = "linux"
arch = "x86_64"
libc = "musl"
runner = "free"
supported = true

[[targets]]
os = "macos"
arch = "aarch64"
runner = "free"
supported = true

[[targets]]
os = "linux"
arch = "aarch64"
libc = "gnu"
runner = "paid"
supported = false
"#;

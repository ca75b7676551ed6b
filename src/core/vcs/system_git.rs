//! System git backend
//!
//! Every operation is a `git` subprocess with an isolated environment. Release
//! commits are built with plumbing (`hash-object`, a scratch index,
//! `commit-tree`) so stamping never touches the working tree, and branch moves
//! go through `update-ref <new> <old>` which is git's own compare-and-swap.

use super::{BranchHandle, BranchStore, ReleaseRepo};
use crate::core::error::{GitError, RailError, RailResult, ResultExt};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

/// Git backend using system git
pub struct SystemGit {
  /// Repository working directory
  pub(crate) repo_path: PathBuf,

  /// Working tree root
  pub(crate) work_tree: PathBuf,

  /// Absolute `.git` directory (lock and scratch files live here)
  pub(crate) git_dir: PathBuf,
}

impl SystemGit {
  /// Open a git repository
  ///
  /// This performs ONE subprocess call to get the repository metadata.
  pub fn open(path: &Path) -> RailResult<Self> {
    let output = Command::new("git")
      .arg("-C")
      .arg(path)
      .args(["rev-parse", "--show-toplevel", "--absolute-git-dir"])
      .output()
      .context("Failed to execute git rev-parse")?;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      if stderr.contains("not a git repository") {
        return Err(RailError::Git(GitError::RepoNotFound {
          path: path.to_path_buf(),
        }));
      }
      return Err(RailError::message(format!("Failed to open git repository: {}", stderr)));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut lines = stdout.lines();
    let work_tree = lines
      .next()
      .ok_or_else(|| RailError::message("git rev-parse returned no toplevel"))?;
    let git_dir = lines
      .next()
      .ok_or_else(|| RailError::message("git rev-parse returned no git dir"))?;

    Ok(Self {
      repo_path: path.to_path_buf(),
      work_tree: PathBuf::from(work_tree.trim()),
      git_dir: PathBuf::from(git_dir.trim()),
    })
  }

  /// Working tree root
  pub fn work_tree(&self) -> &Path {
    &self.work_tree
  }

  /// Absolute path of the `.git` directory
  pub fn git_dir(&self) -> &Path {
    &self.git_dir
  }

  /// Get HEAD commit SHA
  pub fn head_commit(&self) -> RailResult<String> {
    self.run(&["rev-parse", "HEAD"])
  }

  /// Get current branch name
  pub fn current_branch(&self) -> RailResult<String> {
    let output = self
      .git_cmd()
      .args(["rev-parse", "--abbrev-ref", "HEAD"])
      .output()
      .context("Failed to get current branch")?;

    if !output.status.success() {
      return Ok("HEAD".to_string()); // Detached HEAD
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
  }

  /// Resolve any revision to a commit SHA, `None` if it does not exist
  pub fn resolve_commit(&self, rev: &str) -> RailResult<Option<String>> {
    let spec = format!("{}^{{commit}}", rev);
    let output = self
      .git_cmd()
      .args(["rev-parse", "--verify", "--quiet", &spec])
      .output()
      .context("Failed to run git rev-parse")?;

    if !output.status.success() {
      return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
  }

  /// Read a file at a specific commit
  ///
  /// Returns `None` if the file doesn't exist at that commit.
  pub fn read_file_at_commit(&self, commit_sha: &str, path: &Path) -> RailResult<Option<Vec<u8>>> {
    let spec = format!("{}:{}", commit_sha, crate::utils::path_to_git_format(path));

    let output = self
      .git_cmd()
      .args(["cat-file", "blob", &spec])
      .output()
      .context("Failed to read file from commit")?;

    if !output.status.success() {
      return Ok(None);
    }

    Ok(Some(output.stdout))
  }

  /// Run git and return trimmed stdout, mapping failure to `GitError::CommandFailed`
  pub(crate) fn run(&self, args: &[&str]) -> RailResult<String> {
    let output = self
      .git_cmd()
      .args(args)
      .output()
      .with_context(|| format!("Failed to run git {}", args.join(" ")))?;
    Self::check(args, output)
  }

  /// Like [`SystemGit::run`] but feeds `input` on stdin
  pub(crate) fn run_with_stdin(&self, args: &[&str], input: &[u8]) -> RailResult<String> {
    let mut child = self
      .git_cmd()
      .args(args)
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .spawn()
      .with_context(|| format!("Failed to spawn git {}", args.join(" ")))?;

    if let Some(mut stdin) = child.stdin.take() {
      stdin.write_all(input).context("Failed to write to git stdin")?;
    }

    let output = child.wait_with_output().context("Failed to wait for git")?;
    Self::check(args, output)
  }

  fn check(args: &[&str], output: Output) -> RailResult<String> {
    if !output.status.success() {
      return Err(RailError::Git(GitError::CommandFailed {
        command: format!("git {}", args.join(" ")),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
      }));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
  }

  /// Create a safe git command with isolated environment
  ///
  /// - Sets working directory to repo path
  /// - Clears environment variables
  /// - Whitelists PATH, HOME and git identity variables
  /// - Adds safe configuration overrides
  pub(crate) fn git_cmd(&self) -> Command {
    let mut cmd = Command::new("git");

    cmd.arg("-C").arg(&self.repo_path);

    // Isolated environment (don't trust global config)
    cmd.env_clear();
    for key in [
      "PATH",
      "HOME",
      "GIT_AUTHOR_NAME",
      "GIT_AUTHOR_EMAIL",
      "GIT_COMMITTER_NAME",
      "GIT_COMMITTER_EMAIL",
      "GIT_SSH_COMMAND",
    ] {
      if let Ok(value) = std::env::var(key) {
        cmd.env(key, value);
      }
    }

    // Force safe behavior (override user config)
    cmd.arg("-c").arg("protocol.version=2");
    cmd.arg("-c").arg("advice.detachedHead=false");
    cmd.arg("-c").arg("core.quotePath=false"); // Don't escape non-ASCII

    cmd
  }
}

impl BranchStore for SystemGit {
  fn read_branch(&self, branch: &str) -> RailResult<BranchHandle> {
    let head = self
      .resolve_commit(&format!("refs/heads/{}", branch))?
      .ok_or_else(|| {
        RailError::Git(GitError::BranchError {
          message: format!("branch '{}' does not exist", branch),
        })
      })?;
    Ok(BranchHandle::new(branch, head))
  }

  fn advance(&self, handle: &BranchHandle, new_head: &str) -> RailResult<BranchHandle> {
    let refname = format!("refs/heads/{}", handle.branch);
    let reason = format!("fork-rail: move {} to {}", handle.branch, new_head);
    let updated = self
      .git_cmd()
      .args(["update-ref", "-m", &reason, &refname, new_head, &handle.head])
      .output()
      .context("Failed to run git update-ref")?;

    if !updated.status.success() {
      let actual = self.resolve_commit(&refname)?.unwrap_or_default();
      return Err(RailError::Git(GitError::BranchMoved {
        branch: handle.branch.clone(),
        expected: handle.head.clone(),
        actual,
      }));
    }

    // A checked-out branch moved under the index; carry the work tree along
    if self.current_branch()? == handle.branch
      && let Err(e) = self.run(&["read-tree", "-m", "-u", &handle.head, new_head])
    {
      tracing::warn!(branch = %handle.branch, error = %e, "work tree update failed, moving branch back");
      let restored = self
        .git_cmd()
        .args(["update-ref", "-m", "fork-rail: roll back", &refname, &handle.head, new_head])
        .output()
        .context("Failed to run git update-ref")?;
      if !restored.status.success() {
        tracing::error!(branch = %handle.branch, head = %new_head, "could not move branch back");
      }
      return Err(e);
    }

    tracing::debug!(branch = %handle.branch, from = %handle.head, to = %new_head, "branch advanced");
    Ok(handle.moved_to(new_head))
  }
}

impl ReleaseRepo for SystemGit {
  fn read_file_at(&self, commit: &str, path: &Path) -> RailResult<Option<String>> {
    match self.read_file_at_commit(commit, path)? {
      Some(bytes) => Ok(Some(String::from_utf8(bytes)?)),
      None => Ok(None),
    }
  }

  fn commit_file(&self, parent: &str, path: &Path, content: &str, message: &str) -> RailResult<String> {
    let git_path = crate::utils::path_to_git_format(path);
    let blob = self.run_with_stdin(&["hash-object", "-w", "--stdin"], content.as_bytes())?;

    // Keep the file mode the parent already has (e.g. executable scripts)
    let listing = self.run(&["ls-tree", parent, "--", &git_path])?;
    let mode = listing.split_whitespace().next().unwrap_or("100644").to_string();

    let tree = self.with_scratch_index(|git, index| {
      git.run_indexed(index, &["read-tree", parent])?;
      git.run_indexed(
        index,
        &["update-index", "--add", "--cacheinfo", &format!("{},{},{}", mode, blob, git_path)],
      )?;
      git.run_indexed(index, &["write-tree"])
    })?;

    self.run(&["commit-tree", &tree, "-p", parent, "-m", message])
  }

  fn create_annotated_tag(&self, tag: &str, commit: &str, message: &str) -> RailResult<()> {
    self.run(&["tag", "-a", tag, commit, "-m", message])?;
    Ok(())
  }

  fn resolve_tag(&self, tag: &str) -> RailResult<Option<String>> {
    self.resolve_commit(&format!("refs/tags/{}", tag))
  }
}

impl SystemGit {
  fn with_scratch_index<T>(&self, f: impl FnOnce(&Self, &Path) -> RailResult<T>) -> RailResult<T> {
    let index = self.git_dir.join(format!("fork-rail-index-{}", std::process::id()));
    let result = f(self, &index);
    let _ = std::fs::remove_file(&index);
    result
  }

  fn run_indexed(&self, index: &Path, args: &[&str]) -> RailResult<String> {
    let output = self
      .git_cmd()
      .env("GIT_INDEX_FILE", index)
      .args(args)
      .output()
      .with_context(|| format!("Failed to run git {}", args.join(" ")))?;
    Self::check(args, output)
  }
}

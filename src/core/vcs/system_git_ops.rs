//! Additional operations for SystemGit (remotes, merges, worktrees, tags)

use super::system_git::SystemGit;
use crate::core::error::{GitError, RailError, RailResult, ResultExt};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

// `git worktree add/remove` update shared administrative files; builds create
// worktrees from several threads at once.
static WORKTREE_LOCK: Mutex<()> = Mutex::new(());

/// Outcome of `git merge --no-commit`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeState {
  /// Nothing to merge
  UpToDate,
  /// Merge staged without conflicts, not yet committed
  Clean,
  /// Merge staged with conflicts in these paths
  Conflicted(Vec<PathBuf>),
}

impl SystemGit {
  /// Add a remote repository
  pub fn add_remote(&self, name: &str, url: &str) -> RailResult<()> {
    let output = self
      .git_cmd()
      .args(["remote", "add", name, url])
      .output()
      .context("Failed to add remote")?;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      if stderr.contains("already exists") {
        return Ok(()); // Remote exists, not an error
      }
      return Err(RailError::Git(GitError::CommandFailed {
        command: "git remote add".to_string(),
        stderr: stderr.to_string(),
      }));
    }

    Ok(())
  }

  /// List all remotes
  pub fn list_remotes(&self) -> RailResult<Vec<(String, String)>> {
    let output = self
      .git_cmd()
      .args(["remote", "-v"])
      .output()
      .context("Failed to list remotes")?;

    if !output.status.success() {
      return Ok(vec![]);
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut remotes = Vec::new();

    for line in stdout.lines() {
      // Format: "origin  git@github.com:user/repo.git (fetch)"
      let mut parts = line.split_whitespace();
      if let (Some(name), Some(url)) = (parts.next(), parts.next())
        && line.contains("(fetch)")
      {
        remotes.push((name.to_string(), url.to_string()));
      }
    }

    Ok(remotes)
  }

  /// Check if remote exists
  pub fn has_remote(&self, name: &str) -> RailResult<bool> {
    let remotes = self.list_remotes()?;
    Ok(remotes.iter().any(|(n, _)| n == name))
  }

  /// Fetch from remote
  pub fn fetch_from_remote(&self, remote_name: &str) -> RailResult<()> {
    tracing::info!(remote = remote_name, "fetching");
    let output = self
      .git_cmd()
      .args(["fetch", "--no-tags", remote_name])
      .output()
      .context("Failed to fetch")?;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      return Err(RailError::Git(GitError::CommandFailed {
        command: "git fetch".to_string(),
        stderr: stderr.to_string(),
      }));
    }

    Ok(())
  }

  /// Push a single ref (branch or tag) to a remote
  pub fn push_ref(&self, remote_name: &str, refspec: &str) -> RailResult<()> {
    tracing::info!(remote = remote_name, refspec, "pushing");
    let output = self
      .git_cmd()
      .args(["push", remote_name, refspec])
      .output()
      .context("Failed to push")?;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      return Err(RailError::Git(GitError::PushFailed {
        remote: remote_name.to_string(),
        refspec: refspec.to_string(),
        reason: stderr.to_string(),
      }));
    }

    Ok(())
  }

  /// True when tracked files have no staged or unstaged changes
  pub fn is_clean(&self) -> RailResult<bool> {
    let status = self.run(&["status", "--porcelain", "--untracked-files=no"])?;
    Ok(status.is_empty())
  }

  /// Three-way merge `rev` into the checked-out branch without committing
  pub fn merge_no_commit(&self, rev: &str) -> RailResult<MergeState> {
    let before = self.head_commit()?;
    let output = self
      .git_cmd()
      .args(["merge", "--no-commit", "--no-ff", "--no-edit", rev])
      .output()
      .context("Failed to run git merge")?;

    let unmerged = self.unmerged_paths()?;
    if !unmerged.is_empty() {
      return Ok(MergeState::Conflicted(unmerged));
    }

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      return Err(RailError::Git(GitError::CommandFailed {
        command: format!("git merge {}", rev),
        stderr: stderr.to_string(),
      }));
    }

    if self.merge_in_progress() {
      Ok(MergeState::Clean)
    } else if self.head_commit()? == before {
      Ok(MergeState::UpToDate)
    } else {
      // Fast-forward is impossible with --no-ff; treat as staged
      Ok(MergeState::Clean)
    }
  }

  /// Paths git still reports as unmerged
  pub fn unmerged_paths(&self) -> RailResult<Vec<PathBuf>> {
    let listing = self.run(&["diff", "--name-only", "--diff-filter=U"])?;
    Ok(listing.lines().filter(|l| !l.is_empty()).map(PathBuf::from).collect())
  }

  /// True while `.git/MERGE_HEAD` exists
  pub fn merge_in_progress(&self) -> bool {
    self.git_dir.join("MERGE_HEAD").exists()
  }

  /// Abort an in-progress merge, restoring the pre-merge state
  pub fn abort_merge(&self) -> RailResult<()> {
    if self.merge_in_progress() {
      self.run(&["merge", "--abort"])?;
    }
    Ok(())
  }

  /// Stage paths (including deletions)
  pub fn stage(&self, paths: &[PathBuf]) -> RailResult<()> {
    if paths.is_empty() {
      return Ok(());
    }
    let mut cmd = self.git_cmd();
    cmd.args(["add", "-A", "--"]);
    for path in paths {
      cmd.arg(crate::utils::path_to_git_format(path));
    }
    let output = cmd.output().context("Failed to run git add")?;
    if !output.status.success() {
      return Err(RailError::Git(GitError::CommandFailed {
        command: "git add".to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
      }));
    }
    Ok(())
  }

  /// True when the index differs from HEAD or a merge is pending
  pub fn has_staged_changes(&self) -> RailResult<bool> {
    let output = self
      .git_cmd()
      .args(["diff", "--cached", "--quiet"])
      .output()
      .context("Failed to run git diff")?;
    Ok(!output.status.success() || self.merge_in_progress())
  }

  /// Commit the index (concludes a pending merge if there is one)
  pub fn commit_index(&self, message: &str) -> RailResult<String> {
    self.run(&["commit", "--no-verify", "-m", message])?;
    self.head_commit()
  }

  /// Create a detached worktree at `path` checked out at `commit`
  pub fn add_worktree(&self, path: &Path, commit: &str) -> RailResult<()> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    let path_str = path.to_string_lossy();
    let _guard = WORKTREE_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    self.run(&["worktree", "add", "--detach", "--force", &path_str, commit])?;
    Ok(())
  }

  /// Remove a worktree created by [`SystemGit::add_worktree`]
  pub fn remove_worktree(&self, path: &Path) -> RailResult<()> {
    let path_str = path.to_string_lossy();
    let _guard = WORKTREE_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    self.run(&["worktree", "remove", "--force", &path_str])?;
    Ok(())
  }

  /// Check out `commit` into a throwaway worktree under the system temp dir
  pub fn scratch_worktree(&self, label: &str, commit: &str) -> RailResult<ScratchWorktree<'_>> {
    let nanos = std::time::SystemTime::now()
      .duration_since(std::time::UNIX_EPOCH)
      .unwrap_or_default()
      .as_nanos();
    let path = std::env::temp_dir().join(format!("fork-rail-{}-{}-{}", label, std::process::id(), nanos));
    self.add_worktree(&path, commit)?;
    let git = match SystemGit::open(&path) {
      Ok(git) => git,
      Err(e) => {
        let _ = self.remove_worktree(&path);
        return Err(e);
      }
    };
    tracing::debug!(path = %path.display(), commit, "created scratch worktree");
    Ok(ScratchWorktree { owner: self, git, path })
  }
}

/// Worktree removed again when dropped
pub struct ScratchWorktree<'a> {
  owner: &'a SystemGit,
  git: SystemGit,
  path: PathBuf,
}

impl ScratchWorktree<'_> {
  pub fn git(&self) -> &SystemGit {
    &self.git
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl Drop for ScratchWorktree<'_> {
  fn drop(&mut self) {
    if let Err(e) = self.owner.remove_worktree(&self.path) {
      tracing::warn!(path = %self.path.display(), error = %e, "failed to remove scratch worktree");
    }
  }
}

//! Exclusive lock for operations that move the base branch
//!
//! Reconcile and stamp both rewrite the base branch pointer. Two of them must
//! never interleave, so each holds `.git/fork-rail.lock` for its whole run.
//! The lock is a file created with `create_new`; it is removed on drop.

use crate::core::error::{GitError, RailError, RailResult};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "fork-rail.lock";

#[derive(Debug)]
pub struct BranchLock {
  path: PathBuf,
}

impl BranchLock {
  /// Take the lock inside `git_dir`, failing fast if another run holds it
  pub fn acquire(git_dir: &Path, operation: &str) -> RailResult<Self> {
    let path = git_dir.join(LOCK_FILE);
    let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
      Ok(file) => file,
      Err(e) if e.kind() == ErrorKind::AlreadyExists => {
        return Err(RailError::Git(GitError::Locked { path }));
      }
      Err(e) => return Err(e.into()),
    };
    writeln!(file, "{} pid={}", operation, std::process::id())?;
    tracing::debug!(path = %path.display(), operation, "acquired branch lock");
    Ok(Self { path })
  }
}

impl Drop for BranchLock {
  fn drop(&mut self) {
    if let Err(e) = fs::remove_file(&self.path) {
      tracing::warn!(path = %self.path.display(), error = %e, "failed to release branch lock");
    }
  }
}

//! Version-control seams
//!
//! The base branch pointer is the one piece of shared state the reconciler and
//! the version stamper mutate. It is modelled as an explicit [`BranchHandle`]:
//! every mutating call takes the handle the caller last observed and returns the
//! next one, and the backend refuses the update if the branch moved in between.

pub mod system_git;
mod system_git_ops;

#[cfg(test)]
pub mod memory;

use crate::core::error::RailResult;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use system_git::SystemGit;
pub use system_git_ops::{MergeState, ScratchWorktree};

/// Observed state of a branch pointer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchHandle {
  pub branch: String,
  /// Commit the branch pointed at when this handle was produced
  pub head: String,
  /// Head this handle replaced, if it came from an update
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub previous: Option<String>,
}

impl BranchHandle {
  pub fn new(branch: impl Into<String>, head: impl Into<String>) -> Self {
    Self {
      branch: branch.into(),
      head: head.into(),
      previous: None,
    }
  }

  /// Handle describing a move from this head to `new_head`
  pub fn moved_to(&self, new_head: impl Into<String>) -> Self {
    Self {
      branch: self.branch.clone(),
      head: new_head.into(),
      previous: Some(self.head.clone()),
    }
  }
}

/// Compare-and-swap access to branch pointers
pub trait BranchStore {
  /// Read the current head of `branch`
  fn read_branch(&self, branch: &str) -> RailResult<BranchHandle>;

  /// Move `handle.branch` to `new_head`, failing with `GitError::BranchMoved`
  /// if the branch no longer points at `handle.head`
  fn advance(&self, handle: &BranchHandle, new_head: &str) -> RailResult<BranchHandle>;
}

/// Repository operations the release state machine needs
pub trait ReleaseRepo: BranchStore {
  /// File contents at a commit, `None` if the path does not exist there
  fn read_file_at(&self, commit: &str, path: &Path) -> RailResult<Option<String>>;

  /// Create a commit whose only change against `parent` is `path` set to
  /// `content`. Does not move any branch.
  fn commit_file(&self, parent: &str, path: &Path, content: &str, message: &str) -> RailResult<String>;

  /// Create an annotated tag. Fails if the tag already exists.
  fn create_annotated_tag(&self, tag: &str, commit: &str, message: &str) -> RailResult<()>;

  /// Commit a tag points at, `None` if the tag does not exist
  fn resolve_tag(&self, tag: &str) -> RailResult<Option<String>>;
}

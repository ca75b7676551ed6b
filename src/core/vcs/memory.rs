//! In-memory repository used to test branch and release protocols without git

use super::{BranchHandle, BranchStore, ReleaseRepo};
use crate::core::error::{GitError, RailError, RailResult};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct MemCommit {
  pub parent: Option<String>,
  pub files: HashMap<PathBuf, String>,
  pub message: String,
}

#[derive(Default)]
pub struct InMemoryRepo {
  commits: RefCell<HashMap<String, MemCommit>>,
  branches: RefCell<HashMap<String, String>>,
  tags: RefCell<HashMap<String, String>>,
  next_id: RefCell<u32>,
  /// Next `advance` moves the ref and then fails, like a work tree update error
  fail_after_move: RefCell<Option<String>>,
}

impl InMemoryRepo {
  /// Repo with a single root commit on `branch`
  pub fn with_files(branch: &str, files: &[(&str, &str)]) -> Self {
    let repo = Self::default();
    let files = files
      .iter()
      .map(|(p, c)| (PathBuf::from(p), c.to_string()))
      .collect();
    let sha = repo.insert(MemCommit {
      parent: None,
      files,
      message: "root".to_string(),
    });
    repo.branches.borrow_mut().insert(branch.to_string(), sha);
    repo
  }

  fn insert(&self, commit: MemCommit) -> String {
    let mut id = self.next_id.borrow_mut();
    *id += 1;
    let sha = format!("{:040x}", *id);
    self.commits.borrow_mut().insert(sha.clone(), commit);
    sha
  }

  pub fn commit(&self, sha: &str) -> Option<MemCommit> {
    self.commits.borrow().get(sha).cloned()
  }

  /// Move a branch without any check, simulating a concurrent writer
  pub fn force_branch(&self, branch: &str, sha: &str) {
    self.branches.borrow_mut().insert(branch.to_string(), sha.to_string());
  }

  /// Make the next `advance` of `branch` fail after the ref has moved
  pub fn fail_next_checkout(&self, branch: &str) {
    *self.fail_after_move.borrow_mut() = Some(branch.to_string());
  }
}

impl BranchStore for InMemoryRepo {
  fn read_branch(&self, branch: &str) -> RailResult<BranchHandle> {
    let head = self
      .branches
      .borrow()
      .get(branch)
      .cloned()
      .ok_or_else(|| RailError::message(format!("no branch {}", branch)))?;
    Ok(BranchHandle::new(branch, head))
  }

  fn advance(&self, handle: &BranchHandle, new_head: &str) -> RailResult<BranchHandle> {
    let mut branches = self.branches.borrow_mut();
    let actual = branches.get(&handle.branch).cloned().unwrap_or_default();
    if actual != handle.head {
      return Err(RailError::Git(GitError::BranchMoved {
        branch: handle.branch.clone(),
        expected: handle.head.clone(),
        actual,
      }));
    }
    branches.insert(handle.branch.clone(), new_head.to_string());
    if self.fail_after_move.borrow().as_deref() == Some(handle.branch.as_str()) {
      self.fail_after_move.borrow_mut().take();
      return Err(RailError::message(format!("checkout of {} failed", handle.branch)));
    }
    Ok(handle.moved_to(new_head))
  }
}

impl ReleaseRepo for InMemoryRepo {
  fn read_file_at(&self, commit: &str, path: &Path) -> RailResult<Option<String>> {
    let commits = self.commits.borrow();
    let commit = commits.get(commit).ok_or_else(|| {
      RailError::Git(GitError::CommitNotFound {
        sha: commit.to_string(),
      })
    })?;
    Ok(commit.files.get(path).cloned())
  }

  fn commit_file(&self, parent: &str, path: &Path, content: &str, message: &str) -> RailResult<String> {
    let mut files = self
      .commit(parent)
      .ok_or_else(|| {
        RailError::Git(GitError::CommitNotFound {
          sha: parent.to_string(),
        })
      })?
      .files;
    files.insert(path.to_path_buf(), content.to_string());
    Ok(self.insert(MemCommit {
      parent: Some(parent.to_string()),
      files,
      message: message.to_string(),
    }))
  }

  fn create_annotated_tag(&self, tag: &str, commit: &str, _message: &str) -> RailResult<()> {
    let mut tags = self.tags.borrow_mut();
    if tags.contains_key(tag) {
      return Err(RailError::message(format!("tag {} already exists", tag)));
    }
    tags.insert(tag.to_string(), commit.to_string());
    Ok(())
  }

  fn resolve_tag(&self, tag: &str) -> RailResult<Option<String>> {
    Ok(self.tags.borrow().get(tag).cloned())
  }
}

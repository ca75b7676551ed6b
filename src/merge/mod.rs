//! Upstream merge with ledger reconciliation
//!
//! ```text
//! lock base branch -> fetch upstream -> git merge --no-commit
//!   -> Reconciler (take upstream side of governed hunks, re-apply rules)
//!   -> stage -> commit -> verify the branch only moved by our commit
//! ```
//!
//! On any failure the merge is left in progress so the maintainer can finish
//! it by hand. Dry runs do the same work in a scratch worktree and throw it away.

pub mod conflict;
pub mod reconcile;

pub use reconcile::{FileStore, MergeReport, Reconciler, RuleOutcome, WorktreeFiles};

use crate::core::config::RailConfig;
use crate::core::error::{GitError, RailError, RailResult};
use crate::core::lock::BranchLock;
use crate::core::vcs::{BranchHandle, BranchStore, MergeState, SystemGit};
use crate::ledger::Ledger;
use crate::ledger::state::ReviewState;
use serde::Serialize;
use std::path::PathBuf;

/// Options for one upstream sync
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
  /// Revision to merge instead of `<upstream.remote>/<upstream.branch>`
  pub upstream_ref: Option<String>,
  /// Commit the result to the base branch (otherwise dry run)
  pub apply: bool,
}

/// Result of a sync
#[derive(Debug, Clone, Serialize)]
pub struct ReconciledCommit {
  /// Base branch after the sync
  pub handle: BranchHandle,
  pub upstream_ref: String,
  pub upstream_commit: String,
  /// Merge commit, `None` for dry runs or when there was nothing to do
  pub commit: Option<String>,
  pub up_to_date: bool,
  pub report: MergeReport,
}

/// Merge upstream into the base branch and reconcile the ledger
pub fn sync_upstream(
  git: &SystemGit,
  config: &RailConfig,
  ledger: &Ledger,
  state: &mut ReviewState,
  options: &SyncOptions,
) -> RailResult<ReconciledCommit> {
  let upstream_ref = match &options.upstream_ref {
    Some(rev) => rev.clone(),
    None => {
      if !git.has_remote(&config.upstream.remote)? {
        tracing::info!(remote = %config.upstream.remote, url = %config.upstream.url, "adding upstream remote");
        git.add_remote(&config.upstream.remote, &config.upstream.url)?;
      }
      git.fetch_from_remote(&config.upstream.remote)?;
      config.upstream.merge_ref()
    }
  };

  let upstream_commit = git.resolve_commit(&upstream_ref)?.ok_or_else(|| {
    RailError::with_help(
      format!("Upstream revision '{}' does not exist", upstream_ref),
      "Check `[upstream]` in fork-rail.toml or pass --upstream <ref>.",
    )
  })?;

  if options.apply {
    apply_sync(git, config, ledger, state, upstream_ref, upstream_commit)
  } else {
    let mut scratch_state = state.clone();
    dry_run_sync(git, config, ledger, &mut scratch_state, upstream_ref, upstream_commit)
  }
}

fn apply_sync(
  git: &SystemGit,
  config: &RailConfig,
  ledger: &Ledger,
  state: &mut ReviewState,
  upstream_ref: String,
  upstream_commit: String,
) -> RailResult<ReconciledCommit> {
  let _lock = BranchLock::acquire(git.git_dir(), "sync")?;

  let base = &config.base.branch;
  let current = git.current_branch()?;
  if &current != base {
    return Err(RailError::Git(GitError::BranchError {
      message: format!("sync must run on '{}' but '{}' is checked out", base, current),
    }));
  }
  if git.merge_in_progress() {
    return Err(RailError::with_help(
      "A merge is already in progress",
      "Finish it with `git commit` or abort it with `git merge --abort`, then run sync again.",
    ));
  }
  if !git.is_clean()? {
    return Err(RailError::with_help(
      format!("Working tree of '{}' has uncommitted changes", base),
      "Commit or stash local changes before syncing.",
    ));
  }

  let handle = git.read_branch(base)?;
  let merge = git.merge_no_commit(&upstream_ref)?;
  let unmerged = match &merge {
    MergeState::Conflicted(paths) => paths.clone(),
    _ => Vec::new(),
  };
  let up_to_date = merge == MergeState::UpToDate;
  tracing::info!(upstream = %upstream_ref, conflicts = unmerged.len(), up_to_date, "merge staged");

  let mut files = WorktreeFiles::new(git.work_tree());
  let report = Reconciler::new(ledger).reconcile(&mut files, &unmerged, state)?;

  let mut to_stage: Vec<PathBuf> = report.written.clone();
  to_stage.extend(unmerged.iter().cloned());
  git.stage(&to_stage)?;

  if !git.has_staged_changes()? {
    return Ok(ReconciledCommit {
      handle,
      upstream_ref,
      upstream_commit,
      commit: None,
      up_to_date,
      report,
    });
  }

  let message = commit_message(&upstream_ref, &config.base.branch, up_to_date, &report);
  let commit = git.commit_index(&message)?;

  // The lock keeps other fork-rail runs out; this catches anything else that
  // moved the branch while the merge was staged.
  let parent = git.resolve_commit(&format!("{}^1", commit))?.unwrap_or_default();
  if parent != handle.head {
    return Err(RailError::Git(GitError::BranchMoved {
      branch: handle.branch.clone(),
      expected: handle.head.clone(),
      actual: parent,
    }));
  }

  Ok(ReconciledCommit {
    handle: handle.moved_to(&commit),
    upstream_ref,
    upstream_commit,
    commit: Some(commit),
    up_to_date,
    report,
  })
}

fn dry_run_sync(
  git: &SystemGit,
  config: &RailConfig,
  ledger: &Ledger,
  state: &mut ReviewState,
  upstream_ref: String,
  upstream_commit: String,
) -> RailResult<ReconciledCommit> {
  let handle = git.read_branch(&config.base.branch)?;
  let scratch = git.scratch_worktree("sync", &handle.head)?;

  let merge = scratch.git().merge_no_commit(&upstream_commit)?;
  let unmerged = match &merge {
    MergeState::Conflicted(paths) => paths.clone(),
    _ => Vec::new(),
  };

  let mut files = WorktreeFiles::new(scratch.path());
  let report = Reconciler::new(ledger).reconcile(&mut files, &unmerged, state)?;
  scratch.git().abort_merge()?;

  Ok(ReconciledCommit {
    handle,
    upstream_ref,
    upstream_commit,
    commit: None,
    up_to_date: merge == MergeState::UpToDate,
    report,
  })
}

fn commit_message(upstream_ref: &str, base: &str, up_to_date: bool, report: &MergeReport) -> String {
  let mut message = if up_to_date {
    format!("Reapply fork customizations on {} (already at {})", base, upstream_ref)
  } else {
    format!("Merge {} into {}", upstream_ref, base)
  };
  let reapplied: Vec<&str> = report.reapplied().map(|r| r.id.as_str()).collect();
  if !reapplied.is_empty() {
    message.push_str(&format!("\n\nReapplied customizations: {}", reapplied.join(", ")));
  }
  let stale: Vec<&str> = report.stale().map(|r| r.id.as_str()).collect();
  if !stale.is_empty() {
    message.push_str(&format!("\nStale rules: {}", stale.join(", ")));
  }
  message
}

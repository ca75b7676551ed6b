//! Re-apply the customization ledger on top of a merged tree

use super::conflict::{has_conflict_markers, take_upstream};
use crate::core::error::{MergeError, RailError, RailResult, ResultExt};
use crate::ledger::state::ReviewState;
use crate::ledger::{Application, Category, Ledger, ungoverned};
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Where the reconciler reads and writes governed files
pub trait FileStore {
  /// Current contents, `None` if the file does not exist
  fn read(&self, path: &Path) -> RailResult<Option<String>>;
  fn write(&mut self, path: &Path, content: &str) -> RailResult<()>;
}

/// Files in a git working tree
pub struct WorktreeFiles {
  root: PathBuf,
}

impl WorktreeFiles {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }
}

impl FileStore for WorktreeFiles {
  fn read(&self, path: &Path) -> RailResult<Option<String>> {
    let full = self.root.join(path);
    if !full.is_file() {
      return Ok(None);
    }
    let content = fs::read_to_string(&full).with_context(|| format!("Failed to read {}", full.display()))?;
    Ok(Some(content))
  }

  fn write(&mut self, path: &Path, content: &str) -> RailResult<()> {
    let full = self.root.join(path);
    fs::write(&full, content).with_context(|| format!("Failed to write {}", full.display()))
  }
}

/// What happened to one rule during reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "status")]
pub enum RuleOutcome {
  /// Already present, nothing written
  Satisfied,
  /// Upstream text rewritten
  Reapplied { hits: usize },
  /// Governed file missing; rule skipped and kept
  Stale,
  /// Governed file reappeared after being stale; rule held for review
  NeedsReview,
  /// Unsatisfied and the matcher finds nothing to rewrite (`ledger check` only)
  AnchorMissing,
}

#[derive(Debug, Clone, Serialize)]
pub struct RuleReport {
  pub id: String,
  pub path: PathBuf,
  pub category: Category,
  #[serde(flatten)]
  pub outcome: RuleOutcome,
}

/// Record of one reconciliation
#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeReport {
  /// Every rule in ledger order
  pub rules: Vec<RuleReport>,
  /// Governed files whose conflict hunks were resolved to upstream
  pub conflicts_resolved: Vec<PathBuf>,
  /// Files written by the reconciler
  pub written: Vec<PathBuf>,
}

impl MergeReport {
  fn with_outcome(&self, wanted: fn(&RuleOutcome) -> bool) -> impl Iterator<Item = &RuleReport> {
    self.rules.iter().filter(move |r| wanted(&r.outcome))
  }

  pub fn reapplied(&self) -> impl Iterator<Item = &RuleReport> {
    self.with_outcome(|o| matches!(o, RuleOutcome::Reapplied { .. }))
  }

  pub fn stale(&self) -> impl Iterator<Item = &RuleReport> {
    self.with_outcome(|o| matches!(o, RuleOutcome::Stale))
  }

  pub fn needs_review(&self) -> impl Iterator<Item = &RuleReport> {
    self.with_outcome(|o| matches!(o, RuleOutcome::NeedsReview))
  }
}

/// Applies a ledger to a set of files after a merge
pub struct Reconciler<'a> {
  ledger: &'a Ledger,
}

impl<'a> Reconciler<'a> {
  pub fn new(ledger: &'a Ledger) -> Self {
    Self { ledger }
  }

  /// Resolve governed conflicts and bring every rule back to satisfied
  ///
  /// `unmerged` lists the paths git left conflicted. Conflicts outside the
  /// ledger are surfaced before anything is written. Rules run file by file in
  /// ledger order; a rule whose anchor vanished halts reconciliation.
  pub fn reconcile<F: FileStore>(
    &self,
    files: &mut F,
    unmerged: &[PathBuf],
    state: &mut ReviewState,
  ) -> RailResult<MergeReport> {
    if let Some(first) = ungoverned(self.ledger, unmerged).first() {
      let others = ungoverned(self.ledger, unmerged).len() - 1;
      let reason = if others == 0 {
        "conflict in a file no ledger rule governs".to_string()
      } else {
        format!("conflict in a file no ledger rule governs ({} more ungoverned)", others)
      };
      return Err(RailError::Merge(MergeError::UnresolvableConflict {
        path: (*first).clone(),
        rule: None,
        reason,
      }));
    }

    let conflicted: HashSet<&Path> = unmerged.iter().map(PathBuf::as_path).collect();
    let mut report = MergeReport::default();
    let mut outcomes = Vec::new();

    for path in self.ledger.governed_paths() {
      let Some(original) = files.read(path)? else {
        for rule in self.ledger.rules_for(path) {
          tracing::warn!(rule = %rule.id, path = %path.display(), "stale customization rule, governed file is missing");
          state.mark_stale(&rule.id, path);
          outcomes.push((rule.id.clone(), RuleOutcome::Stale));
        }
        continue;
      };

      let mut current = original.clone();
      if conflicted.contains(path) && has_conflict_markers(&current) {
        let (resolved, hunks) = take_upstream(path, &current)?;
        tracing::info!(path = %path.display(), hunks, "took upstream side of conflict hunks");
        current = resolved;
        report.conflicts_resolved.push(path.to_path_buf());
      }

      for rule in self.ledger.rules_for(path) {
        if state.mark_reappeared(&rule.id) || state.is_held(&rule.id) {
          tracing::warn!(rule = %rule.id, path = %path.display(), "governed file reappeared, rule held for review");
          outcomes.push((rule.id.clone(), RuleOutcome::NeedsReview));
          continue;
        }

        let outcome = match rule.evaluate(&current)? {
          Application::Satisfied => RuleOutcome::Satisfied,
          Application::Rewritten { content, hits } => {
            tracing::info!(rule = %rule.id, path = %path.display(), hits, "reapplied customization rule");
            current = content;
            RuleOutcome::Reapplied { hits }
          }
          Application::AnchorMissing => return Err(rule.anchor_missing()),
        };
        outcomes.push((rule.id.clone(), outcome));
      }

      if current != original {
        files.write(path, &current)?;
        report.written.push(path.to_path_buf());
      }
    }

    // Report in ledger order, not file order
    for rule in self.ledger.rules() {
      if let Some((_, outcome)) = outcomes.iter().find(|(id, _)| *id == rule.id) {
        report.rules.push(RuleReport {
          id: rule.id.clone(),
          path: rule.scope_path.clone(),
          category: rule.category,
          outcome: *outcome,
        });
      }
    }

    Ok(report)
  }

  /// Evaluate every rule against `files` without writing or touching review state
  ///
  /// Conflict markers are not resolved, so run this on a clean tree.
  pub fn check<F: FileStore>(&self, files: &F, state: &ReviewState) -> RailResult<MergeReport> {
    let mut report = MergeReport::default();
    let mut outcomes = Vec::new();

    for path in self.ledger.governed_paths() {
      let Some(mut current) = files.read(path)? else {
        outcomes.extend(self.ledger.rules_for(path).map(|r| (r.id.clone(), RuleOutcome::Stale)));
        continue;
      };
      for rule in self.ledger.rules_for(path) {
        if state.is_held(&rule.id) || state.stale.contains_key(&rule.id) {
          outcomes.push((rule.id.clone(), RuleOutcome::NeedsReview));
          continue;
        }
        let outcome = match rule.evaluate(&current)? {
          Application::Satisfied => RuleOutcome::Satisfied,
          Application::Rewritten { content, hits } => {
            current = content;
            RuleOutcome::Reapplied { hits }
          }
          Application::AnchorMissing => RuleOutcome::AnchorMissing,
        };
        outcomes.push((rule.id.clone(), outcome));
      }
    }

    for rule in self.ledger.rules() {
      if let Some((_, outcome)) = outcomes.iter().find(|(id, _)| *id == rule.id) {
        report.rules.push(RuleReport {
          id: rule.id.clone(),
          path: rule.scope_path.clone(),
          category: rule.category,
          outcome: *outcome,
        });
      }
    }
    Ok(report)
  }
}

//! Review state for stale rules
//!
//! A rule whose file disappears upstream is recorded here instead of being
//! deleted. When the file comes back the rule is held for a human to look at
//! before it is applied again.

use crate::core::error::{RailResult, ResultExt};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaleEntry {
  pub path: PathBuf,
  pub since: DateTime<Utc>,
}

/// Persisted in `.fork-rail/state.json`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewState {
  /// Rules whose governed file was missing at the last reconcile
  #[serde(default)]
  pub stale: BTreeMap<String, StaleEntry>,
  /// Rules whose file reappeared; skipped until reviewed
  #[serde(default)]
  pub needs_review: BTreeMap<String, StaleEntry>,
}

impl ReviewState {
  pub fn load(path: &Path) -> RailResult<Self> {
    if !path.exists() {
      return Ok(Self::default());
    }
    let content = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(serde_json::from_str(&content)?)
  }

  pub fn save(&self, path: &Path) -> RailResult<()> {
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(self)?;
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
  }

  /// Record `id` as stale; keeps the original timestamp if already stale
  pub fn mark_stale(&mut self, id: &str, path: &Path) {
    self.stale.entry(id.to_string()).or_insert_with(|| StaleEntry {
      path: path.to_path_buf(),
      since: Utc::now(),
    });
  }

  /// Move a stale rule to needs-review. Returns false if it was not stale.
  pub fn mark_reappeared(&mut self, id: &str) -> bool {
    match self.stale.remove(id) {
      Some(entry) => {
        self.needs_review.insert(id.to_string(), entry);
        true
      }
      None => false,
    }
  }

  pub fn is_held(&self, id: &str) -> bool {
    self.needs_review.contains_key(id)
  }

  /// Clear any record of `id`. Returns whether anything was cleared.
  pub fn clear(&mut self, id: &str) -> bool {
    let a = self.stale.remove(id).is_some();
    let b = self.needs_review.remove(id).is_some();
    a || b
  }

  /// Drop entries for rules no longer in the ledger
  pub fn retain_rules<'a>(&mut self, ids: impl IntoIterator<Item = &'a str>) {
    let keep: std::collections::HashSet<&str> = ids.into_iter().collect();
    self.stale.retain(|id, _| keep.contains(id.as_str()));
    self.needs_review.retain(|id, _| keep.contains(id.as_str()));
  }
}

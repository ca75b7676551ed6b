//! Progress indicators for per-target builds
//!
//! Uses `linya` for allocation-free, concurrency-optimized progress bars.
//! Builds run on rayon workers, so the shared `Progress` sits behind a mutex.

use linya::{Bar, Progress};
use std::sync::{Arc, Mutex};

/// One bar per build target, safe to tick from worker threads
#[derive(Clone)]
pub struct BuildProgress {
  progress: Option<Arc<Mutex<Progress>>>,
}

impl BuildProgress {
  /// Visible progress container
  pub fn new() -> Self {
    Self {
      progress: Some(Arc::new(Mutex::new(Progress::new()))),
    }
  }

  /// Container that draws nothing (JSON output, tests)
  pub fn hidden() -> Self {
    Self { progress: None }
  }

  /// Add a bar with a label and total
  pub fn add_bar(&self, total: usize, label: impl Into<String>) -> Option<Bar> {
    let progress = self.progress.as_ref()?;
    let mut progress = progress.lock().unwrap_or_else(|e| e.into_inner());
    Some(progress.bar(total, label.into()))
  }

  /// Increment a bar (thread-safe)
  pub fn inc(&self, bar: Option<&Bar>) {
    if let (Some(progress), Some(bar)) = (self.progress.as_ref(), bar) {
      let mut progress = progress.lock().unwrap_or_else(|e| e.into_inner());
      progress.inc_and_draw(bar, 1);
    }
  }
}

impl Default for BuildProgress {
  fn default() -> Self {
    Self::new()
  }
}

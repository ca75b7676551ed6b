//! Repository context, built once in `main` and passed to every command

use crate::core::config::RailConfig;
use crate::core::error::{RailError, RailResult};
use crate::core::vcs::SystemGit;
use std::path::{Path, PathBuf};

/// Fork repository state shared by commands
pub struct WorkspaceContext {
  /// Repository work tree (absolute path)
  pub root: PathBuf,

  pub git: SystemGit,

  /// `None` until `fork-rail init` has been run
  pub config: Option<RailConfig>,
}

impl WorkspaceContext {
  /// Open the repository containing `path` and load its config if present
  pub fn build(path: &Path) -> RailResult<Self> {
    let git = SystemGit::open(path)?;
    let root = git.work_tree().to_path_buf();
    let config = if RailConfig::exists(&root) {
      Some(RailConfig::load(&root)?)
    } else {
      None
    };
    Ok(Self { root, git, config })
  }

  /// Get config or error if not found
  pub fn require_config(&self) -> RailResult<&RailConfig> {
    self.config.as_ref().ok_or_else(|| {
      RailError::with_help(
        format!("No fork-rail.toml found in {}", self.root.display()),
        "Run `fork-rail init` to create one.",
      )
    })
  }

  /// Resolve a config-relative path against the repository root
  pub fn path(&self, relative: &Path) -> PathBuf {
    self.root.join(relative)
  }

  /// `.fork-rail/` state directory
  pub fn state_dir(&self) -> PathBuf {
    self.root.join(".fork-rail")
  }

  /// Stale and needs-review rule state
  pub fn review_state_path(&self) -> PathBuf {
    self.state_dir().join("state.json")
  }

  /// First-build checksums per tag and target
  pub fn checksums_path(&self) -> PathBuf {
    self.state_dir().join("checksums.json")
  }

  /// Open stamp record between `release stamp` and `release reset`
  pub fn stamp_path(&self) -> PathBuf {
    self.state_dir().join("stamp.json")
  }
}

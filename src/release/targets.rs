//! Platform target registry
//!
//! Static list of (os, arch, libc) build targets. A target is only active when a
//! free runner class exists for it; everything else stays recorded with
//! `supported = false` so it can be re-enabled later. Targets leave the
//! registry only through [`TargetRegistry::remove`].

use crate::core::error::{RailError, RailResult, ResultExt, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

/// C library / ABI variant of a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Libc {
  Gnu,
  Musl,
  Msvc,
}

impl Libc {
  fn as_str(self) -> &'static str {
    match self {
      Libc::Gnu => "gnu",
      Libc::Musl => "musl",
      Libc::Msvc => "msvc",
    }
  }
}

/// CI runner class a target needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RunnerClass {
  Free,
  Paid,
}

/// One entry of the build matrix
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlatformTarget {
  pub os: String,
  pub arch: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub libc: Option<Libc>,
  pub runner: RunnerClass,
  pub supported: bool,
}

impl PlatformTarget {
  pub fn new(os: &str, arch: &str, libc: Option<Libc>, runner: RunnerClass, supported: bool) -> Self {
    Self {
      os: os.to_string(),
      arch: arch.to_string(),
      libc,
      runner,
      supported,
    }
  }

  /// Rust target triple, e.g. `x86_64-unknown-linux-musl`
  pub fn triple(&self) -> String {
    match (self.os.as_str(), self.libc) {
      ("macos", _) => format!("{}-apple-darwin", self.arch),
      ("windows", libc) => format!("{}-pc-windows-{}", self.arch, libc.unwrap_or(Libc::Msvc).as_str()),
      (os, Some(libc)) => format!("{}-unknown-{}-{}", self.arch, os, libc.as_str()),
      (os, None) => format!("{}-unknown-{}", self.arch, os),
    }
  }

  /// Required targets block the whole release when they fail
  pub fn is_required(&self) -> bool {
    self.supported
  }
}

impl fmt::Display for PlatformTarget {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.triple())
  }
}

/// Validated, ordered set of platform targets
#[derive(Debug, Clone)]
pub struct TargetRegistry {
  targets: Vec<PlatformTarget>,
}

impl TargetRegistry {
  /// Build a registry, enforcing `supported => free` and unique triples
  pub fn new(targets: Vec<PlatformTarget>) -> RailResult<Self> {
    let mut seen = std::collections::HashSet::new();
    for target in &targets {
      if target.supported && target.runner != RunnerClass::Free {
        return Err(RailError::Validation(ValidationError::TargetRegistry {
          reason: format!("{} is marked supported but needs a paid runner", target.triple()),
        }));
      }
      if !seen.insert(target.triple()) {
        return Err(RailError::Validation(ValidationError::TargetRegistry {
          reason: format!("{} is listed twice", target.triple()),
        }));
      }
    }
    Ok(Self { targets })
  }

  /// Every recorded target, supported or not, in registry order
  pub fn all(&self) -> &[PlatformTarget] {
    &self.targets
  }

  /// Targets that build on every release
  pub fn active_targets(&self) -> Vec<PlatformTarget> {
    self
      .targets
      .iter()
      .filter(|t| t.supported && t.runner == RunnerClass::Free)
      .cloned()
      .collect()
  }

  pub fn find(&self, triple: &str) -> Option<&PlatformTarget> {
    self.targets.iter().find(|t| t.triple() == triple)
  }

  /// Record a new target. Paid-only targets are recorded but never activated.
  pub fn add(&mut self, mut target: PlatformTarget) -> RailResult<&PlatformTarget> {
    if self.find(&target.triple()).is_some() {
      return Err(RailError::Validation(ValidationError::TargetRegistry {
        reason: format!("{} is already registered", target.triple()),
      }));
    }
    if target.runner == RunnerClass::Paid && target.supported {
      tracing::warn!(target = %target.triple(), "no free runner; recording target as unsupported");
      target.supported = false;
    }
    self.targets.push(target);
    let added = self.targets.len() - 1;
    Ok(&self.targets[added])
  }

  /// Explicitly remove a target from history
  pub fn remove(&mut self, triple: &str) -> RailResult<PlatformTarget> {
    let idx = self
      .targets
      .iter()
      .position(|t| t.triple() == triple)
      .ok_or_else(|| RailError::message(format!("Target '{}' is not registered", triple)))?;
    Ok(self.targets.remove(idx))
  }

  /// Toggle whether a recorded target builds. Enabling requires a free runner.
  pub fn set_supported(&mut self, triple: &str, supported: bool) -> RailResult<()> {
    let target = self
      .targets
      .iter_mut()
      .find(|t| t.triple() == triple)
      .ok_or_else(|| RailError::message(format!("Target '{}' is not registered", triple)))?;
    if supported && target.runner != RunnerClass::Free {
      return Err(RailError::Validation(ValidationError::TargetRegistry {
        reason: format!("{} has no free runner class", triple),
      }));
    }
    target.supported = supported;
    Ok(())
  }

  /// Write the registry back into the `[[targets]]` array of a config file,
  /// leaving every other section's formatting untouched
  pub fn save_into(&self, config_path: &Path) -> RailResult<()> {
    let content = fs::read_to_string(config_path)
      .with_context(|| format!("Failed to read config from {}", config_path.display()))?;
    let mut doc: toml_edit::DocumentMut = content.parse()?;

    let mut array = toml_edit::ArrayOfTables::new();
    for target in &self.targets {
      let mut table = toml_edit::Table::new();
      table["os"] = toml_edit::value(target.os.as_str());
      table["arch"] = toml_edit::value(target.arch.as_str());
      if let Some(libc) = target.libc {
        table["libc"] = toml_edit::value(libc.as_str());
      }
      table["runner"] = toml_edit::value(match target.runner {
        RunnerClass::Free => "free",
        RunnerClass::Paid => "paid",
      });
      table["supported"] = toml_edit::value(target.supported);
      array.push(table);
    }
    doc.insert("targets", toml_edit::Item::ArrayOfTables(array));

    fs::write(config_path, doc.to_string())
      .with_context(|| format!("Failed to write config to {}", config_path.display()))?;
    Ok(())
  }
}

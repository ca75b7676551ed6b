//! Conditional publishing
//!
//! The fork publishes under its own scope, and only the allow-listed packages.
//! A registry only ever receives an [`AdmittedPackage`], and the only way to
//! obtain one is [`PublishDecision::admit`], which checks the allow-list.

use crate::core::config::PublishConfig;
use crate::core::error::{RailError, RailResult, ReleaseError, ResultExt};
use crate::release::build::ReleaseArtifact;
use crate::release::tag::{Channel, VersionTag};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Registry dist-tag a release is published under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DistTag {
  Latest,
  Alpha,
  Beta,
}

impl fmt::Display for DistTag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      DistTag::Latest => "latest",
      DistTag::Alpha => "alpha",
      DistTag::Beta => "beta",
    };
    f.write_str(s)
  }
}

/// Where and how one release is published. Computed per run from the tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishDecision {
  pub scope: String,
  /// Scoped name of the primary package, e.g. `@echoflux537/codex`
  pub package_name: String,
  pub dist_tag: DistTag,
  pub version: String,
  pub allowed_packages: Vec<String>,
}

/// Map a validated tag to its publish decision
///
/// Stable and product releases go to `latest` explicitly, so the registry never
/// falls back to its own default. Alpha and beta never touch `latest`.
pub fn decide(tag: &VersionTag, config: &PublishConfig) -> PublishDecision {
  let dist_tag = match tag.channel {
    Channel::Stable | Channel::Product(_) => DistTag::Latest,
    Channel::Alpha => DistTag::Alpha,
    Channel::Beta => DistTag::Beta,
  };
  let primary = config.allowed_packages.first().map(String::as_str).unwrap_or_default();
  PublishDecision {
    scope: config.scope.clone(),
    package_name: scoped(&config.scope, primary),
    dist_tag,
    version: tag.version_string(),
    allowed_packages: config.allowed_packages.clone(),
  }
}

fn scoped(scope: &str, name: &str) -> String {
  format!("{}/{}", scope.trim_end_matches('/'), name)
}

/// All artifacts of one package across targets
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageBundle {
  pub name: String,
  pub artifacts: Vec<ReleaseArtifact>,
}

impl PackageBundle {
  /// Group artifacts by package, in package-name order
  pub fn group<'a>(artifacts: impl IntoIterator<Item = &'a ReleaseArtifact>) -> Vec<PackageBundle> {
    let mut by_name: BTreeMap<String, Vec<ReleaseArtifact>> = BTreeMap::new();
    for artifact in artifacts {
      by_name.entry(artifact.package.clone()).or_default().push(artifact.clone());
    }
    by_name
      .into_iter()
      .map(|(name, artifacts)| PackageBundle { name, artifacts })
      .collect()
  }
}

/// A bundle that passed the allow-list. Fields are private to this module.
#[derive(Debug, Clone)]
pub struct AdmittedPackage {
  name: String,
  qualified_name: String,
  artifacts: Vec<ReleaseArtifact>,
}

impl AdmittedPackage {
  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn qualified_name(&self) -> &str {
    &self.qualified_name
  }

  pub fn artifacts(&self) -> &[ReleaseArtifact] {
    &self.artifacts
  }
}

impl PublishDecision {
  pub fn is_allowed(&self, package: &str) -> bool {
    self.allowed_packages.iter().any(|p| p == package)
  }

  /// Admit a bundle if it is allow-listed, otherwise hand it back
  pub fn admit(&self, bundle: PackageBundle) -> Result<AdmittedPackage, PackageBundle> {
    if !self.is_allowed(&bundle.name) {
      return Err(bundle);
    }
    Ok(AdmittedPackage {
      qualified_name: scoped(&self.scope, &bundle.name),
      name: bundle.name,
      artifacts: bundle.artifacts,
    })
  }
}

/// Package sink
pub trait Registry {
  /// Publish one package; `Err` carries the registry's rejection reason
  fn publish(&self, decision: &PublishDecision, package: &AdmittedPackage) -> Result<(), String>;
}

/// Split of a run's packages into what goes out and what stays local
#[derive(Debug, Clone)]
pub struct PublishPlan {
  pub admitted: Vec<AdmittedPackage>,
  pub withheld: Vec<PackageBundle>,
}

impl PublishPlan {
  /// Apply the allow-list, and require every allow-listed package to have artifacts
  pub fn new(decision: &PublishDecision, bundles: Vec<PackageBundle>) -> RailResult<Self> {
    let mut admitted = Vec::new();
    let mut withheld = Vec::new();
    for bundle in bundles {
      match decision.admit(bundle) {
        Ok(pkg) if !pkg.artifacts.is_empty() => admitted.push(pkg),
        Ok(pkg) => withheld.push(PackageBundle {
          name: pkg.name,
          artifacts: pkg.artifacts,
        }),
        Err(bundle) => withheld.push(bundle),
      }
    }

    for wanted in &decision.allowed_packages {
      if !admitted.iter().any(|p| &p.name == wanted) {
        return Err(RailError::Release(ReleaseError::PublishRejected {
          package: scoped(&decision.scope, wanted),
          reason: "no artifacts were built for this allow-listed package".to_string(),
        }));
      }
    }

    Ok(Self { admitted, withheld })
  }

  pub fn withheld_names(&self) -> Vec<String> {
    self.withheld.iter().map(|b| b.name.clone()).collect()
  }

  /// Publish admitted packages one at a time. The first rejection stops the
  /// run; nothing is retried. Packages accepted before the rejection are
  /// still reported.
  pub fn execute<R: Registry>(&self, registry: &R, decision: &PublishDecision) -> PublishReport {
    let mut report = PublishReport::default();
    for package in &self.admitted {
      tracing::info!(
        package = %package.qualified_name,
        version = %decision.version,
        dist_tag = %decision.dist_tag,
        "publishing"
      );
      if let Err(reason) = registry.publish(decision, package) {
        tracing::error!(package = %package.qualified_name, reason = %reason, "registry rejected publish");
        report.rejection = Some(RailError::Release(ReleaseError::PublishRejected {
          package: package.qualified_name.clone(),
          reason,
        }));
        return report;
      }
      report.accepted.push(package.name.clone());
      report.published.push(package.qualified_name.clone());
    }
    for bundle in &self.withheld {
      tracing::info!(package = %bundle.name, "withheld, not on the allow-list");
    }
    report
  }
}

/// What the registry accepted during one publish run
#[derive(Debug, Default)]
pub struct PublishReport {
  /// Unscoped names of accepted packages
  pub accepted: Vec<String>,
  /// Scoped names of accepted packages, in publish order
  pub published: Vec<String>,
  /// The rejection that stopped the run
  pub rejection: Option<RailError>,
}

impl PublishReport {
  pub fn was_accepted(&self, package: &str) -> bool {
    self.accepted.iter().any(|p| p == package)
  }
}

/// Stages an npm package per admitted bundle and runs the publish command
pub struct NpmRegistry<'a> {
  config: &'a PublishConfig,
  /// Repository root, for resolving `package_dir`
  root: PathBuf,
  /// Where staged packages are written
  staging: PathBuf,
}

impl<'a> NpmRegistry<'a> {
  pub fn new(config: &'a PublishConfig, root: &Path, staging: PathBuf) -> Self {
    Self {
      config,
      root: root.to_path_buf(),
      staging,
    }
  }

  /// Lay out `package.json`, `bin/` and `vendor/<triple>/` for one package
  pub fn stage(&self, decision: &PublishDecision, package: &AdmittedPackage) -> RailResult<PathBuf> {
    let dir = self.staging.join(&package.name);
    if dir.exists() {
      fs::remove_dir_all(&dir)?;
    }
    fs::create_dir_all(&dir)?;

    let template_dir = self.root.join(&self.config.package_dir);
    let template = template_dir.join("package.json");
    let mut manifest: serde_json::Value = if template.exists() {
      let content = fs::read_to_string(&template).with_context(|| format!("Failed to read {}", template.display()))?;
      serde_json::from_str(&content)?
    } else {
      serde_json::json!({})
    };
    let Some(fields) = manifest.as_object_mut() else {
      return Err(RailError::message(format!("{} is not a JSON object", template.display())));
    };
    fields.insert("name".to_string(), package.qualified_name.clone().into());
    fields.insert("version".to_string(), decision.version.clone().into());
    fs::write(dir.join("package.json"), serde_json::to_string_pretty(&manifest)?)?;

    let bin = template_dir.join("bin");
    if bin.is_dir() {
      fs::create_dir_all(dir.join("bin"))?;
      for entry in fs::read_dir(&bin)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
          fs::copy(entry.path(), dir.join("bin").join(entry.file_name()))?;
        }
      }
    }

    for artifact in &package.artifacts {
      let vendor = dir.join("vendor").join(&artifact.target);
      fs::create_dir_all(&vendor)?;
      let name = artifact
        .blob_ref
        .file_name()
        .ok_or_else(|| RailError::message(format!("Artifact {} has no file name", artifact.blob_ref.display())))?;
      fs::copy(&artifact.blob_ref, vendor.join(name))
        .with_context(|| format!("Failed to stage {}", artifact.blob_ref.display()))?;
    }

    Ok(dir)
  }
}

impl Registry for NpmRegistry<'_> {
  fn publish(&self, decision: &PublishDecision, package: &AdmittedPackage) -> Result<(), String> {
    let dir = self.stage(decision, package).map_err(|e| e.to_string())?;
    let (program, args) = self
      .config
      .command
      .split_first()
      .ok_or_else(|| "publish command is empty".to_string())?;

    let dist_tag = decision.dist_tag.to_string();
    let dir_str = dir.to_string_lossy();
    let output = Command::new(program)
      .args(args)
      .args([
        dir_str.as_ref(),
        "--tag",
        dist_tag.as_str(),
        "--access",
        self.config.access.as_str(),
        "--registry",
        self.config.registry.as_str(),
      ])
      .current_dir(&self.root)
      .output()
      .map_err(|e| format!("failed to run {}: {}", program, e))?;

    if output.status.success() {
      Ok(())
    } else {
      Err(String::from_utf8_lossy(&output.stderr).trim().to_string())
    }
  }
}

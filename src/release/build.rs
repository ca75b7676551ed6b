//! Multi-platform build orchestration
//!
//! One rayon task per target, each building the same commit in its own
//! scratch worktree. Every task runs to completion; the join step then checks
//! reproducibility against the first build of the tag and applies the
//! all-required-succeed policy.

use crate::core::config::BuildConfig;
use crate::core::error::{RailError, RailResult, ReleaseError, ResultExt};
use crate::core::vcs::SystemGit;
use crate::release::checksums::{ChecksumStore, sha256_file};
use crate::release::targets::PlatformTarget;
use crate::ui::progress::BuildProgress;
use rayon::prelude::*;
use serde::{Deserialize, Serialize, Serializer};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// A file one target build produced, before hashing
#[derive(Debug, Clone)]
pub struct BuiltFile {
  pub package: String,
  pub path: PathBuf,
}

/// Builds one target at one commit
pub trait Builder: Sync {
  /// Returns the produced files, or a human-readable failure reason
  fn build(&self, target: &PlatformTarget, commit: &str) -> Result<Vec<BuiltFile>, String>;
}

/// Immutable output of one package for one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseArtifact {
  pub target: String,
  pub package: String,
  pub blob_ref: PathBuf,
  pub checksum: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum TargetOutcome {
  Built { artifacts: Vec<ReleaseArtifact> },
  Failed { reason: String },
}

fn serialize_triple<S: Serializer>(target: &PlatformTarget, serializer: S) -> Result<S::Ok, S::Error> {
  serializer.serialize_str(&target.triple())
}

#[derive(Debug, Clone, Serialize)]
pub struct TargetResult {
  #[serde(serialize_with = "serialize_triple")]
  pub target: PlatformTarget,
  pub required: bool,
  #[serde(flatten)]
  pub outcome: TargetOutcome,
}

/// Per-target results of one build run
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
  pub tag: String,
  pub commit: String,
  pub results: Vec<TargetResult>,
}

impl BuildReport {
  pub fn artifacts(&self) -> impl Iterator<Item = &ReleaseArtifact> {
    self.results.iter().flat_map(|r| {
      let artifacts: &[ReleaseArtifact] = match &r.outcome {
        TargetOutcome::Built { artifacts } => artifacts,
        TargetOutcome::Failed { .. } => &[],
      };
      artifacts
    })
  }

  pub fn failures(&self) -> impl Iterator<Item = (&TargetResult, &str)> {
    self.results.iter().filter_map(|r| match &r.outcome {
      TargetOutcome::Failed { reason } => Some((r, reason.as_str())),
      TargetOutcome::Built { .. } => None,
    })
  }

  /// Fail unless every required target built
  pub fn ensure_all_required(&self) -> RailResult<()> {
    let failed: Vec<String> = self
      .failures()
      .filter(|(r, _)| r.required)
      .map(|(r, _)| r.target.triple())
      .collect();
    if failed.is_empty() {
      Ok(())
    } else {
      Err(RailError::Release(ReleaseError::BuildFailed { targets: failed }))
    }
  }
}

/// Fans a build out over targets and joins the results
pub struct BuildOrchestrator<'a, B: Builder> {
  builder: &'a B,
  progress: BuildProgress,
}

impl<'a, B: Builder> BuildOrchestrator<'a, B> {
  pub fn new(builder: &'a B, progress: BuildProgress) -> Self {
    Self { builder, progress }
  }

  /// Build `commit` for every target and check checksums against `checksums`
  ///
  /// Build failures are reported per target. A checksum that differs from the
  /// first build of this tag is fatal for the whole run.
  pub fn build_all(
    &self,
    tag: &str,
    commit: &str,
    targets: &[PlatformTarget],
    checksums: &mut ChecksumStore,
  ) -> RailResult<BuildReport> {
    let bars: Vec<_> = targets
      .iter()
      .map(|t| self.progress.add_bar(1, format!("Building {}", t.triple())))
      .collect();

    let raw: Vec<(PlatformTarget, Result<Vec<(BuiltFile, String)>, String>)> = targets
      .par_iter()
      .zip(bars.par_iter())
      .map(|(target, bar)| {
        let result = self.builder.build(target, commit).and_then(|files| {
          files
            .into_iter()
            .map(|f| sha256_file(&f.path).map(|sum| (f, sum)).map_err(|e| e.to_string()))
            .collect::<Result<Vec<_>, String>>()
        });
        self.progress.inc(bar.as_ref());
        match &result {
          Ok(files) => tracing::info!(target = %target.triple(), files = files.len(), "target built"),
          Err(reason) => tracing::warn!(target = %target.triple(), reason = %reason, "target failed"),
        }
        (target.clone(), result)
      })
      .collect();

    let mut results = Vec::with_capacity(raw.len());
    for (target, result) in raw {
      let triple = target.triple();
      let outcome = match result {
        Ok(files) => {
          let mut artifacts = Vec::with_capacity(files.len());
          for (file, checksum) in files {
            checksums.verify_or_record(tag, &triple, &file.package, &checksum)?;
            artifacts.push(ReleaseArtifact {
              target: triple.clone(),
              package: file.package,
              blob_ref: file.path,
              checksum,
            });
          }
          TargetOutcome::Built { artifacts }
        }
        Err(reason) => TargetOutcome::Failed { reason },
      };
      results.push(TargetResult {
        required: target.is_required(),
        target,
        outcome,
      });
    }

    Ok(BuildReport {
      tag: tag.to_string(),
      commit: commit.to_string(),
      results,
    })
  }
}

/// Runs the configured build command in a scratch worktree per target
pub struct CommandBuilder<'a> {
  git: &'a SystemGit,
  config: &'a BuildConfig,
  /// `dist/<tag>`; artifacts land in `<out_dir>/<triple>/`
  out_dir: PathBuf,
}

impl<'a> CommandBuilder<'a> {
  pub fn new(git: &'a SystemGit, config: &'a BuildConfig, out_dir: PathBuf) -> Self {
    Self { git, config, out_dir }
  }

  fn build_in_worktree(&self, target: &PlatformTarget, commit: &str) -> RailResult<Vec<BuiltFile>> {
    let triple = target.triple();
    let scratch = self.git.scratch_worktree(&format!("build-{}", triple), commit)?;
    let build_dir = scratch.path().join(&self.config.working_dir);

    let mut parts = self.config.command.iter().map(|arg| expand(arg, target));
    let program = parts
      .next()
      .ok_or_else(|| RailError::message("Build command is empty"))?;
    let output = Command::new(&program)
      .args(parts)
      .current_dir(&build_dir)
      .output()
      .with_context(|| format!("Failed to run {}", program))?;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      let tail: Vec<&str> = stderr.lines().rev().take(20).collect();
      let tail: Vec<&str> = tail.into_iter().rev().collect();
      return Err(RailError::message(format!(
        "{} exited with {}\n{}",
        program,
        output.status,
        tail.join("\n")
      )));
    }

    let dest_dir = self.out_dir.join(&triple);
    fs::create_dir_all(&dest_dir)?;
    let mut files = Vec::with_capacity(self.config.artifacts.len());
    for out in &self.config.artifacts {
      let src = build_dir.join(expand(&out.path, target));
      let name = src
        .file_name()
        .ok_or_else(|| RailError::message(format!("Artifact path {} has no file name", src.display())))?;
      let dest = dest_dir.join(name);
      fs::copy(&src, &dest).with_context(|| format!("Build did not produce {}", src.display()))?;
      files.push(BuiltFile {
        package: out.package.clone(),
        path: dest,
      });
    }
    Ok(files)
  }
}

impl Builder for CommandBuilder<'_> {
  fn build(&self, target: &PlatformTarget, commit: &str) -> Result<Vec<BuiltFile>, String> {
    self.build_in_worktree(target, commit).map_err(|e| e.to_string())
  }
}

/// Substitute `{target}` and `{exe}` in a build template
fn expand(template: &str, target: &PlatformTarget) -> String {
  let exe = if target.os == "windows" { ".exe" } else { "" };
  template.replace("{target}", &target.triple()).replace("{exe}", exe)
}

/// Directory artifacts of `tag` are collected in
pub fn dist_dir_for(root: &Path, config: &BuildConfig, tag: &str) -> PathBuf {
  root.join(&config.dist_dir).join(tag)
}

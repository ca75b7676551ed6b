//! Tag-to-registry release pipeline
//!
//! ```text
//! validate tag -> build active targets -> collect artifacts -> publish allow-listed
//! ```
//!
//! Every run ends in exactly one [`TerminalStatus`]. A release is only reported
//! as succeeded when every allow-listed package was accepted by the registry.

use crate::core::config::RailConfig;
use crate::core::error::{RailError, RailResult, ReleaseError, ResultExt};
use crate::core::vcs::ReleaseRepo;
use crate::release::build::{BuildOrchestrator, Builder, TargetResult};
use crate::release::checksums::ChecksumStore;
use crate::release::publish::{PackageBundle, PublishDecision, PublishPlan, Registry, decide};
use crate::release::stamp::VersionStamper;
use crate::release::tag::TagGrammar;
use crate::release::targets::TargetRegistry;
use crate::ui::progress::BuildProgress;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// How a release run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "kebab-case")]
pub enum TerminalStatus {
  Succeeded,
  Rejected(String),
  BuiltNotPublished(String),
}

impl TerminalStatus {
  pub fn is_success(&self) -> bool {
    matches!(self, TerminalStatus::Succeeded)
  }
}

/// One artifact in the release record
#[derive(Debug, Clone, Serialize)]
pub struct RecordedArtifact {
  pub target: String,
  pub package: String,
  pub path: PathBuf,
  pub checksum: String,
  pub published: bool,
}

/// Written to `dist/<tag>/release.json` after every run that got past validation
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseRecord {
  pub tag: String,
  pub version: Option<String>,
  pub commit: Option<String>,
  pub outcome: TerminalStatus,
  pub decision: Option<PublishDecision>,
  pub targets: Vec<TargetResult>,
  pub artifacts: Vec<RecordedArtifact>,
  pub published: Vec<String>,
  pub withheld: Vec<String>,
}

impl ReleaseRecord {
  fn new(tag: &str) -> Self {
    Self {
      tag: tag.to_string(),
      version: None,
      commit: None,
      outcome: TerminalStatus::Succeeded,
      decision: None,
      targets: Vec::new(),
      artifacts: Vec::new(),
      published: Vec::new(),
      withheld: Vec::new(),
    }
  }

  pub fn save(&self, dir: &Path) -> RailResult<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join("release.json");
    fs::write(&path, serde_json::to_string_pretty(self)?)
      .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
  }
}

/// Record plus the error behind a non-successful status
#[derive(Debug)]
pub struct ReleaseOutcome {
  pub record: ReleaseRecord,
  pub error: Option<RailError>,
}

impl ReleaseOutcome {
  fn finish(mut record: ReleaseRecord, status: TerminalStatus, error: Option<RailError>) -> Self {
    record.outcome = status;
    Self { record, error }
  }

  /// The error for non-zero exit, if the run must fail
  pub fn into_result(self) -> Result<ReleaseRecord, (ReleaseRecord, RailError)> {
    match self.error {
      Some(err) => Err((self.record, err)),
      None => Ok(self.record),
    }
  }
}

/// Drives one tag through validation, build and publish
pub struct ReleasePipeline<'a, G: ReleaseRepo, B: Builder, R: Registry> {
  repo: &'a G,
  config: &'a RailConfig,
  builder: &'a B,
  /// `None` computes decisions without calling the registry
  registry: Option<&'a R>,
  progress: BuildProgress,
}

impl<'a, G: ReleaseRepo, B: Builder, R: Registry> ReleasePipeline<'a, G, B, R> {
  pub fn new(
    repo: &'a G,
    config: &'a RailConfig,
    builder: &'a B,
    registry: Option<&'a R>,
    progress: BuildProgress,
  ) -> Self {
    Self {
      repo,
      config,
      builder,
      registry,
      progress,
    }
  }

  /// Run the pipeline for `raw_tag`
  ///
  /// Repository and configuration failures are returned as `Err`. Everything
  /// that decides the fate of the release is reported through the outcome.
  pub fn run(&self, raw_tag: &str, checksums: &mut ChecksumStore) -> RailResult<ReleaseOutcome> {
    let mut record = ReleaseRecord::new(raw_tag);
    let grammar = TagGrammar::new(&self.config.tags)?;

    // Validate
    if let Err(rejection) = grammar.parse(raw_tag) {
      tracing::warn!(tag = %raw_tag, reason = rejection.reason(), "tag rejected");
      let status = TerminalStatus::Rejected(rejection.to_string());
      return Ok(ReleaseOutcome::finish(record, status, Some(rejection.into())));
    }
    let commit = self.repo.resolve_tag(raw_tag)?.ok_or_else(|| {
      RailError::with_help(
        format!("Tag {} does not exist", raw_tag),
        "Push the tag first, or cut it with `fork-rail release cut`.",
      )
    })?;
    record.commit = Some(commit.clone());

    let committed = VersionStamper::new(self.repo, &self.config.manifest).committed_version(&commit)?;
    let tag = match grammar.validate(raw_tag, &committed) {
      Ok(tag) => tag,
      Err(rejection) => {
        tracing::warn!(tag = %raw_tag, committed = %committed, reason = rejection.reason(), "tag rejected");
        let status = TerminalStatus::Rejected(rejection.to_string());
        return Ok(ReleaseOutcome::finish(record, status, Some(rejection.into())));
      }
    };
    record.version = Some(tag.version_string());

    // Build
    let targets = TargetRegistry::new(self.config.targets.clone())?.active_targets();
    tracing::info!(tag = %raw_tag, commit = %commit, targets = targets.len(), "building release");
    let report = match BuildOrchestrator::new(self.builder, self.progress.clone()).build_all(
      raw_tag,
      &commit,
      &targets,
      checksums,
    ) {
      Ok(report) => report,
      Err(err @ RailError::Release(ReleaseError::NonReproducible { .. })) => {
        let status = TerminalStatus::Rejected(format!("non-reproducible: {}", err));
        return Ok(ReleaseOutcome::finish(record, status, Some(err)));
      }
      Err(err) => return Err(err),
    };
    record.targets = report.results.clone();
    record.artifacts = report
      .artifacts()
      .map(|a| RecordedArtifact {
        target: a.target.clone(),
        package: a.package.clone(),
        path: a.blob_ref.clone(),
        checksum: a.checksum.clone(),
        published: false,
      })
      .collect();

    if let Err(err) = report.ensure_all_required() {
      let status = TerminalStatus::BuiltNotPublished(err.to_string());
      return Ok(ReleaseOutcome::finish(record, status, Some(err)));
    }

    // Collect
    let decision = decide(&tag, &self.config.publish);
    record.decision = Some(decision.clone());
    let plan = match PublishPlan::new(&decision, PackageBundle::group(report.artifacts())) {
      Ok(plan) => plan,
      Err(err) => {
        let status = TerminalStatus::BuiltNotPublished(err.to_string());
        return Ok(ReleaseOutcome::finish(record, status, Some(err)));
      }
    };
    record.withheld = plan.withheld_names();

    // Publish
    let Some(registry) = self.registry else {
      let names: Vec<&str> = plan.admitted.iter().map(|p| p.qualified_name()).collect();
      let status = TerminalStatus::BuiltNotPublished(format!(
        "dry run: would publish {} as {}@{}",
        names.join(", "),
        decision.version,
        decision.dist_tag
      ));
      return Ok(ReleaseOutcome::finish(record, status, None));
    };

    let report = plan.execute(registry, &decision);
    for artifact in &mut record.artifacts {
      artifact.published = report.was_accepted(&artifact.package);
    }
    record.published = report.published;
    match report.rejection {
      None => Ok(ReleaseOutcome::finish(record, TerminalStatus::Succeeded, None)),
      Some(err) => {
        let status = TerminalStatus::BuiltNotPublished(err.to_string());
        Ok(ReleaseOutcome::finish(record, status, Some(err)))
      }
    }
  }
}

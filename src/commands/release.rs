//! Release command implementation
//!
//! The base branch only holds a real version between `stamp` and `reset`.
//! `cut` runs both in one go; `run` is what CI invokes on a tag push.

use crate::core::context::WorkspaceContext;
use crate::core::error::{RailError, RailResult};
use crate::core::lock::BranchLock;
use crate::core::vcs::{BranchStore, ReleaseRepo};
use crate::release::build::{CommandBuilder, TargetOutcome, dist_dir_for};
use crate::release::checksums::ChecksumStore;
use crate::release::pipeline::{ReleasePipeline, ReleaseRecord, TerminalStatus};
use crate::release::publish::{NpmRegistry, decide};
use crate::release::stamp::{StampedRelease, VersionStamper};
use crate::release::tag::TagGrammar;
use crate::ui::progress::BuildProgress;
use std::fs;
use std::path::PathBuf;

/// Run the release validate command
pub fn run_release_validate(ctx: &WorkspaceContext, tag: String, json: bool) -> RailResult<()> {
  let config = ctx.require_config()?;
  let grammar = TagGrammar::new(&config.tags)?;
  grammar.parse(&tag)?;

  let commit = ctx
    .git
    .resolve_tag(&tag)?
    .ok_or_else(|| RailError::message(format!("Tag {} does not exist", tag)))?;
  let committed = VersionStamper::new(&ctx.git, &config.manifest).committed_version(&commit)?;
  let parsed = grammar.validate(&tag, &committed)?;

  if json {
    println!("{}", serde_json::to_string_pretty(&parsed)?);
  } else {
    println!(
      "✅ {} is valid: version {} ({} channel) at {}",
      parsed.raw,
      parsed.version_string(),
      parsed.channel,
      short(&commit)
    );
  }
  Ok(())
}

/// Run the release stamp command
pub fn run_release_stamp(ctx: &WorkspaceContext, version: String) -> RailResult<()> {
  let config = ctx.require_config()?;
  let tag = TagGrammar::new(&config.tags)?.parse_version(&version)?;

  let stamp_path = ctx.stamp_path();
  if let Some(open) = StampedRelease::load(&stamp_path)? {
    return Err(RailError::with_help(
      format!("Release {} is still stamped on '{}'", open.tag, open.handle.branch),
      "Run `fork-rail release reset` before stamping another version.",
    ));
  }

  let _lock = BranchLock::acquire(ctx.git.git_dir(), "stamp")?;
  ensure_clean(ctx)?;
  let prior = ctx.git.read_branch(&config.base.branch)?;
  let stamped = VersionStamper::new(&ctx.git, &config.manifest).stamp_release(&prior, &tag)?;
  stamped.save(&stamp_path)?;

  println!("🏷️  Stamped {} on '{}'", stamped.version, stamped.handle.branch);
  println!("   Release commit: {}", short(&stamped.release_commit));
  println!("   Tag:            {}", stamped.tag);
  println!();
  println!("Next steps:");
  println!("  git push {} {}", config.base.remote, stamped.tag);
  println!("  fork-rail release reset");
  Ok(())
}

/// Run the release reset command
pub fn run_release_reset(ctx: &WorkspaceContext) -> RailResult<()> {
  let config = ctx.require_config()?;
  let stamp_path = ctx.stamp_path();
  let stamped = StampedRelease::load(&stamp_path)?.ok_or_else(|| {
    RailError::with_help(
      "No stamped release to reset",
      "`release reset` undoes `release stamp`; the base branch already holds the sentinel.",
    )
  })?;

  let _lock = BranchLock::acquire(ctx.git.git_dir(), "reset")?;
  let handle = VersionStamper::new(&ctx.git, &config.manifest).reset_to_sentinel(&stamped)?;
  fs::remove_file(&stamp_path)?;

  println!(
    "✅ '{}' is back at {} (version {})",
    handle.branch,
    short(&handle.head),
    config.manifest.sentinel
  );
  println!("   Tag {} still points at {}", stamped.tag, short(&stamped.release_commit));
  Ok(())
}

/// Run the release cut command
pub fn run_release_cut(ctx: &WorkspaceContext, version: String, push: bool) -> RailResult<()> {
  let config = ctx.require_config()?;
  let tag = TagGrammar::new(&config.tags)?.parse_version(&version)?;

  let _lock = BranchLock::acquire(ctx.git.git_dir(), "cut")?;
  ensure_clean(ctx)?;
  let prior = ctx.git.read_branch(&config.base.branch)?;
  let stamper = VersionStamper::new(&ctx.git, &config.manifest);

  let (stamped, handle) = stamper.cut(&prior, &tag, |stamped| {
    if push {
      ctx.git.push_ref(&config.base.remote, &format!("refs/tags/{}", stamped.tag))?;
      println!("📤 Pushed {} to {}", stamped.tag, config.base.remote);
    }
    Ok(())
  })?;

  println!("🏷️  Cut {} at {}", stamped.tag, short(&stamped.release_commit));
  println!(
    "✅ '{}' reset to {} (version {})",
    handle.branch,
    short(&handle.head),
    config.manifest.sentinel
  );
  if !push {
    println!();
    println!("Next step:");
    println!("  git push {} {}", config.base.remote, stamped.tag);
  }
  Ok(())
}

/// Run the release decide command
pub fn run_release_decide(ctx: &WorkspaceContext, tag: String, json: bool) -> RailResult<()> {
  let config = ctx.require_config()?;
  let parsed = TagGrammar::new(&config.tags)?.parse(&tag)?;
  let decision = decide(&parsed, &config.publish);

  if json {
    println!("{}", serde_json::to_string_pretty(&decision)?);
  } else {
    println!("📦 {} ({} channel)", parsed.raw, parsed.channel);
    println!("   Package:  {}@{}", decision.package_name, decision.version);
    println!("   Dist-tag: {}", decision.dist_tag);
    println!("   Allowed:  {}", decision.allowed_packages.join(", "));
  }
  Ok(())
}

/// Run the release run command
///
/// First-build checksums come from the local store, the `release.json` an
/// earlier run left in the dist directory, and any `--reference` records.
pub fn run_release_run(
  ctx: &WorkspaceContext,
  tag: String,
  publish: bool,
  references: Vec<PathBuf>,
  json: bool,
) -> RailResult<()> {
  let config = ctx.require_config()?;
  let dist_dir = dist_dir_for(&ctx.root, &config.build, &tag);

  let checksums_path = ctx.checksums_path();
  let mut checksums = ChecksumStore::load(&checksums_path)?;
  let previous = dist_dir.join("release.json");
  let seeds = previous.exists().then_some(previous).into_iter().chain(references);
  for record in seeds {
    let added = checksums.seed_from_record(&tag, &ctx.path(&record))?;
    tracing::info!(record = %record.display(), added, "loaded first-build checksums");
  }

  let builder = CommandBuilder::new(&ctx.git, &config.build, dist_dir.clone());
  let registry = NpmRegistry::new(&config.publish, &ctx.root, dist_dir.join("npm"));
  let progress = if json { BuildProgress::hidden() } else { BuildProgress::new() };

  if !json {
    let mode = if publish { "build + publish" } else { "build, dry-run publish" };
    println!("🚀 Releasing {} ({})", tag, mode);
  }

  let pipeline = ReleasePipeline::new(&ctx.git, config, &builder, publish.then_some(&registry), progress);
  let outcome = pipeline.run(&tag, &mut checksums)?;
  checksums.save(&checksums_path)?;

  if outcome.record.version.is_some() {
    let path = outcome.record.save(&dist_dir)?;
    tracing::info!(path = %path.display(), "wrote release record");
  }

  if json {
    println!("{}", serde_json::to_string_pretty(&outcome.record)?);
  } else {
    print_record(&outcome.record);
  }

  outcome.into_result().map(|_| ()).map_err(|(_, err)| err)
}

fn print_record(record: &ReleaseRecord) {
  println!();
  for result in &record.targets {
    match &result.outcome {
      TargetOutcome::Built { artifacts } => {
        println!("  ✅ {:<32} {} artifact(s)", result.target.triple(), artifacts.len());
      }
      TargetOutcome::Failed { reason } => {
        let first = reason.lines().next().unwrap_or_default();
        println!("  ❌ {:<32} {}", result.target.triple(), first);
      }
    }
  }
  if !record.published.is_empty() {
    println!();
    for name in &record.published {
      println!("  📦 published {}", name);
    }
  }
  for name in &record.withheld {
    println!("  🔒 withheld {} (not on the allow-list)", name);
  }

  println!();
  match &record.outcome {
    TerminalStatus::Succeeded => println!("✅ {} succeeded", record.tag),
    TerminalStatus::Rejected(reason) => println!("🚫 {} rejected: {}", record.tag, reason),
    TerminalStatus::BuiltNotPublished(reason) => println!("⚠️  {} built, not published: {}", record.tag, reason),
  }
}

fn ensure_clean(ctx: &WorkspaceContext) -> RailResult<()> {
  if ctx.git.is_clean()? {
    Ok(())
  } else {
    Err(RailError::with_help(
      "Working tree has uncommitted changes",
      "The base branch is moved in place; commit or stash local changes first.",
    ))
  }
}

fn short(sha: &str) -> &str {
  &sha[..sha.len().min(12)]
}

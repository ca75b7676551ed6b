//! Upstream sync command

use crate::core::context::WorkspaceContext;
use crate::core::error::RailResult;
use crate::ledger::Ledger;
use crate::ledger::state::ReviewState;
use crate::merge::{ReconciledCommit, RuleOutcome, SyncOptions, sync_upstream};

/// Run the sync command
pub fn run_sync(ctx: &WorkspaceContext, upstream: Option<String>, apply: bool, json: bool) -> RailResult<()> {
  let config = ctx.require_config()?;
  let ledger = Ledger::load(&ctx.path(&config.ledger.path))?;

  let state_path = ctx.review_state_path();
  let mut state = ReviewState::load(&state_path)?;
  state.retain_rules(ledger.rules().iter().map(|r| r.id.as_str()));

  if !json {
    let source = upstream.clone().unwrap_or_else(|| config.upstream.merge_ref());
    println!("🔄 Syncing {} into {} ({} rules)", source, config.base.branch, ledger.rules().len());
  }

  let options = SyncOptions {
    upstream_ref: upstream,
    apply,
  };
  let result = sync_upstream(&ctx.git, config, &ledger, &mut state, &options);
  // Stale marks made before a failure are kept
  if apply {
    state.save(&state_path)?;
  }
  let result = result?;

  if json {
    println!("{}", serde_json::to_string_pretty(&result)?);
  } else {
    print_result(&result, apply);
  }
  Ok(())
}

fn print_result(result: &ReconciledCommit, apply: bool) {
  println!();
  if result.up_to_date && result.report.written.is_empty() {
    println!("✅ Already up to date with {}", result.upstream_ref);
    return;
  }

  for path in &result.report.conflicts_resolved {
    println!("  ⚔️  {} (took upstream side, customizations re-applied)", path.display());
  }
  for rule in &result.report.rules {
    let line = match rule.outcome {
      RuleOutcome::Satisfied => format!("  ✓  {} ({})", rule.id, rule.path.display()),
      RuleOutcome::Reapplied { hits } => format!("  🔁 {} ({}, {} rewrite(s))", rule.id, rule.path.display(), hits),
      RuleOutcome::Stale => format!("  ⚠️  {} stale: {} no longer exists", rule.id, rule.path.display()),
      RuleOutcome::NeedsReview => format!(
        "  🔎 {} needs review: {} is back (run `fork-rail ledger review {}`)",
        rule.id,
        rule.path.display(),
        rule.id
      ),
      RuleOutcome::AnchorMissing => format!("  ❌ {} anchor missing in {}", rule.id, rule.path.display()),
    };
    println!("{}", line);
  }

  let reapplied = result.report.reapplied().count();
  println!();
  match (&result.commit, apply) {
    (Some(commit), _) if result.up_to_date => println!(
      "✅ Already at {}; re-applied {} customization(s) as {}",
      result.upstream_ref,
      reapplied,
      &commit[..commit.len().min(12)]
    ),
    (Some(commit), _) => println!(
      "✅ Merged {} as {} ({} customization(s) re-applied)",
      result.upstream_ref,
      &commit[..commit.len().min(12)],
      reapplied
    ),
    (None, true) => println!("✅ Nothing to commit"),
    (None, false) => {
      println!("🔍 Dry-run: {} customization(s) would be re-applied", reapplied);
      println!("   Run with --apply to commit the merge");
    }
  }
}

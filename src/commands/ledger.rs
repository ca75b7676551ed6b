//! Ledger maintenance commands

use crate::core::context::WorkspaceContext;
use crate::core::error::{ConfigError, RailError, RailResult};
use crate::ledger::state::ReviewState;
use crate::ledger::{Category, CustomizationRule, Ledger, Matcher};
use crate::merge::{Reconciler, RuleOutcome, WorktreeFiles};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Serialize)]
struct RuleView<'a> {
  #[serde(flatten)]
  rule: &'a CustomizationRule,
  stale: bool,
  needs_review: bool,
}

/// Run the ledger list command
pub fn run_ledger_list(ctx: &WorkspaceContext, category: Option<Category>, json: bool) -> RailResult<()> {
  let config = ctx.require_config()?;
  let ledger = Ledger::load(&ctx.path(&config.ledger.path))?;
  let state = ReviewState::load(&ctx.review_state_path())?;

  let rules: Vec<RuleView> = ledger
    .rules()
    .iter()
    .filter(|r| category.is_none_or(|c| r.category == c))
    .map(|rule| RuleView {
      rule,
      stale: state.stale.contains_key(&rule.id),
      needs_review: state.is_held(&rule.id),
    })
    .collect();

  if json {
    println!("{}", serde_json::to_string_pretty(&rules)?);
    return Ok(());
  }

  if rules.is_empty() {
    println!("⚠️  No customization rules{}", category.map(|c| format!(" in category {}", c)).unwrap_or_default());
    return Ok(());
  }

  println!("📒 Customization ledger ({} rules, application order)", rules.len());
  println!();
  for (i, view) in rules.iter().enumerate() {
    let rule = view.rule;
    let flag = if view.needs_review {
      " [needs review]"
    } else if view.stale {
      " [stale]"
    } else {
      ""
    };
    println!("  {:>2}. {} [{}]{}", i + 1, rule.id, rule.category, flag);
    println!("      {}", rule.scope_path.display());
    let kind = match &rule.matcher {
      Matcher::Literal(_) => "literal",
      Matcher::Regex(_) => "regex",
    };
    println!("      {} {:?} -> {:?}", kind, rule.matcher.pattern(), rule.replacement);
  }
  Ok(())
}

/// Run the ledger check command
///
/// Fails with a merge error when any rule's anchor is missing, so CI can gate on it.
pub fn run_ledger_check(ctx: &WorkspaceContext, json: bool) -> RailResult<()> {
  let config = ctx.require_config()?;
  let ledger = Ledger::load(&ctx.path(&config.ledger.path))?;
  let state = ReviewState::load(&ctx.review_state_path())?;

  let report = Reconciler::new(&ledger).check(&WorktreeFiles::new(&ctx.root), &state)?;

  if json {
    println!("{}", serde_json::to_string_pretty(&report.rules)?);
  } else {
    println!("🔍 Checking {} rules against the working tree", report.rules.len());
    println!();
    for rule in &report.rules {
      let status = match rule.outcome {
        RuleOutcome::Satisfied => "✓ satisfied".to_string(),
        RuleOutcome::Reapplied { hits } => format!("🔁 would re-apply ({} rewrite(s))", hits),
        RuleOutcome::Stale => "⚠️  stale, file missing".to_string(),
        RuleOutcome::NeedsReview => "🔎 needs review".to_string(),
        RuleOutcome::AnchorMissing => "❌ anchor missing".to_string(),
      };
      println!("  {:<28} {:<40} {}", rule.id, rule.path.display(), status);
    }
  }

  if let Some(missing) = report.rules.iter().find(|r| r.outcome == RuleOutcome::AnchorMissing) {
    let rule = ledger
      .find(&missing.id)
      .ok_or_else(|| RailError::Config(ConfigError::RuleNotFound { id: missing.id.clone() }))?;
    return Err(rule.anchor_missing());
  }
  Ok(())
}

/// Run the ledger add command
pub fn run_ledger_add(
  ctx: &WorkspaceContext,
  id: String,
  path: String,
  literal: Option<String>,
  regex: Option<String>,
  replacement: String,
  category: Category,
) -> RailResult<()> {
  let config = ctx.require_config()?;
  let matcher = match (literal, regex) {
    (Some(lit), None) => Matcher::Literal(lit),
    (None, Some(re)) => Matcher::Regex(re),
    _ => return Err(RailError::message("Pass exactly one of --literal or --regex")),
  };
  let rule = CustomizationRule {
    id,
    scope_path: PathBuf::from(path),
    matcher,
    replacement,
    category,
  };
  rule.validate()?;

  let ledger_path = ctx.path(&config.ledger.path);
  Ledger::add_rule(&ledger_path, &rule)?;
  println!("✅ Added rule '{}' ({}) for {}", rule.id, rule.category, rule.scope_path.display());

  if !ctx.path(&rule.scope_path).exists() {
    println!("⚠️  {} does not exist yet; the rule will be reported stale", rule.scope_path.display());
  }
  Ok(())
}

/// Run the ledger remove command
pub fn run_ledger_remove(ctx: &WorkspaceContext, id: String) -> RailResult<()> {
  let config = ctx.require_config()?;
  let removed = Ledger::remove_rule(&ctx.path(&config.ledger.path), &id)?;

  let state_path = ctx.review_state_path();
  let mut state = ReviewState::load(&state_path)?;
  if state.clear(&id) {
    state.save(&state_path)?;
  }

  println!("🗑️  Removed rule '{}' ({})", removed.id, removed.scope_path.display());
  Ok(())
}

/// Run the ledger review command
pub fn run_ledger_review(ctx: &WorkspaceContext, id: String) -> RailResult<()> {
  let config = ctx.require_config()?;
  let ledger = Ledger::load(&ctx.path(&config.ledger.path))?;
  if ledger.find(&id).is_none() {
    return Err(RailError::Config(ConfigError::RuleNotFound { id }));
  }

  let state_path = ctx.review_state_path();
  let mut state = ReviewState::load(&state_path)?;
  if state.clear(&id) {
    state.save(&state_path)?;
    println!("✅ Rule '{}' reviewed; it will be applied on the next sync", id);
  } else {
    println!("ℹ️  Rule '{}' is not held", id);
  }
  Ok(())
}

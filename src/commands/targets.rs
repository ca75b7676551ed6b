use crate::core::config::RailConfig;
use crate::core::context::WorkspaceContext;
use crate::core::error::{ConfigError, RailError, RailResult};
use crate::release::targets::{Libc, PlatformTarget, RunnerClass, TargetRegistry};
use serde::Serialize;

#[derive(Serialize)]
struct TargetView {
  triple: String,
  os: String,
  arch: String,
  runner: RunnerClass,
  supported: bool,
}

/// Run the targets list command
pub fn run_targets_list(ctx: &WorkspaceContext, all: bool, json: bool) -> RailResult<()> {
  let config = ctx.require_config()?;
  let registry = TargetRegistry::new(config.targets.clone())?;

  let views: Vec<TargetView> = registry
    .all()
    .iter()
    .filter(|t| all || t.supported)
    .map(|t| TargetView {
      triple: t.triple(),
      os: t.os.clone(),
      arch: t.arch.clone(),
      runner: t.runner,
      supported: t.supported,
    })
    .collect();

  if json {
    println!("{}", serde_json::to_string_pretty(&views)?);
    return Ok(());
  }

  let active = registry.active_targets().len();
  println!("🎯 Platform targets ({} active, {} recorded)", active, registry.all().len());
  println!();
  for view in &views {
    let icon = if view.supported { "✅" } else { "⏸️ " };
    let runner = match view.runner {
      RunnerClass::Free => "free",
      RunnerClass::Paid => "paid",
    };
    println!("  {} {:<32} {} runner", icon, view.triple, runner);
  }
  if !all && active < registry.all().len() {
    println!();
    println!("  ({} disabled target(s) hidden, use --all)", registry.all().len() - active);
  }
  Ok(())
}

/// Run the targets enable / disable commands
pub fn run_targets_set(ctx: &WorkspaceContext, triple: String, supported: bool) -> RailResult<()> {
  let config = ctx.require_config()?;
  let mut registry = TargetRegistry::new(config.targets.clone())?;
  registry.set_supported(&triple, supported)?;
  registry.save_into(&config_path(ctx)?)?;

  if supported {
    println!("✅ {} enabled; it is now required for every release", triple);
  } else {
    println!("⏸️  {} disabled; it stays recorded for re-enablement", triple);
  }
  Ok(())
}

/// Run the targets add command
pub fn run_targets_add(
  ctx: &WorkspaceContext,
  os: String,
  arch: String,
  libc: Option<Libc>,
  runner: RunnerClass,
  enable: bool,
) -> RailResult<()> {
  let config = ctx.require_config()?;
  let mut registry = TargetRegistry::new(config.targets.clone())?;
  let added = registry.add(PlatformTarget::new(&os, &arch, libc, runner, enable))?.clone();
  registry.save_into(&config_path(ctx)?)?;

  if added.supported {
    println!("✅ Added {}; it is now required for every release", added.triple());
  } else if enable {
    println!("⏸️  Added {} as unsupported; no free runner class builds it", added.triple());
  } else {
    println!("⏸️  Added {} as unsupported", added.triple());
  }
  Ok(())
}

/// Run the targets remove command
pub fn run_targets_remove(ctx: &WorkspaceContext, triple: String) -> RailResult<()> {
  let config = ctx.require_config()?;
  let mut registry = TargetRegistry::new(config.targets.clone())?;
  let removed = registry.remove(&triple)?;
  registry.save_into(&config_path(ctx)?)?;
  println!("🗑️  Removed {} from the target registry", removed.triple());
  Ok(())
}

fn config_path(ctx: &WorkspaceContext) -> RailResult<std::path::PathBuf> {
  RailConfig::find_config_path(&ctx.root).ok_or_else(|| {
    RailError::Config(ConfigError::NotFound {
      workspace_root: ctx.root.clone(),
    })
  })
}

use crate::core::config::RailConfig;
use crate::core::context::WorkspaceContext;
use crate::core::error::{RailError, RailResult, ResultExt};
use crate::ledger::Ledger;
use std::fs;

/// Machine-local state that must never be committed
const STATE_GITIGNORE: &str = "\
state.json
checksums.json
stamp.json
";

/// Run the init command
pub fn run_init(ctx: &WorkspaceContext, force: bool) -> RailResult<()> {
  if let Some(existing) = RailConfig::find_config_path(&ctx.root)
    && !force
  {
    return Err(RailError::with_help(
      format!("{} already exists", existing.display()),
      "Pass --force to overwrite it with the defaults.",
    ));
  }

  let config = RailConfig::default();
  config.save(&ctx.root)?;
  println!("✅ Wrote fork-rail.toml");

  let ledger_path = ctx.path(&config.ledger.path);
  if Ledger::init(&ledger_path)? {
    println!("✅ Created empty ledger at {}", config.ledger.path.display());
  } else {
    println!("ℹ️  Keeping existing ledger at {}", config.ledger.path.display());
  }

  let ignore = ctx.state_dir().join(".gitignore");
  if !ignore.exists() {
    fs::create_dir_all(ctx.state_dir())?;
    fs::write(&ignore, STATE_GITIGNORE).with_context(|| format!("Failed to write {}", ignore.display()))?;
  }

  println!();
  println!("Next steps:");
  println!("  1. Review [upstream], [publish] and [[targets]] in fork-rail.toml");
  println!("  2. Record customizations: fork-rail ledger add --id <id> --path <file> --literal <text> \\");
  println!("       --replacement <text> --category rebrand");
  println!("  3. Commit fork-rail.toml and .fork-rail/, then run: fork-rail sync");

  Ok(())
}

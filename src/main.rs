mod commands;
mod core;
mod ledger;
mod merge;
mod release;
mod telemetry;
mod ui;
mod utils;

use clap::{Parser, Subcommand};
use core::error::{RailError, print_error};
use ledger::Category;
use release::targets::{Libc, RunnerClass};
use std::path::PathBuf;

/// Keep a customized fork in sync with upstream and drive its releases
#[derive(Parser)]
#[command(name = "fork-rail")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(styles = get_styles())]
struct RailCli {
  /// Show debug diagnostics on stderr (or set FORK_RAIL_LOG)
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  // ============================================================================
  // Setup
  // ============================================================================
  /// Write a default fork-rail.toml and an empty customization ledger
  Init {
    /// Overwrite an existing fork-rail.toml
    #[arg(long)]
    force: bool,
  },

  // ============================================================================
  // Upstream sync
  // ============================================================================
  /// Merge upstream into the base branch and re-apply the customization ledger
  Sync {
    /// Revision to merge instead of the configured upstream branch
    #[arg(long)]
    upstream: Option<String>,
    /// Actually commit the merge (default: dry-run in a scratch worktree)
    #[arg(long)]
    apply: bool,
    /// Output the merge report in JSON format
    #[arg(long)]
    json: bool,
  },

  /// Maintain the customization ledger
  #[command(subcommand)]
  Ledger(LedgerCommands),

  // ============================================================================
  // Release
  // ============================================================================
  /// Inspect and edit the platform target registry
  #[command(subcommand)]
  Targets(TargetCommands),

  /// Version stamping, tag validation, build and publish
  #[command(subcommand)]
  Release(ReleaseCommands),
}

#[derive(Subcommand)]
enum LedgerCommands {
  /// List rules in application order
  List {
    /// Only show rules of this category
    #[arg(long, value_enum)]
    category: Option<Category>,
    /// Output rules in JSON format
    #[arg(long)]
    json: bool,
  },

  /// Evaluate every rule against the working tree without writing
  Check {
    /// Output results in JSON format
    #[arg(long)]
    json: bool,
  },

  /// Append a rule to the end of the ledger
  Add {
    /// Unique rule id
    #[arg(long)]
    id: String,
    /// Governed file, relative to the repository root
    #[arg(long)]
    path: String,
    /// Literal text to rewrite
    #[arg(long, conflicts_with = "regex", required_unless_present = "regex")]
    literal: Option<String>,
    /// Regular expression to rewrite
    #[arg(long)]
    regex: Option<String>,
    /// Downstream text
    #[arg(long)]
    replacement: String,
    #[arg(long, value_enum)]
    category: Category,
  },

  /// Remove a rule by id
  Remove { id: String },

  /// Clear the stale / needs-review hold on a rule
  Review { id: String },
}

#[derive(Subcommand)]
enum TargetCommands {
  /// List targets
  List {
    /// Include disabled targets
    #[arg(long)]
    all: bool,
    /// Output targets in JSON format
    #[arg(long)]
    json: bool,
  },

  /// Record a new target
  Add {
    /// Operating system, e.g. linux, macos, windows
    #[arg(long)]
    os: String,
    /// CPU architecture, e.g. x86_64, aarch64
    #[arg(long)]
    arch: String,
    #[arg(long, value_enum)]
    libc: Option<Libc>,
    /// Runner class the target needs
    #[arg(long, value_enum, default_value = "free")]
    runner: RunnerClass,
    /// Build the target on every release (free runners only)
    #[arg(long)]
    enable: bool,
  },

  /// Mark a target as supported (free runners only)
  Enable { triple: String },

  /// Keep a target in the registry but stop building it
  Disable { triple: String },

  /// Delete a target from the registry
  Remove { triple: String },
}

#[derive(Subcommand)]
enum ReleaseCommands {
  /// Check a tag against the grammar and the version committed at the tagged commit
  Validate {
    tag: String,
    /// Output the parsed tag in JSON format
    #[arg(long)]
    json: bool,
  },

  /// Commit the release version on the base branch and tag it
  Stamp {
    /// Version without prefix, e.g. 0.46.0-cometix.1
    #[arg(id = "release_version", value_name = "VERSION")]
    version: String,
  },

  /// Move the base branch back to the sentinel version after a stamp
  Reset,

  /// Stamp, tag, optionally push the tag, then reset
  Cut {
    #[arg(id = "release_version", value_name = "VERSION")]
    version: String,
    /// Push the tag to the base remote before resetting
    #[arg(long)]
    push: bool,
  },

  /// Show where a tag would be published
  Decide {
    tag: String,
    #[arg(long)]
    json: bool,
  },

  /// Validate, build every active target, and publish allow-listed packages
  Run {
    tag: String,
    /// Actually publish (default: build and report what would be published)
    #[arg(long)]
    publish: bool,
    /// release.json of an earlier run of this tag, to check rebuilds against
    #[arg(long = "reference", value_name = "PATH")]
    references: Vec<PathBuf>,
    /// Output the release record in JSON format
    #[arg(long)]
    json: bool,
  },
}

fn get_styles() -> clap::builder::Styles {
  clap::builder::Styles::styled()
    .usage(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow))),
    )
    .header(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow))),
    )
    .literal(anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))))
    .invalid(
      anstyle::Style::new()
        .bold()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
    )
    .error(
      anstyle::Style::new()
        .bold()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
    )
    .valid(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))),
    )
    .placeholder(anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::White))))
}

fn main() {
  let cli = RailCli::parse();
  telemetry::init(cli.verbose);

  let current_dir = match std::env::current_dir() {
    Ok(dir) => dir,
    Err(e) => handle_error(e.into()),
  };

  // Config is optional here; commands that need it call require_config()
  let ctx = match core::context::WorkspaceContext::build(&current_dir) {
    Ok(ctx) => ctx,
    Err(e) => handle_error(e),
  };

  let result = match cli.command {
    Commands::Init { force } => commands::run_init(&ctx, force),
    Commands::Sync { upstream, apply, json } => commands::run_sync(&ctx, upstream, apply, json),

    Commands::Ledger(cmd) => match cmd {
      LedgerCommands::List { category, json } => commands::run_ledger_list(&ctx, category, json),
      LedgerCommands::Check { json } => commands::run_ledger_check(&ctx, json),
      LedgerCommands::Add {
        id,
        path,
        literal,
        regex,
        replacement,
        category,
      } => commands::run_ledger_add(&ctx, id, path, literal, regex, replacement, category),
      LedgerCommands::Remove { id } => commands::run_ledger_remove(&ctx, id),
      LedgerCommands::Review { id } => commands::run_ledger_review(&ctx, id),
    },

    Commands::Targets(cmd) => match cmd {
      TargetCommands::List { all, json } => commands::run_targets_list(&ctx, all, json),
      TargetCommands::Add {
        os,
        arch,
        libc,
        runner,
        enable,
      } => commands::run_targets_add(&ctx, os, arch, libc, runner, enable),
      TargetCommands::Enable { triple } => commands::run_targets_set(&ctx, triple, true),
      TargetCommands::Disable { triple } => commands::run_targets_set(&ctx, triple, false),
      TargetCommands::Remove { triple } => commands::run_targets_remove(&ctx, triple),
    },

    Commands::Release(cmd) => match cmd {
      ReleaseCommands::Validate { tag, json } => commands::run_release_validate(&ctx, tag, json),
      ReleaseCommands::Stamp { version } => commands::run_release_stamp(&ctx, version),
      ReleaseCommands::Reset => commands::run_release_reset(&ctx),
      ReleaseCommands::Cut { version, push } => commands::run_release_cut(&ctx, version, push),
      ReleaseCommands::Decide { tag, json } => commands::run_release_decide(&ctx, tag, json),
      ReleaseCommands::Run {
        tag,
        publish,
        references,
        json,
      } => commands::run_release_run(&ctx, tag, publish, references, json),
    },
  };

  if let Err(err) = result {
    handle_error(err);
  }
}

fn handle_error(err: RailError) -> ! {
  print_error(&err);
  std::process::exit(err.exit_code().as_i32());
}

//! Error types for fork-rail with contextual messages and exit codes
//!
//! One error type for the whole tool. Each category carries its own help text so
//! a failed CI run tells the maintainer what to do next, and each maps to a
//! distinct process exit code so the pipeline stage that failed is visible
//! from the exit status alone.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Exit codes for fork-rail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
  /// User error (config, invalid args, missing files)
  User = 1,
  /// System error (git, I/O)
  System = 2,
  /// Validation failure (invalid registry, ledger, or manifest)
  Validation = 3,
  /// Release rejected before any build ran (malformed tag, version mismatch)
  Rejected = 4,
  /// A required build failed or produced a non-reproducible artifact
  Build = 5,
  /// The registry rejected a publish
  Publish = 6,
  /// Merge left conflicts that need a human
  Conflict = 7,
}

impl ExitCode {
  /// Convert to i32 for process exit
  pub fn as_i32(self) -> i32 {
    self as i32
  }
}

/// Main error type for fork-rail
#[derive(Debug)]
pub enum RailError {
  /// Configuration errors
  Config(ConfigError),

  /// Git operation errors
  Git(GitError),

  /// Validation errors (registry, ledger, manifest)
  Validation(ValidationError),

  /// Merge reconciliation errors
  Merge(MergeError),

  /// Release pipeline errors
  Release(ReleaseError),

  /// I/O errors
  Io(io::Error),

  /// Generic error with message and optional context
  Message {
    message: String,
    context: Option<String>,
    help: Option<String>,
  },
}

impl RailError {
  /// Create a simple error message
  pub fn message(msg: impl Into<String>) -> Self {
    RailError::Message {
      message: msg.into(),
      context: None,
      help: None,
    }
  }

  /// Create an error with help text
  pub fn with_help(msg: impl Into<String>, help: impl Into<String>) -> Self {
    RailError::Message {
      message: msg.into(),
      context: None,
      help: Some(help.into()),
    }
  }

  /// Add context to an existing error
  pub fn context(self, ctx: impl Into<String>) -> Self {
    let ctx_str = ctx.into();
    match self {
      RailError::Message { message, context, help } => RailError::Message {
        message,
        context: Some(context.map(|c| format!("{}\n{}", ctx_str, c)).unwrap_or(ctx_str)),
        help,
      },
      RailError::Io(err) => RailError::Message {
        message: format!("I/O error: {}", err),
        context: Some(ctx_str),
        help: None,
      },
      _ => self,
    }
  }

  /// Get the appropriate exit code for this error
  pub fn exit_code(&self) -> ExitCode {
    match self {
      RailError::Config(_) => ExitCode::User,
      RailError::Git(_) => ExitCode::System,
      RailError::Validation(_) => ExitCode::Validation,
      RailError::Merge(_) => ExitCode::Conflict,
      RailError::Release(e) => e.exit_code(),
      RailError::Io(_) => ExitCode::System,
      RailError::Message { .. } => ExitCode::User,
    }
  }

  /// Get contextual help message for this error
  pub fn help_message(&self) -> Option<String> {
    match self {
      RailError::Config(e) => e.help_message(),
      RailError::Git(e) => e.help_message(),
      RailError::Validation(e) => e.help_message(),
      RailError::Merge(e) => e.help_message(),
      RailError::Release(e) => e.help_message(),
      RailError::Message { help, .. } => help.clone(),
      RailError::Io(_) => None,
    }
  }
}

impl fmt::Display for RailError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RailError::Config(e) => write!(f, "{}", e),
      RailError::Git(e) => write!(f, "{}", e),
      RailError::Validation(e) => write!(f, "{}", e),
      RailError::Merge(e) => write!(f, "{}", e),
      RailError::Release(e) => write!(f, "{}", e),
      RailError::Io(e) => write!(f, "I/O error: {}", e),
      RailError::Message { message, context, .. } => {
        write!(f, "{}", message)?;
        if let Some(ctx) = context {
          write!(f, "\n{}", ctx)?;
        }
        Ok(())
      }
    }
  }
}

impl std::error::Error for RailError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      RailError::Io(e) => Some(e),
      _ => None,
    }
  }
}

impl From<io::Error> for RailError {
  fn from(err: io::Error) -> Self {
    RailError::Io(err)
  }
}

impl From<String> for RailError {
  fn from(msg: String) -> Self {
    RailError::message(msg)
  }
}

impl From<&str> for RailError {
  fn from(msg: &str) -> Self {
    RailError::message(msg)
  }
}

impl From<toml_edit::TomlError> for RailError {
  fn from(err: toml_edit::TomlError) -> Self {
    RailError::message(format!("TOML parse error: {}", err))
  }
}

impl From<toml_edit::de::Error> for RailError {
  fn from(err: toml_edit::de::Error) -> Self {
    RailError::message(format!("TOML deserialization error: {}", err))
  }
}

impl From<toml_edit::ser::Error> for RailError {
  fn from(err: toml_edit::ser::Error) -> Self {
    RailError::message(format!("TOML serialization error: {}", err))
  }
}

impl From<serde_json::Error> for RailError {
  fn from(err: serde_json::Error) -> Self {
    RailError::message(format!("JSON error: {}", err))
  }
}

impl From<semver::Error> for RailError {
  fn from(err: semver::Error) -> Self {
    RailError::message(format!("Version error: {}", err))
  }
}

impl From<regex::Error> for RailError {
  fn from(err: regex::Error) -> Self {
    RailError::message(format!("Invalid pattern: {}", err))
  }
}

impl From<std::string::FromUtf8Error> for RailError {
  fn from(err: std::string::FromUtf8Error) -> Self {
    RailError::message(format!("UTF-8 conversion error: {}", err))
  }
}

/// Configuration-related errors
#[derive(Debug)]
pub enum ConfigError {
  /// fork-rail.toml not found
  NotFound { workspace_root: PathBuf },

  /// Missing required field
  MissingField { field: String },

  /// Rule not found in the ledger
  RuleNotFound { id: String },
}

impl ConfigError {
  fn help_message(&self) -> Option<String> {
    match self {
      ConfigError::NotFound { .. } => Some("Run `fork-rail init` to create a configuration file.".to_string()),
      ConfigError::RuleNotFound { .. } => Some("List the ledger with `fork-rail ledger list`.".to_string()),
      ConfigError::MissingField { .. } => None,
    }
  }
}

impl fmt::Display for ConfigError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ConfigError::NotFound { workspace_root } => {
        write!(
          f,
          "No fork-rail configuration found.\nExpected file: {}/fork-rail.toml",
          workspace_root.display()
        )
      }
      ConfigError::MissingField { field } => {
        write!(f, "Missing required field in config: {}", field)
      }
      ConfigError::RuleNotFound { id } => {
        write!(f, "Rule '{}' not found in the customization ledger", id)
      }
    }
  }
}

/// Git operation errors
#[derive(Debug)]
pub enum GitError {
  /// Git command failed
  CommandFailed { command: String, stderr: String },

  /// Repository not found
  RepoNotFound { path: PathBuf },

  /// Commit not found
  CommitNotFound { sha: String },

  /// Branch operation failed
  BranchError { message: String },

  /// Branch moved underneath us (compare-and-swap lost)
  BranchMoved {
    branch: String,
    expected: String,
    actual: String,
  },

  /// Another fork-rail process owns the branch
  Locked { path: PathBuf },

  /// Push failed
  PushFailed {
    remote: String,
    refspec: String,
    reason: String,
  },
}

impl GitError {
  fn help_message(&self) -> Option<String> {
    match self {
      GitError::PushFailed { reason, .. } => {
        if reason.contains("non-fast-forward") {
          Some("The remote has commits you don't have. Fetch and re-run the sync first.".to_string())
        } else if reason.contains("permission denied") || reason.contains("403") {
          Some("Check the push credentials configured for the CI runner.".to_string())
        } else {
          None
        }
      }
      GitError::RepoNotFound { path } => Some(format!(
        "Initialize the repository first or check the path: {}",
        path.display()
      )),
      GitError::BranchMoved { .. } => {
        Some("Another process updated the branch. Re-read the branch head and retry.".to_string())
      }
      GitError::Locked { path } => Some(format!(
        "Wait for the other run to finish. If none is running, delete {}",
        path.display()
      )),
      _ => None,
    }
  }
}

impl fmt::Display for GitError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      GitError::CommandFailed { command, stderr } => {
        write!(f, "Git command failed: {}\n{}", command, stderr)
      }
      GitError::RepoNotFound { path } => {
        write!(f, "Git repository not found at: {}", path.display())
      }
      GitError::CommitNotFound { sha } => {
        write!(f, "Commit not found: {}", sha)
      }
      GitError::BranchError { message } => {
        write!(f, "Branch operation failed: {}", message)
      }
      GitError::BranchMoved {
        branch,
        expected,
        actual,
      } => {
        write!(
          f,
          "Branch '{}' moved: expected {} but found {}",
          branch,
          short_sha(expected),
          short_sha(actual)
        )
      }
      GitError::Locked { path } => {
        write!(f, "Branch is locked by another fork-rail run ({})", path.display())
      }
      GitError::PushFailed {
        remote,
        refspec,
        reason,
      } => {
        write!(f, "Push of {} to {} failed: {}", refspec, remote, reason)
      }
    }
  }
}

/// Validation errors
#[derive(Debug)]
pub enum ValidationError {
  /// Platform target registry violates its invariants
  TargetRegistry { reason: String },

  /// Versioned manifest is missing the version key or holds an unexpected value
  Manifest { path: PathBuf, reason: String },

  /// Ledger entry is unusable
  Ledger { reason: String },
}

impl ValidationError {
  fn help_message(&self) -> Option<String> {
    match self {
      ValidationError::TargetRegistry { .. } => Some(
        "Targets without a free runner must be recorded with `supported = false` and `runner = \"paid\"`.".to_string(),
      ),
      ValidationError::Manifest { .. } => {
        Some("Check `[manifest]` in fork-rail.toml points at the workspace Cargo.toml.".to_string())
      }
      ValidationError::Ledger { .. } => Some("Run `fork-rail ledger check` to inspect every rule.".to_string()),
    }
  }
}

impl fmt::Display for ValidationError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ValidationError::TargetRegistry { reason } => {
        write!(f, "Platform target registry is invalid: {}", reason)
      }
      ValidationError::Manifest { path, reason } => {
        write!(f, "Versioned manifest {} is invalid: {}", path.display(), reason)
      }
      ValidationError::Ledger { reason } => {
        write!(f, "Customization ledger is invalid: {}", reason)
      }
    }
  }
}

/// Merge reconciliation errors
#[derive(Debug)]
pub enum MergeError {
  /// A rule could not find its anchor, or a conflict sits in a file no rule governs
  UnresolvableConflict { path: PathBuf, rule: Option<String>, reason: String },
}

impl MergeError {
  fn help_message(&self) -> Option<String> {
    match self {
      MergeError::UnresolvableConflict { rule: Some(rule), .. } => Some(format!(
        "Upstream restructured this file. Resolve it by hand, then update or remove rule '{}' with `fork-rail ledger`.",
        rule
      )),
      MergeError::UnresolvableConflict { rule: None, .. } => Some(
        "Resolve the conflict by hand and commit. Add a ledger rule if this file should carry a customization."
          .to_string(),
      ),
    }
  }
}

impl fmt::Display for MergeError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      MergeError::UnresolvableConflict { path, rule, reason } => {
        write!(f, "Unresolvable merge conflict in {}", path.display())?;
        if let Some(rule) = rule {
          write!(f, " (rule '{}')", rule)?;
        }
        write!(f, ": {}", reason)
      }
    }
  }
}

/// Release pipeline errors
#[derive(Debug)]
pub enum ReleaseError {
  /// Tag does not match the release grammar
  MalformedTag { tag: String, reason: String },

  /// Tag version disagrees with the version committed at the tagged commit
  VersionMismatch { tag: String, committed: String },

  /// One or more required targets failed to build
  BuildFailed { targets: Vec<String> },

  /// A rebuild produced different bytes than the first build
  NonReproducible {
    target: String,
    package: String,
    expected: String,
    actual: String,
  },

  /// The registry refused a publish
  PublishRejected { package: String, reason: String },
}

impl ReleaseError {
  /// Exit code for the pipeline stage that failed
  pub fn exit_code(&self) -> ExitCode {
    match self {
      ReleaseError::MalformedTag { .. } | ReleaseError::VersionMismatch { .. } => ExitCode::Rejected,
      ReleaseError::BuildFailed { .. } | ReleaseError::NonReproducible { .. } => ExitCode::Build,
      ReleaseError::PublishRejected { .. } => ExitCode::Publish,
    }
  }

  fn help_message(&self) -> Option<String> {
    match self {
      ReleaseError::MalformedTag { .. } => Some(
        "Release tags look like rust-v0.88.0, rust-v0.88.0-alpha.2 or rust-v0.88.0-cometix.".to_string(),
      ),
      ReleaseError::VersionMismatch { .. } => {
        Some("Cut releases with `fork-rail release cut <version>` so the tag and manifest agree.".to_string())
      }
      ReleaseError::BuildFailed { .. } => {
        Some("Partial multi-platform releases are not allowed. Fix the failing targets and re-run.".to_string())
      }
      ReleaseError::NonReproducible { .. } => Some(
        "A retry produced different bytes. Investigate the build environment before releasing this tag.".to_string(),
      ),
      ReleaseError::PublishRejected { .. } => Some(
        "Publishing is never retried automatically. Check the registry for what was published before re-running."
          .to_string(),
      ),
    }
  }
}

impl fmt::Display for ReleaseError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ReleaseError::MalformedTag { tag, reason } => {
        write!(f, "Malformed release tag '{}': {}", tag, reason)
      }
      ReleaseError::VersionMismatch { tag, committed } => {
        write!(f, "Tag '{}' does not match committed version '{}'", tag, committed)
      }
      ReleaseError::BuildFailed { targets } => {
        write!(f, "Required build(s) failed: {}", targets.join(", "))
      }
      ReleaseError::NonReproducible {
        target,
        package,
        expected,
        actual,
      } => {
        write!(
          f,
          "Non-reproducible artifact {} for {}: expected sha256 {} but got {}",
          package, target, expected, actual
        )
      }
      ReleaseError::PublishRejected { package, reason } => {
        write!(f, "Registry rejected {}: {}", package, reason)
      }
    }
  }
}

fn short_sha(sha: &str) -> &str {
  sha.get(..8).unwrap_or(sha)
}

/// Result type alias for fork-rail
pub type RailResult<T> = Result<T, RailError>;

/// Helper trait to add context to Results
pub trait ResultExt<T> {
  /// Add context to an error result
  fn context(self, ctx: impl Into<String>) -> RailResult<T>;

  /// Add context using a closure (lazy evaluation)
  fn with_context<F>(self, f: F) -> RailResult<T>
  where
    F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
  E: Into<RailError>,
{
  fn context(self, ctx: impl Into<String>) -> RailResult<T> {
    self.map_err(|e| e.into().context(ctx))
  }

  fn with_context<F>(self, f: F) -> RailResult<T>
  where
    F: FnOnce() -> String,
  {
    self.map_err(|e| e.into().context(f()))
  }
}

/// Pretty-print an error to stderr with help text
pub fn print_error(error: &RailError) {
  eprintln!("\n❌ {}\n", error);

  if let Some(help) = error.help_message() {
    eprintln!("💡 Help: {}\n", help);
  }
}

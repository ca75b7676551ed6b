//! Diagnostic logging
//!
//! Controlled by `FORK_RAIL_LOG` (an `EnvFilter` directive, e.g. `fork_rail=debug`).
//! Without it only warnings are shown; `--verbose` raises the default to `debug`.
//! Events go to stderr so command output on stdout stays machine-readable.

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "FORK_RAIL_LOG";

/// Install the global subscriber. Safe to call once per process.
pub fn init(verbose: bool) {
  let default = if verbose { "debug" } else { "warn" };
  let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));

  // A subscriber may already be installed (e.g. by a test harness)
  let _ = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .with_target(false)
    .without_time()
    .try_init();
}

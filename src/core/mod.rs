//! Core building blocks shared by every fork-rail operation
//!
//! - **config**: `fork-rail.toml` parsing and validation
//! - **context**: Repository context built once per invocation
//! - **error**: Error types with contextual help and exit codes
//! - **lock**: Exclusive lock around base-branch mutations
//! - **vcs**: Git access (SystemGit) and the branch compare-and-swap seam

pub mod config;
pub mod context;
pub mod error;
pub mod lock;
pub mod vcs;

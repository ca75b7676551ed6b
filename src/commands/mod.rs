//! CLI commands for fork-rail
//!
//! ## Setup
//! - **init**: Write fork-rail.toml and an empty ledger
//!
//! ## Upstream sync
//! - **sync**: Merge upstream and reconcile the customization ledger
//! - **ledger**: List, check, add, remove and review customization rules
//!
//! ## Release
//! - **targets**: Platform target registry
//! - **release**: Stamp, validate, build and publish
//!
//! All commands accept `&WorkspaceContext`, built once in `main`.

pub mod init;
pub mod ledger;
pub mod release;
pub mod sync;
pub mod targets;

pub use init::run_init;
pub use ledger::{run_ledger_add, run_ledger_check, run_ledger_list, run_ledger_remove, run_ledger_review};
pub use release::{
  run_release_cut, run_release_decide, run_release_reset, run_release_run, run_release_stamp, run_release_validate,
};
pub use sync::run_sync;
pub use targets::{run_targets_add, run_targets_list, run_targets_remove, run_targets_set};

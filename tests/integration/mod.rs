//! Integration tests for fork-rail
//!
//! Each test drives the compiled binary against throwaway git repositories.

mod helpers;
mod test_ledger;
mod test_release;
mod test_sync;
mod test_targets;

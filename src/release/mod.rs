//! Release state machine
//!
//! A release moves through a fixed sequence:
//!
//! 1. **Stamp**: the base branch carries the sentinel version. `stamp` writes the
//!    release version in a single commit, tags it, and `reset` returns the branch
//!    to the sentinel. The tag keeps pointing at the release commit.
//! 2. **Validate**: the pushed tag must match the grammar and the version in the
//!    manifest at the tagged commit. Nothing is built otherwise.
//! 3. **Build**: every active target is built from the tagged commit in parallel.
//!    All required targets must succeed, and rebuilds must be byte-identical.
//! 4. **Publish**: only allow-listed packages are published, under the fork's
//!    scope and a dist-tag picked from the tag's channel.
//!
//! # Example fork-rail.toml
//!
//! ```toml
//! [tags]
//! prefix = "rust-v"
//! product_channel = "cometix"
//!
//! [publish]
//! scope = "@echoflux537"
//! allowed_packages = ["codex"]
//! ```

pub mod build;
pub mod checksums;
pub mod pipeline;
pub mod publish;
pub mod stamp;
pub mod tag;
pub mod targets;


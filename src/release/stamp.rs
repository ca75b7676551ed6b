//! Ephemeral release version on the base branch
//!
//! Outside a release the base branch carries the sentinel version. Stamping
//! creates one commit on top of the prior head that changes only the manifest
//! version, tags it, and moves the branch there. Resetting moves the branch
//! back to the prior head. The tag stays behind on the release commit.

use crate::core::config::ManifestConfig;
use crate::core::error::{RailError, RailResult, ResultExt, ValidationError};
use crate::core::vcs::{BranchHandle, ReleaseRepo};
use crate::release::tag::VersionTag;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use toml_edit::{DocumentMut, Item, Value};

/// Read the version stored at dotted `key` in a manifest
pub fn read_manifest_version(path: &Path, content: &str, key: &str) -> RailResult<String> {
  let doc = content.parse::<DocumentMut>()?;
  let mut item = doc.as_item();
  for part in key.split('.') {
    item = item.get(part).ok_or_else(|| missing_key(path, key))?;
  }
  item
    .as_str()
    .map(str::to_string)
    .ok_or_else(|| manifest_error(path, format!("'{}' is not a string", key)))
}

/// Rewrite the version at dotted `key`, keeping the rest of the file intact
pub fn write_manifest_version(path: &Path, content: &str, key: &str, version: &str) -> RailResult<String> {
  let mut doc = content.parse::<DocumentMut>()?;
  let mut item: &mut Item = doc.as_item_mut();
  for part in key.split('.') {
    item = item.get_mut(part).ok_or_else(|| missing_key(path, key))?;
  }
  let value = item
    .as_value_mut()
    .filter(|v| v.is_str())
    .ok_or_else(|| manifest_error(path, format!("'{}' is not a string", key)))?;
  let decor = value.decor().clone();
  *value = Value::from(version);
  *value.decor_mut() = decor;
  Ok(doc.to_string())
}

fn missing_key(path: &Path, key: &str) -> RailError {
  manifest_error(path, format!("key '{}' not found", key))
}

fn manifest_error(path: &Path, reason: String) -> RailError {
  RailError::Validation(ValidationError::Manifest {
    path: path.to_path_buf(),
    reason,
  })
}

/// Everything needed to undo a stamp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StampedRelease {
  /// Base branch before stamping
  pub prior: BranchHandle,
  /// Base branch pointing at the release commit
  pub handle: BranchHandle,
  pub release_commit: String,
  pub tag: String,
  pub version: String,
}

impl StampedRelease {
  /// Load a pending stamp record, `None` if no stamp is open
  pub fn load(path: &Path) -> RailResult<Option<Self>> {
    if !path.exists() {
      return Ok(None);
    }
    let content = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(Some(serde_json::from_str(&content)?))
  }

  pub fn save(&self, path: &Path) -> RailResult<()> {
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(self)?).with_context(|| format!("Failed to write {}", path.display()))
  }
}

/// Writes and removes the release version
pub struct VersionStamper<'a, R: ReleaseRepo> {
  repo: &'a R,
  manifest: &'a ManifestConfig,
}

impl<'a, R: ReleaseRepo> VersionStamper<'a, R> {
  pub fn new(repo: &'a R, manifest: &'a ManifestConfig) -> Self {
    Self { repo, manifest }
  }

  /// Version recorded in the manifest at `commit`
  pub fn committed_version(&self, commit: &str) -> RailResult<String> {
    let path = &self.manifest.path;
    let content = self
      .repo
      .read_file_at(commit, path)?
      .ok_or_else(|| manifest_error(path, format!("file does not exist at {}", commit)))?;
    read_manifest_version(path, &content, &self.manifest.key)
  }

  /// Create the release commit and tag, and move the base branch onto it
  pub fn stamp_release(&self, prior: &BranchHandle, tag: &VersionTag) -> RailResult<StampedRelease> {
    let path = &self.manifest.path;
    let version = tag.version_string();

    let content = self
      .repo
      .read_file_at(&prior.head, path)?
      .ok_or_else(|| manifest_error(path, format!("file does not exist at {}", prior.head)))?;
    let current = read_manifest_version(path, &content, &self.manifest.key)?;
    if current != self.manifest.sentinel {
      return Err(RailError::with_help(
        format!(
          "Base branch '{}' holds version {} instead of the sentinel {}",
          prior.branch, current, self.manifest.sentinel
        ),
        "A previous release window was not closed. Run `fork-rail release reset`.",
      ));
    }
    if self.repo.resolve_tag(&tag.raw)?.is_some() {
      return Err(RailError::with_help(
        format!("Tag {} already exists", tag.raw),
        "Release tags are permanent. Pick the next version.",
      ));
    }

    let stamped = write_manifest_version(path, &content, &self.manifest.key, &version)?;
    let message = format!("Release {}", version);
    let release_commit = self.repo.commit_file(&prior.head, path, &stamped, &message)?;
    let handle = match self.repo.advance(prior, &release_commit) {
      Ok(handle) => handle,
      Err(e) => {
        self.restore_prior(prior, &release_commit);
        return Err(e);
      }
    };
    tracing::info!(branch = %handle.branch, commit = %release_commit, version = %version, "stamped release version");

    if let Err(e) = self.repo.create_annotated_tag(&tag.raw, &release_commit, &message) {
      tracing::warn!(tag = %tag.raw, error = %e, "tagging failed, restoring base branch");
      self.repo.advance(&handle, &prior.head)?;
      return Err(e);
    }

    if self.repo.resolve_tag(&tag.raw)?.as_deref() != Some(release_commit.as_str()) {
      return Err(RailError::message(format!(
        "Tag {} does not point at release commit {}",
        tag.raw, release_commit
      )));
    }

    Ok(StampedRelease {
      prior: prior.clone(),
      handle,
      release_commit,
      tag: tag.raw.clone(),
      version,
    })
  }

  /// Put the branch back on `prior` if a failed advance left it on `release_commit`
  fn restore_prior(&self, prior: &BranchHandle, release_commit: &str) {
    let moved = match self.repo.read_branch(&prior.branch) {
      Ok(current) if current.head == release_commit => current,
      Ok(_) => return,
      Err(e) => {
        tracing::error!(branch = %prior.branch, error = %e, "cannot read branch after failed stamp");
        return;
      }
    };
    match self.repo.advance(&moved, &prior.head) {
      Ok(_) => tracing::warn!(branch = %prior.branch, head = %prior.head, "restored branch after failed stamp"),
      Err(e) => tracing::error!(branch = %prior.branch, error = %e, "failed to restore branch after failed stamp"),
    }
  }

  /// Move the base branch back to the pre-stamp head
  pub fn reset_to_sentinel(&self, stamped: &StampedRelease) -> RailResult<BranchHandle> {
    let handle = self.repo.advance(&stamped.handle, &stamped.prior.head)?;

    let version = self.committed_version(&handle.head)?;
    if version != self.manifest.sentinel {
      return Err(RailError::message(format!(
        "Base branch '{}' holds {} after reset, expected sentinel {}",
        handle.branch, version, self.manifest.sentinel
      )));
    }
    if self.repo.resolve_tag(&stamped.tag)?.as_deref() != Some(stamped.release_commit.as_str()) {
      return Err(RailError::message(format!(
        "Tag {} no longer points at release commit {}",
        stamped.tag, stamped.release_commit
      )));
    }

    tracing::info!(branch = %handle.branch, head = %handle.head, "reset base branch to sentinel");
    Ok(handle)
  }

  /// Stamp, run `after_tag` (e.g. push the tag), then always reset
  ///
  /// The reset runs even when `after_tag` fails so the sentinel is restored;
  /// the hook's error is returned afterwards.
  pub fn cut(
    &self,
    prior: &BranchHandle,
    tag: &VersionTag,
    after_tag: impl FnOnce(&StampedRelease) -> RailResult<()>,
  ) -> RailResult<(StampedRelease, BranchHandle)> {
    let stamped = self.stamp_release(prior, tag)?;
    let hook = after_tag(&stamped);
    let handle = self.reset_to_sentinel(&stamped)?;
    hook?;
    Ok((stamped, handle))
  }
}

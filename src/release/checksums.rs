//! First-build checksums per tag and target
//!
//! Stored in `.fork-rail/checksums.json` as `tag -> "triple/package" -> sha256`.
//! A rebuild of the same tag and target must produce the same bytes.
//!
//! The local store does not survive a fresh CI runner, so a run can also be
//! seeded from the `release.json` of an earlier run of the same tag.

use crate::core::error::{RailError, RailResult, ReleaseError, ResultExt};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io;
use std::path::Path;

/// Hex SHA-256 of a file, streamed
pub fn sha256_file(path: &Path) -> RailResult<String> {
  let mut file = File::open(path).with_context(|| format!("Failed to open artifact {}", path.display()))?;
  let mut hasher = Sha256::new();
  io::copy(&mut file, &mut hasher).with_context(|| format!("Failed to hash {}", path.display()))?;
  Ok(format!("{:x}", hasher.finalize()))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChecksumStore {
  releases: BTreeMap<String, BTreeMap<String, String>>,
}

impl ChecksumStore {
  pub fn load(path: &Path) -> RailResult<Self> {
    if !path.exists() {
      return Ok(Self::default());
    }
    let content = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(serde_json::from_str(&content)?)
  }

  pub fn save(&self, path: &Path) -> RailResult<()> {
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(self)?).with_context(|| format!("Failed to write {}", path.display()))
  }

  /// Checksum recorded by the first build, if any
  pub fn get(&self, tag: &str, target: &str, package: &str) -> Option<&str> {
    self
      .releases
      .get(tag)
      .and_then(|m| m.get(&key(target, package)))
      .map(String::as_str)
  }

  /// Record a checksum, or check it against the first build's
  pub fn verify_or_record(&mut self, tag: &str, target: &str, package: &str, checksum: &str) -> RailResult<()> {
    let entry = self.releases.entry(tag.to_string()).or_default();
    match entry.get(&key(target, package)) {
      Some(expected) if expected != checksum => Err(RailError::Release(ReleaseError::NonReproducible {
        target: target.to_string(),
        package: package.to_string(),
        expected: expected.clone(),
        actual: checksum.to_string(),
      })),
      Some(_) => Ok(()),
      None => {
        entry.insert(key(target, package), checksum.to_string());
        Ok(())
      }
    }
  }
}

/// The subset of a release record that carries first-build checksums
#[derive(Deserialize)]
struct RecordedChecksums {
  tag: String,
  #[serde(default)]
  artifacts: Vec<RecordedChecksum>,
}

#[derive(Deserialize)]
struct RecordedChecksum {
  target: String,
  package: String,
  checksum: String,
}

impl ChecksumStore {
  /// Take checksums for `tag` from an earlier run's `release.json`
  ///
  /// Entries already in the store win. A record for another tag is an error.
  /// Returns how many checksums were added.
  pub fn seed_from_record(&mut self, tag: &str, record: &Path) -> RailResult<usize> {
    let content = fs::read_to_string(record).with_context(|| format!("Failed to read {}", record.display()))?;
    let recorded: RecordedChecksums = serde_json::from_str(&content)?;
    if recorded.tag != tag {
      return Err(RailError::with_help(
        format!("{} records tag {}, not {}", record.display(), recorded.tag, tag),
        "Pass the release.json of an earlier run of the same tag.",
      ));
    }

    let entry = self.releases.entry(tag.to_string()).or_default();
    let mut added = 0;
    for artifact in recorded.artifacts {
      let k = key(&artifact.target, &artifact.package);
      if !entry.contains_key(&k) {
        entry.insert(k, artifact.checksum);
        added += 1;
      }
    }
    tracing::debug!(tag = %tag, record = %record.display(), added, "seeded first-build checksums");
    Ok(added)
  }
}

fn key(target: &str, package: &str) -> String {
  format!("{}/{}", target, package)
}

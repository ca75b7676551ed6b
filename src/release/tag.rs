//! Release tag grammar and validation
//!
//! A release tag is `<prefix><major>.<minor>.<patch>` with an optional channel
//! suffix `-(alpha|beta|<product>)` and optional `.<n>` sequence. Numbers never
//! carry leading zeros, so formatting a parsed tag yields the raw text again.
//! Validation is the only gate in front of the build.

use crate::core::config::TagConfig;
use crate::core::error::{RailError, RailResult, ReleaseError};
use regex::Regex;
use serde::{Serialize, Serializer};
use std::fmt;

/// Pre-release channel of a tag
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Channel {
  Stable,
  Alpha,
  Beta,
  /// Downstream product channel (e.g. `cometix`)
  Product(String),
}

impl Channel {
  /// Suffix label, `None` for stable
  pub fn label(&self) -> Option<&str> {
    match self {
      Channel::Stable => None,
      Channel::Alpha => Some("alpha"),
      Channel::Beta => Some("beta"),
      Channel::Product(label) => Some(label),
    }
  }
}

impl fmt::Display for Channel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.label().unwrap_or("stable"))
  }
}

impl Serialize for Channel {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}

/// A parsed, valid release tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionTag {
  pub prefix: String,
  pub major: u64,
  pub minor: u64,
  pub patch: u64,
  pub channel: Channel,
  pub channel_sequence: Option<u64>,
  pub raw: String,
}

impl VersionTag {
  /// Version without the tag prefix, e.g. `0.46.0-alpha.3`
  pub fn version_string(&self) -> String {
    let mut s = format!("{}.{}.{}", self.major, self.minor, self.patch);
    if let Some(label) = self.channel.label() {
      s.push('-');
      s.push_str(label);
      if let Some(n) = self.channel_sequence {
        s.push_str(&format!(".{}", n));
      }
    }
    s
  }

  pub fn is_prerelease(&self) -> bool {
    matches!(self.channel, Channel::Alpha | Channel::Beta)
  }

  /// True when `committed` is the same version as this tag
  fn matches_committed(&self, committed: &str) -> bool {
    let Ok(version) = semver::Version::parse(committed.trim()) else {
      return false;
    };
    let expected_pre = self.version_string();
    let expected_pre = expected_pre.split_once('-').map(|(_, pre)| pre).unwrap_or("");
    version.major == self.major
      && version.minor == self.minor
      && version.patch == self.patch
      && version.pre.as_str() == expected_pre
      && version.build.is_empty()
  }
}

impl fmt::Display for VersionTag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}{}", self.prefix, self.version_string())
  }
}

/// Why a tag was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
  Malformed { tag: String, detail: String },
  VersionMismatch { tag: String, expected: String, committed: String },
}

impl Rejection {
  /// Stable reason code for CI output
  pub fn reason(&self) -> &'static str {
    match self {
      Rejection::Malformed { .. } => "malformed",
      Rejection::VersionMismatch { .. } => "version-mismatch",
    }
  }
}

impl fmt::Display for Rejection {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Rejection::Malformed { tag, detail } => write!(f, "{}: tag '{}' {}", self.reason(), tag, detail),
      Rejection::VersionMismatch {
        tag,
        expected,
        committed,
      } => write!(
        f,
        "{}: tag '{}' wants version {} but the tagged commit has {}",
        self.reason(),
        tag,
        expected,
        committed
      ),
    }
  }
}

impl From<Rejection> for RailError {
  fn from(rejection: Rejection) -> Self {
    match rejection {
      Rejection::Malformed { tag, detail } => RailError::Release(ReleaseError::MalformedTag { tag, reason: detail }),
      Rejection::VersionMismatch { tag, committed, .. } => {
        RailError::Release(ReleaseError::VersionMismatch { tag, committed })
      }
    }
  }
}

/// Compiled tag grammar for one prefix and product channel
#[derive(Debug, Clone)]
pub struct TagGrammar {
  prefix: String,
  product: String,
  pattern: Regex,
}

impl TagGrammar {
  pub fn new(config: &TagConfig) -> RailResult<Self> {
    let product_ok = !config.product_channel.is_empty()
      && config
        .product_channel
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-');
    if !product_ok {
      return Err(RailError::message(format!(
        "Product channel '{}' must be a non-empty semver identifier",
        config.product_channel
      )));
    }

    let number = r"(0|[1-9][0-9]*)";
    let pattern = format!(
      r"^{prefix}{n}\.{n}\.{n}(?:-(alpha|beta|{product})(?:\.{n})?)?$",
      prefix = regex::escape(&config.prefix),
      n = number,
      product = regex::escape(&config.product_channel),
    );

    Ok(Self {
      prefix: config.prefix.clone(),
      product: config.product_channel.clone(),
      pattern: Regex::new(&pattern)?,
    })
  }

  pub fn prefix(&self) -> &str {
    &self.prefix
  }

  /// Parse a raw tag
  pub fn parse(&self, raw: &str) -> Result<VersionTag, Rejection> {
    let malformed = |detail: String| Rejection::Malformed {
      tag: raw.to_string(),
      detail,
    };

    let Some(caps) = self.pattern.captures(raw) else {
      return Err(malformed(self.explain(raw)));
    };

    let number = |i: usize| -> Result<Option<u64>, Rejection> {
      match caps.get(i) {
        Some(m) => m
          .as_str()
          .parse::<u64>()
          .map(Some)
          .map_err(|_| malformed(format!("has out-of-range number '{}'", m.as_str()))),
        None => Ok(None),
      }
    };

    let channel = match caps.get(4).map(|m| m.as_str()) {
      None => Channel::Stable,
      Some("alpha") => Channel::Alpha,
      Some("beta") => Channel::Beta,
      Some(label) => Channel::Product(label.to_string()),
    };

    Ok(VersionTag {
      prefix: self.prefix.clone(),
      major: number(1)?.unwrap_or_default(),
      minor: number(2)?.unwrap_or_default(),
      patch: number(3)?.unwrap_or_default(),
      channel,
      channel_sequence: number(5)?,
      raw: raw.to_string(),
    })
  }

  /// Parse a bare version (`0.46.0-beta.1`) as if it were tagged
  pub fn parse_version(&self, version: &str) -> Result<VersionTag, Rejection> {
    self.parse(&format!("{}{}", self.prefix, version))
  }

  /// Validate a pushed tag against the version committed at the tagged commit
  pub fn validate(&self, raw: &str, committed_version: &str) -> Result<VersionTag, Rejection> {
    let tag = self.parse(raw)?;
    if !tag.matches_committed(committed_version) {
      return Err(Rejection::VersionMismatch {
        tag: raw.to_string(),
        expected: tag.version_string(),
        committed: committed_version.trim().to_string(),
      });
    }
    Ok(tag)
  }

  fn explain(&self, raw: &str) -> String {
    let Some(rest) = raw.strip_prefix(&self.prefix) else {
      return format!("is missing the '{}' prefix", self.prefix);
    };
    if let Some((_, suffix)) = rest.split_once('-') {
      let label = suffix.split('.').next().unwrap_or_default();
      if !["alpha", "beta", self.product.as_str()].contains(&label) {
        return format!("has unknown channel '{}' (expected alpha, beta or {})", label, self.product);
      }
    }
    format!(
      "does not match {}<major>.<minor>.<patch>[-(alpha|beta|{})[.<n>]]",
      self.prefix, self.product
    )
  }
}

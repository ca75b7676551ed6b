//! A single customization rule and its pure application function

use crate::core::error::{MergeError, RailError, RailResult, ValidationError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::path::PathBuf;

/// What kind of downstream edit a rule carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Category {
  /// Product name, binary name, user-visible strings
  Rebrand,
  /// Repository URLs, authors, homepage
  Ownership,
  /// Package scope, registry, install instructions
  Distribution,
  /// Downstream-only behavior changes
  Feature,
}

impl fmt::Display for Category {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Category::Rebrand => "rebrand",
      Category::Ownership => "ownership",
      Category::Distribution => "distribution",
      Category::Feature => "feature",
    };
    f.write_str(name)
  }
}

/// How a rule locates the upstream text it rewrites
///
/// Serialized externally tagged: `matcher = { literal = "..." }` or
/// `matcher = { regex = "..." }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Matcher {
  Literal(String),
  Regex(String),
}

impl Matcher {
  pub fn pattern(&self) -> &str {
    match self {
      Matcher::Literal(s) | Matcher::Regex(s) => s,
    }
  }

  fn kind(&self) -> &'static str {
    match self {
      Matcher::Literal(_) => "literal",
      Matcher::Regex(_) => "regex",
    }
  }
}

enum Compiled<'a> {
  Literal(&'a str),
  Regex(Regex),
}

impl Compiled<'_> {
  fn hits(&self, text: &str) -> Vec<Range<usize>> {
    match self {
      Compiled::Literal(lit) => text.match_indices(lit).map(|(i, m)| i..i + m.len()).collect(),
      Compiled::Regex(re) => re.find_iter(text).map(|m| m.range()).collect(),
    }
  }
}

/// One durable downstream edit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomizationRule {
  /// Stable name used by `ledger remove` and `ledger review`
  pub id: String,

  /// File the rule governs, relative to the repository root
  #[serde(rename = "path")]
  pub scope_path: PathBuf,

  pub matcher: Matcher,

  /// Text every matcher hit is rewritten to (inserted verbatim)
  pub replacement: String,

  pub category: Category,
}

/// Result of running a rule over one file's contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Application {
  /// Replacement present and no un-rewritten hit remains
  Satisfied,
  /// Hits were rewritten
  Rewritten { content: String, hits: usize },
  /// Not satisfied and the matcher found nothing to rewrite
  AnchorMissing,
}

impl CustomizationRule {
  /// Check the rule is usable before it ever touches a file
  pub fn validate(&self) -> RailResult<()> {
    let invalid = |reason: String| {
      RailError::Validation(ValidationError::Ledger {
        reason: format!("rule '{}': {}", self.id, reason),
      })
    };

    if self.id.trim().is_empty() {
      return Err(RailError::Validation(ValidationError::Ledger {
        reason: "rule id must not be empty".to_string(),
      }));
    }
    if self.scope_path.as_os_str().is_empty() || self.scope_path.is_absolute() {
      return Err(invalid("path must be relative to the repository root".to_string()));
    }
    if self.matcher.pattern().is_empty() {
      return Err(invalid("matcher must not be empty".to_string()));
    }
    if self.replacement.is_empty() {
      return Err(invalid("replacement must not be empty".to_string()));
    }
    if let Matcher::Regex(pattern) = &self.matcher {
      let re = Regex::new(pattern).map_err(|e| invalid(format!("regex does not compile: {}", e)))?;
      if re.is_match("") {
        return Err(invalid("regex matches the empty string".to_string()));
      }
    }
    Ok(())
  }

  fn compile(&self) -> RailResult<Compiled<'_>> {
    Ok(match &self.matcher {
      Matcher::Literal(lit) => Compiled::Literal(lit),
      Matcher::Regex(pattern) => Compiled::Regex(Regex::new(pattern)?),
    })
  }

  /// True when the replacement is present and every matcher hit lies inside
  /// an occurrence of the replacement
  pub fn is_satisfied(&self, content: &str) -> RailResult<bool> {
    let matcher = self.compile()?;
    Ok(satisfied(&matcher, &self.replacement, content))
  }

  /// Run the rule over `content` without deciding what to do on failure
  pub fn evaluate(&self, content: &str) -> RailResult<Application> {
    let matcher = self.compile()?;
    if satisfied(&matcher, &self.replacement, content) {
      return Ok(Application::Satisfied);
    }

    // Text already carrying the replacement is left alone; only the segments
    // between replacement occurrences are searched.
    let mut hits = 0;
    let mut out = String::with_capacity(content.len());
    for (i, segment) in content.split(self.replacement.as_str()).enumerate() {
      if i > 0 {
        out.push_str(&self.replacement);
      }
      let ranges = matcher.hits(segment);
      hits += ranges.len();
      let mut last = 0;
      for range in ranges {
        out.push_str(&segment[last..range.start]);
        out.push_str(&self.replacement);
        last = range.end;
      }
      out.push_str(&segment[last..]);
    }

    if hits == 0 {
      return Ok(Application::AnchorMissing);
    }

    if !satisfied(&matcher, &self.replacement, &out) {
      return Err(RailError::Validation(ValidationError::Ledger {
        reason: format!(
          "rule '{}': rewriting leaves new {} hits behind, the replacement overlaps the matcher",
          self.id,
          self.matcher.kind()
        ),
      }));
    }

    Ok(Application::Rewritten { content: out, hits })
  }

  /// Apply the rule, returning the rewritten content
  ///
  /// Satisfied content comes back unchanged, so `apply(apply(c)) == apply(c)`.
  pub fn apply(&self, content: &str) -> RailResult<String> {
    match self.evaluate(content)? {
      Application::Satisfied => Ok(content.to_string()),
      Application::Rewritten { content, .. } => Ok(content),
      Application::AnchorMissing => Err(self.anchor_missing()),
    }
  }

  pub(crate) fn anchor_missing(&self) -> RailError {
    RailError::Merge(MergeError::UnresolvableConflict {
      path: self.scope_path.clone(),
      rule: Some(self.id.clone()),
      reason: format!(
        "{} matcher '{}' found no anchor and the replacement is absent",
        self.matcher.kind(),
        self.matcher.pattern()
      ),
    })
  }
}

fn satisfied(matcher: &Compiled<'_>, replacement: &str, content: &str) -> bool {
  content.contains(replacement) && content.split(replacement).all(|segment| matcher.hits(segment).is_empty())
}

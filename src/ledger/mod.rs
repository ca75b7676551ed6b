//! Customization ledger
//!
//! The ledger is an ordered list of [`CustomizationRule`]s stored as
//! `[[rule]]` tables. File order is application order. Edits go through
//! `toml_edit` so comments and layout written by maintainers survive, and
//! existing rules are never reordered.

pub mod rule;
pub mod state;

pub use rule::{Application, Category, CustomizationRule, Matcher};

use crate::core::error::{ConfigError, RailError, RailResult, ResultExt, ValidationError};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use toml_edit::{ArrayOfTables, DocumentMut, InlineTable, Item, Table, value};

const LEDGER_HEADER: &str = "\
# Downstream customizations re-applied after every upstream merge.
# Rules run in file order. Each [[rule]] needs id, path, matcher, replacement, category.
";

#[derive(Deserialize)]
struct LedgerFile {
  #[serde(default, rename = "rule")]
  rules: Vec<CustomizationRule>,
}

/// Ordered, validated set of customization rules
#[derive(Debug, Clone, Default)]
pub struct Ledger {
  rules: Vec<CustomizationRule>,
}

impl Ledger {
  /// Load and validate the ledger file
  pub fn load(path: &Path) -> RailResult<Self> {
    let content = fs::read_to_string(path).with_context(|| format!("Failed to read ledger {}", path.display()))?;
    Self::from_toml(&content).with_context(|| format!("In ledger {}", path.display()))
  }

  /// Parse ledger TOML
  pub fn from_toml(content: &str) -> RailResult<Self> {
    let file: LedgerFile = toml_edit::de::from_str(content)?;
    let ledger = Self { rules: file.rules };
    ledger.validate()?;
    Ok(ledger)
  }

  fn validate(&self) -> RailResult<()> {
    let mut seen = HashSet::new();
    for rule in &self.rules {
      rule.validate()?;
      if !seen.insert(rule.id.as_str()) {
        return Err(RailError::Validation(ValidationError::Ledger {
          reason: format!("duplicate rule id '{}'", rule.id),
        }));
      }
    }
    Ok(())
  }

  /// Rules in application order
  pub fn rules(&self) -> &[CustomizationRule] {
    &self.rules
  }

  pub fn is_empty(&self) -> bool {
    self.rules.is_empty()
  }

  pub fn find(&self, id: &str) -> Option<&CustomizationRule> {
    self.rules.iter().find(|r| r.id == id)
  }

  /// Every governed file, in order of first appearance
  pub fn governed_paths(&self) -> Vec<&Path> {
    let mut seen = HashSet::new();
    self
      .rules
      .iter()
      .map(|r| r.scope_path.as_path())
      .filter(|p| seen.insert(*p))
      .collect()
  }

  /// Rules governing `path`, in ledger order
  pub fn rules_for<'a>(&'a self, path: &'a Path) -> impl Iterator<Item = &'a CustomizationRule> + 'a {
    self.rules.iter().filter(move |r| r.scope_path == path)
  }

  pub fn governs(&self, path: &Path) -> bool {
    self.rules.iter().any(|r| r.scope_path == path)
  }

  /// Write an empty ledger if none exists. Returns whether a file was created.
  pub fn init(path: &Path) -> RailResult<bool> {
    if path.exists() {
      return Ok(false);
    }
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent)?;
    }
    fs::write(path, LEDGER_HEADER).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(true)
  }

  /// Append a rule to the end of the ledger file
  pub fn add_rule(path: &Path, rule: &CustomizationRule) -> RailResult<()> {
    let mut doc = read_document(path)?;

    let rules = doc
      .entry("rule")
      .or_insert(Item::ArrayOfTables(ArrayOfTables::new()))
      .as_array_of_tables_mut()
      .ok_or_else(|| {
        RailError::Validation(ValidationError::Ledger {
          reason: "'rule' must be an array of tables".to_string(),
        })
      })?;
    rules.push(rule_table(rule));

    write_validated(path, &doc)
  }

  /// Remove the rule with `id` from the ledger file, returning it
  pub fn remove_rule(path: &Path, id: &str) -> RailResult<CustomizationRule> {
    let existing = Self::load(path)?;
    let removed = existing
      .find(id)
      .cloned()
      .ok_or_else(|| RailError::Config(ConfigError::RuleNotFound { id: id.to_string() }))?;

    let mut doc = read_document(path)?;
    if let Some(rules) = doc.get_mut("rule").and_then(Item::as_array_of_tables_mut) {
      rules.retain(|t| t.get("id").and_then(Item::as_str) != Some(id));
    }

    write_validated(path, &doc)?;
    Ok(removed)
  }
}

fn read_document(path: &Path) -> RailResult<DocumentMut> {
  let content = if path.exists() {
    fs::read_to_string(path)?
  } else {
    LEDGER_HEADER.to_string()
  };
  Ok(content.parse::<DocumentMut>()?)
}

fn write_validated(path: &Path, doc: &DocumentMut) -> RailResult<()> {
  let rendered = doc.to_string();
  Ledger::from_toml(&rendered)?;
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent)?;
  }
  fs::write(path, rendered).with_context(|| format!("Failed to write {}", path.display()))
}

fn rule_table(rule: &CustomizationRule) -> Table {
  let mut matcher = InlineTable::new();
  match &rule.matcher {
    Matcher::Literal(s) => matcher.insert("literal", s.as_str().into()),
    Matcher::Regex(s) => matcher.insert("regex", s.as_str().into()),
  };

  let mut table = Table::new();
  table.insert("id", value(rule.id.as_str()));
  table.insert("path", value(crate::utils::path_to_git_format(&rule.scope_path)));
  table.insert("matcher", value(matcher));
  table.insert("replacement", value(rule.replacement.as_str()));
  table.insert("category", value(rule.category.to_string()));
  table
}

/// Paths in `paths` that no rule governs
pub fn ungoverned<'a>(ledger: &Ledger, paths: &'a [PathBuf]) -> Vec<&'a PathBuf> {
  paths.iter().filter(|p| !ledger.governs(p)).collect()
}

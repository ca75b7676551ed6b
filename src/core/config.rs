use crate::core::error::{ConfigError, RailError, RailResult, ResultExt};
use crate::release::targets::{Libc, PlatformTarget, RunnerClass, TargetRegistry};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration for fork-rail
/// Searched in order: fork-rail.toml, .fork-rail.toml, .config/fork-rail.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RailConfig {
  #[serde(default)]
  pub upstream: UpstreamConfig,
  #[serde(default)]
  pub base: BaseConfig,
  #[serde(default)]
  pub manifest: ManifestConfig,
  #[serde(default)]
  pub tags: TagConfig,
  #[serde(default)]
  pub ledger: LedgerConfig,
  #[serde(default)]
  pub build: BuildConfig,
  #[serde(default)]
  pub publish: PublishConfig,
  #[serde(default = "default_targets")]
  pub targets: Vec<PlatformTarget>,
}

/// Where upstream history comes from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
  /// Remote name (added on first sync if missing)
  #[serde(default = "default_upstream_remote")]
  pub remote: String,
  /// Remote URL
  #[serde(default = "default_upstream_url")]
  pub url: String,
  /// Branch merged from the remote
  #[serde(default = "default_upstream_branch")]
  pub branch: String,
}

impl UpstreamConfig {
  /// `remote/branch`, the ref merged by `sync`
  pub fn merge_ref(&self) -> String {
    format!("{}/{}", self.remote, self.branch)
  }
}

fn default_upstream_remote() -> String {
  "upstream".to_string()
}

fn default_upstream_url() -> String {
  "https://github.com/openai/codex.git".to_string()
}

fn default_upstream_branch() -> String {
  "main".to_string()
}

impl Default for UpstreamConfig {
  fn default() -> Self {
    Self {
      remote: default_upstream_remote(),
      url: default_upstream_url(),
      branch: default_upstream_branch(),
    }
  }
}

/// The downstream base branch that carries customizations and the sentinel version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseConfig {
  #[serde(default = "default_base_branch")]
  pub branch: String,
  /// Remote the release tag is pushed to by `release cut --push`
  #[serde(default = "default_origin")]
  pub remote: String,
}

fn default_base_branch() -> String {
  "main".to_string()
}

fn default_origin() -> String {
  "origin".to_string()
}

impl Default for BaseConfig {
  fn default() -> Self {
    Self {
      branch: default_base_branch(),
      remote: default_origin(),
    }
  }
}

/// The versioned manifest: single source of truth for the current version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestConfig {
  /// Path relative to the repository root
  #[serde(default = "default_manifest_path")]
  pub path: PathBuf,
  /// Dotted TOML key holding the version
  #[serde(default = "default_manifest_key")]
  pub key: String,
  /// Placeholder version the base branch holds outside the release window
  #[serde(default = "default_sentinel")]
  pub sentinel: String,
}

fn default_manifest_path() -> PathBuf {
  PathBuf::from("codex-rs/Cargo.toml")
}

fn default_manifest_key() -> String {
  "workspace.package.version".to_string()
}

fn default_sentinel() -> String {
  "0.0.0".to_string()
}

impl Default for ManifestConfig {
  fn default() -> Self {
    Self {
      path: default_manifest_path(),
      key: default_manifest_key(),
      sentinel: default_sentinel(),
    }
  }
}

/// Release tag grammar parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagConfig {
  #[serde(default = "default_tag_prefix")]
  pub prefix: String,
  /// Pre-release-shaped label that is nonetheless a stable product release
  #[serde(default = "default_product_channel")]
  pub product_channel: String,
}

fn default_tag_prefix() -> String {
  "rust-v".to_string()
}

fn default_product_channel() -> String {
  "cometix".to_string()
}

impl Default for TagConfig {
  fn default() -> Self {
    Self {
      prefix: default_tag_prefix(),
      product_channel: default_product_channel(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
  #[serde(default = "default_ledger_path")]
  pub path: PathBuf,
}

fn default_ledger_path() -> PathBuf {
  PathBuf::from(".fork-rail/ledger.toml")
}

impl Default for LedgerConfig {
  fn default() -> Self {
    Self {
      path: default_ledger_path(),
    }
  }
}

/// How a single target is built
///
/// `{target}` in `command` and `artifacts` is replaced with the target triple,
/// `{exe}` with `.exe` on Windows targets and nothing elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
  /// Command run inside the isolated checkout
  #[serde(default = "default_build_command")]
  pub command: Vec<String>,
  /// Directory inside the checkout the command runs in
  #[serde(default = "default_build_dir")]
  pub working_dir: PathBuf,
  /// Build outputs collected per target: package name -> path inside the checkout
  #[serde(default = "default_build_artifacts")]
  pub artifacts: Vec<BuildOutput>,
  /// Where collected artifacts land, relative to the repository root
  #[serde(default = "default_dist_dir")]
  pub dist_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildOutput {
  pub package: String,
  pub path: String,
}

fn default_build_command() -> Vec<String> {
  ["cargo", "build", "--release", "--target", "{target}", "--bin", "codex"]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_build_dir() -> PathBuf {
  PathBuf::from("codex-rs")
}

fn default_build_artifacts() -> Vec<BuildOutput> {
  vec![BuildOutput {
    package: "codex".to_string(),
    path: "target/{target}/release/codex{exe}".to_string(),
  }]
}

fn default_dist_dir() -> PathBuf {
  PathBuf::from("dist")
}

impl Default for BuildConfig {
  fn default() -> Self {
    Self {
      command: default_build_command(),
      working_dir: default_build_dir(),
      artifacts: default_build_artifacts(),
      dist_dir: default_dist_dir(),
    }
  }
}

/// Downstream publishing identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
  /// Registry scope the fork publishes under (upstream uses `@openai`)
  #[serde(default = "default_scope")]
  pub scope: String,
  /// The only packages ever sent to the registry
  #[serde(default = "default_allowed_packages")]
  pub allowed_packages: Vec<String>,
  /// Registry URL passed to the publish tool
  #[serde(default = "default_registry")]
  pub registry: String,
  /// Access level for scoped packages
  #[serde(default = "default_access")]
  pub access: String,
  /// Publish tool invocation; the staged directory and flags are appended
  #[serde(default = "default_publish_command")]
  pub command: Vec<String>,
  /// npm package sources whose `package.json` and `bin/` seed each staged package
  #[serde(default = "default_package_dir")]
  pub package_dir: PathBuf,
}

fn default_scope() -> String {
  "@echoflux537".to_string()
}

fn default_allowed_packages() -> Vec<String> {
  vec!["codex".to_string()]
}

fn default_registry() -> String {
  "https://registry.npmjs.org/".to_string()
}

fn default_access() -> String {
  "public".to_string()
}

fn default_publish_command() -> Vec<String> {
  vec!["npm".to_string(), "publish".to_string()]
}

fn default_package_dir() -> PathBuf {
  PathBuf::from("codex-cli")
}

impl Default for PublishConfig {
  fn default() -> Self {
    Self {
      scope: default_scope(),
      allowed_packages: default_allowed_packages(),
      registry: default_registry(),
      access: default_access(),
      command: default_publish_command(),
      package_dir: default_package_dir(),
    }
  }
}

/// Build matrix of the downstream fork
///
/// Linux arm64 and Windows arm64 only have paid runners, so they are kept but disabled.
fn default_targets() -> Vec<PlatformTarget> {
  use RunnerClass::{Free, Paid};
  vec![
    PlatformTarget::new("linux", "x86_64", Some(Libc::Musl), Free, true),
    PlatformTarget::new("linux", "x86_64", Some(Libc::Gnu), Free, true),
    PlatformTarget::new("linux", "aarch64", Some(Libc::Musl), Paid, false),
    PlatformTarget::new("linux", "aarch64", Some(Libc::Gnu), Paid, false),
    PlatformTarget::new("macos", "x86_64", None, Free, true),
    PlatformTarget::new("macos", "aarch64", None, Free, true),
    PlatformTarget::new("windows", "x86_64", Some(Libc::Msvc), Free, true),
    PlatformTarget::new("windows", "aarch64", Some(Libc::Msvc), Paid, false),
  ]
}

impl RailConfig {
  /// Find config file in search order: fork-rail.toml, .fork-rail.toml, .config/fork-rail.toml
  pub fn find_config_path(path: &Path) -> Option<PathBuf> {
    let candidates = vec![
      path.join("fork-rail.toml"),
      path.join(".fork-rail.toml"),
      path.join(".config").join("fork-rail.toml"),
    ];

    candidates.into_iter().find(|p| p.exists())
  }

  /// Load config (searches multiple locations)
  pub fn load(path: &Path) -> RailResult<Self> {
    let config_path = Self::find_config_path(path).ok_or_else(|| {
      RailError::Config(ConfigError::NotFound {
        workspace_root: path.to_path_buf(),
      })
    })?;

    let content = fs::read_to_string(&config_path)
      .with_context(|| format!("Failed to read config from {}", config_path.display()))?;
    let config = Self::from_toml(&content).with_context(|| format!("Invalid config in {}", config_path.display()))?;

    Ok(config)
  }

  /// Parse and validate a config document
  pub fn from_toml(content: &str) -> RailResult<Self> {
    let config: RailConfig = toml_edit::de::from_str(content)?;
    config.validate()?;
    Ok(config)
  }

  /// Save config to fork-rail.toml (default location)
  pub fn save(&self, path: &Path) -> RailResult<()> {
    let config_path = path.join("fork-rail.toml");
    let content = toml_edit::ser::to_string_pretty(self).context("Failed to serialize config to TOML")?;
    fs::write(&config_path, content).with_context(|| format!("Failed to write config to {}", config_path.display()))?;
    Ok(())
  }

  /// Check if config exists at the given path
  pub fn exists(path: &Path) -> bool {
    Self::find_config_path(path).is_some()
  }

  fn validate(&self) -> RailResult<()> {
    if self.tags.prefix.is_empty() {
      return Err(RailError::Config(ConfigError::MissingField {
        field: "tags.prefix".to_string(),
      }));
    }
    if matches!(self.tags.product_channel.as_str(), "" | "alpha" | "beta") {
      return Err(RailError::with_help(
        format!("Invalid product channel '{}'", self.tags.product_channel),
        "The product channel must be a non-empty label other than 'alpha' or 'beta'",
      ));
    }
    semver::Version::parse(&self.manifest.sentinel)
      .with_context(|| format!("Sentinel version '{}' is not valid semver", self.manifest.sentinel))?;
    if self.publish.allowed_packages.is_empty() {
      return Err(RailError::with_help(
        "publish.allowed_packages is empty",
        "List at least one package, e.g. allowed_packages = [\"codex\"]",
      ));
    }
    if self.publish.command.is_empty() {
      return Err(RailError::Config(ConfigError::MissingField {
        field: "publish.command".to_string(),
      }));
    }
    if self.build.command.is_empty() {
      return Err(RailError::Config(ConfigError::MissingField {
        field: "build.command".to_string(),
      }));
    }
    TargetRegistry::new(self.targets.clone())?;
    Ok(())
  }
}

impl Default for RailConfig {
  fn default() -> Self {
    Self {
      upstream: UpstreamConfig::default(),
      base: BaseConfig::default(),
      manifest: ManifestConfig::default(),
      tags: TagConfig::default(),
      ledger: LedgerConfig::default(),
      build: BuildConfig::default(),
      publish: PublishConfig::default(),
      targets: default_targets(),
    }
  }
}

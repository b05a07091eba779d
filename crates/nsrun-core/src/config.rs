use crate::error::RunError;
use crate::version::{DEFAULT_MIN_CLI_VERSION, VersionBounds};
use anyhow::Context;
use derive_builder::Builder;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Executable looked up on `PATH` when no override is configured
pub const DEFAULT_CLI_PATH: &str = "tns";

/// Extension configuration, read from the workspace settings file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[serde(rename_all = "camelCase")]
#[builder(setter(into, strip_option), default)]
pub struct ExtensionConfig {
    /// Location of the NativeScript CLI, overriding `PATH` discovery
    #[serde(default, alias = "nativescript.tnsPath")]
    pub tns_path: Option<PathBuf>,

    /// Lowest compatible CLI version
    #[serde(default = "default_min_cli_version")]
    pub min_cli_version: String,

    /// Highest known-compatible CLI version, unbounded when absent
    #[serde(default)]
    pub max_cli_version: Option<String>,

    /// Timeout for the startup `--version` query (in milliseconds)
    #[serde(default = "default_version_timeout_ms")]
    pub version_timeout_ms: u64,

    /// Time a disposed run gets to exit before it is force killed (in milliseconds)
    #[serde(default = "default_termination_grace_ms")]
    pub termination_grace_ms: u64,

    #[serde(default = "default_analytics_enabled")]
    pub analytics_enabled: bool,
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        Self {
            tns_path: None,
            min_cli_version: default_min_cli_version(),
            max_cli_version: None,
            version_timeout_ms: default_version_timeout_ms(),
            termination_grace_ms: default_termination_grace_ms(),
            analytics_enabled: default_analytics_enabled(),
        }
    }
}

impl ExtensionConfig {
    pub fn builder() -> ExtensionConfigBuilder {
        ExtensionConfigBuilder::default()
    }

    /// Parse a JSON settings document
    pub fn from_json(json: &str) -> Result<Self, RunError> {
        serde_json::from_str(json).map_err(|e| RunError::Configuration(e.to_string()))
    }

    /// Load and validate a JSON settings file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        let config = Self::from_json(&content)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration and return errors if invalid
    pub fn validate(&self) -> Result<(), RunError> {
        let bounds = self.version_bounds()?;
        if let Some(max) = &bounds.max {
            if *max < bounds.min {
                return Err(RunError::Configuration(
                    "maxCliVersion cannot be lower than minCliVersion".to_string(),
                ));
            }
        }

        if self.version_timeout_ms == 0 {
            return Err(RunError::Configuration(
                "versionTimeoutMs must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    pub fn version_bounds(&self) -> Result<VersionBounds, RunError> {
        let min = parse_bound("minCliVersion", &self.min_cli_version)?;
        let max = self
            .max_cli_version
            .as_deref()
            .map(|raw| parse_bound("maxCliVersion", raw))
            .transpose()?;
        Ok(VersionBounds::new(min, max))
    }

    /// The configured CLI path, or `tns` on `PATH`
    pub fn cli_path(&self) -> PathBuf {
        self.tns_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CLI_PATH))
    }

    pub fn version_timeout(&self) -> Duration {
        Duration::from_millis(self.version_timeout_ms)
    }

    pub fn termination_grace(&self) -> Duration {
        Duration::from_millis(self.termination_grace_ms)
    }
}

fn parse_bound(key: &str, raw: &str) -> Result<Version, RunError> {
    Version::parse(raw.trim()).map_err(|e| RunError::Configuration(format!("{key} '{raw}': {e}")))
}

// Default value functions for serde
fn default_min_cli_version() -> String {
    DEFAULT_MIN_CLI_VERSION.to_string()
}
fn default_version_timeout_ms() -> u64 {
    10_000
}
fn default_termination_grace_ms() -> u64 {
    2_000
}
fn default_analytics_enabled() -> bool {
    true
}

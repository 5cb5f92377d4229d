//! Configuration for a kubecuro run.
//!
//! Loaded from `--config FILE`, or from `.kubecuro.yaml` / `.kubecuro.yml`
//! in the working directory, falling back to defaults.

use crate::analyzer::kubecuro::types::{FindingCode, Severity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// File names probed when no explicit config path is given.
pub const DEFAULT_CONFIG_FILES: &[&str] = &[".kubecuro.yaml", ".kubecuro.yml"];

/// What the resolver does when a selector cannot be fully evaluated and
/// its evaluable terms match nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartialSelectorPolicy {
    /// Report nothing.
    #[default]
    Suppress,
    /// Report a low-severity `UNVERIFIABLE_SELECTOR` note.
    Note,
    /// Treat it like a fully evaluated selector (`GHOST_SERVICE`).
    Strict,
}

impl PartialSelectorPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "suppress" => Some(Self::Suppress),
            "note" => Some(Self::Note),
            "strict" => Some(Self::Strict),
            _ => None,
        }
    }
}

/// Configuration for the analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubecuroConfig {
    /// Findings at or above this severity make the run fail.
    #[serde(default = "default_threshold")]
    pub failure_threshold: Severity,

    /// If true, never return a non-zero exit code for findings.
    #[serde(default)]
    pub no_fail: bool,

    /// Finding codes that are never reported.
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Glob patterns for paths to skip.
    #[serde(default)]
    pub ignore_paths: Vec<String>,

    /// Per-code severity overrides, keyed by finding code.
    #[serde(default)]
    pub severity_overrides: BTreeMap<String, Severity>,

    /// Columns a tab expands to in leading whitespace.
    #[serde(default = "default_tab_width")]
    pub tab_width: usize,

    /// Indent block sequences under their parent key.
    #[serde(default = "default_true")]
    pub indent_sequences: bool,

    /// Rewrite deprecated apiVersions that have a direct replacement.
    #[serde(default = "default_true")]
    pub substitute_deprecated_apis: bool,

    #[serde(default)]
    pub partial_selector_policy: PartialSelectorPolicy,

    /// Wall-clock budget for healing a single file, in milliseconds.
    #[serde(default = "default_heal_budget_ms")]
    pub heal_budget_ms: u64,

    #[serde(default = "default_max_nesting_depth")]
    pub max_nesting_depth: usize,

    /// Optional YAML deprecation table replacing the built-in one.
    #[serde(default)]
    pub deprecation_table: Option<PathBuf>,
}

fn default_threshold() -> Severity {
    Severity::High
}

fn default_tab_width() -> usize {
    2
}

fn default_true() -> bool {
    true
}

fn default_heal_budget_ms() -> u64 {
    2000
}

fn default_max_nesting_depth() -> usize {
    128
}

impl Default for KubecuroConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_threshold(),
            no_fail: false,
            exclude: Vec::new(),
            ignore_paths: Vec::new(),
            severity_overrides: BTreeMap::new(),
            tab_width: default_tab_width(),
            indent_sequences: true,
            substitute_deprecated_apis: true,
            partial_selector_policy: PartialSelectorPolicy::default(),
            heal_budget_ms: default_heal_budget_ms(),
            max_nesting_depth: default_max_nesting_depth(),
            deprecation_table: None,
        }
    }
}

impl KubecuroConfig {
    /// Create a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the failure threshold.
    pub fn with_threshold(mut self, threshold: Severity) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Add a finding code to the exclude list.
    pub fn exclude(mut self, code: impl Into<String>) -> Self {
        self.exclude.push(code.into());
        self
    }

    /// Add a path pattern to ignore.
    pub fn ignore_path(mut self, pattern: impl Into<String>) -> Self {
        self.ignore_paths.push(pattern.into());
        self
    }

    pub fn with_policy(mut self, policy: PartialSelectorPolicy) -> Self {
        self.partial_selector_policy = policy;
        self
    }

    pub fn with_severity_override(mut self, code: FindingCode, severity: Severity) -> Self {
        self.severity_overrides
            .insert(code.as_str().to_string(), severity);
        self
    }

    pub fn without_api_substitution(mut self) -> Self {
        self.substitute_deprecated_apis = false;
        self
    }

    /// Check if a finding code is excluded.
    pub fn is_code_excluded(&self, code: FindingCode) -> bool {
        self.exclude
            .iter()
            .any(|e| FindingCode::parse(e) == Some(code))
    }

    /// Severity for a code after applying overrides.
    pub fn effective_severity(&self, code: FindingCode, severity: Severity) -> Severity {
        self.severity_overrides
            .iter()
            .find(|(key, _)| FindingCode::parse(key) == Some(code))
            .map(|(_, overridden)| *overridden)
            .unwrap_or(severity)
    }

    /// Check if a file path should be ignored based on ignore_paths patterns.
    pub fn should_ignore_path(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy();

        for pattern in &self.ignore_paths {
            if let Ok(glob) = glob::Pattern::new(pattern) {
                if glob.matches(&path_str) {
                    return true;
                }
            }
            if path_str.contains(pattern.as_str()) {
                return true;
            }
        }
        false
    }

    /// Load configuration from a YAML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        Self::load_from_str(&content)
    }

    /// Load configuration from a YAML string.
    pub fn load_from_str(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self =
            serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Try to load config from the default locations in `dir`.
    pub fn load_from_default(dir: &Path) -> Result<Option<Self>, ConfigError> {
        for filename in DEFAULT_CONFIG_FILES {
            let path = dir.join(filename);
            if path.exists() {
                log::debug!("Loading configuration from {}", path.display());
                return Self::load_from_file(&path).map(Some);
            }
        }
        Ok(None)
    }

    /// Resolve the configuration for a run: explicit path, default file, or defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self::load_from_default(Path::new("."))?.unwrap_or_default()),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.tab_width == 0 {
            return Err(ConfigError::Invalid("tabWidth must be at least 1".to_string()));
        }
        if self.max_nesting_depth == 0 {
            return Err(ConfigError::Invalid(
                "maxNestingDepth must be at least 1".to_string(),
            ));
        }
        for code in self.exclude.iter().chain(self.severity_overrides.keys()) {
            if FindingCode::parse(code).is_none() {
                return Err(ConfigError::Invalid(format!("unknown finding code '{}'", code)));
            }
        }
        Ok(())
    }
}

/// Configuration loading error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error reading config file.
    #[error("cannot read {}: {message}", path.display())]
    Io { path: PathBuf, message: String },
    /// Parse error in config file.
    #[error("parse error: {0}")]
    Parse(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = KubecuroConfig::default();
        assert_eq!(config.failure_threshold, Severity::High);
        assert_eq!(config.tab_width, 2);
        assert!(config.indent_sequences);
        assert!(config.substitute_deprecated_apis);
        assert_eq!(config.partial_selector_policy, PartialSelectorPolicy::Suppress);
    }

    #[test]
    fn test_load_from_str() {
        let yaml = r#"
failureThreshold: medium
exclude:
  - rbac-wildcard
ignorePaths:
  - "**/charts/**"
severityOverrides:
  PORT_MISMATCH: high
partialSelectorPolicy: note
tabWidth: 4
"#;
        let config = KubecuroConfig::load_from_str(yaml).unwrap();
        assert_eq!(config.failure_threshold, Severity::Medium);
        assert!(config.is_code_excluded(FindingCode::RbacWildcard));
        assert!(!config.is_code_excluded(FindingCode::GhostService));
        assert_eq!(
            config.effective_severity(FindingCode::PortMismatch, Severity::Medium),
            Severity::High
        );
        assert_eq!(config.partial_selector_policy, PartialSelectorPolicy::Note);
        assert_eq!(config.tab_width, 4);
        assert!(config.indent_sequences);
    }

    #[test]
    fn test_empty_config_is_default() {
        let config = KubecuroConfig::load_from_str("  \n").unwrap();
        assert_eq!(config.failure_threshold, Severity::High);
    }

    #[test]
    fn test_rejects_unknown_code() {
        let err = KubecuroConfig::load_from_str("exclude: [NOT_A_CODE]").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_zero_tab_width() {
        assert!(KubecuroConfig::load_from_str("tabWidth: 0").is_err());
    }

    #[test]
    fn test_should_ignore_path() {
        let config = KubecuroConfig::default().ignore_path("**/vendor/**");
        assert!(config.should_ignore_path(Path::new("deploy/vendor/x.yaml")));
        assert!(!config.should_ignore_path(Path::new("deploy/app.yaml")));
    }

    #[test]
    fn test_builder() {
        let config = KubecuroConfig::new()
            .with_threshold(Severity::Low)
            .exclude("SYNTAX_REPAIR")
            .with_policy(PartialSelectorPolicy::Strict)
            .with_severity_override(FindingCode::DeprecatedApi, Severity::Low)
            .without_api_substitution();
        assert_eq!(config.failure_threshold, Severity::Low);
        assert!(config.is_code_excluded(FindingCode::SyntaxRepair));
        assert_eq!(config.partial_selector_policy, PartialSelectorPolicy::Strict);
        assert_eq!(
            config.effective_severity(FindingCode::DeprecatedApi, Severity::Medium),
            Severity::Low
        );
        assert!(!config.substitute_deprecated_apis);
    }
}

//! Deprecated Kubernetes API lookup.
//!
//! The healer consults a [`DeprecationTable`] to substitute apiVersions that
//! have a direct replacement. The built-in table can be swapped for a YAML
//! file through the `deprecationTable` config key.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Kubernetes version as (major, minor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct K8sVersion {
    pub major: u32,
    pub minor: u32,
}

impl K8sVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Parse from string like "1.25" or "v1.25".
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().trim_start_matches('v');
        let mut parts = s.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        Some(Self { major, minor })
    }
}

impl std::fmt::Display for K8sVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl TryFrom<String> for K8sVersion {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid Kubernetes version '{}'", value))
    }
}

impl From<K8sVersion> for String {
    fn from(version: K8sVersion) -> Self {
        version.to_string()
    }
}

/// One deprecated apiVersion, optionally restricted to a kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeprecatedApi {
    pub api_version: String,
    /// `None` applies to every kind served by the group version.
    #[serde(default)]
    pub kind: Option<String>,
    /// Drop-in replacement; `None` when the API was removed without one.
    #[serde(default)]
    pub replacement: Option<String>,
    pub deprecated_in: K8sVersion,
    pub removed_in: K8sVersion,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Read-only lookup injected into the healer.
pub trait DeprecationTable: Send + Sync {
    /// Identifies the data set, for logs and reports.
    fn version(&self) -> &str;

    /// Find the deprecation entry for `api_version` and `kind`.
    fn lookup(&self, api_version: &str, kind: &str) -> Option<&DeprecatedApi>;
}

/// Error loading a deprecation table from disk.
#[derive(Debug, thiserror::Error)]
pub enum DeprecationTableError {
    #[error("cannot read {}: {message}", path.display())]
    Io { path: PathBuf, message: String },
    #[error("invalid deprecation table: {0}")]
    Parse(String),
}

/// A deprecation table held in memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticDeprecationTable {
    version: String,
    apis: Vec<DeprecatedApi>,
}

type Row = (
    &'static str,
    Option<&'static str>,
    Option<&'static str>,
    (u32, u32),
    (u32, u32),
    Option<&'static str>,
);

const BUILTIN_VERSION: &str = "builtin-1.29";

static BUILTIN: &[Row] = &[
    ("extensions/v1beta1", Some("Deployment"), Some("apps/v1"), (1, 9), (1, 16), None),
    ("extensions/v1beta1", Some("DaemonSet"), Some("apps/v1"), (1, 9), (1, 16), None),
    ("extensions/v1beta1", Some("ReplicaSet"), Some("apps/v1"), (1, 9), (1, 16), None),
    ("extensions/v1beta1", Some("NetworkPolicy"), Some("networking.k8s.io/v1"), (1, 9), (1, 16), None),
    ("extensions/v1beta1", Some("Ingress"), Some("networking.k8s.io/v1"), (1, 14), (1, 22), Some("backend fields changed shape in networking.k8s.io/v1")),
    ("extensions/v1beta1", Some("PodSecurityPolicy"), None, (1, 10), (1, 16), Some("PodSecurityPolicy was removed in 1.25; use Pod Security Admission")),
    ("apps/v1beta1", Some("Deployment"), Some("apps/v1"), (1, 9), (1, 16), None),
    ("apps/v1beta1", Some("StatefulSet"), Some("apps/v1"), (1, 9), (1, 16), None),
    ("apps/v1beta2", None, Some("apps/v1"), (1, 9), (1, 16), None),
    ("networking.k8s.io/v1beta1", Some("Ingress"), Some("networking.k8s.io/v1"), (1, 19), (1, 22), None),
    ("networking.k8s.io/v1beta1", Some("IngressClass"), Some("networking.k8s.io/v1"), (1, 19), (1, 22), None),
    ("batch/v1beta1", Some("CronJob"), Some("batch/v1"), (1, 21), (1, 25), None),
    ("policy/v1beta1", Some("PodDisruptionBudget"), Some("policy/v1"), (1, 21), (1, 25), None),
    ("policy/v1beta1", Some("PodSecurityPolicy"), None, (1, 21), (1, 25), Some("use Pod Security Admission")),
    ("autoscaling/v2beta1", Some("HorizontalPodAutoscaler"), Some("autoscaling/v2"), (1, 22), (1, 25), None),
    ("autoscaling/v2beta2", Some("HorizontalPodAutoscaler"), Some("autoscaling/v2"), (1, 23), (1, 26), None),
    ("rbac.authorization.k8s.io/v1beta1", None, Some("rbac.authorization.k8s.io/v1"), (1, 17), (1, 22), None),
    ("apiextensions.k8s.io/v1beta1", Some("CustomResourceDefinition"), Some("apiextensions.k8s.io/v1"), (1, 16), (1, 22), None),
    ("admissionregistration.k8s.io/v1beta1", None, Some("admissionregistration.k8s.io/v1"), (1, 16), (1, 22), None),
    ("storage.k8s.io/v1beta1", None, Some("storage.k8s.io/v1"), (1, 19), (1, 22), None),
    ("scheduling.k8s.io/v1beta1", Some("PriorityClass"), Some("scheduling.k8s.io/v1"), (1, 14), (1, 22), None),
    ("coordination.k8s.io/v1beta1", Some("Lease"), Some("coordination.k8s.io/v1"), (1, 14), (1, 22), None),
    ("certificates.k8s.io/v1beta1", Some("CertificateSigningRequest"), Some("certificates.k8s.io/v1"), (1, 19), (1, 22), None),
    ("discovery.k8s.io/v1beta1", Some("EndpointSlice"), Some("discovery.k8s.io/v1"), (1, 21), (1, 25), None),
    ("events.k8s.io/v1beta1", Some("Event"), Some("events.k8s.io/v1"), (1, 19), (1, 25), None),
    ("node.k8s.io/v1beta1", Some("RuntimeClass"), Some("node.k8s.io/v1"), (1, 22), (1, 25), None),
];

impl StaticDeprecationTable {
    pub fn new(version: impl Into<String>, apis: Vec<DeprecatedApi>) -> Self {
        Self {
            version: version.into(),
            apis,
        }
    }

    /// The table shipped with the binary.
    pub fn builtin() -> Self {
        let apis = BUILTIN
            .iter()
            .map(|(api_version, kind, replacement, deprecated, removed, notes)| DeprecatedApi {
                api_version: api_version.to_string(),
                kind: kind.map(str::to_string),
                replacement: replacement.map(str::to_string),
                deprecated_in: K8sVersion::new(deprecated.0, deprecated.1),
                removed_in: K8sVersion::new(removed.0, removed.1),
                notes: notes.map(str::to_string),
            })
            .collect();
        Self::new(BUILTIN_VERSION, apis)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, DeprecationTableError> {
        serde_yaml::from_str(content).map_err(|e| DeprecationTableError::Parse(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, DeprecationTableError> {
        let content = std::fs::read_to_string(path).map_err(|e| DeprecationTableError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let table = Self::from_yaml_str(&content)?;
        log::debug!(
            "Loaded deprecation table '{}' with {} entries from {}",
            table.version,
            table.apis.len(),
            path.display()
        );
        Ok(table)
    }

    pub fn apis(&self) -> &[DeprecatedApi] {
        &self.apis
    }
}

impl DeprecationTable for StaticDeprecationTable {
    fn version(&self) -> &str {
        &self.version
    }

    fn lookup(&self, api_version: &str, kind: &str) -> Option<&DeprecatedApi> {
        let mut fallback = None;
        for api in self.apis.iter().filter(|api| api.api_version == api_version) {
            match api.kind.as_deref() {
                Some(k) if k == kind => return Some(api),
                None if fallback.is_none() => fallback = Some(api),
                _ => {}
            }
        }
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_k8s_version_parse() {
        assert_eq!(K8sVersion::parse("1.25"), Some(K8sVersion::new(1, 25)));
        assert_eq!(K8sVersion::parse("v1.28"), Some(K8sVersion::new(1, 28)));
        assert_eq!(K8sVersion::parse("invalid"), None);
        assert!(K8sVersion::new(1, 25) > K8sVersion::new(1, 20));
    }

    #[test]
    fn test_builtin_lookup() {
        let table = StaticDeprecationTable::builtin();
        let ingress = table.lookup("extensions/v1beta1", "Ingress").unwrap();
        assert_eq!(ingress.replacement.as_deref(), Some("networking.k8s.io/v1"));
        assert_eq!(ingress.removed_in, K8sVersion::new(1, 22));
        assert!(table.lookup("apps/v1", "Deployment").is_none());
        assert!(table.lookup("extensions/v1beta1", "Widget").is_none());
    }

    #[test]
    fn test_kind_wildcard() {
        let table = StaticDeprecationTable::builtin();
        let role = table
            .lookup("rbac.authorization.k8s.io/v1beta1", "ClusterRole")
            .unwrap();
        assert_eq!(role.replacement.as_deref(), Some("rbac.authorization.k8s.io/v1"));
    }

    #[test]
    fn test_removed_without_replacement() {
        let table = StaticDeprecationTable::builtin();
        let psp = table.lookup("policy/v1beta1", "PodSecurityPolicy").unwrap();
        assert!(psp.replacement.is_none());
    }

    #[test]
    fn test_load_yaml_table() {
        let yaml = r#"
version: custom-1
apis:
  - apiVersion: example.io/v1alpha1
    kind: Widget
    replacement: example.io/v1
    deprecatedIn: "1.27"
    removedIn: "1.30"
"#;
        let table = StaticDeprecationTable::from_yaml_str(yaml).unwrap();
        assert_eq!(table.version(), "custom-1");
        let widget = table.lookup("example.io/v1alpha1", "Widget").unwrap();
        assert_eq!(widget.deprecated_in, K8sVersion::new(1, 27));
        assert!(table.lookup("extensions/v1beta1", "Ingress").is_none());
    }

    #[test]
    fn test_rejects_bad_version() {
        let yaml = "version: x\napis:\n  - apiVersion: a/v1\n    deprecatedIn: soon\n    removedIn: \"1.2\"\n";
        assert!(StaticDeprecationTable::from_yaml_str(yaml).is_err());
    }
}

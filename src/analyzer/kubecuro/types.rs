//! Core types shared by the healer, the resolver and the reporters.
//!
//! - `Severity` - finding severity levels (`fatal > high > medium > low`)
//! - `FindingCode` - stable finding identifiers (e.g. `GHOST_SERVICE`)
//! - `SubjectRef` - which manifest (or file) a finding is about
//! - `Finding` - a single diagnostic produced by an analysis run
//! - `ObjectKind` - the Kubernetes kinds the extractor understands

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};

/// Severity levels for findings.
///
/// Ordered from most severe to least severe:
/// `Fatal > High > Medium > Low`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// A file or document could not be processed at all
    Fatal,
    /// Broken wiring that will misbehave at deploy time
    High,
    /// Likely problems that deserve a look
    #[default]
    Medium,
    /// Cosmetic repairs and informational notes
    Low,
}

impl Severity {
    /// Parse a severity from a string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "fatal" => Some(Self::Fatal),
            "high" => Some(Self::High),
            "medium" | "med" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fatal => "fatal",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Fatal => 3,
            Self::High => 2,
            Self::Medium => 1,
            Self::Low => 0,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Ord for Severity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl PartialOrd for Severity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Stable identifier of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingCode {
    GhostService,
    PortMismatch,
    NamespaceViolation,
    DeprecatedApi,
    SyntaxRepair,
    UnverifiableSelector,
    SelectorMismatch,
    DanglingReference,
    DanglingSelector,
    HpaMissingRequests,
    PrivilegedContainer,
    RbacWildcard,
    IoError,
}

impl FindingCode {
    /// Every code, in catalog order.
    pub const ALL: &'static [FindingCode] = &[
        Self::GhostService,
        Self::PortMismatch,
        Self::NamespaceViolation,
        Self::DeprecatedApi,
        Self::SyntaxRepair,
        Self::UnverifiableSelector,
        Self::SelectorMismatch,
        Self::DanglingReference,
        Self::DanglingSelector,
        Self::HpaMissingRequests,
        Self::PrivilegedContainer,
        Self::RbacWildcard,
        Self::IoError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GhostService => "GHOST_SERVICE",
            Self::PortMismatch => "PORT_MISMATCH",
            Self::NamespaceViolation => "NAMESPACE_VIOLATION",
            Self::DeprecatedApi => "DEPRECATED_API",
            Self::SyntaxRepair => "SYNTAX_REPAIR",
            Self::UnverifiableSelector => "UNVERIFIABLE_SELECTOR",
            Self::SelectorMismatch => "SELECTOR_MISMATCH",
            Self::DanglingReference => "DANGLING_REFERENCE",
            Self::DanglingSelector => "DANGLING_SELECTOR",
            Self::HpaMissingRequests => "HPA_MISSING_REQUESTS",
            Self::PrivilegedContainer => "PRIVILEGED_CONTAINER",
            Self::RbacWildcard => "RBAC_WILDCARD",
            Self::IoError => "IO_ERROR",
        }
    }

    /// Parse a code, accepting `ghost-service`, `ghost_service` and `GHOST_SERVICE`.
    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.trim().to_uppercase().replace('-', "_");
        Self::ALL
            .iter()
            .copied()
            .find(|code| code.as_str() == normalized)
    }

    /// Severity assigned when no override is configured.
    pub fn default_severity(&self) -> Severity {
        match self {
            Self::GhostService => Severity::High,
            Self::PortMismatch => Severity::Medium,
            Self::NamespaceViolation => Severity::High,
            Self::DeprecatedApi => Severity::Medium,
            Self::SyntaxRepair => Severity::Low,
            Self::UnverifiableSelector => Severity::Low,
            Self::SelectorMismatch => Severity::High,
            Self::DanglingReference => Severity::Medium,
            Self::DanglingSelector => Severity::Low,
            Self::HpaMissingRequests => Severity::Medium,
            Self::PrivilegedContainer => Severity::High,
            Self::RbacWildcard => Severity::High,
            Self::IoError => Severity::Fatal,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::GhostService => "Ghost Service",
            Self::PortMismatch => "Port Mismatch",
            Self::NamespaceViolation => "Cross-Namespace Reference",
            Self::DeprecatedApi => "Deprecated API Version",
            Self::SyntaxRepair => "Structural Repair",
            Self::UnverifiableSelector => "Unverifiable Selector",
            Self::SelectorMismatch => "Workload Selector Mismatch",
            Self::DanglingReference => "Dangling Reference",
            Self::DanglingSelector => "Dangling Selector",
            Self::HpaMissingRequests => "HPA Without Resource Requests",
            Self::PrivilegedContainer => "Privileged Container",
            Self::RbacWildcard => "RBAC Wildcard",
            Self::IoError => "Unreadable File",
        }
    }

    /// Long-form explanation used by `kubecuro explain`.
    pub fn description(&self) -> &'static str {
        match self {
            Self::GhostService => {
                "A Service selects Pods by label. When no Pod template in the same namespace carries \
                 every label of the selector, the Service has no endpoints and traffic sent to it is dropped."
            }
            Self::PortMismatch => {
                "Each Service port forwards to a targetPort on the selected Pods. A numeric targetPort must \
                 be declared as a containerPort and a named targetPort must match a named containerPort. \
                 An absent targetPort defaults to the Service port."
            }
            Self::NamespaceViolation => {
                "A manifest references an object through an explicit namespace that differs from its own. \
                 Namespace isolation means the reference will not resolve the way it reads."
            }
            Self::DeprecatedApi => {
                "The manifest uses an API version that is deprecated or already removed from current \
                 Kubernetes releases. Clusters that dropped it will reject the object."
            }
            Self::SyntaxRepair => {
                "The document needed structural repair: indentation, missing colons, misaligned sequence \
                 dashes, spacing or whitespace. A fatal repair finding means the document could not be \
                 reconstructed and was left untouched."
            }
            Self::UnverifiableSelector => {
                "The selector uses set-based expressions that cannot be evaluated offline, and none of its \
                 plain label terms matched. The selector may still match at runtime."
            }
            Self::SelectorMismatch => {
                "A workload's spec.selector does not match the labels of its own Pod template. The API \
                 server rejects such workloads."
            }
            Self::DanglingReference => {
                "An object references another object by name (HPA scale target, Ingress backend, RoleBinding \
                 role) that is not defined anywhere in the analyzed manifests."
            }
            Self::DanglingSelector => {
                "A PodDisruptionBudget or NetworkPolicy selector matches no Pod template in its namespace, \
                 so the policy has no effect."
            }
            Self::HpaMissingRequests => {
                "A HorizontalPodAutoscaler scales on a resource metric, but containers of its target do not \
                 request that resource. Utilization cannot be computed and the autoscaler stays idle."
            }
            Self::PrivilegedContainer => {
                "A container runs with securityContext.privileged: true, which grants it full access to the \
                 host."
            }
            Self::RbacWildcard => {
                "A Role or ClusterRole grants '*' verbs or resources. Wildcards silently widen permissions as \
                 new resources appear."
            }
            Self::IoError => {
                "The file could not be read as UTF-8 text, or a healed file could not be written back."
            }
        }
    }

    /// Default remediation advice.
    pub fn remediation(&self) -> &'static str {
        match self {
            Self::GhostService => "Align the Service selector with the labels of the intended Pod template.",
            Self::PortMismatch => "Point targetPort at a declared containerPort number or name.",
            Self::NamespaceViolation => "Move the referenced object into the same namespace or drop the override.",
            Self::DeprecatedApi => "Run `kubecuro fix` or switch apiVersion to the replacement.",
            Self::SyntaxRepair => "Run `kubecuro fix` to write the healed document back.",
            Self::UnverifiableSelector => "Confirm the matchExpressions terms against the target Pods.",
            Self::SelectorMismatch => "Make spec.selector a subset of spec.template.metadata.labels.",
            Self::DanglingReference => "Create the referenced object or fix the referenced name.",
            Self::DanglingSelector => "Align the selector with the labels of an existing Pod template.",
            Self::HpaMissingRequests => "Set resources.requests for the scaled resource on every container.",
            Self::PrivilegedContainer => "Remove privileged: true or grant only the capabilities needed.",
            Self::RbacWildcard => "List the verbs and resources explicitly.",
            Self::IoError => "Check file permissions and encoding.",
        }
    }
}

impl fmt::Display for FindingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reference to the manifest (or bare file) a finding is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectRef {
    /// File the subject was read from.
    pub file: PathBuf,
    /// Zero-based index of the YAML document inside the file.
    pub document: Option<usize>,
    /// 1-indexed source line, when known.
    pub line: Option<u32>,
    pub kind: Option<String>,
    pub name: Option<String>,
    pub namespace: Option<String>,
}

impl SubjectRef {
    /// A subject that is a whole file.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            file: path.into(),
            document: None,
            line: None,
            kind: None,
            name: None,
            namespace: None,
        }
    }

    /// A subject that is one document of a file.
    pub fn document(path: impl Into<PathBuf>, document: usize) -> Self {
        Self {
            document: Some(document),
            ..Self::file(path)
        }
    }

    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    /// Attach the object identity (kind, name, namespace).
    pub fn with_object(
        mut self,
        kind: impl Into<String>,
        name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        self.kind = Some(kind.into());
        self.name = Some(name.into());
        self.namespace = Some(namespace.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.file
    }

    /// `Kind/namespace/name` when the object is known, the file path otherwise.
    pub fn identifier(&self) -> String {
        match (&self.kind, &self.name) {
            (Some(kind), Some(name)) => match &self.namespace {
                Some(ns) => format!("{}/{}/{}", kind, ns, name),
                None => format!("{}/{}", kind, name),
            },
            _ => self.file.display().to_string(),
        }
    }
}

/// A single diagnostic produced by an analysis run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub code: FindingCode,
    pub severity: Severity,
    pub message: String,
    pub subject: SubjectRef,
    /// Other manifests involved (matched workloads, referenced objects).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<SubjectRef>,
    /// Suggested textual fix, when one is known.
    pub suggestion: Option<String>,
}

impl Finding {
    /// Create a finding with the code's default severity.
    pub fn new(code: FindingCode, message: impl Into<String>, subject: SubjectRef) -> Self {
        Self {
            code,
            severity: code.default_severity(),
            message: message.into(),
            subject,
            related: Vec::new(),
            suggestion: None,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_related(mut self, related: SubjectRef) -> Self {
        self.related.push(related);
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn line(&self) -> Option<u32> {
        self.subject.line
    }

    /// Report order: severity descending, then file path, then line (unknown lines last).
    ///
    /// Ties are left to the caller so a stable sort keeps insertion order.
    pub fn report_order(&self, other: &Self) -> Ordering {
        other
            .severity
            .cmp(&self.severity)
            .then_with(|| self.subject.file.cmp(&other.subject.file))
            .then_with(|| match (self.subject.line, other.subject.line) {
                (Some(a), Some(b)) => a.cmp(&b),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            })
    }
}

/// Object kinds the extractor and resolver understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    // Workloads
    Deployment,
    StatefulSet,
    DaemonSet,
    ReplicaSet,
    ReplicationController,
    Pod,
    Job,
    CronJob,

    // Services & Networking
    Service,
    Ingress,
    NetworkPolicy,

    // RBAC
    Role,
    ClusterRole,
    RoleBinding,
    ClusterRoleBinding,

    // Scaling & Disruption
    HorizontalPodAutoscaler,
    PodDisruptionBudget,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deployment => "Deployment",
            Self::StatefulSet => "StatefulSet",
            Self::DaemonSet => "DaemonSet",
            Self::ReplicaSet => "ReplicaSet",
            Self::ReplicationController => "ReplicationController",
            Self::Pod => "Pod",
            Self::Job => "Job",
            Self::CronJob => "CronJob",
            Self::Service => "Service",
            Self::Ingress => "Ingress",
            Self::NetworkPolicy => "NetworkPolicy",
            Self::Role => "Role",
            Self::ClusterRole => "ClusterRole",
            Self::RoleBinding => "RoleBinding",
            Self::ClusterRoleBinding => "ClusterRoleBinding",
            Self::HorizontalPodAutoscaler => "HorizontalPodAutoscaler",
            Self::PodDisruptionBudget => "PodDisruptionBudget",
        }
    }

    /// Parse from a Kubernetes kind string.
    pub fn from_kind(kind: &str) -> Option<Self> {
        match kind {
            "Deployment" => Some(Self::Deployment),
            "StatefulSet" => Some(Self::StatefulSet),
            "DaemonSet" => Some(Self::DaemonSet),
            "ReplicaSet" => Some(Self::ReplicaSet),
            "ReplicationController" => Some(Self::ReplicationController),
            "Pod" => Some(Self::Pod),
            "Job" => Some(Self::Job),
            "CronJob" => Some(Self::CronJob),
            "Service" => Some(Self::Service),
            "Ingress" => Some(Self::Ingress),
            "NetworkPolicy" => Some(Self::NetworkPolicy),
            "Role" => Some(Self::Role),
            "ClusterRole" => Some(Self::ClusterRole),
            "RoleBinding" => Some(Self::RoleBinding),
            "ClusterRoleBinding" => Some(Self::ClusterRoleBinding),
            "HorizontalPodAutoscaler" => Some(Self::HorizontalPodAutoscaler),
            "PodDisruptionBudget" => Some(Self::PodDisruptionBudget),
            _ => None,
        }
    }

    /// Check if this kind carries a Pod template (or is a Pod).
    pub fn carries_pod_template(&self) -> bool {
        matches!(
            self,
            Self::Deployment
                | Self::StatefulSet
                | Self::DaemonSet
                | Self::ReplicaSet
                | Self::ReplicationController
                | Self::Pod
                | Self::Job
                | Self::CronJob
        )
    }

    /// Kinds whose `spec.selector` must match their own template labels.
    pub fn has_workload_selector(&self) -> bool {
        matches!(
            self,
            Self::Deployment
                | Self::StatefulSet
                | Self::DaemonSet
                | Self::ReplicaSet
                | Self::ReplicationController
        )
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Fatal > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn test_severity_from_str() {
        assert_eq!(Severity::parse("fatal"), Some(Severity::Fatal));
        assert_eq!(Severity::parse("HIGH"), Some(Severity::High));
        assert_eq!(Severity::parse("med"), Some(Severity::Medium));
        assert_eq!(Severity::parse("Low"), Some(Severity::Low));
        assert_eq!(Severity::parse("warning"), None);
    }

    #[test]
    fn test_finding_code_parse() {
        assert_eq!(FindingCode::parse("GHOST_SERVICE"), Some(FindingCode::GhostService));
        assert_eq!(FindingCode::parse("port-mismatch"), Some(FindingCode::PortMismatch));
        assert_eq!(FindingCode::parse("rbac_wildcard"), Some(FindingCode::RbacWildcard));
        assert_eq!(FindingCode::parse("nope"), None);
        for code in FindingCode::ALL {
            assert_eq!(FindingCode::parse(code.as_str()), Some(*code));
        }
    }

    #[test]
    fn test_default_severities() {
        assert_eq!(FindingCode::GhostService.default_severity(), Severity::High);
        assert_eq!(FindingCode::PortMismatch.default_severity(), Severity::Medium);
        assert_eq!(FindingCode::NamespaceViolation.default_severity(), Severity::High);
        assert_eq!(FindingCode::IoError.default_severity(), Severity::Fatal);
    }

    #[test]
    fn test_report_order() {
        let low = Finding::new(
            FindingCode::SyntaxRepair,
            "indentation",
            SubjectRef::file("a.yaml").with_line(3),
        );
        let high = Finding::new(
            FindingCode::GhostService,
            "no pods",
            SubjectRef::file("b.yaml").with_line(9),
        );
        let high_earlier = Finding::new(
            FindingCode::GhostService,
            "no pods",
            SubjectRef::file("a.yaml"),
        );
        let high_line = Finding::new(
            FindingCode::GhostService,
            "no pods",
            SubjectRef::file("a.yaml").with_line(1),
        );

        let mut findings = vec![low, high, high_earlier, high_line];
        findings.sort_by(|a, b| a.report_order(b));

        assert_eq!(findings[0].subject.file, PathBuf::from("a.yaml"));
        assert_eq!(findings[0].line(), Some(1));
        assert_eq!(findings[1].line(), None);
        assert_eq!(findings[2].subject.file, PathBuf::from("b.yaml"));
        assert_eq!(findings[3].severity, Severity::Low);
    }

    #[test]
    fn test_subject_identifier() {
        let subject = SubjectRef::document("svc.yaml", 0).with_object("Service", "web", "prod");
        assert_eq!(subject.identifier(), "Service/prod/web");
        assert_eq!(SubjectRef::file("x.yaml").identifier(), "x.yaml");
    }

    #[test]
    fn test_object_kind() {
        assert!(ObjectKind::Deployment.carries_pod_template());
        assert!(ObjectKind::CronJob.carries_pod_template());
        assert!(!ObjectKind::Service.carries_pod_template());
        assert!(!ObjectKind::Pod.has_workload_selector());
        assert_eq!(ObjectKind::from_kind("Ingress"), Some(ObjectKind::Ingress));
        assert_eq!(ObjectKind::from_kind("Widget"), None);
    }
}

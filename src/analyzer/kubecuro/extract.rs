//! Manifest Model Extractor
//!
//! Projects a healed document into the typed [`ManifestRecord`] the
//! resolver works on. Documents without an `apiVersion`/`kind` pair are
//! skipped, not reported.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_yaml::Value;

use crate::analyzer::kubecuro::healer::{Document, Node, Scalar, unquote};
use crate::analyzer::kubecuro::types::{ObjectKind, SubjectRef};

/// Namespace assumed when `metadata.namespace` is absent.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Why a document produced no record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionSkip {
    /// The document holds only comments.
    Empty,
    /// The root is a scalar or a sequence.
    NotAMapping,
    /// `apiVersion` or `kind` is missing.
    MissingIdentity,
}

impl ExtractionSkip {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Empty => "empty document",
            Self::NotAMapping => "root is not a mapping",
            Self::MissingIdentity => "missing apiVersion or kind",
        }
    }
}

/// Where a record came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Origin {
    pub file: PathBuf,
    /// 0-based document index inside the file.
    pub document: usize,
    /// First line of the document's content.
    pub line: usize,
}

/// A Service `targetPort`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum TargetPort {
    Number(i64),
    Name(String),
}

impl std::fmt::Display for TargetPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetPort::Number(n) => write!(f, "{}", n),
            TargetPort::Name(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServicePort {
    pub name: Option<String>,
    pub port: i64,
    pub target_port: Option<TargetPort>,
    pub protocol: String,
}

impl ServicePort {
    /// `targetPort`, defaulting to `port` as the API server does.
    pub fn effective_target(&self) -> TargetPort {
        self.target_port
            .clone()
            .unwrap_or(TargetPort::Number(self.port))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerPort {
    pub name: Option<String>,
    pub container_port: i64,
    pub protocol: String,
    /// Name of the container declaring the port.
    pub container: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Container {
    pub name: String,
    pub init: bool,
    pub privileged: bool,
    /// Resource names under `resources.requests`.
    pub requests: BTreeSet<String>,
}

/// A label selector reduced to what can be matched exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Selector {
    pub labels: BTreeMap<String, String>,
    /// Terms that cannot be evaluated by equality (`matchExpressions`, odd values).
    pub unevaluable: Vec<String>,
}

impl Selector {
    pub fn is_fully_evaluable(&self) -> bool {
        self.unevaluable.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty() && self.unevaluable.is_empty()
    }

    /// Equality terms all hold on `labels`.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.labels
            .iter()
            .all(|(key, value)| labels.get(key) == Some(value))
    }

    pub fn describe(&self) -> String {
        let mut terms: Vec<String> = self
            .labels
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect();
        terms.extend(self.unevaluable.iter().cloned());
        terms.join(",")
    }
}

/// A reference from one manifest to another by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectRef {
    pub kind: String,
    pub name: String,
    /// Explicit `namespace:` written inside the reference.
    pub namespace: Option<String>,
    /// Field path the reference was read from.
    pub field: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRule {
    pub api_groups: Vec<String>,
    pub resources: Vec<String>,
    pub verbs: Vec<String>,
}

/// Typed projection of one manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestRecord {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    /// Always resolved; `default` when the manifest names none.
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    /// Labels of the pod template, for pod-template-bearing kinds.
    pub pod_labels: Option<BTreeMap<String, String>>,
    /// Service, PodDisruptionBudget or NetworkPolicy selector.
    pub selector: Option<Selector>,
    /// A workload's own `spec.selector`.
    pub workload_selector: Option<Selector>,
    pub ports: Vec<ServicePort>,
    pub container_ports: Vec<ContainerPort>,
    pub containers: Vec<Container>,
    pub references: Vec<ObjectRef>,
    pub policy_rules: Vec<PolicyRule>,
    /// Resource names an HPA scales on.
    pub metrics: Vec<String>,
    pub origin: Origin,
}

impl ManifestRecord {
    pub fn object_kind(&self) -> Option<ObjectKind> {
        ObjectKind::from_kind(&self.kind)
    }

    pub fn carries_pod_template(&self) -> bool {
        self.object_kind()
            .is_some_and(|kind| kind.carries_pod_template())
    }

    pub fn subject(&self) -> SubjectRef {
        SubjectRef::document(self.origin.file.clone(), self.origin.document)
            .with_line(self.origin.line as u32)
            .with_object(self.kind.clone(), self.name.clone(), self.namespace.clone())
    }

    /// `Kind/namespace/name`.
    pub fn identity(&self) -> String {
        format!("{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

/// Extract the record for one healed document.
pub fn extract(document: &Document, file: &Path, index: usize) -> Result<ManifestRecord, ExtractionSkip> {
    let root = document.root.as_ref().ok_or(ExtractionSkip::Empty)?;
    if root.as_mapping().is_none() {
        return Err(ExtractionSkip::NotAMapping);
    }
    let value = to_value(root);
    let (Some(api_version), Some(kind)) = (get_string(&value, "apiVersion"), get_string(&value, "kind")) else {
        return Err(ExtractionSkip::MissingIdentity);
    };

    let metadata = value.get("metadata");
    let name = metadata
        .and_then(|m| get_string(m, "name"))
        .or_else(|| metadata.and_then(|m| get_string(m, "generateName")))
        .unwrap_or_default();
    let namespace = metadata
        .and_then(|m| get_string(m, "namespace"))
        .filter(|ns| !ns.is_empty())
        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

    let mut record = ManifestRecord {
        api_version,
        kind,
        name,
        namespace,
        labels: metadata.map(|m| get_string_map(m, "labels")).unwrap_or_default(),
        annotations: metadata
            .map(|m| get_string_map(m, "annotations"))
            .unwrap_or_default(),
        pod_labels: None,
        selector: None,
        workload_selector: None,
        ports: Vec::new(),
        container_ports: Vec::new(),
        containers: Vec::new(),
        references: Vec::new(),
        policy_rules: Vec::new(),
        metrics: Vec::new(),
        origin: Origin {
            file: file.to_path_buf(),
            document: index,
            line: root.line().unwrap_or(1),
        },
    };

    let spec = value.get("spec");
    let Some(kind) = record.object_kind() else {
        return Ok(record);
    };

    if kind.carries_pod_template() {
        if let Some(template) = pod_template(&value, kind) {
            record.pod_labels = Some(
                template
                    .get("metadata")
                    .map(|m| get_string_map(m, "labels"))
                    .unwrap_or_default(),
            );
            if let Some(pod_spec) = template.get("spec") {
                record.containers = parse_containers(pod_spec);
                record.container_ports = parse_container_ports(pod_spec);
            }
        }
    }
    if kind.has_workload_selector() {
        record.workload_selector = spec.and_then(|s| s.get("selector")).map(parse_selector);
    }

    match kind {
        ObjectKind::Service => {
            record.selector = spec.and_then(|s| s.get("selector")).map(parse_selector);
            record.ports = spec.map(parse_service_ports).unwrap_or_default();
        }
        ObjectKind::PodDisruptionBudget => {
            record.selector = spec.and_then(|s| s.get("selector")).map(parse_selector);
        }
        ObjectKind::NetworkPolicy => {
            record.selector = spec.and_then(|s| s.get("podSelector")).map(parse_selector);
        }
        ObjectKind::HorizontalPodAutoscaler => {
            if let Some(spec) = spec {
                record.references.extend(parse_reference(
                    spec.get("scaleTargetRef"),
                    None,
                    "spec.scaleTargetRef",
                ));
                record.metrics = parse_metrics(spec);
            }
        }
        ObjectKind::Ingress => {
            if let Some(spec) = spec {
                record.references = parse_ingress_backends(spec);
            }
        }
        ObjectKind::RoleBinding => {
            let role_ref = value.get("roleRef");
            if role_ref.and_then(|r| get_string(r, "kind")).as_deref() == Some("Role") {
                record
                    .references
                    .extend(parse_reference(role_ref, None, "roleRef"));
            }
        }
        ObjectKind::Role | ObjectKind::ClusterRole => {
            record.policy_rules = parse_policy_rules(value.get("rules"));
        }
        _ => {}
    }

    Ok(record)
}

/// Convert a healed node to a plain YAML value.
pub fn to_value(node: &Node) -> Value {
    match node {
        Node::Mapping(mapping) => {
            let mut out = serde_yaml::Mapping::new();
            for entry in &mapping.children {
                let value = entry.value.as_ref().map(to_value).unwrap_or(Value::Null);
                out.insert(Value::String(entry.key_text().to_string()), value);
            }
            Value::Mapping(out)
        }
        Node::Sequence(sequence) => Value::Sequence(
            sequence
                .children
                .iter()
                .map(|item| item.value.as_ref().map(to_value).unwrap_or(Value::Null))
                .collect(),
        ),
        Node::Scalar(scalar) => scalar_value(scalar),
    }
}

fn scalar_value(scalar: &Scalar) -> Value {
    let text = scalar.logical_text();
    if scalar.is_block() {
        return Value::String(text);
    }
    serde_yaml::from_str::<Value>(&text).unwrap_or(Value::String(unquote(&text).to_string()))
}

fn get_string(value: &Value, key: &str) -> Option<String> {
    scalar_string(value.get(key)?)
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Tagged(tagged) => scalar_string(&tagged.value),
        _ => None,
    }
}

fn get_i64(value: &Value, key: &str) -> Option<i64> {
    match value.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn get_bool(value: &Value, key: &str) -> Option<bool> {
    value.get(key)?.as_bool()
}

fn get_string_map(value: &Value, key: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    if let Some(mapping) = value.get(key).and_then(Value::as_mapping) {
        for (k, v) in mapping {
            if let (Some(key), Some(val)) = (scalar_string(k), scalar_string(v)) {
                map.insert(key, val);
            }
        }
    }
    map
}

fn get_string_list(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_sequence)
        .map(|items| items.iter().filter_map(scalar_string).collect())
        .unwrap_or_default()
}

fn pod_template(value: &Value, kind: ObjectKind) -> Option<&Value> {
    match kind {
        ObjectKind::Pod => Some(value),
        ObjectKind::CronJob => value
            .get("spec")?
            .get("jobTemplate")?
            .get("spec")?
            .get("template"),
        _ => value.get("spec")?.get("template"),
    }
}

/// Accepts both `matchLabels`/`matchExpressions` selectors and flat maps.
/// A null selector selects nothing and comes back empty.
fn parse_selector(value: &Value) -> Selector {
    let mut selector = Selector::default();
    if value.is_null() {
        return selector;
    }
    let Some(mapping) = value.as_mapping() else {
        selector.unevaluable.push(format!("selector {:?}", value));
        return selector;
    };
    let structured = value.get("matchLabels").is_some() || value.get("matchExpressions").is_some();
    if !structured {
        for (k, v) in mapping {
            match (scalar_string(k), scalar_string(v)) {
                (Some(key), Some(val)) => {
                    selector.labels.insert(key, val);
                }
                (Some(key), None) => selector.unevaluable.push(format!("{} (non-scalar)", key)),
                _ => selector.unevaluable.push("non-scalar key".to_string()),
            }
        }
        return selector;
    }

    selector.labels = get_string_map(value, "matchLabels");
    if let Some(expressions) = value.get("matchExpressions").and_then(Value::as_sequence) {
        for expression in expressions {
            let key = get_string(expression, "key").unwrap_or_default();
            let operator = get_string(expression, "operator").unwrap_or_default();
            let values = get_string_list(expression, "values");
            let term = if values.is_empty() {
                format!("{} {}", key, operator)
            } else {
                format!("{} {} ({})", key, operator, values.join(","))
            };
            selector.unevaluable.push(term);
        }
    }
    selector
}

fn parse_service_ports(spec: &Value) -> Vec<ServicePort> {
    let Some(ports) = spec.get("ports").and_then(Value::as_sequence) else {
        return Vec::new();
    };
    ports
        .iter()
        .filter_map(|p| {
            let port = get_i64(p, "port")?;
            let target_port = p.get("targetPort").and_then(|target| match target {
                Value::Number(n) => n.as_i64().map(TargetPort::Number),
                Value::String(s) if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) => {
                    s.parse().ok().map(TargetPort::Number)
                }
                Value::String(s) => Some(TargetPort::Name(s.clone())),
                _ => None,
            });
            Some(ServicePort {
                name: get_string(p, "name"),
                port,
                target_port,
                protocol: protocol(p),
            })
        })
        .collect()
}

fn protocol(port: &Value) -> String {
    get_string(port, "protocol")
        .map(|p| p.to_uppercase())
        .unwrap_or_else(|| "TCP".to_string())
}

fn parse_containers(pod_spec: &Value) -> Vec<Container> {
    let mut out = Vec::new();
    for (field, init) in [("containers", false), ("initContainers", true)] {
        let Some(containers) = pod_spec.get(field).and_then(Value::as_sequence) else {
            continue;
        };
        for c in containers {
            out.push(Container {
                name: get_string(c, "name").unwrap_or_default(),
                init,
                privileged: c
                    .get("securityContext")
                    .and_then(|sc| get_bool(sc, "privileged"))
                    .unwrap_or(false),
                requests: c
                    .get("resources")
                    .map(|r| get_string_map(r, "requests").into_keys().collect())
                    .unwrap_or_default(),
            });
        }
    }
    out
}

fn parse_container_ports(pod_spec: &Value) -> Vec<ContainerPort> {
    let Some(containers) = pod_spec.get("containers").and_then(Value::as_sequence) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for c in containers {
        let container = get_string(c, "name").unwrap_or_default();
        let Some(ports) = c.get("ports").and_then(Value::as_sequence) else {
            continue;
        };
        for p in ports {
            if let Some(container_port) = get_i64(p, "containerPort") {
                out.push(ContainerPort {
                    name: get_string(p, "name"),
                    container_port,
                    protocol: protocol(p),
                    container: container.clone(),
                });
            }
        }
    }
    out
}

fn parse_reference(value: Option<&Value>, kind: Option<&str>, field: &str) -> Option<ObjectRef> {
    let value = value?;
    let name = get_string(value, "name").filter(|n| !n.is_empty())?;
    let kind = kind
        .map(str::to_string)
        .or_else(|| get_string(value, "kind"))?;
    Some(ObjectRef {
        kind,
        name,
        namespace: get_string(value, "namespace"),
        field: field.to_string(),
    })
}

/// Service backends of both the `networking.k8s.io/v1` and the legacy shapes.
fn parse_ingress_backends(spec: &Value) -> Vec<ObjectRef> {
    let mut refs = Vec::new();
    let mut push_backend = |backend: &Value, field: String| {
        if let Some(service) = backend.get("service") {
            refs.extend(parse_reference(Some(service), Some("Service"), &field));
        } else if let Some(name) = get_string(backend, "serviceName") {
            refs.push(ObjectRef {
                kind: "Service".to_string(),
                name,
                namespace: get_string(backend, "namespace"),
                field,
            });
        }
    };

    if let Some(backend) = spec.get("defaultBackend") {
        push_backend(backend, "spec.defaultBackend".to_string());
    }
    if let Some(backend) = spec.get("backend") {
        push_backend(backend, "spec.backend".to_string());
    }
    let rules = spec.get("rules").and_then(Value::as_sequence);
    for (r, rule) in rules.into_iter().flatten().enumerate() {
        let paths = rule
            .get("http")
            .and_then(|http| http.get("paths"))
            .and_then(Value::as_sequence);
        for (p, path) in paths.into_iter().flatten().enumerate() {
            if let Some(backend) = path.get("backend") {
                push_backend(backend, format!("spec.rules[{}].http.paths[{}].backend", r, p));
            }
        }
    }
    refs
}

fn parse_metrics(spec: &Value) -> Vec<String> {
    let mut metrics = BTreeSet::new();
    if let Some(list) = spec.get("metrics").and_then(Value::as_sequence) {
        for metric in list {
            if get_string(metric, "type").as_deref() != Some("Resource") {
                continue;
            }
            if let Some(name) = metric.get("resource").and_then(|r| get_string(r, "name")) {
                metrics.insert(name);
            }
        }
        return metrics.into_iter().collect();
    }
    // autoscaling/v1 and the v2 default both scale on CPU.
    vec!["cpu".to_string()]
}

fn parse_policy_rules(rules: Option<&Value>) -> Vec<PolicyRule> {
    rules
        .and_then(Value::as_sequence)
        .map(|rules| {
            rules
                .iter()
                .map(|rule| PolicyRule {
                    api_groups: get_string_list(rule, "apiGroups"),
                    resources: get_string_list(rule, "resources"),
                    verbs: get_string_list(rule, "verbs"),
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::kubecuro::deprecation::StaticDeprecationTable;
    use crate::analyzer::kubecuro::healer::{Healer, HealerOptions};

    fn record(yaml: &str) -> Result<ManifestRecord, ExtractionSkip> {
        let table = StaticDeprecationTable::builtin();
        let output = Healer::new(HealerOptions::default(), &table).heal(yaml);
        let document = output.documents[0].tree().expect("healable");
        extract(document, Path::new("test.yaml"), 0)
    }

    #[test]
    fn test_service() {
        let r = record(
            r#"
apiVersion: v1
kind: Service
metadata:
  name: web
spec:
  selector:
    app: web
    tier: "frontend"
  ports:
    - name: http
      port: 80
      targetPort: web
    - port: 8443
      targetPort: "8443"
      protocol: udp
    - port: 9000
"#,
        )
        .unwrap();
        assert_eq!(r.namespace, "default");
        let selector = r.selector.as_ref().unwrap();
        assert!(selector.is_fully_evaluable());
        assert_eq!(selector.labels.get("tier").map(String::as_str), Some("frontend"));
        assert_eq!(r.ports.len(), 3);
        assert_eq!(r.ports[0].target_port, Some(TargetPort::Name("web".to_string())));
        assert_eq!(r.ports[1].target_port, Some(TargetPort::Number(8443)));
        assert_eq!(r.ports[1].protocol, "UDP");
        assert_eq!(r.ports[2].effective_target(), TargetPort::Number(9000));
        assert_eq!(r.origin.line, 2);
    }

    #[test]
    fn test_deployment_template() {
        let r = record(
            r#"apiVersion: apps/v1
kind: Deployment
metadata:
  name: api
  namespace: prod
spec:
  selector:
    matchLabels:
      app: api
  template:
    metadata:
      labels:
        app: api
    spec:
      initContainers:
        - name: migrate
      containers:
        - name: api
          securityContext:
            privileged: true
          resources:
            requests:
              cpu: 100m
          ports:
            - name: http
              containerPort: 8080
"#,
        )
        .unwrap();
        assert_eq!(r.namespace, "prod");
        assert_eq!(r.pod_labels.as_ref().unwrap().get("app").map(String::as_str), Some("api"));
        assert!(r.workload_selector.as_ref().unwrap().matches(r.pod_labels.as_ref().unwrap()));
        assert_eq!(r.container_ports.len(), 1);
        assert_eq!(r.container_ports[0].protocol, "TCP");
        assert_eq!(r.containers.len(), 2);
        assert!(r.containers[0].privileged);
        assert!(r.containers[0].requests.contains("cpu"));
        assert!(r.containers[1].init);
    }

    #[test]
    fn test_cronjob_template() {
        let r = record(
            "apiVersion: batch/v1\nkind: CronJob\nmetadata:\n  name: nightly\nspec:\n  jobTemplate:\n    spec:\n      template:\n        metadata:\n          labels:\n            job: nightly\n        spec:\n          containers:\n            - name: run\n              ports:\n                - containerPort: 9090\n",
        )
        .unwrap();
        assert_eq!(r.pod_labels.unwrap().get("job").map(String::as_str), Some("nightly"));
        assert_eq!(r.container_ports[0].container_port, 9090);
    }

    #[test]
    fn test_match_expressions_are_unevaluable() {
        let r = record(
            "apiVersion: policy/v1\nkind: PodDisruptionBudget\nmetadata:\n  name: pdb\nspec:\n  selector:\n    matchLabels:\n      app: web\n    matchExpressions:\n      - key: tier\n        operator: In\n        values: [a, b]\n",
        )
        .unwrap();
        let selector = r.selector.unwrap();
        assert!(!selector.is_fully_evaluable());
        assert_eq!(selector.unevaluable, vec!["tier In (a,b)".to_string()]);
    }

    #[test]
    fn test_null_selector_is_empty() {
        let r = record(
            "apiVersion: v1\nkind: Service\nmetadata:\n  name: external-db\nspec:\n  selector:\n  ports:\n    - port: 5432\n",
        )
        .unwrap();
        let selector = r.selector.unwrap();
        assert!(selector.is_empty());
        assert!(selector.is_fully_evaluable());
    }

    #[test]
    fn test_references() {
        let hpa = record(
            "apiVersion: autoscaling/v2\nkind: HorizontalPodAutoscaler\nmetadata:\n  name: api\nspec:\n  scaleTargetRef:\n    kind: Deployment\n    name: api\n  metrics:\n    - type: Resource\n      resource:\n        name: memory\n",
        )
        .unwrap();
        assert_eq!(hpa.references[0].kind, "Deployment");
        assert_eq!(hpa.metrics, vec!["memory".to_string()]);

        let ingress = record(
            "apiVersion: networking.k8s.io/v1\nkind: Ingress\nmetadata:\n  name: web\nspec:\n  rules:\n    - http:\n        paths:\n          - path: /\n            backend:\n              service:\n                name: web\n                namespace: other\n",
        )
        .unwrap();
        assert_eq!(ingress.references.len(), 1);
        assert_eq!(ingress.references[0].namespace.as_deref(), Some("other"));
    }

    #[test]
    fn test_skips() {
        assert_eq!(record("just: data\n").unwrap_err(), ExtractionSkip::MissingIdentity);
        assert_eq!(record("- a\n- b\n").unwrap_err(), ExtractionSkip::NotAMapping);
        assert_eq!(record("# only a comment\n").unwrap_err(), ExtractionSkip::Empty);
    }
}

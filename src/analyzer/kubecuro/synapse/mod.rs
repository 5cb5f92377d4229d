//! Relationship Resolver (Synapse)
//!
//! Cross-references every extracted manifest of a run: Service selectors
//! against pod templates, Service ports against container ports, and
//! name references (HPA targets, Ingress backends, RoleBinding roles)
//! against the objects they name. Matching is namespace-scoped.

pub mod index;

use std::collections::BTreeSet;

use self::index::Indices;
use crate::analyzer::kubecuro::config::PartialSelectorPolicy;
use crate::analyzer::kubecuro::extract::{ManifestRecord, Selector, ServicePort, TargetPort};
use crate::analyzer::kubecuro::types::{Finding, FindingCode, ObjectKind};

/// Resource metrics whose utilization targets depend on container requests.
const REQUEST_METRICS: &[&str] = &["cpu", "memory"];

/// Resolve relationships across all records of a run.
pub fn resolve(records: &[ManifestRecord], policy: PartialSelectorPolicy) -> Vec<Finding> {
    let indices = Indices::build(records);
    let resolver = Resolver {
        indices: &indices,
        policy,
    };
    let mut findings = Vec::new();

    for service in indices.services() {
        resolver.check_service(service, &mut findings);
    }
    for record in records {
        resolver.check_workload_selector(record, &mut findings);
        resolver.check_references(record, &mut findings);
        resolver.check_dangling_selector(record, &mut findings);
    }

    log::debug!("Resolver produced {} findings", findings.len());
    findings
}

struct Resolver<'a, 'r> {
    indices: &'a Indices<'r>,
    policy: PartialSelectorPolicy,
}

impl<'a, 'r> Resolver<'a, 'r> {
    fn check_service(&self, service: &'r ManifestRecord, findings: &mut Vec<Finding>) {
        let Some(selector) = service.selector.as_ref().filter(|s| !s.is_empty()) else {
            return;
        };
        let matched = self.indices.matching(&service.namespace, selector);

        if matched.is_empty() {
            if selector.is_fully_evaluable() || self.policy == PartialSelectorPolicy::Strict {
                findings.push(self.ghost_service(service, selector));
            } else if self.policy == PartialSelectorPolicy::Note {
                findings.push(unverifiable(service, selector));
            }
            return;
        }
        // Without equality terms every template matched; there is nothing to port-check.
        if selector.labels.is_empty() {
            return;
        }

        for port in &service.ports {
            if let Some(finding) = self.check_port(service, port, &matched) {
                findings.push(finding);
            }
        }
    }

    fn ghost_service(&self, service: &ManifestRecord, selector: &Selector) -> Finding {
        let mut message = format!(
            "Service '{}' selector {{{}}} matches no workload in namespace '{}'",
            service.name,
            selector.describe(),
            service.namespace
        );
        let elsewhere = self
            .indices
            .namespaces_matching(selector, &service.namespace);
        let mut finding = Finding::new(FindingCode::GhostService, String::new(), service.subject());
        if !elsewhere.is_empty() {
            message.push_str(&format!(
                "; matching workloads exist in namespace(s) {}",
                quoted_list(elsewhere.iter().copied())
            ));
            finding = finding.with_suggestion(format!(
                "move the Service to namespace '{}' or deploy the workload to '{}'",
                elsewhere[0], service.namespace
            ));
        } else {
            finding = finding.with_suggestion("align the selector with the pod template labels of the target workload");
        }
        finding.message = message;
        finding
    }

    fn check_port(
        &self,
        service: &ManifestRecord,
        port: &ServicePort,
        matched: &BTreeSet<usize>,
    ) -> Option<Finding> {
        let target = port.effective_target();
        let workloads: Vec<&ManifestRecord> = matched.iter().map(|idx| self.indices.record(*idx)).collect();
        let resolved = workloads.iter().any(|workload| {
            workload.container_ports.iter().any(|cp| {
                cp.protocol == port.protocol
                    && match &target {
                        TargetPort::Number(n) => cp.container_port == *n,
                        TargetPort::Name(name) => cp.name.as_deref() == Some(name.as_str()),
                    }
            })
        });
        if resolved {
            return None;
        }

        let message = match &target {
            TargetPort::Name(name) => {
                let names: BTreeSet<&str> = workloads
                    .iter()
                    .flat_map(|w| w.container_ports.iter())
                    .filter_map(|cp| cp.name.as_deref())
                    .collect();
                format!(
                    "Service '{}' port {} targetPort: {} names no container port of {}; available names: {}",
                    service.name,
                    port.port,
                    name,
                    workload_list(&workloads),
                    list_or_none(names.into_iter().map(str::to_string))
                )
            }
            TargetPort::Number(n) => {
                let ports: BTreeSet<String> = workloads
                    .iter()
                    .flat_map(|w| w.container_ports.iter())
                    .map(|cp| match &cp.name {
                        Some(name) => format!("{}/{} ({})", cp.container_port, cp.protocol, name),
                        None => format!("{}/{}", cp.container_port, cp.protocol),
                    })
                    .collect();
                format!(
                    "Service '{}' port {} targetPort: {}/{} matches no containerPort of {}; available ports: {}",
                    service.name,
                    port.port,
                    n,
                    port.protocol,
                    workload_list(&workloads),
                    list_or_none(ports.into_iter())
                )
            }
        };

        let mut finding = Finding::new(FindingCode::PortMismatch, message, service.subject())
            .with_suggestion(format!(
                "set targetPort to a port the workload declares, or add containerPort {} to the pod template",
                target
            ));
        for workload in workloads {
            finding = finding.with_related(workload.subject());
        }
        Some(finding)
    }

    fn check_workload_selector(&self, record: &ManifestRecord, findings: &mut Vec<Finding>) {
        let (Some(selector), Some(pod_labels)) = (&record.workload_selector, &record.pod_labels) else {
            return;
        };
        if selector.labels.is_empty() || !selector.is_fully_evaluable() {
            return;
        }
        if !selector.matches(pod_labels) {
            let missing: Vec<String> = selector
                .labels
                .iter()
                .filter(|(key, value)| pod_labels.get(*key) != Some(*value))
                .map(|(key, value)| format!("{}={}", key, value))
                .collect();
            findings.push(
                Finding::new(
                    FindingCode::SelectorMismatch,
                    format!(
                        "{} '{}' selector does not match its own pod template; template lacks {}",
                        record.kind,
                        record.name,
                        missing.join(",")
                    ),
                    record.subject(),
                )
                .with_suggestion("copy spec.selector.matchLabels into spec.template.metadata.labels"),
            );
        }
    }

    fn check_references(&self, record: &ManifestRecord, findings: &mut Vec<Finding>) {
        for reference in &record.references {
            if let Some(ns) = reference.namespace.as_deref() {
                if ns != record.namespace {
                    findings.push(
                        Finding::new(
                            FindingCode::NamespaceViolation,
                            format!(
                                "{} '{}' in namespace '{}' references {} '{}' in namespace '{}' via {}; the reference cannot cross namespaces",
                                record.kind,
                                record.name,
                                record.namespace,
                                reference.kind,
                                reference.name,
                                ns,
                                reference.field
                            ),
                            record.subject(),
                        )
                        .with_suggestion(format!(
                            "deploy both objects to the same namespace ('{}' or '{}')",
                            record.namespace, ns
                        )),
                    );
                    continue;
                }
            }

            if ObjectKind::from_kind(&reference.kind).is_none() {
                continue;
            }
            match self
                .indices
                .lookup(&record.namespace, &reference.kind, &reference.name)
            {
                None => findings.push(Finding::new(
                    FindingCode::DanglingReference,
                    format!(
                        "{} '{}' references {} '{}' via {}, which does not exist in namespace '{}'",
                        record.kind,
                        record.name,
                        reference.kind,
                        reference.name,
                        reference.field,
                        record.namespace
                    ),
                    record.subject(),
                )),
                Some(target) if record.kind == "HorizontalPodAutoscaler" => {
                    self.check_hpa_requests(record, target, findings)
                }
                Some(_) => {}
            }
        }
    }

    fn check_hpa_requests(&self, hpa: &ManifestRecord, target: &ManifestRecord, findings: &mut Vec<Finding>) {
        let containers: Vec<_> = target.containers.iter().filter(|c| !c.init).collect();
        if containers.is_empty() {
            return;
        }
        for metric in hpa
            .metrics
            .iter()
            .filter(|m| REQUEST_METRICS.contains(&m.as_str()))
        {
            let missing: Vec<&str> = containers
                .iter()
                .filter(|c| !c.requests.contains(metric))
                .map(|c| c.name.as_str())
                .collect();
            if missing.is_empty() {
                continue;
            }
            findings.push(
                Finding::new(
                    FindingCode::HpaMissingRequests,
                    format!(
                        "HorizontalPodAutoscaler '{}' scales on {} but container(s) {} of {} '{}' do not request it",
                        hpa.name,
                        metric,
                        quoted_list(missing.into_iter()),
                        target.kind,
                        target.name
                    ),
                    hpa.subject(),
                )
                .with_related(target.subject())
                .with_suggestion(format!("add resources.requests.{} to every container", metric)),
            );
        }
    }

    fn check_dangling_selector(&self, record: &ManifestRecord, findings: &mut Vec<Finding>) {
        if !matches!(record.kind.as_str(), "PodDisruptionBudget" | "NetworkPolicy") {
            return;
        }
        let Some(selector) = record.selector.as_ref().filter(|s| !s.is_empty()) else {
            return;
        };
        if !self.indices.matching(&record.namespace, selector).is_empty() {
            return;
        }
        if selector.is_fully_evaluable() || self.policy == PartialSelectorPolicy::Strict {
            findings.push(Finding::new(
                FindingCode::DanglingSelector,
                format!(
                    "{} '{}' selector {{{}}} matches no workload in namespace '{}'",
                    record.kind,
                    record.name,
                    selector.describe(),
                    record.namespace
                ),
                record.subject(),
            ));
        } else if self.policy == PartialSelectorPolicy::Note {
            findings.push(unverifiable(record, selector));
        }
    }
}

fn unverifiable(record: &ManifestRecord, selector: &Selector) -> Finding {
    Finding::new(
        FindingCode::UnverifiableSelector,
        format!(
            "{} '{}' selector {{{}}} cannot be fully evaluated and its equality terms match nothing",
            record.kind,
            record.name,
            selector.describe()
        ),
        record.subject(),
    )
}

fn workload_list(workloads: &[&ManifestRecord]) -> String {
    workloads
        .iter()
        .map(|w| format!("{} '{}'", w.kind, w.name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn quoted_list<'s>(items: impl Iterator<Item = &'s str>) -> String {
    items
        .map(|item| format!("'{}'", item))
        .collect::<Vec<_>>()
        .join(", ")
}

fn list_or_none(items: impl Iterator<Item = String>) -> String {
    let items: Vec<String> = items.collect();
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::kubecuro::deprecation::StaticDeprecationTable;
    use crate::analyzer::kubecuro::extract::extract;
    use crate::analyzer::kubecuro::healer::{Healer, HealerOptions};
    use std::path::Path;

    fn records(files: &[(&str, &str)]) -> Vec<ManifestRecord> {
        let table = StaticDeprecationTable::builtin();
        let healer = Healer::new(HealerOptions::default(), &table);
        let mut out = Vec::new();
        for (file, text) in files {
            let healed = healer.heal(text);
            for document in &healed.documents {
                if let Some(tree) = document.tree() {
                    if let Ok(record) = extract(tree, Path::new(file), document.index) {
                        out.push(record);
                    }
                }
            }
        }
        out
    }

    fn codes(findings: &[Finding]) -> Vec<FindingCode> {
        findings.iter().map(|f| f.code).collect()
    }

    fn deployment(name: &str, labels: &str, ports: &str) -> String {
        format!(
            "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: {name}\nspec:\n  selector:\n    matchLabels:\n      app: {name}\n  template:\n    metadata:\n      labels:\n{labels}    spec:\n      containers:\n        - name: main\n          ports:\n{ports}"
        )
    }

    fn service(selector: &str, ports: &str) -> String {
        format!(
            "apiVersion: v1\nkind: Service\nmetadata:\n  name: svc\nspec:\n  selector:\n{selector}  ports:\n{ports}"
        )
    }

    #[test]
    fn test_selector_conjunction() {
        let p1 = deployment("p1", "        app: x\n", "            - containerPort: 80\n");
        let p2 = deployment("p1b", "        app: x\n        tier: y\n", "            - containerPort: 80\n");
        let svc = service("    app: x\n    tier: y\n", "    - port: 80\n");

        let with_p2 = records(&[("p1.yaml", &p1), ("p2.yaml", &p2), ("svc.yaml", &svc)]);
        let findings = resolve(&with_p2, PartialSelectorPolicy::Suppress);
        assert!(!codes(&findings).contains(&FindingCode::GhostService));

        let without_p2 = records(&[("p1.yaml", &p1), ("svc.yaml", &svc)]);
        let findings = resolve(&without_p2, PartialSelectorPolicy::Suppress);
        let ghosts: Vec<&Finding> = findings
            .iter()
            .filter(|f| f.code == FindingCode::GhostService)
            .collect();
        assert_eq!(ghosts.len(), 1);
        assert_eq!(ghosts[0].subject.name.as_deref(), Some("svc"));
    }

    #[test]
    fn test_named_port_resolution() {
        let svc = service("    app: web\n", "    - port: 80\n      targetPort: web\n");
        let good = deployment("web", "        app: web\n", "            - name: web\n              containerPort: 8080\n");
        let findings = resolve(&records(&[("a.yaml", &good), ("s.yaml", &svc)]), PartialSelectorPolicy::Suppress);
        assert!(findings.is_empty(), "{:?}", findings);

        let renamed = deployment("web", "        app: web\n", "            - name: http\n              containerPort: 8080\n");
        let findings = resolve(&records(&[("a.yaml", &renamed), ("s.yaml", &svc)]), PartialSelectorPolicy::Suppress);
        assert_eq!(codes(&findings), vec![FindingCode::PortMismatch]);
        assert!(findings[0].message.contains("targetPort: web"));
        assert!(findings[0].message.contains("available names: http"));
    }

    #[test]
    fn test_default_target_port() {
        let svc = service("    app: web\n", "    - port: 8080\n");
        let workload = deployment("web", "        app: web\n", "            - containerPort: 8080\n");
        let findings = resolve(&records(&[("a.yaml", &workload), ("s.yaml", &svc)]), PartialSelectorPolicy::Suppress);
        assert!(findings.is_empty(), "{:?}", findings);
    }

    #[test]
    fn test_protocol_must_match() {
        let svc = service("    app: dns\n", "    - port: 53\n      protocol: UDP\n");
        let workload = deployment("dns", "        app: dns\n", "            - containerPort: 53\n");
        let findings = resolve(&records(&[("a.yaml", &workload), ("s.yaml", &svc)]), PartialSelectorPolicy::Suppress);
        assert_eq!(codes(&findings), vec![FindingCode::PortMismatch]);
    }

    #[test]
    fn test_partial_selector_policies() {
        let pdb = "apiVersion: policy/v1\nkind: PodDisruptionBudget\nmetadata:\n  name: pdb\nspec:\n  selector:\n    matchLabels:\n      app: nothing\n    matchExpressions:\n      - key: tier\n        operator: Exists\n";
        let all = records(&[("pdb.yaml", pdb)]);
        assert!(resolve(&all, PartialSelectorPolicy::Suppress).is_empty());
        assert_eq!(
            codes(&resolve(&all, PartialSelectorPolicy::Note)),
            vec![FindingCode::UnverifiableSelector]
        );
        assert_eq!(
            codes(&resolve(&all, PartialSelectorPolicy::Strict)),
            vec![FindingCode::DanglingSelector]
        );
    }

    #[test]
    fn test_partial_service_selector_suppressed() {
        let svc = "apiVersion: v1\nkind: Service\nmetadata:\n  name: svc\nspec:\n  selector:\n    app: x\n    tier:\n      nested: value\n";
        let all = records(&[("svc.yaml", svc)]);
        assert!(resolve(&all, PartialSelectorPolicy::Suppress).is_empty());
        assert_eq!(
            codes(&resolve(&all, PartialSelectorPolicy::Strict)),
            vec![FindingCode::GhostService]
        );
    }

    #[test]
    fn test_ghost_service_names_other_namespace() {
        let workload = deployment("api", "        app: api\n", "            - containerPort: 80\n")
            .replace("  name: api\n", "  name: api\n  namespace: prod\n");
        let svc = service("    app: api\n", "    - port: 80\n");
        let findings = resolve(&records(&[("a.yaml", &workload), ("s.yaml", &svc)]), PartialSelectorPolicy::Suppress);
        assert_eq!(codes(&findings), vec![FindingCode::GhostService]);
        assert!(findings[0].message.contains("'prod'"));
    }

    #[test]
    fn test_namespace_violation_and_dangling_reference() {
        let ingress = "apiVersion: networking.k8s.io/v1\nkind: Ingress\nmetadata:\n  name: web\nspec:\n  rules:\n    - http:\n        paths:\n          - path: /\n            backend:\n              service:\n                name: web\n                namespace: other\n          - path: /api\n            backend:\n              service:\n                name: api\n";
        let findings = resolve(&records(&[("i.yaml", ingress)]), PartialSelectorPolicy::Suppress);
        assert_eq!(
            codes(&findings),
            vec![FindingCode::NamespaceViolation, FindingCode::DanglingReference]
        );
        assert!(findings[0].message.contains("'other'"));
        assert!(findings[0].message.contains("'default'"));
    }

    #[test]
    fn test_hpa_missing_requests() {
        let workload = deployment("api", "        app: api\n", "            - containerPort: 80\n");
        let hpa = "apiVersion: autoscaling/v2\nkind: HorizontalPodAutoscaler\nmetadata:\n  name: api\nspec:\n  scaleTargetRef:\n    apiVersion: apps/v1\n    kind: Deployment\n    name: api\n";
        let findings = resolve(&records(&[("d.yaml", &workload), ("h.yaml", hpa)]), PartialSelectorPolicy::Suppress);
        assert_eq!(codes(&findings), vec![FindingCode::HpaMissingRequests]);
        assert!(findings[0].message.contains("cpu"));
    }

    #[test]
    fn test_selector_mismatch() {
        let workload = deployment("api", "        app: other\n", "            - containerPort: 80\n");
        let findings = resolve(&records(&[("d.yaml", &workload)]), PartialSelectorPolicy::Suppress);
        assert_eq!(codes(&findings), vec![FindingCode::SelectorMismatch]);
    }

    #[test]
    fn test_service_without_selector_ignored() {
        let svc = "apiVersion: v1\nkind: Service\nmetadata:\n  name: external\nspec:\n  type: ExternalName\n  externalName: example.com\n";
        assert!(resolve(&records(&[("s.yaml", svc)]), PartialSelectorPolicy::Suppress).is_empty());
    }

    #[test]
    fn test_null_selector_skips_port_checks() {
        let web = deployment("web", "        app: web\n", "            - containerPort: 8080\n");
        let svc = "apiVersion: v1\nkind: Service\nmetadata:\n  name: external-db\nspec:\n  selector:\n  ports:\n    - port: 5432\n";
        let findings = resolve(&records(&[("web.yaml", &web), ("db.yaml", svc)]), PartialSelectorPolicy::Suppress);
        assert!(findings.is_empty(), "{:?}", findings);
    }

    #[test]
    fn test_expression_only_selector_skips_port_checks() {
        let web = deployment("web", "        app: web\n", "            - containerPort: 8080\n");
        let svc = service(
            "    matchExpressions:\n      - key: app\n        operator: Exists\n",
            "    - port: 5432\n",
        );
        for policy in [PartialSelectorPolicy::Suppress, PartialSelectorPolicy::Note] {
            let findings = resolve(&records(&[("web.yaml", &web), ("svc.yaml", &svc)]), policy);
            assert!(!codes(&findings).contains(&FindingCode::PortMismatch), "{:?}", findings);
        }
    }
}

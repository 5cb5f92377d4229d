//! Namespace-scoped lookup tables over the extracted records.
//!
//! Built once per run, read-only afterwards. Indices hold positions into the
//! record slice rather than copies.

use std::collections::{BTreeMap, BTreeSet};

use crate::analyzer::kubecuro::extract::{ManifestRecord, Selector};

type LabelKey<'r> = (&'r str, &'r str, &'r str);
type NameKey<'r> = (&'r str, &'r str, &'r str);

pub struct Indices<'r> {
    records: &'r [ManifestRecord],
    /// (namespace, label key, label value) -> pod-template-bearing records.
    labels: BTreeMap<LabelKey<'r>, BTreeSet<usize>>,
    /// (namespace, kind, name) -> record.
    names: BTreeMap<NameKey<'r>, usize>,
    /// namespace -> Service records.
    services: BTreeMap<&'r str, Vec<usize>>,
    /// namespace -> pod-template-bearing records.
    templates: BTreeMap<&'r str, BTreeSet<usize>>,
}

impl<'r> Indices<'r> {
    pub fn build(records: &'r [ManifestRecord]) -> Self {
        let mut indices = Self {
            records,
            labels: BTreeMap::new(),
            names: BTreeMap::new(),
            services: BTreeMap::new(),
            templates: BTreeMap::new(),
        };
        for (idx, record) in records.iter().enumerate() {
            let ns = record.namespace.as_str();
            indices
                .names
                .entry((ns, record.kind.as_str(), record.name.as_str()))
                .or_insert(idx);
            if record.kind == "Service" {
                indices.services.entry(ns).or_default().push(idx);
            }
            if let Some(pod_labels) = &record.pod_labels {
                indices.templates.entry(ns).or_default().insert(idx);
                for (key, value) in pod_labels {
                    indices
                        .labels
                        .entry((ns, key.as_str(), value.as_str()))
                        .or_default()
                        .insert(idx);
                }
            }
        }
        log::debug!(
            "Indexed {} records: {} label keys, {} names, {} namespaces with services",
            records.len(),
            indices.labels.len(),
            indices.names.len(),
            indices.services.len()
        );
        indices
    }

    pub fn record(&self, idx: usize) -> &'r ManifestRecord {
        &self.records[idx]
    }

    /// Pod-template records in `namespace` satisfying every equality term.
    ///
    /// A selector without equality terms yields every template in the namespace.
    pub fn matching(&self, namespace: &str, selector: &Selector) -> BTreeSet<usize> {
        let mut terms = selector.labels.iter();
        let Some((key, value)) = terms.next() else {
            return self.templates.get(namespace).cloned().unwrap_or_default();
        };
        let mut matched = self.label_set(namespace, key, value);
        for (key, value) in terms {
            if matched.is_empty() {
                break;
            }
            let next = self.label_set(namespace, key, value);
            matched = matched.intersection(&next).copied().collect();
        }
        matched
    }

    fn label_set(&self, namespace: &str, key: &str, value: &str) -> BTreeSet<usize> {
        self.labels
            .get(&(namespace, key, value))
            .cloned()
            .unwrap_or_default()
    }

    /// Other namespaces where `selector` would match something.
    pub fn namespaces_matching(&self, selector: &Selector, except: &str) -> Vec<&'r str> {
        self.templates
            .keys()
            .copied()
            .filter(|ns| *ns != except && !self.matching(ns, selector).is_empty())
            .collect()
    }

    pub fn lookup(&self, namespace: &str, kind: &str, name: &str) -> Option<&'r ManifestRecord> {
        self.names
            .get(&(namespace, kind, name))
            .map(|idx| &self.records[*idx])
    }

    /// Service records, grouped by namespace.
    pub fn services(&self) -> impl Iterator<Item = &'r ManifestRecord> + '_ {
        self.services
            .values()
            .flatten()
            .map(|idx| &self.records[*idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::kubecuro::extract::Origin;
    use std::path::PathBuf;

    fn workload(name: &str, ns: &str, labels: &[(&str, &str)]) -> ManifestRecord {
        let pod_labels: BTreeMap<String, String> = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ManifestRecord {
            api_version: "apps/v1".to_string(),
            kind: "Deployment".to_string(),
            name: name.to_string(),
            namespace: ns.to_string(),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            pod_labels: Some(pod_labels),
            selector: None,
            workload_selector: None,
            ports: Vec::new(),
            container_ports: Vec::new(),
            containers: Vec::new(),
            references: Vec::new(),
            policy_rules: Vec::new(),
            metrics: Vec::new(),
            origin: Origin {
                file: PathBuf::from(format!("{}.yaml", name)),
                document: 0,
                line: 1,
            },
        }
    }

    fn selector(terms: &[(&str, &str)]) -> Selector {
        Selector {
            labels: terms
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            unevaluable: Vec::new(),
        }
    }

    #[test]
    fn test_conjunctive_matching() {
        let records = vec![
            workload("p1", "default", &[("app", "x")]),
            workload("p2", "default", &[("app", "x"), ("tier", "y")]),
        ];
        let indices = Indices::build(&records);
        let matched = indices.matching("default", &selector(&[("app", "x"), ("tier", "y")]));
        assert_eq!(matched.into_iter().collect::<Vec<_>>(), vec![1]);
        assert_eq!(indices.matching("default", &selector(&[("app", "x")])).len(), 2);
    }

    #[test]
    fn test_namespace_scoped() {
        let records = vec![workload("api", "prod", &[("app", "api")])];
        let indices = Indices::build(&records);
        let sel = selector(&[("app", "api")]);
        assert!(indices.matching("default", &sel).is_empty());
        assert_eq!(indices.namespaces_matching(&sel, "default"), vec!["prod"]);
    }

    #[test]
    fn test_name_lookup() {
        let records = vec![workload("api", "prod", &[])];
        let indices = Indices::build(&records);
        assert!(indices.lookup("prod", "Deployment", "api").is_some());
        assert!(indices.lookup("default", "Deployment", "api").is_none());
    }
}

//! A minimal label-selector implementation used to filter pods and PDBs.
//!
//! Hand-rolled rather than pulled in from a full Kubernetes API client crate:
//! matching `match_labels`/`match_expressions` against a plain label map is
//! the only thing callers need from a selector here.

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorOperator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

#[derive(Debug, Clone)]
pub struct LabelSelectorRequirement {
    pub key: String,
    pub operator: SelectorOperator,
    pub values: Vec<String>,
}

/// Label selector matching a set of key/value labels.
///
/// An empty selector (no `match_labels`, no `match_expressions`) matches everything.
#[derive(Debug, Clone, Default)]
pub struct LabelSelector {
    pub match_labels: HashMap<String, String>,
    pub match_expressions: Vec<LabelSelectorRequirement>,
}

impl LabelSelector {
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn matches(&self, labels: &HashMap<String, String>) -> bool {
        for (key, value) in &self.match_labels {
            if labels.get(key) != Some(value) {
                return false;
            }
        }
        for req in &self.match_expressions {
            let satisfied = match req.operator {
                SelectorOperator::In => labels
                    .get(&req.key)
                    .is_some_and(|v| req.values.contains(v)),
                SelectorOperator::NotIn => !labels
                    .get(&req.key)
                    .is_some_and(|v| req.values.contains(v)),
                SelectorOperator::Exists => labels.contains_key(&req.key),
                SelectorOperator::DoesNotExist => !labels.contains_key(&req.key),
            };
            if !satisfied {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn everything_matches_any_labels() {
        let sel = LabelSelector::everything();
        assert!(sel.matches(&labels(&[("a", "b")])));
        assert!(sel.matches(&HashMap::new()));
    }

    #[test]
    fn match_labels_requires_exact_value() {
        let mut sel = LabelSelector::everything();
        sel.match_labels.insert("tier".to_string(), "frontend".to_string());
        assert!(sel.matches(&labels(&[("tier", "frontend")])));
        assert!(!sel.matches(&labels(&[("tier", "backend")])));
        assert!(!sel.matches(&HashMap::new()));
    }

    #[test]
    fn match_expressions_support_exists() {
        let sel = LabelSelector {
            match_labels: HashMap::new(),
            match_expressions: vec![LabelSelectorRequirement {
                key: "canary".to_string(),
                operator: SelectorOperator::DoesNotExist,
                values: vec![],
            }],
        };
        assert!(sel.matches(&labels(&[("tier", "frontend")])));
        assert!(!sel.matches(&labels(&[("canary", "true")])));
    }
}

//! Disruption budget storage: opaque objects keyed by uid, selectable by label.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::selector::LabelSelector;

/// A disruption budget. The cache stores this verbatim and never interprets
/// its fields beyond `metadata` for selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisruptionBudget {
    pub uid: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// Opaque spec payload; the cache never inspects this.
    #[serde(default)]
    pub spec: serde_json::Value,
}

impl DisruptionBudget {
    pub fn matches(&self, selector: &LabelSelector) -> bool {
        selector.matches(&self.labels)
    }
}

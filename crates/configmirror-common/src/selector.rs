//! Label predicates
//!
//! Selectors are modelled as a small predicate over a label map so that
//! routing and fetching share a single definition of "matches".

use std::collections::BTreeMap;

/// A predicate over an object's labels
pub trait LabelPredicate: Send + Sync {
    /// Check whether a label set satisfies the predicate
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool;

    /// Render as a Kubernetes label selector string for server-side filtering
    ///
    /// Returns `None` when the predicate selects everything.
    fn to_selector_string(&self) -> Option<String>;
}

/// Conjunction of exact label equality checks
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MatchLabels {
    labels: BTreeMap<String, String>,
}

impl MatchLabels {
    /// Create a predicate requiring every given label
    pub fn new(labels: BTreeMap<String, String>) -> Self {
        Self { labels }
    }

    /// Check if this selector is empty (matches everything)
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl LabelPredicate for MatchLabels {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.labels
            .iter()
            .all(|(key, value)| labels.get(key) == Some(value))
    }

    fn to_selector_string(&self) -> Option<String> {
        if self.labels.is_empty() {
            return None;
        }
        Some(
            self.labels
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(","),
        )
    }
}

impl std::fmt::Display for MatchLabels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_selector_string() {
            Some(s) => f.write_str(&s),
            None => f.write_str("<everything>"),
        }
    }
}

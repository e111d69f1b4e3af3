//! ConfigMirror CRD
//!
//! A ConfigMirror selects ConfigMaps by label in one source namespace and
//! replicates every match into each of its target namespaces.

use std::collections::BTreeMap;

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::selector::MatchLabels;
use crate::Error;

/// ConfigMirror replicates labelled ConfigMaps across namespaces.
///
/// Example:
/// ```yaml
/// apiVersion: bennsimon.github.io/v1alpha1
/// kind: ConfigMirror
/// metadata:
///   name: shared-config
///   namespace: default
/// spec:
///   sourceNamespace: default
///   targetNamespaces:
///     - team-a
///     - team-b
///   selector:
///     matchLabels:
///       app: shared
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "bennsimon.github.io",
    version = "v1alpha1",
    kind = "ConfigMirror",
    namespaced,
    status = "ConfigMirrorStatus",
    shortname = "cmir",
    printcolumn = r#"{"name":"Source","type":"string","jsonPath":".spec.sourceNamespace"}"#,
    printcolumn = r#"{"name":"Targets","type":"string","jsonPath":".spec.targetNamespaces"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMirrorSpec {
    /// Namespace the source ConfigMaps are read from
    pub source_namespace: String,

    /// Namespaces replicas are written into, processed in order
    #[serde(default)]
    pub target_namespaces: Vec<String>,

    /// Label selector; every label must match
    #[serde(default)]
    pub selector: ConfigMirrorSelector,
}

/// Label selector restricted to exact matches
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMirrorSelector {
    /// Map of label key-value pairs; all must match
    #[serde(default)]
    pub match_labels: BTreeMap<String, String>,
}

/// ConfigMirror status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMirrorStatus {
    /// Current phase
    #[serde(default)]
    pub phase: ConfigMirrorPhase,

    /// Human-readable message
    ///
    /// Always serialized so a merge patch clears a message left by an
    /// earlier failure.
    #[serde(default)]
    pub message: Option<String>,

    /// Number of replicas applied by the last successful reconcile
    #[serde(default)]
    pub replicated_count: u32,

    /// Observed generation of the spec the status describes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// ConfigMirror phase
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConfigMirrorPhase {
    /// Not yet reconciled
    #[default]
    Pending,
    /// All selected ConfigMaps replicated to every target
    Ready,
    /// Spec is invalid
    Failed,
}

impl ConfigMirrorSpec {
    /// Validate the spec
    ///
    /// `definition` is only used to label the error.
    pub fn validate(&self, definition: &str) -> Result<(), Error> {
        if self.source_namespace.trim().is_empty() {
            return Err(Error::validation_for_field(
                definition,
                "spec.sourceNamespace",
                "sourceNamespace must not be empty",
            ));
        }

        if self.target_namespaces.is_empty() {
            return Err(Error::validation_for_field(
                definition,
                "spec.targetNamespaces",
                "at least one target namespace is required",
            ));
        }

        for target in &self.target_namespaces {
            if target.trim().is_empty() {
                return Err(Error::validation_for_field(
                    definition,
                    "spec.targetNamespaces",
                    "target namespace must not be empty",
                ));
            }
            // A replica in the source namespace would share the source's identity
            if *target == self.source_namespace {
                return Err(Error::validation_for_field(
                    definition,
                    "spec.targetNamespaces",
                    format!("target namespace {target} is the source namespace"),
                ));
            }
        }

        Ok(())
    }

    /// Label predicate for this spec's selector
    pub fn predicate(&self) -> MatchLabels {
        MatchLabels::new(self.selector.match_labels.clone())
    }
}

impl ConfigMirror {
    /// Identity recorded in the managed-by annotation: `<namespace>/<name>`
    pub fn definition_id(&self) -> String {
        format!(
            "{}/{}",
            self.namespace().unwrap_or_default(),
            self.name_any()
        )
    }
}

//! Reverse routing from ConfigMap events to ConfigMirror work items
//!
//! The controller watches every ConfigMap, including the replicas it writes.
//! Replicas are told apart by the mirror annotation alone. An event on a
//! replica that still exists is the echo of our own write and is dropped. An
//! event on a replica that is gone is routed as if it lived in its source
//! namespace, so the owning definitions recreate it.

use k8s_openapi::api::core::v1::ConfigMap;
use kube::runtime::reflector::ObjectRef;
use kube::ResourceExt;
use tracing::{debug, info, warn};

use configmirror_common::crd::ConfigMirror;
use configmirror_common::selector::LabelPredicate;
use configmirror_common::{metrics, MIRROR_ANNOTATION, SOURCE_NAMESPACE_ANNOTATION};

use crate::client::MirrorClient;

/// What a watched ConfigMap is
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WatchedObject {
    /// An ordinary ConfigMap
    Source,
    /// A replica written by this controller
    Replica {
        /// Value of the source namespace annotation, if present and non-empty
        source_namespace: Option<String>,
    },
}

/// Classify by presence of the mirror annotation
pub fn classify(cm: &ConfigMap) -> WatchedObject {
    let annotations = cm.annotations();
    if !annotations.contains_key(MIRROR_ANNOTATION) {
        return WatchedObject::Source;
    }
    WatchedObject::Replica {
        source_namespace: annotations
            .get(SOURCE_NAMESPACE_ANNOTATION)
            .filter(|ns| !ns.is_empty())
            .cloned(),
    }
}

/// Decide which object, if any, should be matched against definitions
///
/// Sources pass through unchanged. Replicas cost one lookup of their own
/// identity: still present yields `None`, gone yields the object moved to
/// its source namespace, and a failed lookup yields `None`.
pub async fn resolve(mut cm: ConfigMap, client: &dyn MirrorClient) -> Option<ConfigMap> {
    let source_namespace = match classify(&cm) {
        WatchedObject::Source => {
            metrics::record_route("source");
            return Some(cm);
        }
        WatchedObject::Replica { source_namespace } => source_namespace,
    };

    let namespace = cm.namespace().unwrap_or_default();
    let name = cm.name_any();

    match client.get_config_map(&namespace, &name).await {
        Ok(Some(_)) => {
            metrics::record_route("live_replica");
            debug!(replica = %format!("{namespace}/{name}"), "ignoring event on live replica");
            None
        }
        Ok(None) => match source_namespace {
            Some(source_namespace) => {
                metrics::record_route("deleted_replica");
                info!(
                    replica = %format!("{namespace}/{name}"),
                    source_namespace = %source_namespace,
                    "detected deleted replica, routing to source namespace"
                );
                cm.metadata.namespace = Some(source_namespace);
                Some(cm)
            }
            None => {
                metrics::record_route("unresolved");
                warn!(
                    replica = %format!("{namespace}/{name}"),
                    "deleted replica has no source namespace annotation"
                );
                None
            }
        },
        Err(error) => {
            metrics::record_route("lookup_failed");
            warn!(
                replica = %format!("{namespace}/{name}"),
                %error,
                "failed to look up replica, dropping event"
            );
            None
        }
    }
}

/// Definitions whose source namespace and selector cover `cm`
///
/// Returned in the order of `definitions`, without duplicates.
pub fn select_definitions<D: AsRef<ConfigMirror>>(
    cm: &ConfigMap,
    definitions: &[D],
) -> Vec<ObjectRef<ConfigMirror>> {
    let Some(namespace) = cm.namespace() else {
        return Vec::new();
    };

    let mut selected: Vec<ObjectRef<ConfigMirror>> = Vec::new();
    for definition in definitions.iter().map(AsRef::as_ref) {
        if definition.spec.source_namespace != namespace {
            continue;
        }
        if !definition.spec.predicate().matches(cm.labels()) {
            continue;
        }
        let reference = ObjectRef::from_obj(definition);
        if !selected.contains(&reference) {
            selected.push(reference);
        }
    }
    selected
}

/// Map one watched ConfigMap to the definitions that must reconcile
///
/// `definitions` is the snapshot of known ConfigMirrors at the time of the
/// event.
pub async fn route<D: AsRef<ConfigMirror>>(
    cm: ConfigMap,
    definitions: &[D],
    client: &dyn MirrorClient,
) -> Vec<ObjectRef<ConfigMirror>> {
    match resolve(cm, client).await {
        Some(cm) => select_definitions(&cm, definitions),
        None => Vec::new(),
    }
}

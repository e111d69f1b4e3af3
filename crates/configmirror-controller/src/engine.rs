//! Replica writes
//!
//! Applying a replica is a read-merge-write against the destination
//! namespace. The write is skipped when the merged object already matches
//! what is stored. Successful applies are optionally recorded in the audit
//! store.

use std::fmt;

use k8s_openapi::api::core::v1::ConfigMap;
use kube::ResourceExt;
use tracing::{debug, info};

use configmirror_common::crd::ConfigMirror;
use configmirror_common::{metrics, Error, FIELD_OWNER};
use configmirror_store::ReplicaStore;

use crate::client::MirrorClient;
use crate::replica::{build_replica, merge_owned, same_content, OwnedFields};

/// What an apply did to the destination
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The replica did not exist and was created
    Created,
    /// The replica existed and was rewritten
    Updated,
    /// The replica already matched
    Unchanged,
}

impl ApplyOutcome {
    /// Metric label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
        }
    }
}

impl fmt::Display for ApplyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a successful apply
#[derive(Clone, Debug)]
pub struct AppliedReplica {
    /// What happened
    pub outcome: ApplyOutcome,
    /// The replica as stored after the apply
    pub replica: ConfigMap,
}

fn object_ref(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

/// Write the replica of `source` for `mirror` into `target`
pub async fn apply_replica(
    client: &dyn MirrorClient,
    source: &ConfigMap,
    mirror: &ConfigMirror,
    target: &str,
) -> Result<AppliedReplica, Error> {
    let name = source.name_any();
    let source_ref = object_ref(&source.namespace().unwrap_or_default(), &name);
    let destination = object_ref(target, &name);
    let fail = |e: Error| Error::apply(&source_ref, &destination, e);

    let desired = build_replica(source, mirror, target);

    let applied = match client.get_config_map(target, &name).await.map_err(fail)? {
        None => {
            let created = client
                .create_config_map(target, &desired)
                .await
                .map_err(fail)?;
            AppliedReplica {
                outcome: ApplyOutcome::Created,
                replica: created,
            }
        }
        Some(current) => {
            let owned = OwnedFields::from_managed_fields(&current, FIELD_OWNER);
            let merged = merge_owned(&current, &desired, &owned);
            if same_content(&merged, &current) {
                AppliedReplica {
                    outcome: ApplyOutcome::Unchanged,
                    replica: current,
                }
            } else {
                let updated = client
                    .replace_config_map(target, &name, &merged)
                    .await
                    .map_err(fail)?;
                AppliedReplica {
                    outcome: ApplyOutcome::Updated,
                    replica: updated,
                }
            }
        }
    };

    metrics::record_apply(applied.outcome.as_str());
    if applied.outcome == ApplyOutcome::Unchanged {
        debug!(source = %source_ref, replica = %destination, "replica already up to date");
    } else {
        info!(
            source = %source_ref,
            replica = %destination,
            outcome = %applied.outcome,
            "replica applied"
        );
    }
    Ok(applied)
}

/// Apply a replica, then record it when an audit store is configured
///
/// A persistence failure is reported after the replica has been written;
/// the next reconcile re-applies (usually as unchanged) and records again.
pub async fn replicate(
    client: &dyn MirrorClient,
    store: Option<&dyn ReplicaStore>,
    source: &ConfigMap,
    mirror: &ConfigMirror,
    target: &str,
) -> Result<AppliedReplica, Error> {
    let applied = apply_replica(client, source, mirror, target).await?;
    if let Some(store) = store {
        store.upsert(&applied.replica).await?;
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockMirrorClient;
    use crate::test_support::MockStore;
    use configmirror_common::crd::{ConfigMirrorSelector, ConfigMirrorSpec};
    use configmirror_common::MANAGED_BY_ANNOTATION;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
        FieldsV1, ManagedFieldsEntry, ObjectMeta,
    };
    use std::collections::BTreeMap;

    fn mirror() -> ConfigMirror {
        let mut mirror = ConfigMirror::new(
            "shared",
            ConfigMirrorSpec {
                source_namespace: "default".to_string(),
                target_namespaces: vec!["team-a".to_string()],
                selector: ConfigMirrorSelector::default(),
            },
        );
        mirror.metadata.namespace = Some("default".to_string());
        mirror
    }

    fn source(value: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some("cfg".to_string()),
                namespace: Some("default".to_string()),
                uid: Some("uid-1".to_string()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([("key".to_string(), value.to_string())])),
            ..Default::default()
        }
    }

    /// The replica as the API server would return it after our own write
    fn stored(value: &str) -> ConfigMap {
        let mut cm = build_replica(&source(value), &mirror(), "team-a");
        cm.metadata.resource_version = Some("5".to_string());
        cm.metadata.managed_fields = Some(vec![ManagedFieldsEntry {
            manager: Some(FIELD_OWNER.to_string()),
            fields_v1: Some(FieldsV1(serde_json::json!({"f:data": {"f:key": {}}}))),
            ..Default::default()
        }]);
        cm
    }

    #[tokio::test]
    async fn missing_replica_is_created() {
        let mut client = MockMirrorClient::new();
        client
            .expect_get_config_map()
            .withf(|ns, name| ns == "team-a" && name == "cfg")
            .returning(|_, _| Ok(None));
        client
            .expect_create_config_map()
            .withf(|ns, cm| {
                ns == "team-a"
                    && cm.metadata.annotations.as_ref().is_some_and(|a| {
                        a.get(MANAGED_BY_ANNOTATION).map(String::as_str) == Some("default/shared")
                    })
            })
            .times(1)
            .returning(|_, cm| Ok(cm.clone()));
        client.expect_replace_config_map().never();

        let applied = apply_replica(&client, &source("v1"), &mirror(), "team-a")
            .await
            .expect("apply");
        assert_eq!(applied.outcome, ApplyOutcome::Created);
    }

    #[tokio::test]
    async fn matching_replica_is_not_written() {
        let mut client = MockMirrorClient::new();
        client
            .expect_get_config_map()
            .returning(|_, _| Ok(Some(stored("v1"))));
        client.expect_create_config_map().never();
        client.expect_replace_config_map().never();

        let applied = apply_replica(&client, &source("v1"), &mirror(), "team-a")
            .await
            .expect("apply");
        assert_eq!(applied.outcome, ApplyOutcome::Unchanged);
    }

    #[tokio::test]
    async fn changed_source_replaces_with_current_resource_version() {
        let mut client = MockMirrorClient::new();
        client
            .expect_get_config_map()
            .returning(|_, _| Ok(Some(stored("v1"))));
        client
            .expect_replace_config_map()
            .withf(|ns, name, cm| {
                ns == "team-a"
                    && name == "cfg"
                    && cm.metadata.resource_version.as_deref() == Some("5")
                    && cm.data.as_ref().and_then(|d| d.get("key")).map(String::as_str)
                        == Some("v2")
            })
            .times(1)
            .returning(|_, _, cm| Ok(cm.clone()));

        let applied = apply_replica(&client, &source("v2"), &mirror(), "team-a")
            .await
            .expect("apply");
        assert_eq!(applied.outcome, ApplyOutcome::Updated);
    }

    #[tokio::test]
    async fn write_failure_names_source_and_destination() {
        let mut client = MockMirrorClient::new();
        client.expect_get_config_map().returning(|_, _| Ok(None));
        client
            .expect_create_config_map()
            .returning(|_, _| Err(Error::internal_with_context("test", "forbidden")));

        let err = apply_replica(&client, &source("v1"), &mirror(), "team-a")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Apply { .. }));
        let message = err.to_string();
        assert!(message.contains("default/cfg"));
        assert!(message.contains("team-a/cfg"));
    }

    #[tokio::test]
    async fn applied_replica_is_recorded_when_store_is_configured() {
        let mut client = MockMirrorClient::new();
        client.expect_get_config_map().returning(|_, _| Ok(None));
        client
            .expect_create_config_map()
            .returning(|_, cm| Ok(cm.clone()));
        let mut store = MockStore::new();
        store
            .expect_upsert()
            .withf(|cm| cm.namespace().as_deref() == Some("team-a"))
            .times(1)
            .returning(|_| Ok(()));

        let store: &dyn ReplicaStore = &store;
        replicate(&client, Some(store), &source("v1"), &mirror(), "team-a")
            .await
            .expect("replicate");
    }

    #[tokio::test]
    async fn persistence_failure_is_surfaced() {
        let mut client = MockMirrorClient::new();
        client.expect_get_config_map().returning(|_, _| Ok(None));
        client
            .expect_create_config_map()
            .returning(|_, cm| Ok(cm.clone()));
        let mut store = MockStore::new();
        store
            .expect_upsert()
            .returning(|_| Err(Error::persistence("team-a/cfg", "connection refused")));

        let store: &dyn ReplicaStore = &store;
        let err = replicate(&client, Some(store), &source("v1"), &mirror(), "team-a")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Persistence { .. }));
    }
}

//! Integration tests for ConfigMap replication
//!
//! These tests tell the story of a platform team sharing configuration from
//! one namespace with application teams through a ConfigMirror.

use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, Patch, PatchParams};
use kube::ResourceExt;

use configmirror_common::crd::{ConfigMirror, ConfigMirrorPhase};
use configmirror_common::{
    MANAGED_BY_ANNOTATION, MIRROR_ANNOTATION, SOURCE_NAMESPACE_ANNOTATION,
};

use super::helpers::{
    apply, cleanup, ensure_namespace, eventually, sample_config_map, sample_mirror, test_client,
};

/// Story: a labelled ConfigMap appears in the target namespace
///
/// Expected behavior:
/// - The replica has the source's name and data
/// - Provenance annotations name the source uid, namespace and definition
/// - The ConfigMirror reports Ready
#[tokio::test]
#[ignore = "requires a cluster with the operator running - run with: cargo test --test kind -- --ignored"]
async fn story_matching_config_map_is_replicated() {
    let client = test_client().await;
    ensure_namespace(&client, "e2e-source").await;
    ensure_namespace(&client, "e2e-team-a").await;

    let mirrors: Api<ConfigMirror> = Api::namespaced(client.clone(), "e2e-source");
    let sources: Api<ConfigMap> = Api::namespaced(client.clone(), "e2e-source");
    let replicas: Api<ConfigMap> = Api::namespaced(client.clone(), "e2e-team-a");
    cleanup(&replicas, "shared-cfg").await;

    apply(&sources, &sample_config_map("shared-cfg", "e2e-source", "test", "v1")).await;
    apply(
        &mirrors,
        &sample_mirror("test-mirror", "e2e-source", &["e2e-team-a"], "test"),
    )
    .await;

    let source = sources.get("shared-cfg").await.expect("source exists");
    let replica = eventually("replica in e2e-team-a", || {
        let replicas = replicas.clone();
        async move { replicas.get_opt("shared-cfg").await.ok().flatten() }
    })
    .await
    .expect("replica was not created");

    let annotations = replica.annotations();
    assert_eq!(
        annotations.get(MANAGED_BY_ANNOTATION).map(String::as_str),
        Some("e2e-source/test-mirror")
    );
    assert_eq!(
        annotations.get(SOURCE_NAMESPACE_ANNOTATION).map(String::as_str),
        Some("e2e-source")
    );
    assert_eq!(annotations.get(MIRROR_ANNOTATION), source.metadata.uid.as_ref());
    assert_ne!(replica.metadata.uid, source.metadata.uid);
    assert_eq!(replica.data, source.data);

    let ready = eventually("ConfigMirror Ready", || {
        let mirrors = mirrors.clone();
        async move {
            let mirror = mirrors.get("test-mirror").await.ok()?;
            (mirror.status?.phase == ConfigMirrorPhase::Ready).then_some(())
        }
    })
    .await;
    assert!(ready.is_some(), "ConfigMirror should report Ready");

    cleanup(&mirrors, "test-mirror").await;
    cleanup(&sources, "shared-cfg").await;
    cleanup(&replicas, "shared-cfg").await;
}

/// Story: a selector that matches nothing replicates nothing
#[tokio::test]
#[ignore = "requires a cluster with the operator running - run with: cargo test --test kind -- --ignored"]
async fn story_non_matching_selector_creates_no_replica() {
    let client = test_client().await;
    ensure_namespace(&client, "e2e-source").await;
    ensure_namespace(&client, "e2e-team-b").await;

    let mirrors: Api<ConfigMirror> = Api::namespaced(client.clone(), "e2e-source");
    let sources: Api<ConfigMap> = Api::namespaced(client.clone(), "e2e-source");
    let replicas: Api<ConfigMap> = Api::namespaced(client.clone(), "e2e-team-b");

    apply(&sources, &sample_config_map("unshared-cfg", "e2e-source", "test", "v1")).await;
    apply(
        &mirrors,
        &sample_mirror("other-mirror", "e2e-source", &["e2e-team-b"], "other"),
    )
    .await;

    let reconciled = eventually("ConfigMirror Ready", || {
        let mirrors = mirrors.clone();
        async move {
            let status = mirrors.get("other-mirror").await.ok()?.status?;
            (status.phase == ConfigMirrorPhase::Ready).then_some(status.replicated_count)
        }
    })
    .await;
    assert_eq!(reconciled, Some(0));
    assert!(replicas
        .get_opt("unshared-cfg")
        .await
        .expect("get replica")
        .is_none());

    cleanup(&mirrors, "other-mirror").await;
    cleanup(&sources, "unshared-cfg").await;
}

/// Story: editing the source updates the replica; deleting the replica recreates it
#[tokio::test]
#[ignore = "requires a cluster with the operator running - run with: cargo test --test kind -- --ignored"]
async fn story_replica_follows_source_and_survives_deletion() {
    let client = test_client().await;
    ensure_namespace(&client, "e2e-source").await;
    ensure_namespace(&client, "e2e-team-c").await;

    let mirrors: Api<ConfigMirror> = Api::namespaced(client.clone(), "e2e-source");
    let sources: Api<ConfigMap> = Api::namespaced(client.clone(), "e2e-source");
    let replicas: Api<ConfigMap> = Api::namespaced(client.clone(), "e2e-team-c");

    apply(&sources, &sample_config_map("synced-cfg", "e2e-source", "sync", "v1")).await;
    apply(
        &mirrors,
        &sample_mirror("sync-mirror", "e2e-source", &["e2e-team-c"], "sync"),
    )
    .await;

    let value_is = |expected: &'static str| {
        let replicas = replicas.clone();
        move || {
            let replicas = replicas.clone();
            async move {
                let cm = replicas.get_opt("synced-cfg").await.ok().flatten()?;
                (cm.data?.get("key")?.as_str() == expected).then_some(())
            }
        }
    };

    assert!(eventually("initial replica", value_is("v1")).await.is_some());

    let update = serde_json::json!({ "data": { "key": "v2" } });
    sources
        .patch("synced-cfg", &PatchParams::default(), &Patch::Merge(&update))
        .await
        .expect("failed to update source");
    assert!(
        eventually("updated replica", value_is("v2")).await.is_some(),
        "replica should follow the source"
    );

    cleanup(&replicas, "synced-cfg").await;
    assert!(
        eventually("recreated replica", value_is("v2")).await.is_some(),
        "deleted replica should be recreated"
    );

    cleanup(&mirrors, "sync-mirror").await;
    cleanup(&sources, "synced-cfg").await;
    cleanup(&replicas, "synced-cfg").await;
}

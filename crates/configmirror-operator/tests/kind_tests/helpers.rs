//! Shared fixtures for cluster-backed tests

use std::collections::BTreeMap;
use std::future::Future;
use std::time::{Duration, Instant};

use k8s_openapi::api::core::v1::{ConfigMap, Namespace};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, Patch, PatchParams};
use kube::Client;

use configmirror_common::crd::{ConfigMirror, ConfigMirrorSelector, ConfigMirrorSpec};

/// How long a story waits for the operator to converge
pub const CONVERGE_TIMEOUT: Duration = Duration::from_secs(60);
const POLL_INTERVAL: Duration = Duration::from_secs(1);
const TEST_MANAGER: &str = "configmirror-e2e";

/// Client for the cluster the tests run against
pub async fn test_client() -> Client {
    Client::try_default()
        .await
        .expect("failed to create client from KUBECONFIG")
}

/// Ensure a namespace exists
pub async fn ensure_namespace(client: &Client, name: &str) {
    let api: Api<Namespace> = Api::all(client.clone());
    let ns = Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        ..Default::default()
    };
    api.patch(name, &PatchParams::apply(TEST_MANAGER), &Patch::Apply(&ns))
        .await
        .expect("failed to ensure namespace");
}

/// Build a ConfigMirror selecting `app=<app>` from `source` into `targets`
pub fn sample_mirror(name: &str, source: &str, targets: &[&str], app: &str) -> ConfigMirror {
    let mut mirror = ConfigMirror::new(
        name,
        ConfigMirrorSpec {
            source_namespace: source.to_string(),
            target_namespaces: targets.iter().map(|t| t.to_string()).collect(),
            selector: ConfigMirrorSelector {
                match_labels: BTreeMap::from([("app".to_string(), app.to_string())]),
            },
        },
    );
    mirror.metadata.namespace = Some(source.to_string());
    mirror
}

/// Build a ConfigMap labelled `app=<app>`
pub fn sample_config_map(name: &str, namespace: &str, app: &str, value: &str) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(BTreeMap::from([("app".to_string(), app.to_string())])),
            ..Default::default()
        },
        data: Some(BTreeMap::from([("key".to_string(), value.to_string())])),
        ..Default::default()
    }
}

/// Server-side apply an object owned by the test suite
pub async fn apply<K>(api: &Api<K>, object: &K)
where
    K: kube::Resource + Clone + serde::de::DeserializeOwned + serde::Serialize + std::fmt::Debug,
{
    let name = object.meta().name.clone().expect("object has a name");
    api.patch(&name, &PatchParams::apply(TEST_MANAGER).force(), &Patch::Apply(object))
        .await
        .expect("failed to apply object");
}

/// Delete an object, ignoring errors
pub async fn cleanup<K>(api: &Api<K>, name: &str)
where
    K: kube::Resource + Clone + serde::de::DeserializeOwned + std::fmt::Debug,
{
    let _ = api.delete(name, &DeleteParams::default()).await;
}

/// Poll until `check` yields a value or the timeout elapses
pub async fn eventually<T, F, Fut>(description: &str, mut check: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let start = Instant::now();
    while start.elapsed() < CONVERGE_TIMEOUT {
        if let Some(value) = check().await {
            return Some(value);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    eprintln!("timed out waiting for {description}");
    None
}

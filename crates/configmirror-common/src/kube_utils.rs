//! Shared Kubernetes utilities using kube-rs

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};

use crate::{Error, CALL_TIMEOUT, LAST_APPLIED_ANNOTATION};

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for kube clients
///
/// Must exceed the watcher timeout so idle watches close server-side first.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Create a kube client from optional kubeconfig path with default timeouts
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client, Error> {
    let mut config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                Error::internal_with_context(
                    "create_client",
                    format!("failed to read kubeconfig: {e}"),
                )
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| {
                    Error::internal_with_context(
                        "create_client",
                        format!("failed to load kubeconfig: {e}"),
                    )
                })?
        }
        None => Config::infer().await.map_err(|e| {
            Error::internal_with_context("create_client", format!("failed to infer config: {e}"))
        })?,
    };
    config.connect_timeout = Some(DEFAULT_CONNECT_TIMEOUT);
    config.read_timeout = Some(DEFAULT_READ_TIMEOUT);
    Client::try_from(config).map_err(|e| {
        Error::internal_with_context("create_client", format!("failed to create client: {e}"))
    })
}

/// Run an external call under the standard per-call deadline
///
/// An elapsed deadline cancels the call and surfaces as [`Error::Timeout`].
pub async fn with_timeout<T, F>(operation: &str, call: F) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>>,
{
    with_deadline(operation, CALL_TIMEOUT, call).await
}

/// Run an external call under an explicit deadline
pub async fn with_deadline<T, F>(operation: &str, deadline: Duration, call: F) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(Error::timeout(operation, deadline)),
    }
}

/// Check whether a kube error is an API 404
pub fn is_not_found(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(ae) if ae.code == 404)
}

/// Strip cluster-assigned identity from metadata before writing a copy.
///
/// Removes fields that belong to the source object and would be rejected
/// or misinterpreted on a new object:
/// - uid, resourceVersion, generation, creationTimestamp
/// - managedFields: field ownership of the source
/// - ownerReferences: owners live in the source namespace
/// - the `kubectl apply` last-applied-configuration annotation
pub fn strip_identity_metadata(meta: &mut ObjectMeta) {
    meta.uid = None;
    meta.resource_version = None;
    meta.generation = None;
    meta.creation_timestamp = None;
    meta.deletion_timestamp = None;
    meta.deletion_grace_period_seconds = None;
    meta.managed_fields = None;
    meta.owner_references = None;
    meta.finalizers = None;
    meta.self_link = None;
    meta.generate_name = None;
    if let Some(annotations) = meta.annotations.as_mut() {
        annotations.remove(LAST_APPLIED_ANNOTATION);
    }
}

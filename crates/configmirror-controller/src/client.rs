//! Cluster access used by reconciliation and routing
//!
//! Every call goes through [`with_timeout`] so a stalled API server surfaces
//! as [`Error::Timeout`] instead of blocking a reconcile forever.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client};

#[cfg(test)]
use mockall::automock;

use configmirror_common::crd::{ConfigMirror, ConfigMirrorStatus};
use configmirror_common::kube_utils::{is_not_found, with_timeout};
use configmirror_common::{Error, FIELD_OWNER};

/// Trait abstracting the Kubernetes calls the controller makes
///
/// Reads of a single object return `Ok(None)` when the object does not exist.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MirrorClient: Send + Sync {
    /// Get a ConfigMirror by namespace and name
    async fn get_config_mirror(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ConfigMirror>, Error>;

    /// List ConfigMaps in a namespace, optionally narrowed by a label selector string
    async fn list_config_maps(
        &self,
        namespace: &str,
        label_selector: Option<String>,
    ) -> Result<Vec<ConfigMap>, Error>;

    /// Get a ConfigMap by namespace and name
    async fn get_config_map(&self, namespace: &str, name: &str)
        -> Result<Option<ConfigMap>, Error>;

    /// Create a ConfigMap owned by the controller's field manager
    async fn create_config_map(
        &self,
        namespace: &str,
        config_map: &ConfigMap,
    ) -> Result<ConfigMap, Error>;

    /// Replace a ConfigMap, guarded by the resourceVersion it carries
    async fn replace_config_map(
        &self,
        namespace: &str,
        name: &str,
        config_map: &ConfigMap,
    ) -> Result<ConfigMap, Error>;

    /// Merge-patch the status subresource of a ConfigMirror
    async fn patch_mirror_status(
        &self,
        namespace: &str,
        name: &str,
        status: &ConfigMirrorStatus,
    ) -> Result<(), Error>;
}

/// Real Kubernetes client implementation
#[derive(Clone)]
pub struct KubeMirrorClient {
    client: Client,
}

impl KubeMirrorClient {
    /// Create a new KubeMirrorClient wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(FIELD_OWNER.to_string()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl MirrorClient for KubeMirrorClient {
    async fn get_config_mirror(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ConfigMirror>, Error> {
        let api: Api<ConfigMirror> = Api::namespaced(self.client.clone(), namespace);
        with_timeout("get ConfigMirror", async {
            match api.get(name).await {
                Ok(mirror) => Ok(Some(mirror)),
                Err(e) if is_not_found(&e) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn list_config_maps(
        &self,
        namespace: &str,
        label_selector: Option<String>,
    ) -> Result<Vec<ConfigMap>, Error> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        let params = match label_selector.as_deref() {
            Some(selector) => ListParams::default().labels(selector),
            None => ListParams::default(),
        };
        with_timeout("list ConfigMaps", async {
            Ok(api.list(&params).await?.items)
        })
        .await
    }

    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ConfigMap>, Error> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        with_timeout("get ConfigMap", async {
            match api.get(name).await {
                Ok(cm) => Ok(Some(cm)),
                Err(e) if is_not_found(&e) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn create_config_map(
        &self,
        namespace: &str,
        config_map: &ConfigMap,
    ) -> Result<ConfigMap, Error> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        with_timeout("create ConfigMap", async {
            Ok(api.create(&Self::post_params(), config_map).await?)
        })
        .await
    }

    async fn replace_config_map(
        &self,
        namespace: &str,
        name: &str,
        config_map: &ConfigMap,
    ) -> Result<ConfigMap, Error> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        with_timeout("replace ConfigMap", async {
            Ok(api.replace(name, &Self::post_params(), config_map).await?)
        })
        .await
    }

    async fn patch_mirror_status(
        &self,
        namespace: &str,
        name: &str,
        status: &ConfigMirrorStatus,
    ) -> Result<(), Error> {
        let api: Api<ConfigMirror> = Api::namespaced(self.client.clone(), namespace);
        let body = status_patch(status);

        with_timeout("patch ConfigMirror status", async {
            api.patch_status(name, &PatchParams::apply(FIELD_OWNER), &Patch::Merge(&body))
                .await?;
            Ok(())
        })
        .await
    }
}

/// Merge patch body for the status subresource
///
/// A cleared message is sent as `null` so the merge removes it from the
/// stored status.
pub(crate) fn status_patch(status: &ConfigMirrorStatus) -> serde_json::Value {
    serde_json::json!({ "status": status })
}

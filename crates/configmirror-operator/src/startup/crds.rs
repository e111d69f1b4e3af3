//! CRD installation using server-side apply
//!
//! The operator installs its own CRD on startup so the schema always matches
//! the running version.

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, CustomResourceExt};

use configmirror_common::crd::ConfigMirror;
use configmirror_common::FIELD_OWNER;

/// Name of the ConfigMirror CRD object (`<plural>.<group>`)
pub fn config_mirror_crd_name() -> String {
    ConfigMirror::crd_name().to_string()
}

/// Install or update the ConfigMirror CRD
pub async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_OWNER).force();
    let name = config_mirror_crd_name();

    tracing::info!(crd = %name, "Installing ConfigMirror CRD...");
    crds.patch(&name, &params, &Patch::Apply(&ConfigMirror::crd()))
        .await
        .map_err(|e| anyhow::anyhow!("failed to install {name} CRD: {e}"))?;

    tracing::info!("ConfigMirror CRD installed/updated");
    Ok(())
}

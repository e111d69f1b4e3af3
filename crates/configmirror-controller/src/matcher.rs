//! Source ConfigMap selection

use k8s_openapi::api::core::v1::ConfigMap;
use kube::ResourceExt;
use tracing::debug;

use configmirror_common::selector::LabelPredicate;
use configmirror_common::Error;

use crate::client::MirrorClient;

const EVERYTHING: &str = "<everything>";

/// List the ConfigMaps in `namespace` whose labels satisfy `predicate`
///
/// The predicate is pushed to the API server as a label selector and
/// re-checked locally. An empty predicate selects every ConfigMap.
pub async fn fetch_matching(
    client: &dyn MirrorClient,
    namespace: &str,
    predicate: &dyn LabelPredicate,
) -> Result<Vec<ConfigMap>, Error> {
    let selector = predicate.to_selector_string();
    let listed = client
        .list_config_maps(namespace, selector.clone())
        .await
        .map_err(|e| Error::fetch(namespace, selector.as_deref().unwrap_or(EVERYTHING), e))?;

    let matching: Vec<ConfigMap> = listed
        .into_iter()
        .filter(|cm| predicate.matches(cm.labels()))
        .collect();

    debug!(
        namespace,
        selector = selector.as_deref().unwrap_or(""),
        count = matching.len(),
        "matched source ConfigMaps"
    );
    Ok(matching)
}

//! Replica construction and owned-field merging
//!
//! A replica is the source ConfigMap with its cluster identity removed, its
//! namespace rewritten and provenance annotations stamped on. When a replica
//! already exists, only the keys this controller wrote last time are ours to
//! remove; everything else a different writer added is left alone.

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::core::v1::ConfigMap;
use kube::ResourceExt;

use configmirror_common::crd::ConfigMirror;
use configmirror_common::kube_utils::strip_identity_metadata;
use configmirror_common::{
    MANAGED_BY_ANNOTATION, MIRROR_ANNOTATION, SOURCE_NAMESPACE_ANNOTATION,
};

/// Build the desired replica of `source` in `target`
pub fn build_replica(source: &ConfigMap, mirror: &ConfigMirror, target: &str) -> ConfigMap {
    let mut replica = source.clone();
    strip_identity_metadata(&mut replica.metadata);
    replica.metadata.namespace = Some(target.to_string());

    let annotations = replica.metadata.annotations.get_or_insert_with(BTreeMap::new);
    annotations.insert(
        MIRROR_ANNOTATION.to_string(),
        source.metadata.uid.clone().unwrap_or_default(),
    );
    annotations.insert(
        SOURCE_NAMESPACE_ANNOTATION.to_string(),
        source.namespace().unwrap_or_default(),
    );
    annotations.insert(MANAGED_BY_ANNOTATION.to_string(), mirror.definition_id());

    replica
}

/// Map keys recorded as owned by one field manager
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OwnedFields {
    /// Keys under `data`
    pub data: BTreeSet<String>,
    /// Keys under `binaryData`
    pub binary_data: BTreeSet<String>,
    /// Keys under `metadata.labels`
    pub labels: BTreeSet<String>,
    /// Keys under `metadata.annotations`
    pub annotations: BTreeSet<String>,
}

impl OwnedFields {
    /// Read the keys `manager` owns from the object's `managedFields`
    ///
    /// Entries for other managers, and fieldsV1 shapes other than map keys,
    /// are ignored.
    pub fn from_managed_fields(object: &ConfigMap, manager: &str) -> Self {
        let mut owned = Self::default();
        let entries = object.metadata.managed_fields.iter().flatten();

        for entry in entries.filter(|e| e.manager.as_deref() == Some(manager)) {
            let Some(fields) = entry.fields_v1.as_ref().map(|f| &f.0) else {
                continue;
            };
            owned.data.extend(field_keys(fields.get("f:data")));
            owned.binary_data.extend(field_keys(fields.get("f:binaryData")));

            let metadata = fields.get("f:metadata");
            owned
                .labels
                .extend(field_keys(metadata.and_then(|m| m.get("f:labels"))));
            owned
                .annotations
                .extend(field_keys(metadata.and_then(|m| m.get("f:annotations"))));
        }

        owned
    }

    /// True when no keys are owned
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
            && self.binary_data.is_empty()
            && self.labels.is_empty()
            && self.annotations.is_empty()
    }
}

fn field_keys(set: Option<&serde_json::Value>) -> impl Iterator<Item = String> + '_ {
    set.and_then(serde_json::Value::as_object)
        .into_iter()
        .flat_map(|map| map.keys())
        .filter_map(|key| key.strip_prefix("f:"))
        .map(str::to_string)
}

/// Merge `desired` into `current`
///
/// Every desired key is written. Keys in `owned` that `desired` no longer
/// carries are removed. All other keys on `current` are preserved.
pub fn merge_owned(current: &ConfigMap, desired: &ConfigMap, owned: &OwnedFields) -> ConfigMap {
    let mut merged = current.clone();

    merge_map(&mut merged.data, desired.data.as_ref(), &owned.data);
    merge_map(
        &mut merged.binary_data,
        desired.binary_data.as_ref(),
        &owned.binary_data,
    );
    merge_map(
        &mut merged.metadata.labels,
        desired.metadata.labels.as_ref(),
        &owned.labels,
    );
    merge_map(
        &mut merged.metadata.annotations,
        desired.metadata.annotations.as_ref(),
        &owned.annotations,
    );
    if desired.immutable.is_some() {
        merged.immutable = desired.immutable;
    }

    merged
}

fn merge_map<V: Clone>(
    target: &mut Option<BTreeMap<String, V>>,
    desired: Option<&BTreeMap<String, V>>,
    owned: &BTreeSet<String>,
) {
    let mut map = target.take().unwrap_or_default();
    map.retain(|key, _| !owned.contains(key) || desired.is_some_and(|d| d.contains_key(key)));
    for (key, value) in desired.into_iter().flatten() {
        map.insert(key.clone(), value.clone());
    }
    *target = (!map.is_empty()).then_some(map);
}

/// Compare the replicated content of two ConfigMaps
///
/// Absent and empty maps are equal.
pub fn same_content(a: &ConfigMap, b: &ConfigMap) -> bool {
    fn norm<V>(map: &Option<BTreeMap<String, V>>) -> Option<&BTreeMap<String, V>> {
        map.as_ref().filter(|m| !m.is_empty())
    }

    norm(&a.data) == norm(&b.data)
        && norm(&a.binary_data) == norm(&b.binary_data)
        && norm(&a.metadata.labels) == norm(&b.metadata.labels)
        && norm(&a.metadata.annotations) == norm(&b.metadata.annotations)
        && a.immutable.unwrap_or(false) == b.immutable.unwrap_or(false)
}

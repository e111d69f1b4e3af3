//! Shared mocks for controller tests

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use mockall::mock;

use configmirror_common::Error;
use configmirror_store::ReplicaStore;

mock! {
    pub Store {}

    #[async_trait]
    impl ReplicaStore for Store {
        async fn upsert(&self, replica: &ConfigMap) -> Result<(), Error>;
    }
}

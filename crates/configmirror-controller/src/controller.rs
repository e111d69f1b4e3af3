//! ConfigMirror reconciliation
//!
//! A reconcile re-reads its definition, validates it, then replicates every
//! matching source into every target namespace in order. The first failure
//! aborts the pass; replicas already written stay written.

use std::sync::Arc;
use std::time::{Duration, Instant};

use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use configmirror_common::crd::{ConfigMirror, ConfigMirrorPhase, ConfigMirrorStatus};
use configmirror_common::{metrics, Error};
use configmirror_store::ReplicaStore;

use crate::client::{KubeMirrorClient, MirrorClient};
use crate::engine::replicate;
use crate::matcher::fetch_matching;

/// Drift resync interval after a successful reconcile
pub const REQUEUE_SUCCESS: Duration = Duration::from_secs(300);
/// Retry interval after a retryable failure
pub const REQUEUE_ERROR: Duration = Duration::from_secs(5);

/// Controller context shared by every reconcile
///
/// Use [`ContextBuilder`] to construct instances:
///
/// ```text
/// let ctx = Context::builder(client)
///     .replica_store(store)
///     .build();
/// ```
pub struct Context {
    /// Kubernetes access (trait object for testability)
    pub client: Arc<dyn MirrorClient>,
    /// Audit store, present when persistence is enabled
    pub store: Option<Arc<dyn ReplicaStore>>,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client) -> ContextBuilder {
        ContextBuilder::new(client)
    }

    /// Create a context for testing with mock clients
    #[cfg(test)]
    pub fn for_testing(
        client: Arc<dyn MirrorClient>,
        store: Option<Arc<dyn ReplicaStore>>,
    ) -> Self {
        Self { client, store }
    }
}

/// Builder for constructing [`Context`] instances
pub struct ContextBuilder {
    client: Client,
    store: Option<Arc<dyn ReplicaStore>>,
}

impl ContextBuilder {
    fn new(client: Client) -> Self {
        Self {
            client,
            store: None,
        }
    }

    /// Record every applied replica in this store
    pub fn replica_store(mut self, store: Arc<dyn ReplicaStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        Context {
            client: Arc::new(KubeMirrorClient::new(self.client)),
            store: self.store,
        }
    }
}

/// Reconcile a ConfigMirror
///
/// Returns a requeue after [`REQUEUE_SUCCESS`] so replicas edited out of
/// band are repaired even without a source event.
#[instrument(skip(mirror, ctx), fields(definition = %mirror.definition_id()))]
pub async fn reconcile(mirror: Arc<ConfigMirror>, ctx: Arc<Context>) -> Result<Action, Error> {
    let started = Instant::now();
    let result = reconcile_definition(&mirror, &ctx).await;
    metrics::record_reconcile(
        started.elapsed().as_secs_f64(),
        result.as_ref().err().map(Error::kind),
    );
    result
}

async fn reconcile_definition(mirror: &ConfigMirror, ctx: &Context) -> Result<Action, Error> {
    let id = mirror.definition_id();
    let namespace = mirror.namespace().unwrap_or_default();
    let name = mirror.name_any();
    info!("reconciling ConfigMirror");

    // The cached copy may be stale or already deleted
    let Some(definition) = ctx.client.get_config_mirror(&namespace, &name).await? else {
        return Err(Error::definition_not_found(id));
    };

    if let Err(invalid) = definition.spec.validate(&id) {
        warn!(error = %invalid, "invalid ConfigMirror spec");
        if let Err(e) = update_status(
            &definition,
            ctx,
            ConfigMirrorPhase::Failed,
            Some(invalid.to_string()),
            0,
        )
        .await
        {
            warn!(error = %e, "failed to record Failed status");
        }
        return Err(invalid);
    }

    let spec = &definition.spec;
    let predicate = spec.predicate();
    let sources = fetch_matching(ctx.client.as_ref(), &spec.source_namespace, &predicate).await?;
    if sources.is_empty() {
        info!(
            source_namespace = %spec.source_namespace,
            selector = %predicate,
            "no ConfigMaps match selector"
        );
    }

    let store = ctx.store.as_deref();
    let mut replicated: u32 = 0;
    for target in &spec.target_namespaces {
        for source in &sources {
            replicate(ctx.client.as_ref(), store, source, &definition, target).await?;
            replicated += 1;
        }
    }
    info!(
        sources = sources.len(),
        targets = spec.target_namespaces.len(),
        replicated,
        "ConfigMirror reconciled"
    );

    update_status(&definition, ctx, ConfigMirrorPhase::Ready, None, replicated).await?;
    Ok(Action::requeue(REQUEUE_SUCCESS))
}

/// Patch status unless it already says the same thing
async fn update_status(
    mirror: &ConfigMirror,
    ctx: &Context,
    phase: ConfigMirrorPhase,
    message: Option<String>,
    replicated_count: u32,
) -> Result<(), Error> {
    let status = ConfigMirrorStatus {
        phase,
        message,
        replicated_count,
        observed_generation: mirror.metadata.generation,
    };
    if mirror.status.as_ref() == Some(&status) {
        debug!("status unchanged");
        return Ok(());
    }

    ctx.client
        .patch_mirror_status(
            &mirror.namespace().unwrap_or_default(),
            &mirror.name_any(),
            &status,
        )
        .await
}

/// Decide what to do after a failed reconcile
///
/// Transient failures are retried after [`REQUEUE_ERROR`]. Permanent ones
/// (vanished or invalid definition, forbidden or rejected writes) wait for
/// the next change to the definition.
pub fn error_policy(mirror: Arc<ConfigMirror>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        definition = %mirror.definition_id(),
        retryable = error.is_retryable(),
        "reconciliation failed"
    );

    if error.is_retryable() {
        Action::requeue(REQUEUE_ERROR)
    } else {
        Action::await_change()
    }
}

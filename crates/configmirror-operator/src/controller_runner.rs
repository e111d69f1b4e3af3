//! Controller runner - wires the ConfigMirror controller and its watches
//!
//! ConfigMirrors are watched directly. ConfigMaps are watched across all
//! namespaces and mapped to ConfigMirrors through the reverse router.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::runtime::reflector::{ObjectRef, Store};
use kube::runtime::watcher::{self, Config as WatcherConfig};
use kube::runtime::{Controller, WatchStreamExt};
use kube::{Api, Client};

use configmirror_common::crd::ConfigMirror;
use configmirror_controller::router::route;
use configmirror_controller::{error_policy, reconcile, Context, MirrorClient};
use configmirror_store::ReplicaStore;

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
/// This forces the API server to close the watch before the client times out,
/// preventing "body read timed out" errors on idle watches.
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Replica lookups allowed in flight while routing ConfigMap events
const ROUTE_CONCURRENCY: usize = 16;

/// Build the ConfigMirror controller future
///
/// Runs until a termination signal is received.
pub fn build_mirror_controller(
    client: Client,
    store: Option<Arc<dyn ReplicaStore>>,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    let mut ctx_builder = Context::builder(client.clone());
    if let Some(store) = store {
        ctx_builder = ctx_builder.replica_store(store);
    }
    let ctx = Arc::new(ctx_builder.build());

    let mirrors: Api<ConfigMirror> = Api::all(client.clone());
    let config_maps: Api<ConfigMap> = Api::all(client);

    let controller = Controller::new(mirrors, WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS));
    let triggers = config_map_triggers(config_maps, controller.store(), ctx.client.clone());

    tracing::info!("- ConfigMirror controller");

    Box::pin(
        controller
            .reconcile_on(triggers)
            .shutdown_on_signal()
            .run(reconcile, error_policy, ctx)
            .for_each(log_reconcile_result("ConfigMirror")),
    )
}

/// ConfigMap changes and deletions, routed to the ConfigMirrors they affect
///
/// Each event is matched against the definitions cached when it arrives.
/// Lookups run concurrently, so a slow one does not hold back unrelated
/// events. Watch errors are logged; the watcher backs off and resumes.
fn config_map_triggers(
    api: Api<ConfigMap>,
    definitions: Store<ConfigMirror>,
    client: Arc<dyn MirrorClient>,
) -> impl Stream<Item = ObjectRef<ConfigMirror>> + Send + 'static {
    let events = watcher::watcher(api, WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS))
        .default_backoff()
        .touched_objects();
    route_events(events, definitions, client)
}

fn route_events<S>(
    events: S,
    definitions: Store<ConfigMirror>,
    client: Arc<dyn MirrorClient>,
) -> impl Stream<Item = ObjectRef<ConfigMirror>> + Send + 'static
where
    S: Stream<Item = Result<ConfigMap, watcher::Error>> + Send + 'static,
{
    events
        .map(move |event| {
            let client = client.clone();
            let definitions = definitions.clone();
            async move {
                match event {
                    Ok(cm) => route(cm, &definitions.state(), client.as_ref()).await,
                    Err(error) => {
                        tracing::warn!(%error, "ConfigMap watch error");
                        Vec::new()
                    }
                }
            }
        })
        .buffer_unordered(ROUTE_CONCURRENCY)
        .flat_map(futures::stream::iter)
}

/// Creates a closure for logging reconciliation results.
fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}

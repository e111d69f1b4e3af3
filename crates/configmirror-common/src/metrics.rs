//! Metrics for ConfigMirror observability
//!
//! Exported through the global OpenTelemetry meter; a no-op until
//! telemetry is initialised with an OTLP endpoint.

use once_cell::sync::Lazy;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::KeyValue;

/// Global meter for ConfigMirror metrics
static METER: Lazy<Meter> = Lazy::new(|| global::meter("configmirror"));

/// Histogram of reconcile duration
///
/// Labels:
/// - `result`: success, error
pub static RECONCILE_DURATION: Lazy<Histogram<f64>> = Lazy::new(|| {
    METER
        .f64_histogram("configmirror_reconcile_duration_seconds")
        .with_description("Duration of ConfigMirror reconciliation in seconds")
        .with_unit("s")
        .build()
});

/// Counter of reconcile errors
///
/// Labels:
/// - `error_kind`: see `Error::kind`
pub static RECONCILE_ERRORS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("configmirror_reconcile_errors_total")
        .with_description("Total number of ConfigMirror reconciliation errors")
        .with_unit("{errors}")
        .build()
});

/// Counter of replica writes
///
/// Labels:
/// - `outcome`: created, updated, unchanged
pub static REPLICA_APPLIES: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("configmirror_replica_applies_total")
        .with_description("Total number of replica apply operations by outcome")
        .with_unit("{replicas}")
        .build()
});

/// Counter of routing decisions for watched ConfigMaps
///
/// Labels:
/// - `decision`: source, live_replica, deleted_replica, unresolved, lookup_failed
pub static ROUTER_DECISIONS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("configmirror_router_decisions_total")
        .with_description("Total number of reverse routing decisions by kind")
        .with_unit("{events}")
        .build()
});

/// Record a finished reconcile
pub fn record_reconcile(duration_secs: f64, error_kind: Option<&'static str>) {
    let result = if error_kind.is_some() { "error" } else { "success" };
    RECONCILE_DURATION.record(duration_secs, &[KeyValue::new("result", result)]);
    if let Some(kind) = error_kind {
        RECONCILE_ERRORS.add(1, &[KeyValue::new("error_kind", kind)]);
    }
}

/// Record a replica apply outcome
pub fn record_apply(outcome: &'static str) {
    REPLICA_APPLIES.add(1, &[KeyValue::new("outcome", outcome)]);
}

/// Record a router decision
pub fn record_route(decision: &'static str) {
    ROUTER_DECISIONS.add(1, &[KeyValue::new("decision", decision)]);
}

//! Telemetry for the ConfigMirror operator
//!
//! JSON logs always go to stdout, filtered by `RUST_LOG`. When
//! `OTEL_EXPORTER_OTLP_ENDPOINT` is set, spans and the reconcile metrics are
//! also pushed over OTLP. The returned [`TelemetryGuard`] owns both
//! providers and flushes them on shutdown.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::TracerProvider;
use opentelemetry_sdk::{runtime, Resource};
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Default log filter when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "info,configmirror=debug,kube=info,tower=warn,hyper=warn";

/// Variable naming the OTLP collector endpoint
pub const OTLP_ENDPOINT_VAR: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

/// Variable overriding the reported service name
pub const SERVICE_NAME_VAR: &str = "OTEL_SERVICE_NAME";

/// Errors that can occur during telemetry initialization
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Failed to initialize OpenTelemetry tracer
    #[error("failed to initialize tracer: {0}")]
    TracerInit(String),

    /// Failed to initialize OTLP metrics exporter
    #[error("failed to initialize metrics exporter: {0}")]
    MetricsInit(String),

    /// Failed to initialize tracing subscriber
    #[error("failed to initialize tracing subscriber: {0}")]
    SubscriberInit(String),
}

/// Configuration for telemetry initialization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Service name for traces and metrics
    pub service_name: String,

    /// OTLP endpoint (e.g., "http://otel-collector:4317"); logs only when unset
    pub otlp_endpoint: Option<String>,

    /// Resource attributes describing where the operator runs
    pub attributes: Vec<(&'static str, String)>,
}

impl TelemetryConfig {
    /// Build the configuration from a variable lookup
    ///
    /// Empty values count as unset. Pod identity comes from the Deployment's
    /// downward API (`POD_NAME`, `POD_NAMESPACE`, `NODE_NAME`).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let attributes = [
            ("POD_NAME", "k8s.pod.name"),
            ("POD_NAMESPACE", "k8s.namespace.name"),
            ("NODE_NAME", "k8s.node.name"),
        ]
        .into_iter()
        .filter_map(|(key, attribute)| var(key).map(|value| (attribute, value)))
        .collect();

        Self {
            service_name: var(SERVICE_NAME_VAR)
                .unwrap_or_else(|| crate::CONTROLLER_NAME.to_string()),
            otlp_endpoint: var(OTLP_ENDPOINT_VAR),
            attributes,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

/// Keeps the OTLP providers alive until shutdown
#[must_use = "dropping the guard without shutdown loses buffered telemetry"]
#[derive(Default)]
pub struct TelemetryGuard {
    tracer_provider: Option<TracerProvider>,
    meter_provider: Option<SdkMeterProvider>,
}

impl TelemetryGuard {
    /// Whether spans and metrics are exported
    pub fn is_exporting(&self) -> bool {
        self.tracer_provider.is_some() || self.meter_provider.is_some()
    }

    /// Flush pending spans and metrics, then stop both exporters
    pub fn shutdown(self) {
        if let Some(provider) = self.tracer_provider {
            if let Err(e) = provider.shutdown() {
                tracing::warn!(error = %e, "failed to shut down tracer provider");
            }
        }
        if let Some(provider) = self.meter_provider {
            if let Err(e) = provider.shutdown() {
                tracing::warn!(error = %e, "failed to shut down meter provider");
            }
        }
    }
}

/// Initialize telemetry with the given configuration
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    let mut guard = TelemetryGuard::default();
    let otel_layer = match &config.otlp_endpoint {
        Some(endpoint) => {
            let resource = build_resource(&config);
            guard.meter_provider = Some(init_otlp_metrics(endpoint, resource.clone())?);
            let provider = init_otlp_tracer(endpoint, resource)?;
            let tracer = provider.tracer(config.service_name.clone());
            guard.tracer_provider = Some(provider);
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(false)
        .with_target(true)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(otel_layer)
        .try_init()
        .map_err(|e: tracing_subscriber::util::TryInitError| {
            TelemetryError::SubscriberInit(e.to_string())
        })?;

    Ok(guard)
}

/// OpenTelemetry resource: service identity plus pod placement
fn build_resource(config: &TelemetryConfig) -> Resource {
    let mut attributes = vec![
        KeyValue::new(
            opentelemetry_semantic_conventions::resource::SERVICE_NAME,
            config.service_name.clone(),
        ),
        KeyValue::new(
            opentelemetry_semantic_conventions::resource::SERVICE_VERSION,
            env!("CARGO_PKG_VERSION"),
        ),
    ];
    attributes.extend(
        config
            .attributes
            .iter()
            .map(|(key, value)| KeyValue::new(*key, value.clone())),
    );

    Resource::new(attributes)
}

/// Initialize OTLP tracer provider
fn init_otlp_tracer(endpoint: &str, resource: Resource) -> Result<TracerProvider, TelemetryError> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| TelemetryError::TracerInit(e.to_string()))?;

    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_resource(resource)
        .build();

    global::set_tracer_provider(provider.clone());

    Ok(provider)
}

/// Initialize OTLP metrics exporter with periodic push
fn init_otlp_metrics(
    endpoint: &str,
    resource: Resource,
) -> Result<SdkMeterProvider, TelemetryError> {
    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    let reader =
        opentelemetry_sdk::metrics::PeriodicReader::builder(exporter, runtime::Tokio).build();

    let meter_provider = SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(resource)
        .build();

    global::set_meter_provider(meter_provider.clone());

    Ok(meter_provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn unset_environment_logs_locally_as_controller() {
        let config = TelemetryConfig::from_lookup(lookup(&[]));
        assert_eq!(config.service_name, "configmirror-controller");
        assert_eq!(config.otlp_endpoint, None);
        assert!(config.attributes.is_empty());
    }

    #[test]
    fn empty_endpoint_disables_export() {
        let config = TelemetryConfig::from_lookup(lookup(&[(OTLP_ENDPOINT_VAR, "  ")]));
        assert_eq!(config.otlp_endpoint, None);
    }

    #[test]
    fn endpoint_service_name_and_pod_identity_are_read() {
        let config = TelemetryConfig::from_lookup(lookup(&[
            (OTLP_ENDPOINT_VAR, "http://otel-collector:4317"),
            (SERVICE_NAME_VAR, "configmirror-staging"),
            ("POD_NAME", "configmirror-7d9f"),
            ("POD_NAMESPACE", "configmirror-system"),
        ]));
        assert_eq!(config.service_name, "configmirror-staging");
        assert_eq!(
            config.otlp_endpoint.as_deref(),
            Some("http://otel-collector:4317")
        );
        assert_eq!(
            config.attributes,
            vec![
                ("k8s.pod.name", "configmirror-7d9f".to_string()),
                ("k8s.namespace.name", "configmirror-system".to_string()),
            ]
        );
    }

    #[test]
    fn resource_carries_pod_attributes() {
        let config = TelemetryConfig::from_lookup(lookup(&[("NODE_NAME", "worker-1")]));
        let resource = build_resource(&config);
        let node = resource
            .get(opentelemetry::Key::new("k8s.node.name"))
            .map(|v| v.to_string());
        assert_eq!(node.as_deref(), Some("worker-1"));
    }

    #[test]
    fn default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
    }

    #[test]
    fn local_only_guard_shuts_down_cleanly() {
        let guard = TelemetryGuard::default();
        assert!(!guard.is_exporting());
        guard.shutdown();
    }
}

use crate::Environment;
use crate::logging::install;
use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource,
    metrics::{PeriodicReader, SdkMeterProvider},
    propagation::TraceContextPropagator,
    trace::{Sampler, SdkTracerProvider},
};
use std::time::Duration;
use tracing_subscriber::Layer;
use tracing_subscriber::registry::Registry;

/// Metric export period. Tile counters move every frame; a coarse period
/// keeps collector load flat regardless of camera count.
const METRICS_INTERVAL: Duration = Duration::from_secs(10);

/// Installs OTLP trace and metric providers plus the tracing subscriber, and
/// flushes both providers when dropped.
///
/// Must be created from inside a Tokio runtime: the batch exporters spawn
/// onto it.
///
/// ```ignore
/// let _telemetry = TelemetryGuard::init("viewer", "http://localhost:4317", Environment::Production, "info")?;
/// ```
pub struct TelemetryGuard {
    tracer_provider: SdkTracerProvider,
    meter_provider: SdkMeterProvider,
}

impl TelemetryGuard {
    /// # Arguments
    /// * `service_name` - reported as `service.name` on every span and metric
    /// * `endpoint` - OTLP gRPC collector, e.g. `http://localhost:4317`
    /// * `environment` - selects JSON (production) or pretty (development) logs
    /// * `default_directive` - log filter used when `RUST_LOG` is unset
    pub fn init(
        service_name: &str,
        endpoint: &str,
        environment: Environment,
        default_directive: &str,
    ) -> anyhow::Result<Self> {
        global::set_text_map_propagator(TraceContextPropagator::new());

        let resource = service_resource(service_name, environment);
        let tracer_provider = tracer_provider(endpoint, resource.clone())?;
        let meter_provider = meter_provider(endpoint, resource)?;

        global::set_tracer_provider(tracer_provider.clone());
        global::set_meter_provider(meter_provider.clone());

        let otel_layer = tracing_opentelemetry::layer::<Registry>()
            .with_tracer(global::tracer(service_name.to_string()))
            .boxed();
        install(environment, default_directive, otel_layer)?;

        tracing::info!(service = service_name, endpoint, "OpenTelemetry export enabled");

        Ok(Self {
            tracer_provider,
            meter_provider,
        })
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Err(e) = self.tracer_provider.shutdown() {
            eprintln!("Failed to shutdown tracer provider: {:?}", e);
        }
        if let Err(e) = self.meter_provider.shutdown() {
            eprintln!("Failed to shutdown meter provider: {:?}", e);
        }
    }
}

fn service_resource(service_name: &str, environment: Environment) -> Resource {
    use opentelemetry_semantic_conventions::attribute::{SERVICE_NAME, SERVICE_VERSION};

    Resource::builder()
        .with_attributes([
            KeyValue::new(SERVICE_NAME, service_name.to_string()),
            KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
            KeyValue::new("deployment.environment", environment.as_str()),
        ])
        .build()
}

fn tracer_provider(endpoint: &str, resource: Resource) -> anyhow::Result<SdkTracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    Ok(SdkTracerProvider::builder()
        .with_resource(resource)
        .with_sampler(Sampler::ParentBased(Box::new(Sampler::AlwaysOn)))
        .with_batch_exporter(exporter)
        .build())
}

fn meter_provider(endpoint: &str, resource: Resource) -> anyhow::Result<SdkMeterProvider> {
    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    let reader = PeriodicReader::builder(exporter)
        .with_interval(METRICS_INTERVAL)
        .build();

    Ok(SdkMeterProvider::builder()
        .with_resource(resource)
        .with_reader(reader)
        .build())
}

/// Creates a debug-level span and enters it for the rest of the scope.
#[macro_export]
macro_rules! span {
    ($name:literal) => {
        tracing::debug_span!($name).entered()
    };
    ($name:literal, $($field:tt)+) => {
        tracing::debug_span!($name, $($field)+).entered()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_carries_service_identity() {
        let resource = service_resource("viewer", Environment::Production);

        let get = |key: &'static str| resource.get(&opentelemetry::Key::from_static_str(key));
        assert_eq!(get("service.name").map(|v| v.to_string()), Some("viewer".to_string()));
        assert_eq!(
            get("deployment.environment").map(|v| v.to_string()),
            Some("production".to_string())
        );
    }

    #[test]
    fn test_span_macro_accepts_fields() {
        let camera_id = "cam-1";
        let _plain = crate::span!("plain");
        let _with_fields = crate::span!("with_fields", camera_id, seq = 3u64);
    }
}

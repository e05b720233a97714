use crate::config::Environment;
use tracing_subscriber::registry::Registry;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt};

pub(crate) type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Initialize the tracing subscriber: pretty output for development, JSON for
/// production.
///
/// `RUST_LOG` wins when set; otherwise `default_directive` is used (e.g.
/// `"info"` or `"pool=debug,info"`).
///
/// The OpenTelemetry layer is always attached. It is inert until a global
/// tracer provider exists (see [`crate::TelemetryGuard`]).
pub fn setup_logging(environment: Environment, default_directive: &str) {
    let otel_layer = tracing_opentelemetry::layer::<Registry>().boxed();

    if let Err(e) = install(environment, default_directive, otel_layer) {
        tracing::debug!(error = %e, "Tracing subscriber already installed");
    }
}

pub(crate) fn install(
    environment: Environment,
    default_directive: &str,
    otel_layer: BoxedLayer,
) -> Result<(), TryInitError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let fmt_layer = match environment {
        Environment::Production => tracing_subscriber::fmt::layer().json().with_level(true).boxed(),
        Environment::Development => tracing_subscriber::fmt::layer().pretty().with_ansi(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(vec![otel_layer, fmt_layer])
        .with(env_filter)
        .try_init()
}

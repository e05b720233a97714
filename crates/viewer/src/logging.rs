use crate::config::ViewerConfig;
use common::TelemetryGuard;

/// Installs logging, with OTLP export when an endpoint is configured. Keep
/// the returned guard alive for the lifetime of the process.
pub fn setup_logging(config: &ViewerConfig) -> anyhow::Result<Option<TelemetryGuard>> {
    match &config.otel_endpoint {
        Some(endpoint) => {
            let guard = TelemetryGuard::init(
                env!("CARGO_PKG_NAME"),
                endpoint,
                config.environment,
                config.log_level.as_str(),
            )?;
            Ok(Some(guard))
        }
        None => {
            common::setup_logging(config.environment, config.log_level.as_str());
            Ok(None)
        }
    }
}

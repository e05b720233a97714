use common::Environment;
use pool::{PoolConfig, Priority, ReconnectPolicy, endpoint_for_camera};
use renderer::FeedConfig;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ViewerConfig {
    /// Backend base URL, e.g. `ws://localhost:8000`.
    pub backend_url: String,
    pub cameras: Vec<String>,
    /// Cameras rendered as thumbnails; they shed frames under load.
    pub low_priority: Vec<String>,
    pub reconnect_delay_ms: u64,
    pub max_reconnect_attempts: u32,
    /// Outbound messages buffered per camera socket.
    pub send_queue: usize,
    pub annotation_capacity: usize,
    pub annotation_tolerance_ms: u64,
    pub show_overlays: bool,
    pub telemetry_interval_secs: u64,
    pub log_level: LogLevel,
    pub environment: Environment,
    pub otel_endpoint: Option<String>,
}

impl ViewerConfig {
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            reconnect: ReconnectPolicy {
                max_attempts: self.max_reconnect_attempts,
                delay: Duration::from_millis(self.reconnect_delay_ms),
            },
            send_queue: self.send_queue,
        }
    }

    pub fn feed_config(&self, camera_id: &str) -> FeedConfig {
        let priority = if self.low_priority.iter().any(|c| c == camera_id) {
            Priority::Low
        } else {
            Priority::Normal
        };

        let mut feed = FeedConfig::new(camera_id, endpoint_for_camera(&self.backend_url, camera_id))
            .with_priority(priority);
        feed.show_overlays = self.show_overlays;
        feed.annotation_capacity = self.annotation_capacity;
        feed.annotation_tolerance = Duration::from_millis(self.annotation_tolerance_ms);
        feed
    }

    pub fn telemetry_interval(&self) -> Duration {
        Duration::from_secs(self.telemetry_interval_secs.max(1))
    }
}

pub fn get_configuration() -> Result<ViewerConfig, config::ConfigError> {
    let config = config::Config::builder()
        .set_default("backend_url", "ws://localhost:8000")?
        .set_default("cameras", Vec::<String>::new())?
        .set_default("low_priority", Vec::<String>::new())?
        .set_default("reconnect_delay_ms", 3000)?
        .set_default("max_reconnect_attempts", 5)?
        .set_default("send_queue", pool::DEFAULT_SEND_QUEUE as i64)?
        .set_default("annotation_capacity", 30)?
        .set_default("annotation_tolerance_ms", 500)?
        .set_default("show_overlays", true)?
        .set_default("telemetry_interval_secs", 10)?
        .set_default("log_level", "info")?
        .set_default("environment", "development")?
        .add_source(
            config::Environment::with_prefix("VIEWER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("cameras")
                .with_list_parse_key("low_priority"),
        )
        .build()?;

    let config: ViewerConfig = config.try_deserialize::<ViewerConfig>()?;

    Ok(config)
}

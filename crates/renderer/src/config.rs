use annotations::{DEFAULT_CAPACITY, DEFAULT_TOLERANCE};
use pool::Priority;
use std::time::Duration;

/// Per-tile settings.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedConfig {
    pub camera_id: String,
    /// Socket URL, usually from [`pool::endpoint_for_camera`].
    pub endpoint: String,
    /// Expected frame rate; only used for logging and staleness hints.
    pub fps_hint: Option<f32>,
    pub visible: bool,
    pub show_overlays: bool,
    pub priority: Priority,
    pub annotation_capacity: usize,
    pub annotation_tolerance: Duration,
    /// Pool subscriber id. When unset every renderer picks its own, so two
    /// tiles on one camera never share a registration.
    pub subscriber_id: Option<String>,
}

impl FeedConfig {
    pub fn new(camera_id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            camera_id: camera_id.into(),
            endpoint: endpoint.into(),
            fps_hint: None,
            visible: true,
            show_overlays: true,
            priority: Priority::Normal,
            annotation_capacity: DEFAULT_CAPACITY,
            annotation_tolerance: DEFAULT_TOLERANCE,
            subscriber_id: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_subscriber_id(mut self, subscriber_id: impl Into<String>) -> Self {
        self.subscriber_id = Some(subscriber_id.into());
        self
    }

    /// Age after which the tile counts as stale: three frame intervals, or
    /// five seconds without a hint.
    pub fn stale_after(&self) -> Duration {
        match self.fps_hint {
            Some(fps) if fps > 0.0 => Duration::from_secs_f32(3.0 / fps).max(Duration::from_millis(500)),
            _ => Duration::from_secs(5),
        }
    }
}

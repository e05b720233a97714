use crate::state::TileState;
use std::time::{Duration, Instant};

/// Point-in-time view of one tile.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedTelemetry {
    pub camera_id: String,
    pub state: TileState,
    /// Receipt wall clock minus server timestamp of the last frame message.
    pub latency_ms: Option<u64>,
    pub detection_count: usize,
    pub track_count: usize,
    pub frames_received: u64,
    pub frames_painted: u64,
    pub frames_dropped: u64,
    pub last_frame_at: Option<Instant>,
}

impl FeedTelemetry {
    pub fn new(camera_id: impl Into<String>) -> Self {
        Self {
            camera_id: camera_id.into(),
            state: TileState::Idle,
            latency_ms: None,
            detection_count: 0,
            track_count: 0,
            frames_received: 0,
            frames_painted: 0,
            frames_dropped: 0,
            last_frame_at: None,
        }
    }

    /// True when no frame arrived within `threshold`, or none ever did.
    pub fn is_stale(&self, threshold: Duration) -> bool {
        self.is_stale_at(Instant::now(), threshold)
    }

    pub fn is_stale_at(&self, now: Instant, threshold: Duration) -> bool {
        self.last_frame_at
            .is_none_or(|at| now.saturating_duration_since(at) > threshold)
    }

    pub fn status_text(&self) -> String {
        match &self.state {
            TileState::Idle => "idle".to_string(),
            TileState::Connecting => "connecting".to_string(),
            TileState::Live => match self.latency_ms {
                Some(ms) => format!("live {} ms", ms),
                None => "live".to_string(),
            },
            TileState::Error(message) => format!("error: {}", message),
        }
    }
}

use schema::{DetectionBox, InboundMessage, TrackedObject};
use std::time::Instant;

/// A detection box tagged with the model that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDetection {
    pub model: String,
    pub detection: DetectionBox,
}

/// Overlay data for one server timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationRecord {
    /// Server clock, milliseconds.
    pub server_ts_ms: u64,
    /// Local receipt time.
    pub received_at: Instant,
    pub detections: Vec<ModelDetection>,
    pub tracked: Vec<TrackedObject>,
}

impl AnnotationRecord {
    pub fn new(server_ts_ms: u64, received_at: Instant) -> Self {
        Self {
            server_ts_ms,
            received_at,
            detections: Vec::new(),
            tracked: Vec::new(),
        }
    }

    /// Flattens every model result and the tracker output of `msg`.
    pub fn from_message(msg: &InboundMessage, received_at: Instant) -> Self {
        let detections = msg
            .results
            .models()
            .flat_map(|(name, result)| {
                result.detections.iter().map(move |d| ModelDetection {
                    model: name.to_string(),
                    detection: d.clone(),
                })
            })
            .collect();

        let tracked = msg
            .results
            .tracking()
            .map(|t| t.tracked_objects.values().cloned().collect())
            .unwrap_or_default();

        Self {
            server_ts_ms: msg.timestamp_ms(),
            received_at,
            detections,
            tracked,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty() && self.tracked.is_empty()
    }
}

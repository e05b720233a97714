//! Wire types for the JSON messages a camera socket pushes to the client.

mod message;
mod results;

pub use message::{
    ErrorMessage, InboundMessage, ServerMessage, StatusMessage, normalize_timestamp_ms,
};
pub use results::{
    DetectionBox, ModelResult, PositionMeters, ResultEntry, Results, TRACKING_KEY,
    TrackedObject, TrackingResult, TrackingSummary, classify, is_model_result,
    is_tracking_result,
};

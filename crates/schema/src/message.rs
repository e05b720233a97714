use crate::results::{Results, string_or_number};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde_json::Value;

/// Timestamps below this are taken to be seconds rather than milliseconds.
/// 1e11 ms is March 1973; 1e11 s is far beyond any realistic clock.
const SECONDS_CUTOFF: f64 = 1e11;

/// A frame/analytics update for one camera.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InboundMessage {
    #[serde(deserialize_with = "string_or_number")]
    pub camera_id: String,
    /// Server clock, milliseconds or seconds depending on the endpoint.
    pub timestamp: f64,
    /// Base64 JPEG, optionally as a `data:` URI.
    #[serde(default)]
    pub frame: Option<String>,
    #[serde(default)]
    pub calibrated: bool,
    #[serde(default)]
    pub results: Results,
    /// Set when the backend failed part of the processing but still replied.
    #[serde(default)]
    pub error: Option<String>,
}

impl InboundMessage {
    /// Server timestamp normalized to milliseconds since the epoch.
    pub fn timestamp_ms(&self) -> u64 {
        normalize_timestamp_ms(self.timestamp)
    }

    /// Decodes the embedded image. `None` when the message carries no frame.
    pub fn image_bytes(&self) -> Option<Result<Vec<u8>, base64::DecodeError>> {
        let frame = self.frame.as_deref()?;
        if frame.is_empty() {
            return None;
        }
        Some(STANDARD.decode(strip_data_uri(frame)))
    }
}

/// Sent once the backend has opened the camera source.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatusMessage {
    #[serde(default)]
    pub camera_id: Option<String>,
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub stream_type: Option<String>,
    #[serde(default)]
    pub fps: Option<f64>,
}

/// Sent when the backend cannot serve the camera at all.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ErrorMessage {
    #[serde(default)]
    pub camera_id: Option<String>,
    pub error: String,
}

/// Every JSON payload a camera socket can carry.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Frame(InboundMessage),
    Status(StatusMessage),
    Error(ErrorMessage),
}

impl ServerMessage {
    /// Parses a raw socket payload.
    ///
    /// Anything with `results` or a `timestamp` is a frame message, even when
    /// it also carries an `error`; otherwise `status` and then `error` decide.
    pub fn parse(payload: &[u8]) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_slice(payload)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let Some(obj) = value.as_object() else {
            return Err(serde::de::Error::custom("message is not a JSON object"));
        };

        if obj.contains_key("results") || obj.contains_key("timestamp") {
            serde_json::from_value(value).map(ServerMessage::Frame)
        } else if obj.contains_key("status") {
            serde_json::from_value(value).map(ServerMessage::Status)
        } else if obj.contains_key("error") {
            serde_json::from_value(value).map(ServerMessage::Error)
        } else {
            Err(serde::de::Error::custom("unrecognized message shape"))
        }
    }

    pub fn camera_id(&self) -> Option<&str> {
        match self {
            ServerMessage::Frame(m) => Some(&m.camera_id),
            ServerMessage::Status(m) => m.camera_id.as_deref(),
            ServerMessage::Error(m) => m.camera_id.as_deref(),
        }
    }

    pub fn as_frame(&self) -> Option<&InboundMessage> {
        match self {
            ServerMessage::Frame(m) => Some(m),
            _ => None,
        }
    }
}

pub fn normalize_timestamp_ms(timestamp: f64) -> u64 {
    if !timestamp.is_finite() || timestamp <= 0.0 {
        return 0;
    }
    if timestamp < SECONDS_CUTOFF {
        (timestamp * 1000.0).round() as u64
    } else {
        timestamp.round() as u64
    }
}

fn strip_data_uri(frame: &str) -> &str {
    if frame.starts_with("data:") {
        frame.split_once(',').map_or(frame, |(_, data)| data)
    } else {
        frame
    }
}

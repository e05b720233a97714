use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Reserved `results` key under which the backend publishes tracker output.
pub const TRACKING_KEY: &str = "tracking";

/// One bounding box produced by a detection model, in source-image pixels.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DetectionBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: i64,
    #[serde(default)]
    pub label: String,
}

impl DetectionBox {
    pub fn bbox(&self) -> [f32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

/// Output of a single model for one frame.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ModelResult {
    pub detections: Vec<DetectionBox>,
    #[serde(deserialize_with = "whole_number")]
    pub count: u32,
    pub model: String,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct PositionMeters {
    pub x: f32,
    pub y: f32,
}

/// An object followed across frames by the backend tracker.
///
/// Speed and distance fields are only present when the camera is calibrated
/// and the feature is enabled for the object's class.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TrackedObject {
    #[serde(deserialize_with = "string_or_number")]
    pub track_id: String,
    pub class_name: String,
    #[serde(default)]
    pub class_id: Option<i64>,
    pub bbox: [f32; 4],
    pub centroid: [f32; 2],
    pub confidence: f32,
    /// Age in frames.
    #[serde(default)]
    pub age: u32,
    #[serde(default)]
    pub velocity: [f32; 2],
    #[serde(default)]
    pub speed_px_per_sec: Option<f32>,
    #[serde(default)]
    pub speed_m_per_sec: Option<f32>,
    #[serde(default)]
    pub speed_kmh: Option<f32>,
    #[serde(default)]
    pub distance_traveled: Option<f32>,
    #[serde(default)]
    pub time_in_frame_seconds: Option<f32>,
    #[serde(default)]
    pub time_in_frame_frames: Option<u32>,
    #[serde(default)]
    pub position_meters: Option<PositionMeters>,
    #[serde(default)]
    pub distance_from_camera_m: Option<f32>,
    #[serde(default)]
    pub distance_from_camera_ft: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
pub struct TrackingSummary {
    #[serde(deserialize_with = "whole_number")]
    pub total_tracks: u32,
    #[serde(default, deserialize_with = "whole_number")]
    pub active_tracks: u32,
    #[serde(default)]
    pub class_counts: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TrackingResult {
    pub tracked_objects: BTreeMap<String, TrackedObject>,
    pub summary: TrackingSummary,
}

/// A recognised entry of the `results` map.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultEntry {
    Model(ModelResult),
    Tracking(TrackingResult),
}

/// Shape check for a model result: `detections` array, numeric `count`,
/// string `model`.
pub fn is_model_result(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    obj.get("detections").is_some_and(Value::is_array)
        && obj.get("count").is_some_and(Value::is_number)
        && obj.get("model").is_some_and(Value::is_string)
}

/// Shape check for a tracking result: `tracked_objects` map and a `summary`
/// that carries `total_tracks`.
pub fn is_tracking_result(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    obj.get("tracked_objects").is_some_and(Value::is_object)
        && obj
            .get("summary")
            .and_then(|s| s.get("total_tracks"))
            .is_some_and(Value::is_number)
}

/// Classifies one `results` entry. Unknown shapes, and known shapes whose
/// fields do not deserialize, yield `None`.
pub fn classify(value: Value) -> Option<ResultEntry> {
    if is_model_result(&value) {
        serde_json::from_value(value).ok().map(ResultEntry::Model)
    } else if is_tracking_result(&value) {
        serde_json::from_value(value).ok().map(ResultEntry::Tracking)
    } else {
        None
    }
}

/// The `results` map of an inbound frame message with unrecognised entries
/// already dropped.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Results {
    entries: BTreeMap<String, ResultEntry>,
}

impl Results {
    pub fn from_entries(entries: impl IntoIterator<Item = (String, ResultEntry)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&ResultEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Model results keyed by model name, in name order.
    pub fn models(&self) -> impl Iterator<Item = (&str, &ModelResult)> {
        self.entries.iter().filter_map(|(name, entry)| match entry {
            ResultEntry::Model(m) => Some((name.as_str(), m)),
            ResultEntry::Tracking(_) => None,
        })
    }

    /// Tracker output. Prefers the reserved key, otherwise the first
    /// tracking-shaped entry.
    pub fn tracking(&self) -> Option<&TrackingResult> {
        if let Some(ResultEntry::Tracking(t)) = self.entries.get(TRACKING_KEY) {
            return Some(t);
        }
        self.entries.values().find_map(|entry| match entry {
            ResultEntry::Tracking(t) => Some(t),
            ResultEntry::Model(_) => None,
        })
    }

    pub fn detection_count(&self) -> usize {
        self.models().map(|(_, m)| m.detections.len()).sum()
    }

    pub fn track_count(&self) -> usize {
        self.tracking().map_or(0, |t| t.tracked_objects.len())
    }
}

impl<'de> Deserialize<'de> for Results {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<BTreeMap<String, Value>>::deserialize(deserializer)?.unwrap_or_default();

        let mut entries = BTreeMap::new();
        for (name, value) in raw {
            match classify(value) {
                Some(entry) => {
                    entries.insert(name, entry);
                }
                None => tracing::debug!(key = %name, "Dropping unrecognized result entry"),
            }
        }

        Ok(Self { entries })
    }
}

pub(crate) fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

/// Accepts any JSON number for a count field. Fractions round, negative or
/// non-finite values become zero.
pub(crate) fn whole_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let n = f64::deserialize(deserializer)?;
    if n.is_finite() && n > 0.0 {
        Ok(n.round().min(u32::MAX as f64) as u32)
    } else {
        Ok(0)
    }
}

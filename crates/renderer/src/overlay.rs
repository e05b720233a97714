use annotations::AnnotationRecord;
use schema::TrackedObject;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayKind {
    Detection,
    Track,
}

/// One box to draw over the frame, in source-image pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    pub kind: OverlayKind,
    pub bbox: [f32; 4],
    pub label: String,
    /// Extra lines under the label (age, speed, distance).
    pub details: Vec<String>,
}

impl Overlay {
    pub fn width(&self) -> f32 {
        (self.bbox[2] - self.bbox[0]).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.bbox[3] - self.bbox[1]).max(0.0)
    }
}

/// Builds the overlays for one annotation record. Tracks come first; a
/// detection whose box is exactly a tracked box is left out since the track
/// already shows it.
pub fn build_overlays(record: &AnnotationRecord) -> Vec<Overlay> {
    let mut overlays: Vec<Overlay> = record.tracked.iter().map(track_overlay).collect();

    for entry in &record.detections {
        let bbox = entry.detection.bbox();
        if record.tracked.iter().any(|t| t.bbox == bbox) {
            continue;
        }

        let label = if entry.detection.label.is_empty() {
            entry.model.clone()
        } else {
            entry.detection.label.clone()
        };

        overlays.push(Overlay {
            kind: OverlayKind::Detection,
            bbox,
            label: format!("{} {:.0}%", label, entry.detection.confidence * 100.0),
            details: Vec::new(),
        });
    }

    overlays
}

fn track_overlay(track: &TrackedObject) -> Overlay {
    let mut details = Vec::new();

    match track.time_in_frame_seconds {
        Some(secs) => details.push(format!("{:.1}s", secs)),
        None => details.push(format!("age {}", track.age)),
    }

    if let Some(kmh) = track.speed_kmh {
        details.push(format!("{:.1} km/h", kmh));
    } else if let Some(px) = track.speed_px_per_sec {
        details.push(format!("{:.0} px/s", px));
    }

    if let Some(m) = track.distance_from_camera_m {
        details.push(format!("{:.1} m", m));
    }

    Overlay {
        kind: OverlayKind::Track,
        bbox: track.bbox,
        label: format!("#{} {}", track.track_id, track.class_name),
        details,
    }
}

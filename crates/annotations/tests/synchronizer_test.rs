use annotations::{AnnotationBuffer, AnnotationRecord};
use schema::ServerMessage;
use serde_json::json;
use std::time::{Duration, Instant};

fn frame_message(ts: u64, boxes: usize, tracks: usize) -> ServerMessage {
    let detections: Vec<_> = (0..boxes)
        .map(|i| {
            json!({
                "x1": i as f32, "y1": 0.0, "x2": i as f32 + 10.0, "y2": 10.0,
                "confidence": 0.8, "class_id": 0, "label": "person"
            })
        })
        .collect();

    let tracked: serde_json::Map<String, serde_json::Value> = (0..tracks)
        .map(|i| {
            (
                i.to_string(),
                json!({
                    "track_id": i.to_string(), "class_name": "person",
                    "bbox": [0.0, 0.0, 10.0, 10.0], "centroid": [5.0, 5.0],
                    "confidence": 0.9, "age": 3, "velocity": [0.0, 0.0]
                }),
            )
        })
        .collect();

    let payload = json!({
        "camera_id": "cam-7",
        "timestamp": ts,
        "calibrated": false,
        "results": {
            "face_detection": {"detections": detections, "count": boxes, "model": "face_detection", "error": null},
            "tracking": {"tracked_objects": tracked, "summary": {"total_tracks": tracks, "active_tracks": tracks}}
        }
    });

    ServerMessage::parse(&serde_json::to_vec(&payload).unwrap()).unwrap()
}

/// Records extracted from inbound messages are matched back to the frame
/// they describe, even when they arrive out of order.
#[test]
fn test_records_from_messages_match_their_frames() {
    let mut buffer = AnnotationBuffer::new(30, Duration::from_millis(500));
    let now = Instant::now();

    for (ts, boxes, tracks) in [
        (1_700_000_002_000u64, 2, 1),
        (1_700_000_001_000, 1, 0),
        (1_700_000_003_000, 3, 2),
    ] {
        let msg = frame_message(ts, boxes, tracks);
        let frame = msg.as_frame().expect("frame message");
        buffer.insert(AnnotationRecord::from_message(frame, now));
    }

    let hit = buffer.nearest(1_700_000_002_100).expect("record within tolerance");
    assert_eq!(hit.server_ts_ms, 1_700_000_002_000);
    assert_eq!(hit.detections.len(), 2);
    assert_eq!(hit.detections[0].model, "face_detection");
    assert_eq!(hit.tracked.len(), 1);

    assert!(buffer.nearest(1_700_000_010_000).is_none());
}

/// A tracking entry missing `summary.total_tracks` is dropped during
/// decoding and contributes no tracked objects.
#[test]
fn test_malformed_tracking_is_excluded() {
    let payload = json!({
        "camera_id": "cam-7",
        "timestamp": 1_700_000_000_000u64,
        "results": {
            "tracking": {"tracked_objects": {}, "summary": {"active_tracks": 0}}
        }
    });

    let msg = ServerMessage::parse(&serde_json::to_vec(&payload).unwrap()).unwrap();
    let frame = msg.as_frame().expect("frame message");
    assert!(frame.results.tracking().is_none());

    let record = AnnotationRecord::from_message(frame, Instant::now());
    assert!(record.tracked.is_empty());
    assert!(record.is_empty());
}

/// Timestamps in seconds are normalized before matching.
#[test]
fn test_second_resolution_timestamps_are_normalized() {
    let msg = frame_message(1_700_000_000, 1, 0);
    let record = AnnotationRecord::from_message(msg.as_frame().unwrap(), Instant::now());
    assert_eq!(record.server_ts_ms, 1_700_000_000_000);
}

use crate::errors::{CodecError, check_len};
use crate::reader::Reader;
use bytes::{BufMut, Bytes, BytesMut};
use std::time::{SystemTime, UNIX_EPOCH};

/// Camera-scoped frame message used by the per-camera endpoints.
///
/// Distinct from [`crate::FrameRequest`]: the timestamp is milliseconds and
/// little-endian, and the camera is named inline.
///
/// ```text
/// u32 LE  timestamp, milliseconds since the epoch (low 32 bits)
/// u8      camera id length, camera id bytes
/// ..      payload bytes to the end of the buffer
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraHandshake {
    pub timestamp_ms: u32,
    pub camera_id: String,
    pub payload: Bytes,
}

impl CameraHandshake {
    pub fn new(camera_id: impl Into<String>, timestamp: SystemTime, payload: impl Into<Bytes>) -> Self {
        let millis = timestamp
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);

        Self {
            // Wraps every ~49.7 days; the receiver only compares nearby values.
            timestamp_ms: millis as u32,
            camera_id: camera_id.into(),
            payload: payload.into(),
        }
    }

    pub fn encode(&self) -> Result<Bytes, CodecError> {
        let id_len = check_len("camera id", self.camera_id.len())?;

        let mut buf = BytesMut::with_capacity(4 + 1 + self.camera_id.len() + self.payload.len());
        buf.put_u32_le(self.timestamp_ms);
        buf.put_u8(id_len);
        buf.put_slice(self.camera_id.as_bytes());
        buf.put_slice(&self.payload);
        Ok(buf.freeze())
    }

    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        let mut reader = Reader::new(buf);
        let timestamp_ms = reader.u32_le("timestamp")?;
        let camera_id = reader.short_string("camera id")?;

        Ok(Self {
            timestamp_ms,
            camera_id,
            payload: Bytes::copy_from_slice(reader.rest()),
        })
    }
}

use crate::errors::{CodecError, check_len};
use crate::reader::Reader;
use bytes::{BufMut, Bytes, BytesMut};
use std::time::{SystemTime, UNIX_EPOCH};

/// A model the backend should run on the frame, optionally restricted to a
/// set of class names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRequest {
    pub name: String,
    pub classes: Option<Vec<String>>,
}

/// Raw frame plus the models to run on it.
///
/// Layout (big-endian):
///
/// ```text
/// u32  timestamp, whole seconds since the epoch
/// u8   model count
/// per model:
///   u8   name length, name bytes
///   u8   has class filter (0/1)
///   if 1: u8 class count, per class: u8 length, bytes
/// ..   image bytes to the end of the buffer
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRequest {
    pub timestamp_secs: u32,
    pub models: Vec<ModelRequest>,
    pub image: Bytes,
}

impl FrameRequest {
    pub fn new(timestamp: SystemTime, image: impl Into<Bytes>) -> Self {
        let secs = timestamp
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Self {
            timestamp_secs: secs as u32,
            models: Vec::new(),
            image: image.into(),
        }
    }

    pub fn with_model(mut self, name: impl Into<String>, classes: Option<Vec<String>>) -> Self {
        self.models.push(ModelRequest {
            name: name.into(),
            classes,
        });
        self
    }

    /// Validates every length prefix, then writes the whole message. Nothing
    /// is produced when a field overflows.
    pub fn encode(&self) -> Result<Bytes, CodecError> {
        let model_count = check_len("model list", self.models.len())?;

        let mut header_len = 4 + 1;
        for model in &self.models {
            check_len("model name", model.name.len())?;
            header_len += 1 + model.name.len() + 1;
            if let Some(classes) = &model.classes {
                check_len("class list", classes.len())?;
                header_len += 1;
                for class in classes {
                    check_len("class name", class.len())?;
                    header_len += 1 + class.len();
                }
            }
        }

        let mut buf = BytesMut::with_capacity(header_len + self.image.len());
        buf.put_u32(self.timestamp_secs);
        buf.put_u8(model_count);

        for model in &self.models {
            buf.put_u8(model.name.len() as u8);
            buf.put_slice(model.name.as_bytes());
            match &model.classes {
                None => buf.put_u8(0),
                Some(classes) => {
                    buf.put_u8(1);
                    buf.put_u8(classes.len() as u8);
                    for class in classes {
                        buf.put_u8(class.len() as u8);
                        buf.put_slice(class.as_bytes());
                    }
                }
            }
        }

        buf.put_slice(&self.image);
        Ok(buf.freeze())
    }

    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        let mut reader = Reader::new(buf);

        let timestamp_secs = reader.u32_be("timestamp")?;
        let model_count = reader.u8("model count")?;

        let mut models = Vec::with_capacity(model_count as usize);
        for _ in 0..model_count {
            let name = reader.short_string("model name")?;
            let classes = match reader.u8("class filter flag")? {
                0 => None,
                1 => {
                    let count = reader.u8("class count")?;
                    let mut classes = Vec::with_capacity(count as usize);
                    for _ in 0..count {
                        classes.push(reader.short_string("class name")?);
                    }
                    Some(classes)
                }
                other => return Err(CodecError::InvalidFlag(other)),
            };
            models.push(ModelRequest { name, classes });
        }

        Ok(Self {
            timestamp_secs,
            models,
            image: Bytes::copy_from_slice(reader.rest()),
        })
    }
}

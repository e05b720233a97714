//! Binary layouts for messages pushed from the client to the analytics
//! backend.
//!
//! Every variable-length field except the trailing image is prefixed with a
//! single length byte, so names and lists are capped at 255. Oversized input
//! is rejected with [`CodecError::EncodingOverflow`] instead of being
//! truncated.

pub mod errors;
pub mod frame_request;
pub mod handshake;
mod reader;

pub use errors::CodecError;
pub use frame_request::{FrameRequest, ModelRequest};
pub use handshake::CameraHandshake;

/// Largest value a one-byte length prefix can carry.
pub const MAX_FIELD_LEN: usize = u8::MAX as usize;

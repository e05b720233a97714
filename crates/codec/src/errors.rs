use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("{field} has length {len}, at most 255 fits the wire format")]
    EncodingOverflow { field: &'static str, len: usize },

    #[error("Buffer ended while reading {0}")]
    Truncated(&'static str),

    #[error("Invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    #[error("Invalid class filter flag: {0}")]
    InvalidFlag(u8),
}

/// Rejects lengths that do not fit a one-byte prefix.
pub(crate) fn check_len(field: &'static str, len: usize) -> Result<u8, CodecError> {
    u8::try_from(len).map_err(|_| CodecError::EncodingOverflow { field, len })
}

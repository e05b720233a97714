use crate::transport::TransportError;
use codec::CodecError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Gave up on {endpoint} after {attempts} reconnect attempts")]
    ReconnectExhausted { endpoint: String, attempts: u32 },

    #[error("Encoding failed: {0}")]
    Encoding(#[from] CodecError),

    #[error("No connection for {0}")]
    UnknownEndpoint(String),

    #[error("Send queue for {endpoint} is full ({capacity} messages)")]
    Backpressure { endpoint: String, capacity: usize },
}

//! Connection pool that keeps at most one live socket per stream endpoint and
//! fans its messages out to any number of subscribers.
//!
//! The pool is a plain value: construct one [`Pool`] at the application root
//! and hand clones to whatever needs to subscribe.

pub mod errors;
mod metrics;
pub mod pool;
pub mod reconnect;
pub mod subscriber;
pub mod transport;

pub use errors::PoolError;
pub use pool::{ConnectionState, DEFAULT_SEND_QUEUE, Pool, PoolConfig, Subscription};
pub use reconnect::ReconnectPolicy;
pub use subscriber::{ErrorCallback, FrameCallback, Priority, SubscriberId, SubscriberInfo};
pub use transport::{Connector, TransportError, WireMessage, WsConnector, WsSocket};

/// Per-camera socket URL exposed by the analytics backend.
pub fn endpoint_for_camera(base_url: &str, camera_id: &str) -> String {
    format!("{}/ws/camera/{}", base_url.trim_end_matches('/'), camera_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url_is_built_from_base() {
        assert_eq!(
            endpoint_for_camera("ws://localhost:8000/", "cam-1"),
            "ws://localhost:8000/ws/camera/cam-1"
        );
        assert_eq!(
            endpoint_for_camera("ws://10.0.0.5:8000", "42"),
            "ws://10.0.0.5:8000/ws/camera/42"
        );
    }
}

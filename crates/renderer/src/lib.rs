//! Per-tile camera feed rendering on top of the connection pool.
//!
//! A [`FeedRenderer`] subscribes to one camera endpoint, keeps recent
//! annotations in an [`annotations::AnnotationBuffer`] and paints each
//! decoded frame with the overlays nearest to its server timestamp.

pub mod config;
pub mod errors;
pub mod feed;
mod metrics;
pub mod overlay;
pub mod state;
pub mod surface;
pub mod telemetry;

pub use config::FeedConfig;
pub use errors::RenderError;
pub use feed::{FeedRenderer, latency_ms};
pub use overlay::{Overlay, OverlayKind, build_overlays};
pub use state::{TileEvent, TileState, TileStateContext};
pub use surface::{ImageSurface, Label, Surface};
pub use telemetry::FeedTelemetry;

use crate::config::FeedConfig;
use crate::errors::RenderError;
use crate::metrics::RenderMetrics;
use crate::overlay::build_overlays;
use crate::state::{TileEvent, TileState, TileStateContext};
use crate::surface::Surface;
use crate::telemetry::FeedTelemetry;
use annotations::{AnnotationBuffer, AnnotationRecord};
use image::RgbaImage;
use opentelemetry::KeyValue;
use pool::{Connector, Pool, PoolError, Priority, SubscriberId, Subscription};
use schema::{InboundMessage, ServerMessage};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;

/// Renders one camera tile: subscribes to the camera's endpoint, keeps the
/// annotation buffer, decodes frames off the socket task and paints them
/// with overlays onto a [`Surface`].
///
/// A mounted tile holds a pool subscription only while it is visible.
pub struct FeedRenderer<S: Surface> {
    tile: Arc<Tile<S>>,
    /// Present between mount and unmount.
    binding: Option<Binding>,
}

type Attach = Box<dyn Fn() -> Attached + Send + Sync>;

struct Binding {
    attach: Attach,
    attached: Option<Attached>,
}

struct Attached {
    subscription: Subscription,
    cancel: CancellationToken,
}

static NEXT_TILE: AtomicU64 = AtomicU64::new(1);

struct Tile<S> {
    config: FeedConfig,
    subscriber_id: SubscriberId,
    inner: Mutex<TileInner>,
    surface: Mutex<S>,
    decodes_in_flight: AtomicUsize,
    metrics: RenderMetrics,
}

struct TileInner {
    state: TileStateContext,
    telemetry: FeedTelemetry,
    annotations: AnnotationBuffer,
    visible: bool,
    show_overlays: bool,
    /// Sequence number of the last frame message received.
    received_seq: u64,
    /// Sequence number of the frame currently on the surface.
    painted_seq: u64,
    /// Last painted frame and its server timestamp, for overlay repaints.
    last_frame: Option<(u64, Arc<RgbaImage>)>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Receipt wall clock minus server timestamp. `None` without a usable
/// server timestamp.
pub fn latency_ms(server_ts_ms: u64, now: SystemTime) -> Option<u64> {
    if server_ts_ms == 0 {
        return None;
    }
    let now_ms = now.duration_since(UNIX_EPOCH).ok()?.as_millis() as u64;
    Some(now_ms.saturating_sub(server_ts_ms))
}

fn decode_frame(bytes: &[u8]) -> Result<RgbaImage, RenderError> {
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}

impl<S: Surface> FeedRenderer<S> {
    pub fn new(config: FeedConfig, surface: S) -> Self {
        let subscriber_id = match &config.subscriber_id {
            Some(id) => SubscriberId::new(id.clone()),
            None => SubscriberId::new(format!(
                "feed-{}-{}",
                config.camera_id,
                NEXT_TILE.fetch_add(1, Ordering::Relaxed)
            )),
        };
        let telemetry = FeedTelemetry::new(config.camera_id.clone());
        let inner = TileInner {
            state: TileStateContext::new(),
            telemetry,
            annotations: AnnotationBuffer::new(config.annotation_capacity, config.annotation_tolerance),
            visible: config.visible,
            show_overlays: config.show_overlays,
            received_seq: 0,
            painted_seq: 0,
            last_frame: None,
        };

        Self {
            tile: Arc::new(Tile {
                config,
                subscriber_id,
                inner: Mutex::new(inner),
                surface: Mutex::new(surface),
                decodes_in_flight: AtomicUsize::new(0),
                metrics: RenderMetrics::new(),
            }),
            binding: None,
        }
    }

    /// Binds the tile to `pool` and subscribes if the tile is visible.
    /// Mounting a mounted tile does nothing. Must be called from within a
    /// Tokio runtime.
    pub fn mount<C: Connector>(&mut self, pool: &Pool<C>) {
        if self.binding.is_some() {
            return;
        }

        let visible = self.tile.lock_inner().visible;
        let config = &self.tile.config;
        tracing::info!(
            camera_id = %config.camera_id,
            endpoint = %config.endpoint,
            subscriber = %self.tile.subscriber_id,
            priority = config.priority.as_str(),
            visible,
            "Mounting feed"
        );

        let attach: Attach = {
            let tile = Arc::clone(&self.tile);
            let pool = pool.clone();
            Box::new(move || tile.attach(&pool))
        };
        let attached = if visible { Some(attach()) } else { None };

        self.binding = Some(Binding { attach, attached });
    }

    /// Tears the tile down: late callbacks and pending decodes become
    /// no-ops, the subscription is released and the buffer cleared.
    pub fn unmount(&mut self) {
        let Some(binding) = self.binding.take() else {
            return;
        };

        if let Some(attached) = binding.attached {
            self.tile.detach(attached);
        }

        tracing::info!(camera_id = %self.tile.config.camera_id, "Feed unmounted");
    }

    pub fn is_mounted(&self) -> bool {
        self.binding.is_some()
    }

    /// True while the tile holds a pool subscription.
    pub fn is_subscribed(&self) -> bool {
        self.binding.as_ref().is_some_and(|b| b.attached.is_some())
    }

    /// Hiding a mounted tile releases its subscription and neutralizes
    /// pending decodes. Showing it again subscribes afresh.
    pub fn set_visible(&mut self, visible: bool) {
        {
            let mut inner = self.tile.lock_inner();
            if inner.visible == visible {
                return;
            }
            inner.visible = visible;
        }
        tracing::debug!(camera_id = %self.tile.config.camera_id, visible, "Visibility changed");

        let Some(binding) = self.binding.as_mut() else {
            return;
        };
        if visible {
            if binding.attached.is_none() {
                binding.attached = Some((binding.attach)());
            }
        } else if let Some(attached) = binding.attached.take() {
            self.tile.detach(attached);
        }
    }

    /// Toggles overlays and repaints the current frame with the new setting.
    pub fn set_show_overlays(&self, show: bool) {
        let subscribed = self.is_subscribed();
        let mut inner = self.tile.lock_inner();
        if inner.show_overlays == show {
            return;
        }
        inner.show_overlays = show;

        if subscribed && let Some((server_ts_ms, frame)) = inner.last_frame.clone() {
            self.tile.paint(&inner, &frame, server_ts_ms);
        }
    }

    pub fn state(&self) -> TileState {
        self.tile.lock_inner().state.current_state().clone()
    }

    pub fn telemetry(&self) -> FeedTelemetry {
        self.tile.lock_inner().telemetry.clone()
    }

    pub fn config(&self) -> &FeedConfig {
        &self.tile.config
    }

    pub fn subscriber_id(&self) -> &SubscriberId {
        &self.tile.subscriber_id
    }

    pub fn with_surface<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&lock(&self.tile.surface))
    }
}

impl<S: Surface> Drop for FeedRenderer<S> {
    fn drop(&mut self) {
        self.unmount();
    }
}

impl<S: Surface> Tile<S> {
    fn lock_inner(&self) -> MutexGuard<'_, TileInner> {
        lock(&self.inner)
    }

    fn attach<C: Connector>(self: &Arc<Self>, pool: &Pool<C>) -> Attached {
        let cancel = CancellationToken::new();
        self.apply(TileEvent::Mounted);

        let on_frame = {
            let tile = Arc::clone(self);
            let cancel = cancel.clone();
            move |message: Arc<ServerMessage>| -> anyhow::Result<()> {
                if cancel.is_cancelled() {
                    return Ok(());
                }
                tile.on_message(&message, &cancel);
                Ok(())
            }
        };

        let on_error = {
            let tile = Arc::clone(self);
            let cancel = cancel.clone();
            move |error: &PoolError| {
                if cancel.is_cancelled() {
                    return;
                }
                tile.on_pool_error(error);
            }
        };

        let subscription = pool.subscribe(
            &self.config.endpoint,
            self.subscriber_id.clone(),
            on_frame,
            on_error,
            self.config.priority,
        );

        Attached {
            subscription,
            cancel,
        }
    }

    /// Cancels under the tile lock, so no decode can paint once this
    /// returns.
    fn detach(&self, attached: Attached) {
        {
            let mut inner = self.lock_inner();
            attached.cancel.cancel();
            inner.annotations.clear();
            inner.last_frame = None;
            Self::transition(&self.config.camera_id, &mut inner, TileEvent::Unmounted);
        }
        attached.subscription.unsubscribe();
    }

    fn apply(&self, event: TileEvent) {
        let mut inner = self.lock_inner();
        Self::transition(&self.config.camera_id, &mut inner, event);
    }

    fn transition(camera_id: &str, inner: &mut TileInner, event: TileEvent) {
        if let Some(state) = inner.state.update(event) {
            tracing::info!(camera_id, state = state.as_str(), "Tile state changed");
            inner.telemetry.state = state;
        }
    }

    fn on_message(self: &Arc<Self>, message: &ServerMessage, cancel: &CancellationToken) {
        match message {
            ServerMessage::Frame(frame) => self.on_frame(frame, cancel),
            ServerMessage::Status(status) => {
                tracing::debug!(
                    camera_id = %self.config.camera_id,
                    status = %status.status,
                    stream_type = status.stream_type.as_deref(),
                    "Backend status"
                );
                self.apply(TileEvent::Status);
            }
            ServerMessage::Error(error) => {
                tracing::warn!(camera_id = %self.config.camera_id, error = %error.error, "Backend error");
                self.apply(TileEvent::BackendError(error.error.clone()));
            }
        }
    }

    fn on_pool_error(&self, error: &PoolError) {
        tracing::warn!(camera_id = %self.config.camera_id, error = %error, "Stream error");
        self.apply(TileEvent::PoolError(error.to_string()));
    }

    fn on_frame(self: &Arc<Self>, frame: &InboundMessage, cancel: &CancellationToken) {
        let received_at = Instant::now();
        let server_ts_ms = frame.timestamp_ms();
        let record = AnnotationRecord::from_message(frame, received_at);
        let image = frame.image_bytes();

        let (seq, visible) = {
            let mut inner = self.lock_inner();
            if cancel.is_cancelled() {
                return;
            }

            let telemetry = &mut inner.telemetry;
            telemetry.frames_received += 1;
            telemetry.last_frame_at = Some(received_at);
            telemetry.latency_ms = latency_ms(server_ts_ms, SystemTime::now());
            telemetry.detection_count = record.detections.len();
            telemetry.track_count = record.tracked.len();

            inner.annotations.insert(record);

            let event = match (&image, &frame.error) {
                (None, Some(error)) => TileEvent::BackendError(error.clone()),
                _ => TileEvent::Frame,
            };
            Self::transition(&self.config.camera_id, &mut inner, event);

            inner.received_seq += 1;
            (inner.received_seq, inner.visible)
        };

        // Annotation-only message.
        let Some(image) = image else {
            return;
        };

        if !visible {
            self.drop_frame("hidden");
            return;
        }

        let bytes = match image {
            Ok(bytes) => bytes,
            Err(e) => {
                self.decode_failed(&RenderError::from(e));
                return;
            }
        };

        if self.config.priority == Priority::Low && self.decodes_in_flight.load(Ordering::Acquire) > 0 {
            self.drop_frame("busy");
            return;
        }
        self.decodes_in_flight.fetch_add(1, Ordering::AcqRel);

        let tile = Arc::clone(self);
        let cancel = cancel.clone();
        let job = move || {
            let result = decode_frame(&bytes);
            tile.finish_decode(seq, server_ts_ms, result, &cancel);
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(job);
            }
            Err(_) => job(),
        }
    }

    fn finish_decode(
        &self,
        seq: u64,
        server_ts_ms: u64,
        result: Result<RgbaImage, RenderError>,
        cancel: &CancellationToken,
    ) {
        self.decodes_in_flight.fetch_sub(1, Ordering::AcqRel);

        if cancel.is_cancelled() {
            tracing::trace!(camera_id = %self.config.camera_id, seq, "Discarding decode after unmount");
            return;
        }

        let frame = match result {
            Ok(frame) => Arc::new(frame),
            Err(e) => {
                self.decode_failed(&e);
                return;
            }
        };

        let _span = common::span!("paint_frame", camera_id = %self.config.camera_id, seq);

        let mut inner = self.lock_inner();
        if cancel.is_cancelled() {
            tracing::trace!(camera_id = %self.config.camera_id, seq, "Discarding decode after detach");
            return;
        }
        if seq <= inner.painted_seq {
            drop(inner);
            self.drop_frame("superseded");
            return;
        }

        inner.painted_seq = seq;
        inner.last_frame = Some((server_ts_ms, Arc::clone(&frame)));
        self.paint(&inner, &frame, server_ts_ms);
        inner.telemetry.frames_painted += 1;

        self.metrics
            .frames_painted
            .add(1, &[KeyValue::new("camera_id", self.config.camera_id.clone())]);
    }

    /// Draws `frame` and, when enabled, the annotations nearest to its
    /// server timestamp.
    fn paint(&self, inner: &TileInner, frame: &RgbaImage, server_ts_ms: u64) {
        let overlays = if inner.show_overlays {
            inner
                .annotations
                .nearest(server_ts_ms)
                .map(build_overlays)
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        let mut surface = lock(&self.surface);
        let (width, height) = frame.dimensions();
        if surface.size() != (width, height) {
            tracing::debug!(camera_id = %self.config.camera_id, width, height, "Resizing surface");
            surface.resize(width, height);
        }

        surface.draw_image(frame);
        for overlay in &overlays {
            surface.draw_overlay(overlay);
        }
    }

    fn drop_frame(&self, reason: &'static str) {
        self.lock_inner().telemetry.frames_dropped += 1;
        self.metrics.frames_dropped.add(
            1,
            &[
                KeyValue::new("camera_id", self.config.camera_id.clone()),
                KeyValue::new("reason", reason),
            ],
        );
        tracing::trace!(camera_id = %self.config.camera_id, reason, "Frame dropped");
    }

    fn decode_failed(&self, error: &RenderError) {
        self.metrics
            .decode_failures
            .add(1, &[KeyValue::new("camera_id", self.config.camera_id.clone())]);
        tracing::warn!(camera_id = %self.config.camera_id, error = %error, "Dropping undecodable frame");
        self.drop_frame("decode");
    }
}

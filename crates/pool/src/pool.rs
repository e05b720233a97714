use crate::errors::PoolError;
use crate::metrics::PoolMetrics;
use crate::reconnect::ReconnectPolicy;
use crate::subscriber::{
    ErrorCallback, FrameCallback, Priority, Registration, SubscriberId, SubscriberInfo,
};
use crate::transport::{Connector, TransportError, WireMessage};
use codec::{CameraHandshake, FrameRequest};
use futures::{SinkExt, StreamExt};
use opentelemetry::KeyValue;
use schema::ServerMessage;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Outbound messages buffered per endpoint before sends are refused.
pub const DEFAULT_SEND_QUEUE: usize = 16;

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub reconnect: ReconnectPolicy,
    /// Capacity of each endpoint's outbound queue. Raised to 1 if zero.
    pub send_queue: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectPolicy::default(),
            send_queue: DEFAULT_SEND_QUEUE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Opening the socket (first time or after a reconnect delay).
    Connecting,
    Open,
    /// Closed unexpectedly; waiting out the reconnect delay.
    Reconnecting,
}

/// Multiplexes subscribers onto one socket per endpoint URL.
///
/// Cloning is cheap and every clone shares the same endpoint table. All
/// methods must be called from within a Tokio runtime.
pub struct Pool<C: Connector> {
    shared: Arc<Shared>,
    connector: Arc<C>,
}

impl<C: Connector> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            connector: Arc::clone(&self.connector),
        }
    }
}

/// Handle returned by [`Pool::subscribe`]. Dropping it does not
/// unsubscribe; call [`Subscription::unsubscribe`].
pub struct Subscription {
    shared: Weak<Shared>,
    endpoint: String,
    subscriber_id: SubscriberId,
    registration: u64,
    released: AtomicBool,
}

impl Subscription {
    /// Removes this registration. Calling it again does nothing.
    pub fn unsubscribe(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(shared) = self.shared.upgrade() {
            shared.unsubscribe(&self.endpoint, &self.subscriber_id, self.registration);
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn subscriber_id(&self) -> &SubscriberId {
        &self.subscriber_id
    }
}

struct Endpoint {
    generation: u64,
    subscribers: Vec<Registration>,
    state: ConnectionState,
    reconnect_attempts: u32,
    last_message: Option<Arc<ServerMessage>>,
    outbound: mpsc::Sender<WireMessage>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct Shared {
    config: PoolConfig,
    endpoints: Mutex<HashMap<String, Endpoint>>,
    /// Connection tasks of removed endpoints that may still be closing their
    /// socket. A new connection to the same URL waits for them.
    draining: Mutex<HashMap<String, JoinHandle<()>>>,
    next_id: AtomicU64,
    metrics: PoolMetrics,
}

enum CloseOutcome {
    Retry(u32),
    Stop,
}

enum PumpOutcome {
    Closed,
    Cancelled,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Callbacks never run under these locks, so poisoning can only come from
    // a panic inside pool bookkeeping; the data is still consistent.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<C: Connector> Pool<C> {
    pub fn new(config: PoolConfig, connector: C) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                endpoints: Mutex::new(HashMap::new()),
                draining: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                metrics: PoolMetrics::new(),
            }),
            connector: Arc::new(connector),
        }
    }

    /// Registers `subscriber_id` on `endpoint`, opening the socket if this is
    /// the first subscriber.
    ///
    /// Re-subscribing an id that is already registered is a no-op that
    /// returns a fresh handle to the existing registration. A new subscriber
    /// on an endpoint that has already seen a frame receives that cached
    /// frame before this call returns.
    pub fn subscribe<F, E>(
        &self,
        endpoint: &str,
        subscriber_id: impl Into<SubscriberId>,
        on_frame: F,
        on_error: E,
        priority: Priority,
    ) -> Subscription
    where
        F: Fn(Arc<ServerMessage>) -> anyhow::Result<()> + Send + Sync + 'static,
        E: Fn(&PoolError) + Send + Sync + 'static,
    {
        let subscriber_id = subscriber_id.into();
        let on_frame: FrameCallback = Arc::new(on_frame);
        let on_error: ErrorCallback = Arc::new(on_error);

        let (registration, replay) = {
            let mut endpoints = lock(&self.shared.endpoints);

            let entry = match endpoints.entry(endpoint.to_string()) {
                Entry::Occupied(occupied) => occupied.into_mut(),
                Entry::Vacant(vacant) => {
                    let created = self.open_endpoint(endpoint);
                    vacant.insert(created)
                }
            };

            if let Some(existing) = entry.subscribers.iter().find(|s| s.id == subscriber_id) {
                tracing::debug!(
                    endpoint,
                    subscriber = %subscriber_id,
                    "Subscriber already registered"
                );
                (existing.registration, None)
            } else {
                let registration = Registration {
                    id: subscriber_id.clone(),
                    registration: self.shared.next_id(),
                    priority,
                    on_frame,
                    on_error,
                    active: Arc::new(AtomicBool::new(true)),
                };
                let replay = entry
                    .last_message
                    .clone()
                    .map(|message| (registration.clone(), message));
                let id = registration.registration;
                entry.subscribers.push(registration);

                tracing::info!(
                    endpoint,
                    subscriber = %subscriber_id,
                    priority = priority.as_str(),
                    subscribers = entry.subscribers.len(),
                    "Subscriber added"
                );
                (id, replay)
            }
        };

        if let Some((target, message)) = replay {
            self.shared.deliver_frame(endpoint, &target, &message);
        }

        Subscription {
            shared: Arc::downgrade(&self.shared),
            endpoint: endpoint.to_string(),
            subscriber_id,
            registration,
            released: AtomicBool::new(false),
        }
    }

    /// Encodes `request` and queues it on the endpoint's socket. Encoding
    /// errors are returned before anything is queued.
    pub fn send_frame(&self, endpoint: &str, request: &FrameRequest) -> Result<(), PoolError> {
        let encoded = request.encode()?;
        self.send(endpoint, WireMessage::Binary(encoded))
    }

    /// Same as [`Pool::send_frame`] for the camera-scoped message kind.
    pub fn send_handshake(&self, endpoint: &str, message: &CameraHandshake) -> Result<(), PoolError> {
        let encoded = message.encode()?;
        self.send(endpoint, WireMessage::Binary(encoded))
    }

    /// Queues a raw message. Messages queued while reconnecting are sent
    /// once the socket is back. A full queue refuses the message with
    /// [`PoolError::Backpressure`] instead of growing.
    pub fn send(&self, endpoint: &str, message: WireMessage) -> Result<(), PoolError> {
        let endpoints = lock(&self.shared.endpoints);
        let entry = endpoints
            .get(endpoint)
            .ok_or_else(|| PoolError::UnknownEndpoint(endpoint.to_string()))?;
        entry.outbound.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                self.shared
                    .metrics
                    .sends_refused
                    .add(1, &[KeyValue::new("endpoint", endpoint.to_string())]);
                tracing::debug!(endpoint, state = ?entry.state, "Send queue full");
                PoolError::Backpressure {
                    endpoint: endpoint.to_string(),
                    capacity: entry.outbound.max_capacity(),
                }
            }
            mpsc::error::TrySendError::Closed(_) => PoolError::UnknownEndpoint(endpoint.to_string()),
        })
    }

    pub fn endpoint_count(&self) -> usize {
        lock(&self.shared.endpoints).len()
    }

    pub fn subscriber_count(&self, endpoint: &str) -> usize {
        lock(&self.shared.endpoints)
            .get(endpoint)
            .map_or(0, |e| e.subscribers.len())
    }

    pub fn subscribers(&self, endpoint: &str) -> Vec<SubscriberInfo> {
        lock(&self.shared.endpoints)
            .get(endpoint)
            .map(|e| e.subscribers.iter().map(Registration::info).collect())
            .unwrap_or_default()
    }

    pub fn connection_state(&self, endpoint: &str) -> Option<ConnectionState> {
        lock(&self.shared.endpoints).get(endpoint).map(|e| e.state)
    }

    pub fn reconnect_attempts(&self, endpoint: &str) -> Option<u32> {
        lock(&self.shared.endpoints)
            .get(endpoint)
            .map(|e| e.reconnect_attempts)
    }

    /// Most recent frame message seen on the endpoint.
    pub fn last_message(&self, endpoint: &str) -> Option<Arc<ServerMessage>> {
        lock(&self.shared.endpoints)
            .get(endpoint)
            .and_then(|e| e.last_message.clone())
    }

    /// Spawns the connection task for a new endpoint. Called with the
    /// endpoint table locked.
    fn open_endpoint(&self, endpoint: &str) -> Endpoint {
        let generation = self.shared.next_id();
        let (outbound, outbound_rx) = mpsc::channel(self.shared.config.send_queue.max(1));
        let cancel = CancellationToken::new();
        let previous = lock(&self.shared.draining).remove(endpoint);

        let task = tokio::spawn(run_connection(
            Arc::clone(&self.shared),
            Arc::clone(&self.connector),
            endpoint.to_string(),
            generation,
            outbound_rx,
            cancel.clone(),
            previous,
        ));

        tracing::info!(endpoint, generation, "Opening endpoint");

        Endpoint {
            generation,
            subscribers: Vec::new(),
            state: ConnectionState::Connecting,
            reconnect_attempts: 0,
            last_message: None,
            outbound,
            cancel,
            task,
        }
    }
}

impl Shared {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn unsubscribe(&self, endpoint: &str, subscriber_id: &SubscriberId, registration: u64) {
        let removed = {
            let mut endpoints = lock(&self.endpoints);
            let Some(entry) = endpoints.get_mut(endpoint) else {
                return;
            };
            let Some(pos) = entry
                .subscribers
                .iter()
                .position(|s| s.id == *subscriber_id && s.registration == registration)
            else {
                return;
            };

            entry.subscribers.remove(pos).deactivate();
            tracing::info!(
                endpoint,
                subscriber = %subscriber_id,
                subscribers = entry.subscribers.len(),
                "Subscriber removed"
            );

            if entry.subscribers.is_empty() {
                endpoints.remove(endpoint)
            } else {
                None
            }
        };

        if let Some(entry) = removed {
            tracing::info!(endpoint, "Last subscriber left, closing socket");
            entry.cancel.cancel();
            let mut draining = lock(&self.draining);
            draining.retain(|_, task| !task.is_finished());
            draining.insert(endpoint.to_string(), entry.task);
        }
    }

    /// Runs `f` against the endpoint if it still belongs to `generation`.
    fn with_endpoint<R>(
        &self,
        endpoint: &str,
        generation: u64,
        f: impl FnOnce(&mut Endpoint) -> R,
    ) -> Option<R> {
        let mut endpoints = lock(&self.endpoints);
        endpoints
            .get_mut(endpoint)
            .filter(|e| e.generation == generation)
            .map(f)
    }

    fn set_state(&self, endpoint: &str, generation: u64, state: ConnectionState) -> bool {
        self.with_endpoint(endpoint, generation, |e| e.state = state)
            .is_some()
    }

    fn on_open(&self, endpoint: &str, generation: u64) -> bool {
        self.with_endpoint(endpoint, generation, |e| {
            if e.reconnect_attempts > 0 {
                tracing::info!(endpoint, attempts = e.reconnect_attempts, "Reconnected");
            } else {
                tracing::info!(endpoint, "Connected");
            }
            e.state = ConnectionState::Open;
            e.reconnect_attempts = 0;
        })
        .is_some()
    }

    fn on_closed(&self, endpoint: &str, generation: u64) -> CloseOutcome {
        let exhausted = {
            let mut endpoints = lock(&self.endpoints);
            let Some(entry) = endpoints
                .get_mut(endpoint)
                .filter(|e| e.generation == generation)
            else {
                return CloseOutcome::Stop;
            };

            entry.reconnect_attempts += 1;
            let attempt = entry.reconnect_attempts;

            if self.config.reconnect.should_retry(attempt) {
                entry.state = ConnectionState::Reconnecting;
                self.metrics
                    .reconnects
                    .add(1, &[KeyValue::new("endpoint", endpoint.to_string())]);
                tracing::warn!(
                    endpoint,
                    attempt,
                    max_attempts = self.config.reconnect.max_attempts,
                    delay_ms = self.config.reconnect.delay_for_attempt(attempt).as_millis() as u64,
                    "Connection lost, scheduling reconnect"
                );
                return CloseOutcome::Retry(attempt);
            }

            endpoints.remove(endpoint)
        };

        if let Some(entry) = exhausted {
            let attempts = entry.reconnect_attempts - 1;
            tracing::error!(
                endpoint,
                attempts,
                subscribers = entry.subscribers.len(),
                "Reconnect attempts exhausted, dropping endpoint"
            );
            let error = PoolError::ReconnectExhausted {
                endpoint: endpoint.to_string(),
                attempts,
            };
            for subscriber in &entry.subscribers {
                self.deliver_error(endpoint, subscriber, &error);
                subscriber.deactivate();
            }
        }

        CloseOutcome::Stop
    }

    /// Parses `payload` once and broadcasts it to a snapshot of the
    /// subscriber list.
    fn dispatch(&self, endpoint: &str, generation: u64, payload: &[u8]) {
        let message = match ServerMessage::parse(payload) {
            Ok(message) => Arc::new(message),
            Err(e) => {
                self.metrics
                    .decode_errors
                    .add(1, &[KeyValue::new("endpoint", endpoint.to_string())]);
                tracing::warn!(endpoint, error = %e, bytes = payload.len(), "Dropping undecodable message");
                return;
            }
        };

        let snapshot = self.with_endpoint(endpoint, generation, |e| {
            if matches!(*message, ServerMessage::Frame(_)) {
                e.last_message = Some(Arc::clone(&message));
            }
            e.subscribers.clone()
        });

        let Some(subscribers) = snapshot else {
            return;
        };

        self.metrics
            .messages
            .add(1, &[KeyValue::new("endpoint", endpoint.to_string())]);

        for subscriber in &subscribers {
            self.deliver_frame(endpoint, subscriber, &message);
        }
    }

    fn broadcast_error(&self, endpoint: &str, generation: u64, error: &PoolError) {
        let Some(subscribers) = self.with_endpoint(endpoint, generation, |e| e.subscribers.clone())
        else {
            return;
        };
        for subscriber in &subscribers {
            self.deliver_error(endpoint, subscriber, error);
        }
    }

    fn deliver_frame(&self, endpoint: &str, subscriber: &Registration, message: &Arc<ServerMessage>) {
        if !subscriber.is_active() {
            return;
        }

        let outcome = catch_unwind(AssertUnwindSafe(|| (subscriber.on_frame)(Arc::clone(message))));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.metrics.callback_failures.add(1, &[]);
                tracing::warn!(endpoint, subscriber = %subscriber.id, error = %e, "Subscriber frame callback failed");
            }
            Err(_) => {
                self.metrics.callback_failures.add(1, &[]);
                tracing::error!(endpoint, subscriber = %subscriber.id, "Subscriber frame callback panicked");
            }
        }
    }

    fn deliver_error(&self, endpoint: &str, subscriber: &Registration, error: &PoolError) {
        if !subscriber.is_active() {
            return;
        }

        if catch_unwind(AssertUnwindSafe(|| (subscriber.on_error)(error))).is_err() {
            self.metrics.callback_failures.add(1, &[]);
            tracing::error!(endpoint, subscriber = %subscriber.id, "Subscriber error callback panicked");
        }
    }
}

/// Owns the socket for one endpoint generation: connects, pumps messages,
/// and reconnects until cancelled or out of attempts.
async fn run_connection<C: Connector>(
    shared: Arc<Shared>,
    connector: Arc<C>,
    endpoint: String,
    generation: u64,
    mut outbound: mpsc::Receiver<WireMessage>,
    cancel: CancellationToken,
    previous: Option<JoinHandle<()>>,
) {
    if let Some(previous) = previous {
        // Keep "one socket per URL" strict while the old socket closes.
        let _ = previous.await;
    }

    loop {
        if !shared.set_state(&endpoint, generation, ConnectionState::Connecting) {
            return;
        }

        let connected = tokio::select! {
            _ = cancel.cancelled() => return,
            result = connector.connect(&endpoint) => result,
        };

        match connected {
            Ok(socket) => {
                if !shared.on_open(&endpoint, generation) {
                    return;
                }
                match pump(&shared, &endpoint, generation, socket, &mut outbound, &cancel).await {
                    PumpOutcome::Cancelled => return,
                    PumpOutcome::Closed => {
                        tracing::warn!(endpoint = %endpoint, "Socket closed by peer");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(endpoint = %endpoint, error = %e, "Connect failed");
            }
        }

        let attempt = match shared.on_closed(&endpoint, generation) {
            CloseOutcome::Retry(attempt) => attempt,
            CloseOutcome::Stop => return,
        };

        let delay = shared.config.reconnect.delay_for_attempt(attempt);
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

async fn pump<S>(
    shared: &Shared,
    endpoint: &str,
    generation: u64,
    socket: S,
    outbound: &mut mpsc::Receiver<WireMessage>,
    cancel: &CancellationToken,
) -> PumpOutcome
where
    S: futures::Stream<Item = Result<WireMessage, TransportError>>
        + futures::Sink<WireMessage, Error = TransportError>
        + Unpin,
{
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                if let Err(e) = sink.send(WireMessage::Close).await {
                    tracing::debug!(endpoint, error = %e, "Close frame not delivered");
                }
                let _ = sink.close().await;
                return PumpOutcome::Cancelled;
            }
            Some(message) = outbound.recv() => {
                if let Err(e) = sink.send(message).await {
                    tracing::warn!(endpoint, error = %e, "Failed to send message");
                }
            }
            item = stream.next() => match item {
                Some(Ok(WireMessage::Text(text))) => shared.dispatch(endpoint, generation, text.as_bytes()),
                Some(Ok(WireMessage::Binary(data))) => shared.dispatch(endpoint, generation, &data),
                Some(Ok(WireMessage::Close)) | None => return PumpOutcome::Closed,
                Some(Err(e)) => {
                    tracing::warn!(endpoint, error = %e, "Transport error");
                    shared.broadcast_error(endpoint, generation, &PoolError::Transport(e));
                }
            },
        }
    }
}

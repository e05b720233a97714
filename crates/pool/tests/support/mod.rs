#![allow(dead_code)]

use futures::channel::mpsc;
use futures::{Sink, Stream};
use pool::{Connector, TransportError, WireMessage};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

type Inbound = Result<WireMessage, TransportError>;

#[derive(Default)]
struct MockState {
    connects: AtomicUsize,
    open: AtomicUsize,
    max_open: AtomicUsize,
    refuse: AtomicBool,
    /// Server side of the most recent socket per URL.
    links: Mutex<HashMap<String, mpsc::UnboundedSender<Inbound>>>,
    /// Everything the client wrote, per URL, across reconnects.
    sent: Mutex<HashMap<String, Vec<WireMessage>>>,
}

/// In-memory connector. Each URL behaves like a server whose latest socket
/// can be fed messages, errors and closes from the test.
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<MockState>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Sockets currently alive (not yet dropped by the pool).
    pub fn open(&self) -> usize {
        self.state.open.load(Ordering::SeqCst)
    }

    pub fn max_open(&self) -> usize {
        self.state.max_open.load(Ordering::SeqCst)
    }

    /// While set, every connect attempt fails.
    pub fn refuse(&self, refuse: bool) {
        self.state.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn push_json(&self, url: &str, value: &Value) -> bool {
        self.push(url, Ok(WireMessage::Text(value.to_string())))
    }

    pub fn push_text(&self, url: &str, text: &str) -> bool {
        self.push(url, Ok(WireMessage::Text(text.to_string())))
    }

    pub fn push_error(&self, url: &str, message: &str) -> bool {
        self.push(url, Err(TransportError::Socket(message.to_string())))
    }

    /// Closes the current socket from the server side.
    pub fn close(&self, url: &str) -> bool {
        let link = self.state.links.lock().unwrap().remove(url);
        match link {
            Some(tx) => {
                let delivered = tx.unbounded_send(Ok(WireMessage::Close)).is_ok();
                tx.close_channel();
                delivered
            }
            None => false,
        }
    }

    pub fn sent(&self, url: &str) -> Vec<WireMessage> {
        self.state
            .sent
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_default()
    }

    fn push(&self, url: &str, item: Inbound) -> bool {
        match self.state.links.lock().unwrap().get(url) {
            Some(tx) => tx.unbounded_send(item).is_ok(),
            None => false,
        }
    }
}

impl Connector for MockConnector {
    type Socket = MockSocket;

    fn connect(&self, url: &str) -> impl Future<Output = Result<MockSocket, TransportError>> + Send {
        let state = Arc::clone(&self.state);
        let url = url.to_string();

        async move {
            state.connects.fetch_add(1, Ordering::SeqCst);
            if state.refuse.load(Ordering::SeqCst) {
                return Err(TransportError::Connect(format!("{} refused", url)));
            }

            let (tx, rx) = mpsc::unbounded();
            state.links.lock().unwrap().insert(url.clone(), tx);

            let open = state.open.fetch_add(1, Ordering::SeqCst) + 1;
            state.max_open.fetch_max(open, Ordering::SeqCst);

            Ok(MockSocket {
                url,
                inbound: rx,
                state,
            })
        }
    }
}

pub struct MockSocket {
    url: String,
    inbound: mpsc::UnboundedReceiver<Inbound>,
    state: Arc<MockState>,
}

impl Drop for MockSocket {
    fn drop(&mut self) {
        self.state.open.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Stream for MockSocket {
    type Item = Inbound;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inbound).poll_next(cx)
    }
}

impl Sink<WireMessage> for MockSocket {
    type Error = TransportError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: WireMessage) -> Result<(), Self::Error> {
        self.state
            .sent
            .lock()
            .unwrap()
            .entry(self.url.clone())
            .or_default()
            .push(item);
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}

/// Lets spawned tasks run until they block.
pub async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

/// Polls `condition`, advancing (paused) time in small steps.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

pub fn frame_json(camera_id: &str, timestamp_ms: u64) -> Value {
    serde_json::json!({
        "camera_id": camera_id,
        "timestamp": timestamp_ms,
        "calibrated": false,
        "results": {}
    })
}

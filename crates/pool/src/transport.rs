use bytes::Bytes;
use futures::{Sink, Stream};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Failed to connect: {0}")]
    Connect(String),

    #[error("Socket error: {0}")]
    Socket(String),
}

/// Transport-neutral socket message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    Text(String),
    Binary(Bytes),
    Close,
}

/// Opens sockets for the pool. The seam between pool logic and the network.
pub trait Connector: Send + Sync + 'static {
    type Socket: Stream<Item = Result<WireMessage, TransportError>>
        + Sink<WireMessage, Error = TransportError>
        + Send
        + Unpin
        + 'static;

    fn connect(&self, url: &str) -> impl Future<Output = Result<Self::Socket, TransportError>> + Send;
}

/// WebSocket connector backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    type Socket = WsSocket;

    fn connect(&self, url: &str) -> impl Future<Output = Result<WsSocket, TransportError>> + Send {
        let url = url.to_string();
        async move {
            let (stream, response) = connect_async(url.as_str())
                .await
                .map_err(|e| TransportError::Connect(e.to_string()))?;

            tracing::debug!(url = %url, status = %response.status(), "WebSocket handshake complete");

            Ok(WsSocket { inner: stream })
        }
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A tungstenite stream speaking [`WireMessage`]. Ping/pong frames are
/// handled by tungstenite and never surface here.
pub struct WsSocket {
    inner: WsStream,
}

impl Stream for WsSocket {
    type Item = Result<WireMessage, TransportError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            let next = ready!(Pin::new(&mut self.inner).poll_next(cx));
            let mapped = match next {
                None => return Poll::Ready(None),
                Some(Err(e)) => Err(TransportError::Socket(e.to_string())),
                Some(Ok(Message::Text(text))) => Ok(WireMessage::Text(text)),
                Some(Ok(Message::Binary(data))) => Ok(WireMessage::Binary(Bytes::from(data))),
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!(?frame, "Peer sent close frame");
                    Ok(WireMessage::Close)
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
            };
            return Poll::Ready(Some(mapped));
        }
    }
}

impl Sink<WireMessage> for WsSocket {
    type Error = TransportError;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.inner)
            .poll_ready(cx)
            .map_err(|e| TransportError::Socket(e.to_string()))
    }

    fn start_send(mut self: Pin<&mut Self>, item: WireMessage) -> Result<(), Self::Error> {
        let message = match item {
            WireMessage::Text(text) => Message::Text(text),
            WireMessage::Binary(data) => Message::Binary(data.to_vec()),
            WireMessage::Close => Message::Close(None),
        };
        Pin::new(&mut self.inner)
            .start_send(message)
            .map_err(|e| TransportError::Socket(e.to_string()))
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.inner)
            .poll_flush(cx)
            .map_err(|e| TransportError::Socket(e.to_string()))
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Pin::new(&mut self.inner)
            .poll_close(cx)
            .map_err(|e| TransportError::Socket(e.to_string()))
    }
}

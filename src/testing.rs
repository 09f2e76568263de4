//! Reusable test utilities for exercising the connection manager without a
//! real socket.
//!
//! [`MockTransport`] hands every `connect()` call to the paired
//! [`MockServer`] as a fresh [`MockConnection`], so tests can drive multiple
//! connection epochs: answer the first handshake, drop the socket, observe
//! the re-announcement on the second.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures_util::Sink;
use tokio::sync::{mpsc, watch};

use crate::core::{BufferConfig, ConnectionState, RealtimeError, ReconnectStrategy, WsFrame};
use crate::transport::{TransportConnectFuture, WsTransport};

/// In-memory transport paired with a [`MockServer`].
#[derive(Clone)]
pub struct MockTransport {
    conn_tx: mpsc::UnboundedSender<MockConnection>,
    fail_budget: Arc<AtomicUsize>,
}

impl MockTransport {
    /// Build a transport + server control pair.
    pub fn channel_pair() -> (Self, MockServer) {
        let (conn_tx, conn_rx) = mpsc::unbounded_channel();
        let fail_budget = Arc::new(AtomicUsize::new(0));
        (
            Self {
                conn_tx,
                fail_budget: fail_budget.clone(),
            },
            MockServer {
                conn_rx,
                fail_budget,
            },
        )
    }
}

impl WsTransport for MockTransport {
    type Reader = MockReader;
    type Writer = MockWriter;

    fn connect(
        &self,
        url: String,
        _buffers: BufferConfig,
    ) -> TransportConnectFuture<Self::Reader, Self::Writer> {
        let conn_tx = self.conn_tx.clone();
        let fail_budget = self.fail_budget.clone();
        Box::pin(async move {
            if fail_budget
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(RealtimeError::ConnectionFailed(
                    "mock handshake refused".to_string(),
                ));
            }

            let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<WsFrame>();
            let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<WsFrame>();
            conn_tx
                .send(MockConnection {
                    url,
                    outbound_rx,
                    inbound_tx: Some(inbound_tx),
                })
                .map_err(|_| {
                    RealtimeError::ConnectionFailed("mock server dropped".to_string())
                })?;
            Ok((
                MockReader { rx: inbound_rx },
                MockWriter { tx: outbound_tx },
            ))
        })
    }
}

/// Error surface for [`MockConnection`] operations.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum MockServerError {
    /// The inbound socket side was intentionally dropped.
    SocketDropped,
    /// The client side is no longer receiving inbound frames.
    ChannelClosed,
}

impl std::fmt::Display for MockServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MockServerError::SocketDropped => f.write_str("mock socket already dropped"),
            MockServerError::ChannelClosed => f.write_str("mock client channel is closed"),
        }
    }
}

impl std::error::Error for MockServerError {}

/// Server-side control handle paired with [`MockTransport`].
pub struct MockServer {
    conn_rx: mpsc::UnboundedReceiver<MockConnection>,
    fail_budget: Arc<AtomicUsize>,
}

impl MockServer {
    /// Wait for the client's next handshake, panicking after `timeout`.
    pub async fn accept(&mut self, timeout: Duration) -> MockConnection {
        tokio::time::timeout(timeout, self.conn_rx.recv())
            .await
            .expect("timed out waiting for mock connection")
            .expect("mock transport dropped")
    }

    /// Refuse the next `n` handshakes with a connection error.
    pub fn fail_next_connects(&self, n: usize) {
        self.fail_budget.store(n, Ordering::SeqCst);
    }

    /// A handshake that is already waiting, without blocking.
    pub fn try_next_connection(&mut self) -> Option<MockConnection> {
        self.conn_rx.try_recv().ok()
    }
}

/// One accepted socket, as seen from the server side.
pub struct MockConnection {
    pub url: String,
    outbound_rx: mpsc::UnboundedReceiver<WsFrame>,
    inbound_tx: Option<mpsc::UnboundedSender<WsFrame>>,
}

impl MockConnection {
    /// Receive a frame written by the client.
    pub async fn recv_outbound(&mut self) -> Option<WsFrame> {
        self.outbound_rx.recv().await
    }

    /// Receive a frame with a timeout; `None` when nothing arrived.
    pub async fn recv_outbound_timeout(&mut self, timeout: Duration) -> Option<WsFrame> {
        tokio::time::timeout(timeout, self.outbound_rx.recv())
            .await
            .unwrap_or_default()
    }

    /// Push an inbound frame to the client.
    pub fn send_inbound(&self, frame: WsFrame) -> Result<(), MockServerError> {
        let Some(tx) = self.inbound_tx.as_ref() else {
            return Err(MockServerError::SocketDropped);
        };
        tx.send(frame).map_err(|_| MockServerError::ChannelClosed)
    }

    /// Push a UTF-8 payload as a websocket text frame.
    pub fn send_text(&self, text: impl AsRef<str>) -> Result<(), MockServerError> {
        self.send_inbound(WsFrame::Text(Bytes::copy_from_slice(
            text.as_ref().as_bytes(),
        )))
    }

    /// Send a close frame with the given code, then drop the socket.
    pub fn close_with(&mut self, code: u16) -> Result<(), MockServerError> {
        self.send_inbound(WsFrame::close(code, Bytes::new()))?;
        self.drop_socket();
        Ok(())
    }

    /// Simulate an unclean server-side drop: the client reader sees EOF.
    pub fn drop_socket(&mut self) {
        self.inbound_tx = None;
    }
}

/// Reader side for [`MockTransport`].
pub struct MockReader {
    rx: mpsc::UnboundedReceiver<WsFrame>,
}

impl futures_util::Stream for MockReader {
    type Item = Result<WsFrame, RealtimeError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match Pin::new(&mut self.rx).poll_recv(cx) {
            Poll::Ready(Some(frame)) => Poll::Ready(Some(Ok(frame))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Writer side for [`MockTransport`].
pub struct MockWriter {
    tx: mpsc::UnboundedSender<WsFrame>,
}

impl Sink<WsFrame> for MockWriter {
    type Error = RealtimeError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: WsFrame) -> Result<(), Self::Error> {
        self.get_mut()
            .tx
            .send(item)
            .map_err(|_| RealtimeError::Transport {
                context: "mock_transport_write",
                error: "mock outbound channel closed".to_string(),
            })
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}

/// Reconnect strategy that never retries.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoReconnect;

impl ReconnectStrategy for NoReconnect {
    fn next_delay(&mut self) -> Duration {
        Duration::from_secs(24 * 60 * 60)
    }

    fn reset(&mut self) {}

    fn should_retry(&self) -> bool {
        false
    }

    fn attempts(&self) -> u32 {
        0
    }
}

/// Reconnect strategy with a fixed delay, for tests that need fast retries.
#[derive(Clone, Copy, Debug)]
pub struct FixedReconnect {
    pub delay: Duration,
    attempts: u32,
}

impl FixedReconnect {
    pub fn new(delay: Duration) -> Self {
        Self { delay, attempts: 0 }
    }
}

impl ReconnectStrategy for FixedReconnect {
    fn next_delay(&mut self) -> Duration {
        self.attempts = self.attempts.saturating_add(1);
        self.delay
    }

    fn reset(&mut self) {
        self.attempts = 0;
    }

    fn should_retry(&self) -> bool {
        true
    }

    fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Block until `rx` observes `want`, panicking after `timeout`.
pub async fn await_state(
    rx: &mut watch::Receiver<ConnectionState>,
    want: ConnectionState,
    timeout: Duration,
) {
    tokio::time::timeout(timeout, rx.wait_for(|state| *state == want))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {want:?}"))
        .expect("state channel closed");
}

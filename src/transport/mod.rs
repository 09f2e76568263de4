use std::future::Future;
use std::pin::Pin;

use futures_util::{Sink, Stream};

use crate::core::{BufferConfig, RealtimeError, WsFrame};

pub mod tungstenite;

/// Future returned by [`WsTransport::connect`].
pub type TransportConnectFuture<R, W> =
    Pin<Box<dyn Future<Output = Result<(R, W), RealtimeError>> + Send>>;

/// Transport boundary for websocket IO.
///
/// The connection manager owns state and policy; the transport only opens a
/// socket and hands back a frame stream and sink. Keeping this seam minimal
/// lets the state machine run against an in-memory transport in tests.
pub trait WsTransport: Clone + Send + Sync + 'static {
    type Reader: Stream<Item = Result<WsFrame, RealtimeError>> + Send + Unpin + 'static;
    type Writer: Sink<WsFrame, Error = RealtimeError> + Send + Sync + Unpin + 'static;

    fn connect(
        &self,
        url: String,
        buffers: BufferConfig,
    ) -> TransportConnectFuture<Self::Reader, Self::Writer>;
}

//! Thin websocket stream wrapper hiding tungstenite types.
//!
//! Integration tests use this to stand up in-process servers the connection
//! manager can reconnect against; nothing in the client path depends on it.

use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, accept_async as tungstenite_accept,
};

use crate::core::{RealtimeError, WsFrame};
use crate::transport::tungstenite::{frame_to_msg, msg_to_frame};

use futures_util::{SinkExt, StreamExt};

pub struct WsClient {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsClient {
    pub async fn send(&mut self, frame: WsFrame) -> Result<(), RealtimeError> {
        self.inner
            .send(frame_to_msg(frame))
            .await
            .map_err(|err| RealtimeError::Transport {
                context: "write",
                error: err.to_string(),
            })
    }

    pub async fn next(&mut self) -> Option<Result<WsFrame, RealtimeError>> {
        self.inner.next().await.map(|res| {
            res.map(msg_to_frame).map_err(|err| RealtimeError::Transport {
                context: "read",
                error: err.to_string(),
            })
        })
    }
}

/// Accept an incoming websocket connection.
pub async fn accept_async(stream: TcpStream) -> Result<WsClient, RealtimeError> {
    let ws = tungstenite_accept(MaybeTlsStream::Plain(stream))
        .await
        .map_err(|err| RealtimeError::ConnectionFailed(err.to_string()))?;
    Ok(WsClient { inner: ws })
}

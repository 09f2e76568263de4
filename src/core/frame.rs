use bytes::Bytes;

/// Close code the protocol treats as an intentional shutdown. Every other
/// code (or a missing close frame) enters the reconnect flow.
pub const CLOSE_NORMAL: u16 = 1000;

/// Transport-neutral websocket frame.
///
/// Transports convert their native frame representation into/from `WsFrame`;
/// everything above the transport boundary only sees this type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WsFrame {
    Text(Bytes),
    Binary(Bytes),
    Ping(Bytes),
    Pong(Bytes),
    Close(Option<WsCloseFrame>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WsCloseFrame {
    pub code: u16,
    pub reason: Bytes,
}

impl WsFrame {
    #[inline]
    pub fn close(code: u16, reason: Bytes) -> Self {
        Self::Close(Some(WsCloseFrame { code, reason }))
    }

    /// Close frame carrying the normal-closure code.
    #[inline]
    pub fn close_normal() -> Self {
        Self::close(CLOSE_NORMAL, Bytes::from_static(b"client disconnect"))
    }
}

impl WsCloseFrame {
    #[inline]
    pub fn is_normal(&self) -> bool {
        self.code == CLOSE_NORMAL
    }
}

/// Borrow the underlying bytes from frames without allocation.
#[inline]
pub fn frame_bytes(frame: &WsFrame) -> Option<&[u8]> {
    match frame {
        WsFrame::Text(bytes) => Some(bytes.as_ref()),
        WsFrame::Binary(bytes) => Some(bytes.as_ref()),
        WsFrame::Ping(bytes) => Some(bytes.as_ref()),
        WsFrame::Pong(bytes) => Some(bytes.as_ref()),
        WsFrame::Close(_) => None,
    }
}

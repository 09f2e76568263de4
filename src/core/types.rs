use std::time::Duration;

use thiserror::Error;

/// Convenience result alias for realtime-client operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

/// Canonical error surface for the realtime client.
#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("transport error ({context}): {error}")]
    Transport {
        context: &'static str,
        error: String,
    },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("send dropped: connection is {state:?}")]
    NotConnected { state: ConnectionState },

    #[error("reconnect attempts exhausted after {attempts}")]
    ReconnectExhausted { attempts: u32 },

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("actor error: {0}")]
    Actor(String),

    #[error("invalid state: {0}")]
    InvalidState(String),
}

/// Connection lifecycle of one manager instance. Exactly one value holds at
/// any time; transitions never skip a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, kameo::Reply)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

impl ConnectionState {
    #[inline]
    pub fn is_connected(self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// Client tuning knobs, immutable after construction.
///
/// `max_reconnect_attempts: None` retries forever; `Some(n)` transitions to
/// [`ConnectionState::Failed`] once the failure streak reaches `n`.
#[derive(Clone, Copy, Debug)]
pub struct ClientConfig {
    pub reconnect_interval: Duration,
    pub max_reconnect_interval: Duration,
    pub reconnect_decay: f64,
    pub max_reconnect_attempts: Option<u32>,
    pub ping_interval: Duration,
    pub debug: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            reconnect_interval: Duration::from_secs(1),
            max_reconnect_interval: Duration::from_secs(30),
            reconnect_decay: 1.5,
            max_reconnect_attempts: None,
            ping_interval: Duration::from_secs(30),
            debug: false,
        }
    }
}

/// Who this connection speaks for. Embedded in the connection URL as query
/// parameters; immutable for the life of one connection manager.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionIdentity {
    pub user_id: String,
    pub participant_id: Option<String>,
    pub token: Option<String>,
}

impl SessionIdentity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            participant_id: None,
            token: None,
        }
    }

    pub fn with_participant(mut self, participant_id: impl Into<String>) -> Self {
        self.participant_id = Some(participant_id.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// Transport-independent buffer sizing. Progress frames are small; the
/// defaults cap a misbehaving server long before memory pressure.
#[derive(Clone, Copy, Debug)]
pub struct BufferConfig {
    pub max_message_bytes: usize,
    pub max_frame_bytes: usize,
    pub write_buffer_bytes: usize,
    pub max_write_buffer_bytes: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_message_bytes: 1 << 20,
            max_frame_bytes: 1 << 20,
            write_buffer_bytes: 64 << 10,
            max_write_buffer_bytes: 128 << 10,
        }
    }
}

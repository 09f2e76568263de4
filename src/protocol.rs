//! Wire protocol for the progress feed: JSON text frames tagged by `type`.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::{RealtimeError, RealtimeResult, SessionIdentity, WsFrame};

/// Channel names the server forwards events on.
pub mod channels {
    pub const STEP_UPDATES: &str = "step_updates";
    pub const TOTAL_UPDATES: &str = "total_updates";
    pub const LEADERBOARD_UPDATES: &str = "leaderboard_updates";
    pub const BADGE_UPDATES: &str = "badge_updates";

    pub const ALL: [&str; 4] = [
        STEP_UPDATES,
        TOTAL_UPDATES,
        LEADERBOARD_UPDATES,
        BADGE_UPDATES,
    ];
}

/// Step progress for a single participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepUpdate {
    pub participant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub naam: Option<String>,
    pub steps: u64,
    pub delta: i64,
    pub route: String,
    pub allocated_funds: f64,
    pub timestamp: i64,
}

/// Campaign-wide aggregate. Always a whole-state replacement, never a delta.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TotalUpdate {
    pub total_steps: u64,
    pub year: i32,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub participant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub naam: Option<String>,
    pub steps: u64,
    pub achievement_points: u32,
    pub total_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    pub badge_count: u32,
}

/// Full top-N snapshot. Replaces any previously received leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardUpdate {
    pub top_n: u32,
    pub entries: Vec<LeaderboardEntry>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BadgeEarned {
    pub participant_id: String,
    pub badge_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge_icon: Option<String>,
    pub points: u32,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pong {
    pub timestamp: i64,
}

/// Server→client envelope, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    StepUpdate(StepUpdate),
    TotalUpdate(TotalUpdate),
    LeaderboardUpdate(LeaderboardUpdate),
    BadgeEarned(BadgeEarned),
    Pong(Pong),
}

/// Dispatch key for application messages. `pong` is control traffic and has
/// no kind; connection-state changes ride a separate watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    StepUpdate,
    TotalUpdate,
    LeaderboardUpdate,
    BadgeEarned,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::StepUpdate => "step_update",
            MessageKind::TotalUpdate => "total_update",
            MessageKind::LeaderboardUpdate => "leaderboard_update",
            MessageKind::BadgeEarned => "badge_earned",
        }
    }
}

impl ServerMessage {
    pub fn kind(&self) -> Option<MessageKind> {
        match self {
            ServerMessage::StepUpdate(_) => Some(MessageKind::StepUpdate),
            ServerMessage::TotalUpdate(_) => Some(MessageKind::TotalUpdate),
            ServerMessage::LeaderboardUpdate(_) => Some(MessageKind::LeaderboardUpdate),
            ServerMessage::BadgeEarned(_) => Some(MessageKind::BadgeEarned),
            ServerMessage::Pong(_) => None,
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            ServerMessage::StepUpdate(m) => m.timestamp,
            ServerMessage::TotalUpdate(m) => m.timestamp,
            ServerMessage::LeaderboardUpdate(m) => m.timestamp,
            ServerMessage::BadgeEarned(m) => m.timestamp,
            ServerMessage::Pong(m) => m.timestamp,
        }
    }
}

/// Client→server envelope, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe { channels: Vec<String> },
    Unsubscribe { channels: Vec<String> },
    Ping { timestamp: i64 },
}

pub fn decode_server_message(bytes: &[u8]) -> RealtimeResult<ServerMessage> {
    sonic_rs::from_slice(bytes).map_err(|err| RealtimeError::Protocol(err.to_string()))
}

pub fn encode_client_message(message: &ClientMessage) -> RealtimeResult<WsFrame> {
    let bytes =
        sonic_rs::to_vec(message).map_err(|err| RealtimeError::Protocol(err.to_string()))?;
    Ok(WsFrame::Text(bytes.into()))
}

/// Build the connection URL with the session identity as query parameters.
pub fn connect_url(base: &str, identity: &SessionIdentity) -> RealtimeResult<String> {
    let mut url = Url::parse(base).map_err(|err| RealtimeError::InvalidUrl(err.to_string()))?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("user_id", &identity.user_id);
        if let Some(token) = identity.token.as_deref() {
            query.append_pair("token", token);
        }
        if let Some(participant_id) = identity.participant_id.as_deref() {
            query.append_pair("participant_id", participant_id);
        }
    }
    Ok(url.into())
}

/// Current wall-clock time as Unix epoch milliseconds.
pub fn epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|dur| dur.as_millis().min(i64::MAX as u128) as i64)
        .unwrap_or(0)
}

//! Realtime push client for step-challenge progress feeds.
//!
//! One [`session::RealtimeSession`] owns one connection manager actor, which
//! owns one websocket at a time: drops are survived with bounded exponential
//! backoff, the desired channel set is re-announced after every reconnect,
//! and typed server events fan out to per-instance listeners and a read-only
//! snapshot.

pub mod client;
pub mod conn;
pub mod core;
pub mod dispatch;
pub mod protocol;
pub mod session;
pub mod subscriptions;
pub mod supervision;
pub mod testing;
pub mod tls;
pub mod transport;

pub use crate::conn::{ConnectionActor, ConnectionActorArgs, ConnectionEvent};
pub use crate::core::{
    ClientConfig, ConnectionState, RealtimeError, RealtimeResult, SessionIdentity,
};
pub use crate::session::{RealtimeSession, RealtimeSnapshot, SessionRole};

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::protocol::{ClientMessage, epoch_ms};

/// Keep-alive contract for the connection manager.
///
/// The manager sends whatever `create_ping` produces on every keep-alive
/// tick while connected, and feeds echoed pong timestamps back through
/// `on_pong` for RTT sampling. There is deliberately no staleness verdict
/// here: a missed pong never forces a reconnect.
pub trait PingStrategy: Send + 'static {
    fn interval(&self) -> Duration;

    fn create_ping(&mut self) -> ClientMessage;

    /// Match an echoed timestamp against a pending ping; `Some(rtt)` when it
    /// corresponds to one we sent.
    fn on_pong(&mut self, timestamp_ms: i64) -> Option<Duration>;

    /// Pings sent but not yet answered.
    fn pending(&self) -> usize;

    /// Forget in-flight pings, on any transition out of connected.
    fn reset(&mut self);
}

/// Application-level ping carrying an epoch-ms timestamp the server echoes
/// back in its `pong`.
pub struct JsonPingPong {
    interval: Duration,
    pending: HashMap<i64, Instant>,
    max_pending: usize,
}

impl JsonPingPong {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            pending: HashMap::new(),
            max_pending: 8,
        }
    }

    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending.max(1);
        self
    }
}

impl PingStrategy for JsonPingPong {
    fn interval(&self) -> Duration {
        self.interval
    }

    fn create_ping(&mut self) -> ClientMessage {
        // A server that never answers must not grow the pending map without
        // bound; evict the oldest entry instead of suppressing the ping.
        if self.pending.len() >= self.max_pending {
            if let Some(oldest) = self
                .pending
                .iter()
                .min_by_key(|(_, sent)| **sent)
                .map(|(ts, _)| *ts)
            {
                self.pending.remove(&oldest);
            }
        }

        let timestamp = epoch_ms();
        self.pending.insert(timestamp, Instant::now());
        ClientMessage::Ping { timestamp }
    }

    fn on_pong(&mut self, timestamp_ms: i64) -> Option<Duration> {
        self.pending
            .remove(&timestamp_ms)
            .map(|sent| sent.elapsed())
    }

    fn pending(&self) -> usize {
        self.pending.len()
    }

    fn reset(&mut self) {
        self.pending.clear();
    }
}

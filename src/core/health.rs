use std::time::{Duration, Instant};

use hdrhistogram::Histogram;

use super::ring::RingBuffer;

const MAX_RECENT_ERRORS: usize = 100;
const MAX_ERROR_TEXT_BYTES: usize = 512;

#[derive(Debug, Clone)]
struct ProtocolErrorRec {
    _at: Instant,
    _detail: String,
}

fn truncate_detail(s: &str) -> String {
    if s.len() <= MAX_ERROR_TEXT_BYTES {
        return s.to_string();
    }
    let mut end = MAX_ERROR_TEXT_BYTES;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

/// Point-in-time connection statistics snapshot.
#[derive(Clone, Debug, kameo::Reply)]
pub struct ConnectionStats {
    pub uptime: Duration,
    pub messages: u64,
    pub reconnects: u64,
    pub last_message_age: Duration,
    pub recent_protocol_errors: usize,
    pub p50_rtt_us: u64,
    pub p99_rtt_us: u64,
    pub rtt_samples: u64,
}

/// Per-connection health bookkeeping, owned by the connection manager.
#[derive(Debug)]
pub struct HealthMonitor {
    connection_started: Instant,
    last_message_received: Instant,
    message_count: u64,
    reconnect_count: u64,
    protocol_errors: RingBuffer<ProtocolErrorRec>,
    rtt_histogram: Histogram<u64>,
}

impl HealthMonitor {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            connection_started: now,
            last_message_received: now,
            message_count: 0,
            reconnect_count: 0,
            protocol_errors: RingBuffer::new(MAX_RECENT_ERRORS),
            rtt_histogram: Histogram::new_with_bounds(1, 60_000_000, 3)
                .expect("histogram bounds are valid"),
        }
    }

    /// Marks a fresh connection epoch. Counters survive; timestamps restart.
    pub fn reset_epoch(&mut self) {
        let now = Instant::now();
        self.connection_started = now;
        self.last_message_received = now;
    }

    pub fn record_message(&mut self) {
        self.last_message_received = Instant::now();
        self.message_count = self.message_count.saturating_add(1);
    }

    pub fn record_protocol_error(&mut self, detail: &str) {
        self.protocol_errors.push(ProtocolErrorRec {
            _at: Instant::now(),
            _detail: truncate_detail(detail),
        });
    }

    pub fn record_rtt(&mut self, rtt: Duration) {
        let micros = rtt.as_micros().min(u64::MAX as u128) as u64;
        let _ = self.rtt_histogram.record(micros);
    }

    pub fn increment_reconnect(&mut self) {
        self.reconnect_count = self.reconnect_count.saturating_add(1);
    }

    pub fn get_stats(&self) -> ConnectionStats {
        let rtt_samples = self.rtt_histogram.len();
        let (p50, p99) = if rtt_samples == 0 {
            (0, 0)
        } else {
            (
                self.rtt_histogram.value_at_percentile(50.0),
                self.rtt_histogram.value_at_percentile(99.0),
            )
        };

        ConnectionStats {
            uptime: self.connection_started.elapsed(),
            messages: self.message_count,
            reconnects: self.reconnect_count,
            last_message_age: self.last_message_received.elapsed(),
            recent_protocol_errors: self.protocol_errors.len(),
            p50_rtt_us: p50,
            p99_rtt_us: p99,
            rtt_samples,
        }
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

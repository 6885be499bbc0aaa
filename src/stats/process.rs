use std::time::{Duration, Instant};

use crate::network::types::{Direction, ProcessId};
use crate::stats::rate::SlidingWindow;

/// Accounting for one process (or the unknown bucket)
#[derive(Debug, Clone)]
pub struct ProcessStats {
    pub pid: ProcessId,
    pub name: String,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub last_seen: Option<Instant>,
    sent: SlidingWindow,
    received: SlidingWindow,
}

impl ProcessStats {
    pub fn new(pid: ProcessId, name: &str, window: Duration, max_samples: usize) -> Self {
        Self {
            pid,
            name: name.to_string(),
            bytes_sent: 0,
            bytes_received: 0,
            last_seen: None,
            sent: SlidingWindow::with_max_samples(window, max_samples),
            received: SlidingWindow::with_max_samples(window, max_samples),
        }
    }

    /// Add one packet's bytes to the counter and window for `direction`
    pub fn record(&mut self, direction: Direction, timestamp: Instant, bytes: u64) {
        match direction {
            Direction::Upload => {
                self.bytes_sent = self.bytes_sent.saturating_add(bytes);
                self.sent.push(timestamp, bytes);
            }
            Direction::Download => {
                self.bytes_received = self.bytes_received.saturating_add(bytes);
                self.received.push(timestamp, bytes);
            }
        }
        self.last_seen = Some(self.last_seen.map_or(timestamp, |seen| seen.max(timestamp)));
    }

    /// Drop samples that are no longer inside the window ending at `now`
    pub fn prune(&mut self, now: Instant) {
        self.sent.prune(now);
        self.received.prune(now);
    }

    /// Zero counters and windows, keeping identity
    pub fn reset(&mut self) {
        self.bytes_sent = 0;
        self.bytes_received = 0;
        self.last_seen = None;
        self.sent.clear();
        self.received.clear();
    }

    pub fn upload_rate(&self, now: Instant) -> f64 {
        self.sent.rate(now)
    }

    pub fn download_rate(&self, now: Instant) -> f64 {
        self.received.rate(now)
    }

    pub fn total_bytes(&self) -> u64 {
        self.bytes_sent.saturating_add(self.bytes_received)
    }

    /// Number of samples currently held across both windows
    pub fn sample_count(&self) -> usize {
        self.sent.len() + self.received.len()
    }
}

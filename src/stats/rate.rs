use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Default length of the rate window
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(5);

/// Upper bound on retained samples per window.
/// 4000 pps × 5 sec = 20,000 samples; beyond that the oldest are evicted.
pub const DEFAULT_MAX_SAMPLES: usize = 20_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub timestamp: Instant,
    pub bytes: u64,
}

/// Byte samples from the trailing `window`, used to derive a rate on read.
///
/// The rate is the sum of samples in `[now - window, now]` divided by the
/// window length, so a single burst decays linearly to zero as it ages out.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    samples: VecDeque<Sample>,
    window: Duration,
    max_samples: usize,
}

impl SlidingWindow {
    pub fn new(window: Duration) -> Self {
        Self::with_max_samples(window, DEFAULT_MAX_SAMPLES)
    }

    pub fn with_max_samples(window: Duration, max_samples: usize) -> Self {
        Self {
            samples: VecDeque::new(),
            window,
            max_samples: max_samples.max(1),
        }
    }

    /// Record `bytes` at `timestamp` and drop samples that fell out of the window
    pub fn push(&mut self, timestamp: Instant, bytes: u64) {
        self.samples.push_back(Sample { timestamp, bytes });
        self.prune(timestamp);

        while self.samples.len() > self.max_samples {
            self.samples.pop_front();
        }
    }

    /// Remove samples older than `now - window`
    pub fn prune(&mut self, now: Instant) {
        let Some(cutoff) = now.checked_sub(self.window) else {
            return;
        };

        while let Some(oldest) = self.samples.front() {
            if oldest.timestamp < cutoff {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Bytes per second over the window ending at `now`
    pub fn rate(&self, now: Instant) -> f64 {
        let window_secs = self.window.as_secs_f64();
        if window_secs <= 0.0 {
            return 0.0;
        }

        let cutoff = now.checked_sub(self.window);
        let total: u64 = self
            .samples
            .iter()
            .filter(|s| s.timestamp <= now && cutoff.is_none_or(|c| s.timestamp >= c))
            .map(|s| s.bytes)
            .sum();

        total as f64 / window_secs
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_window_rate_is_zero() {
        let window = SlidingWindow::new(Duration::from_secs(5));
        assert_eq!(window.rate(Instant::now()), 0.0);
    }

    #[test]
    fn test_rate_divides_by_window_not_elapsed() {
        let t0 = Instant::now();
        let mut window = SlidingWindow::new(Duration::from_secs(5));
        window.push(t0, 1000);

        let rate = window.rate(t0 + Duration::from_secs(2));
        assert!(
            (rate - 200.0).abs() < 1e-9,
            "1000 bytes over a 5s window should be 200 B/s, got: {}",
            rate
        );
    }

    #[test]
    fn test_rate_decays_to_zero_after_window() {
        let t0 = Instant::now();
        let mut window = SlidingWindow::new(Duration::from_secs(5));
        window.push(t0, 1000);
        window.push(t0 + Duration::from_secs(1), 1000);

        assert!(window.rate(t0 + Duration::from_secs(4)) > 0.0);
        // First sample aged out, second still inside
        assert_eq!(window.rate(t0 + Duration::from_millis(5500)), 200.0);
        assert_eq!(window.rate(t0 + Duration::from_secs(7)), 0.0);
    }

    #[test]
    fn test_push_prunes_expired_samples() {
        let t0 = Instant::now();
        let mut window = SlidingWindow::new(Duration::from_secs(5));
        for i in 0..10 {
            window.push(t0 + Duration::from_secs(i), 100);
        }

        // Samples at t=4..=9 lie within [9-5, 9]
        assert_eq!(window.len(), 6);
        assert!(
            window
                .samples()
                .all(|s| s.timestamp >= t0 + Duration::from_secs(4))
        );
    }

    #[test]
    fn test_prune_on_read_empties_idle_window() {
        let t0 = Instant::now();
        let mut window = SlidingWindow::new(Duration::from_secs(2));
        window.push(t0, 500);

        window.prune(t0 + Duration::from_secs(3));
        assert!(window.is_empty());
    }

    #[test]
    fn test_max_samples_bounds_memory() {
        let t0 = Instant::now();
        let mut window = SlidingWindow::with_max_samples(Duration::from_secs(60), 100);
        for i in 0..1000u64 {
            window.push(t0 + Duration::from_millis(i), 10);
        }
        assert_eq!(window.len(), 100);
    }

    #[test]
    fn test_clear() {
        let t0 = Instant::now();
        let mut window = SlidingWindow::new(Duration::from_secs(5));
        window.push(t0, 1000);
        window.clear();
        assert!(window.is_empty());
        assert_eq!(window.rate(t0), 0.0);
    }
}

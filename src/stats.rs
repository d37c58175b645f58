/// Ingest statistics.
///
/// Counts events, batches, rejected events, and timestamp discontinuities,
/// and tracks the event rate over a sliding window of stream time. Rates are
/// in events per stream-second.
#[derive(Clone, Debug, PartialEq)]
pub struct IngestStats {
    window_s: f64,
    window_start: f64,
    window_count: u64,
    events: u64,
    batches: u64,
    rejected: u64,
    discontinuities: u64,
    peak_rate: f64,
    last_rate: f64,
    initialized: bool,
}

impl Default for IngestStats {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl IngestStats {
    /// Create a tracker computing rates over `window_s` seconds of stream time.
    pub fn new(window_s: f64) -> Self {
        assert!(window_s > 0.0, "window_s must be positive");
        Self {
            window_s,
            window_start: 0.0,
            window_count: 0,
            events: 0,
            batches: 0,
            rejected: 0,
            discontinuities: 0,
            peak_rate: 0.0,
            last_rate: 0.0,
            initialized: false,
        }
    }

    /// Record one applied event at stream time `t`.
    /// Returns the rate if a window boundary was crossed.
    pub fn record_event(&mut self, t: f64) -> Option<f64> {
        self.events += 1;
        self.window_count += 1;

        if !self.initialized {
            self.initialized = true;
            self.window_start = t;
            return None;
        }

        let elapsed = t - self.window_start;
        if elapsed >= self.window_s {
            let rate = self.window_count as f64 / elapsed;
            if rate > self.peak_rate {
                self.peak_rate = rate;
            }
            self.last_rate = rate;
            self.window_start = t;
            self.window_count = 0;
            Some(rate)
        } else {
            None
        }
    }

    pub fn record_batch(&mut self) {
        self.batches += 1;
    }

    pub fn record_rejected(&mut self) {
        self.rejected += 1;
    }

    pub fn record_discontinuity(&mut self) {
        self.discontinuities += 1;
    }

    /// Events applied to the surface.
    pub fn events(&self) -> u64 {
        self.events
    }

    pub fn batches(&self) -> u64 {
        self.batches
    }

    /// Events skipped because their coordinates were outside the frame.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Stamps whose delta was clamped.
    pub fn discontinuities(&self) -> u64 {
        self.discontinuities
    }

    pub fn last_rate(&self) -> f64 {
        self.last_rate
    }

    pub fn peak_rate(&self) -> f64 {
        self.peak_rate
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.window_s);
    }
}

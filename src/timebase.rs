/// Result of advancing the time base by one raw stamp.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeStep {
    /// Elapsed seconds since the previous stamp, never negative.
    pub dt: f64,
    /// Set when the stamp was unusable (out of range or beyond the allowed
    /// gap) and `dt` was clamped to zero.
    pub discontinuity: bool,
}

/// Converts a wrapping hardware timestamp counter into elapsed seconds.
///
/// The counter counts from `0` to `max_stamp` inclusive and then wraps, so
/// forward distances are taken modulo `max_stamp + 1`.
#[derive(Clone, Debug)]
pub struct TimeBase {
    max_stamp: u32,
    tick_seconds: f64,
    max_gap_ticks: Option<u64>,
    prev: Option<u32>,
}

impl TimeBase {
    /// Create a time base for a counter wrapping after `max_stamp`, where one
    /// tick lasts `tick_seconds`.
    pub fn new(max_stamp: u32, tick_seconds: f64) -> Self {
        assert!(max_stamp > 0, "max_stamp must be positive");
        assert!(
            tick_seconds > 0.0 && tick_seconds.is_finite(),
            "tick_seconds must be positive"
        );
        Self {
            max_stamp,
            tick_seconds,
            max_gap_ticks: None,
            prev: None,
        }
    }

    /// Treat forward gaps larger than `ticks` as lost data.
    pub fn with_max_gap(mut self, ticks: Option<u64>) -> Self {
        self.max_gap_ticks = ticks;
        self
    }

    #[inline]
    fn modulus(&self) -> u64 {
        self.max_stamp as u64 + 1
    }

    /// Forward distance in ticks from `prev` to `raw`, modulo `max_stamp + 1`.
    #[inline]
    pub fn ticks_between(&self, raw: u32, prev: u32) -> u64 {
        let m = self.modulus();
        let raw = raw as u64 % m;
        let prev = prev as u64 % m;
        (raw + m - prev) % m
    }

    /// Elapsed seconds from `prev` to `raw`, handling counter wraparound.
    #[inline]
    pub fn advance(&self, raw: u32, prev: u32) -> f64 {
        self.ticks_between(raw, prev) as f64 * self.tick_seconds
    }

    /// Advance from the last stamp seen by this time base.
    ///
    /// The first stamp counts from zero, the counter's reset value.
    pub fn step(&mut self, raw: u32) -> TimeStep {
        if raw > self.max_stamp {
            // Not a counter value; the next stamp measures from the last valid one.
            return TimeStep {
                dt: 0.0,
                discontinuity: true,
            };
        }
        let prev = self.prev.unwrap_or(0);
        self.prev = Some(raw);

        let ticks = self.ticks_between(raw, prev);
        if let Some(max_gap) = self.max_gap_ticks {
            if ticks > max_gap {
                return TimeStep {
                    dt: 0.0,
                    discontinuity: true,
                };
            }
        }
        TimeStep {
            dt: ticks as f64 * self.tick_seconds,
            discontinuity: false,
        }
    }

    /// Last in-range raw stamp passed to [`TimeBase::step`].
    pub fn previous(&self) -> Option<u32> {
        self.prev
    }

    pub fn max_stamp(&self) -> u32 {
        self.max_stamp
    }

    pub fn tick_seconds(&self) -> f64 {
        self.tick_seconds
    }

    /// Forget the previous stamp; the next step counts from zero.
    pub fn reset(&mut self) {
        self.prev = None;
    }
}

//! Convolver configuration

use std::f64::consts::PI;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{ConvError, Result};
use crate::strategy::Strategy;

/// Configuration shared by both strategies.
///
/// Sized and validated once; immutable after a convolver is built from it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvConfig {
    /// Sensor width in pixels.
    pub width: u32,

    /// Sensor height in pixels.
    pub height: u32,

    /// Decay rate in 1/s.
    pub alpha: f64,

    /// Gaussian kernel side length (positive, odd).
    pub kernel_size: usize,

    /// Gaussian spread in pixels.
    pub sigma: f64,

    /// Production rate of the approximate strategy in frames per second.
    pub fps: f64,

    pub strategy: Strategy,

    /// Largest raw timestamp before the hardware counter wraps.
    pub max_stamp: u32,

    /// Duration of one timestamp tick in seconds.
    pub tick_seconds: f64,

    /// Forward gaps above this many ticks are treated as lost data.
    pub max_gap_ticks: Option<u64>,

    /// How long the ingest task blocks on its source before re-checking
    /// for a stop request.
    pub poll_interval_ms: u64,

    /// Emit a per-event accuracy measurement.
    pub accuracy_log: bool,
}

impl Default for ConvConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            alpha: PI,
            kernel_size: 3,
            sigma: 0.3,
            fps: 30.0,
            strategy: Strategy::Approximate,
            max_stamp: i32::MAX as u32,
            tick_seconds: 80e-9,
            max_gap_ticks: None,
            poll_interval_ms: 50,
            accuracy_log: false,
        }
    }
}

impl ConvConfig {
    /// Default parameters for a `width x height` sensor.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_kernel(mut self, size: usize, sigma: f64) -> Self {
        self.kernel_size = size;
        self.sigma = sigma;
        self
    }

    pub fn with_fps(mut self, fps: f64) -> Self {
        self.fps = fps;
        self
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Timestamp counter range and tick duration.
    pub fn with_clock(mut self, max_stamp: u32, tick_seconds: f64) -> Self {
        self.max_stamp = max_stamp;
        self.tick_seconds = tick_seconds;
        self
    }

    pub fn with_max_gap(mut self, ticks: Option<u64>) -> Self {
        self.max_gap_ticks = ticks;
        self
    }

    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_accuracy_log(mut self, enabled: bool) -> Self {
        self.accuracy_log = enabled;
        self
    }

    /// Border added on every side of the surface, `(kernel_size - 1) / 2`.
    pub fn pad_size(&self) -> usize {
        self.kernel_size.saturating_sub(1) / 2
    }

    /// Production period, `1 / fps`. Saturates to `Duration::MAX` for a
    /// frame rate that [`ConvConfig::validate`] would reject.
    pub fn period(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.fps).unwrap_or(Duration::MAX)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Validate configuration. Any error here is fatal: no task may start.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ConvError::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }
        if self.width > crate::MAX_SENSOR_DIM || self.height > crate::MAX_SENSOR_DIM {
            return Err(ConvError::DimensionTooLarge {
                width: self.width,
                height: self.height,
                max: crate::MAX_SENSOR_DIM,
            });
        }
        if self.kernel_size == 0 || self.kernel_size % 2 == 0 {
            return Err(ConvError::InvalidKernelSize(self.kernel_size));
        }
        if !(self.sigma > 0.0 && self.sigma.is_finite()) {
            return Err(ConvError::InvalidSigma(self.sigma));
        }
        if !(self.alpha > 0.0 && self.alpha.is_finite()) {
            return Err(ConvError::InvalidAlpha(self.alpha));
        }
        if !(self.fps > 0.0 && self.fps.is_finite()) {
            return Err(ConvError::InvalidPeriod(self.fps));
        }
        // The production loop schedules deadlines as `Instant + period`.
        let schedulable = Duration::try_from_secs_f64(1.0 / self.fps)
            .ok()
            .and_then(|p| Instant::now().checked_add(p))
            .is_some();
        if !schedulable {
            return Err(ConvError::InvalidPeriod(self.fps));
        }
        if !(self.tick_seconds > 0.0 && self.tick_seconds.is_finite()) {
            return Err(ConvError::InvalidTickPeriod(self.tick_seconds));
        }
        if self.max_stamp == 0 {
            return Err(ConvError::InvalidMaxStamp);
        }
        Ok(())
    }
}

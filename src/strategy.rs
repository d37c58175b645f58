//! The two interchangeable smoothing strategies.

use std::str::FromStr;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::ConvConfig;
use crate::error::Result;
use crate::event::Event;
use crate::frame::OutputFrame;
use crate::ingest::{BatchReport, EventIngestEngine, UpdateMode};
use crate::metrics::Recorder;
use crate::periodic::PeriodicConvolutionEngine;
use crate::state::ConvState;
use crate::stats::IngestStats;

/// Which smoothing strategy a convolver uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Point updates per event, full-frame decay and convolution per period.
    #[default]
    Approximate,
    /// Kernel patch updates per event; no convolution pass.
    Exact,
}

impl Strategy {
    pub fn update_mode(self) -> UpdateMode {
        match self {
            Strategy::Approximate => UpdateMode::Point,
            Strategy::Exact => UpdateMode::Patch,
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Approximate => write!(f, "approximate"),
            Strategy::Exact => write!(f, "exact"),
        }
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "approximate" | "approx" | "lite" => Ok(Strategy::Approximate),
            "exact" | "ref" | "reference" => Ok(Strategy::Exact),
            other => Err(format!("unknown strategy '{}'", other)),
        }
    }
}

/// A decayed, spatially smoothed view of an event stream.
///
/// Callers must not assume whether smoothing happens inline or deferred.
pub trait EventConvolver: Send {
    /// Apply one batch of events in order.
    fn ingest(&mut self, batch: &[Event]) -> BatchReport;

    /// The latest smoothed frame. Two calls with no ingest in between
    /// return identical frames.
    fn current_frame(&self) -> OutputFrame;

    fn strategy(&self) -> Strategy;

    /// Stream time of the last ingested event, in seconds.
    fn global_time(&self) -> f64;

    fn stats(&self) -> &IngestStats;
}

/// Approximate strategy without a timer thread.
///
/// Ingest is O(1) per event. The convolution pass is deferred until a frame
/// is requested: [`EventConvolver::current_frame`] runs one production cycle
/// if events arrived since the previous one. Use [`crate::Pipeline`] to run
/// production on a fixed period instead.
pub struct ApproximateConvolver {
    ingest: EventIngestEngine,
    producer: Mutex<PeriodicConvolutionEngine>,
    state: Arc<ConvState>,
}

impl ApproximateConvolver {
    pub fn new(config: &ConvConfig) -> Result<Self> {
        Self::with_recorder(config, Recorder::disabled())
    }

    pub fn with_recorder(config: &ConvConfig, recorder: Recorder) -> Result<Self> {
        let state = ConvState::new(config, UpdateMode::Point)?;
        Ok(Self {
            ingest: EventIngestEngine::new(state.clone(), config).with_recorder(recorder.clone()),
            producer: Mutex::new(PeriodicConvolutionEngine::new(state.clone()).with_recorder(recorder)),
            state,
        })
    }

    /// Run a production cycle now if one is pending.
    pub fn produce(&self) -> bool {
        self.producer.lock().produce()
    }

    pub fn state(&self) -> &Arc<ConvState> {
        &self.state
    }
}

impl EventConvolver for ApproximateConvolver {
    fn ingest(&mut self, batch: &[Event]) -> BatchReport {
        self.ingest.ingest(batch)
    }

    fn current_frame(&self) -> OutputFrame {
        self.produce();
        self.state.handoff.latest()
    }

    fn strategy(&self) -> Strategy {
        Strategy::Approximate
    }

    fn global_time(&self) -> f64 {
        self.ingest.global_time()
    }

    fn stats(&self) -> &IngestStats {
        self.ingest.stats()
    }
}

/// Exact strategy: every event applies the signed kernel to its patch, so
/// the accumulator is the smoothed image at all times.
///
/// Ingest is O(kernel_size^2) per event; reading a frame only decays the
/// accumulator to the current global time.
pub struct ExactConvolver {
    ingest: EventIngestEngine,
    state: Arc<ConvState>,
}

impl ExactConvolver {
    pub fn new(config: &ConvConfig) -> Result<Self> {
        Self::with_recorder(config, Recorder::disabled())
    }

    pub fn with_recorder(config: &ConvConfig, recorder: Recorder) -> Result<Self> {
        let state = ConvState::new(config, UpdateMode::Patch)?;
        Ok(Self {
            ingest: EventIngestEngine::new(state.clone(), config).with_recorder(recorder),
            state,
        })
    }

    pub fn state(&self) -> &Arc<ConvState> {
        &self.state
    }
}

impl EventConvolver for ExactConvolver {
    fn ingest(&mut self, batch: &[Event]) -> BatchReport {
        self.ingest.ingest(batch)
    }

    fn current_frame(&self) -> OutputFrame {
        self.state.snapshot()
    }

    fn strategy(&self) -> Strategy {
        Strategy::Exact
    }

    fn global_time(&self) -> f64 {
        self.ingest.global_time()
    }

    fn stats(&self) -> &IngestStats {
        self.ingest.stats()
    }
}

/// Build the convolver selected by `config.strategy`.
pub fn build(config: &ConvConfig) -> Result<Box<dyn EventConvolver>> {
    Ok(match config.strategy {
        Strategy::Approximate => Box::new(ApproximateConvolver::new(config)?),
        Strategy::Exact => Box::new(ExactConvolver::new(config)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(strategy: Strategy) -> ConvConfig {
        ConvConfig::new(9, 9)
            .with_kernel(3, 0.8)
            .with_clock(1_000_000, 1e-3)
            .with_alpha(3.0)
            .with_strategy(strategy)
    }

    #[test]
    fn test_parse_strategy() {
        assert_eq!("exact".parse::<Strategy>().unwrap(), Strategy::Exact);
        assert_eq!("Approx".parse::<Strategy>().unwrap(), Strategy::Approximate);
        assert!("fast".parse::<Strategy>().is_err());
        assert_eq!(Strategy::Exact.to_string(), "exact");
    }

    #[test]
    fn test_build_selects_strategy() {
        for s in [Strategy::Approximate, Strategy::Exact] {
            let conv = build(&config(s)).unwrap();
            assert_eq!(conv.strategy(), s);
        }
    }

    #[test]
    fn test_build_rejects_bad_config() {
        assert!(build(&config(Strategy::Exact).with_kernel(2, 1.0)).is_err());
    }

    #[test]
    fn test_isolated_event_strategies_agree() {
        let mut approx = ApproximateConvolver::new(&config(Strategy::Approximate)).unwrap();
        let mut exact = ExactConvolver::new(&config(Strategy::Exact)).unwrap();
        let batch = [Event::new(4, 4, 100, false), Event::new(0, 8, 400, true)];
        approx.ingest(&batch);
        exact.ingest(&batch);
        let a = approx.current_frame();
        let b = exact.current_frame();
        assert_eq!(a.reference_time(), b.reference_time());
        assert!(a.max_abs_diff(&b) < 1e-12, "diff {}", a.max_abs_diff(&b));
    }

    #[test]
    fn test_current_frame_idempotent() {
        for s in [Strategy::Approximate, Strategy::Exact] {
            let mut conv = build(&config(s)).unwrap();
            conv.ingest(&[Event::new(3, 3, 10, true), Event::new(5, 2, 20, false)]);
            let first = conv.current_frame();
            let second = conv.current_frame();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_empty_stream_frame_is_zero() {
        for s in [Strategy::Approximate, Strategy::Exact] {
            let conv = build(&config(s)).unwrap();
            assert_eq!(conv.current_frame().energy(), 0.0);
            assert_eq!(conv.global_time(), 0.0);
        }
    }
}

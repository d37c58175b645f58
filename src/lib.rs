//! Decaying brightness reconstruction for event cameras.
//!
//! Events (per-pixel polarity spikes) are accumulated into an exponentially
//! decaying surface and smoothed with a Gaussian kernel. Two strategies share
//! the same [`EventConvolver`] contract:
//!
//! - **Approximate**: every event is a point update; a production task decays
//!   the whole frame to the current time and convolves it on a fixed period.
//! - **Exact**: every event decays and updates a kernel-sized patch, so the
//!   accumulator is always the smoothed image.
//!
//! ```rust
//! use event_conv::{ConvConfig, Event, EventConvolver, ExactConvolver};
//!
//! let config = ConvConfig::new(32, 32).with_kernel(3, 0.5);
//! let mut conv = ExactConvolver::new(&config).unwrap();
//! conv.ingest(&[Event::new(10, 10, 0, true)]);
//! let frame = conv.current_frame();
//! assert!(frame.get(10, 10) > 0.0);
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod ffi;
pub mod frame;
pub mod handoff;
pub mod ingest;
pub mod kernel;
pub mod metrics;
pub mod periodic;
pub mod pipeline;
pub mod state;
pub mod stats;
pub mod strategy;
pub mod surface;
pub mod timebase;

pub use config::ConvConfig;
pub use error::{ConvError, Result};
pub use event::Event;
pub use frame::OutputFrame;
pub use handoff::{FrameHandoff, StopSignal};
pub use ingest::{BatchReport, EventIngestEngine, UpdateMode};
pub use kernel::Kernel;
pub use metrics::Measurement;
pub use periodic::PeriodicConvolutionEngine;
pub use pipeline::{BatchRead, ChannelSource, EventSource, Pipeline, PipelineSummary, ReplaySource};
pub use state::ConvState;
pub use stats::IngestStats;
pub use strategy::{ApproximateConvolver, EventConvolver, ExactConvolver, Strategy};
pub use surface::DecaySurface;
pub use timebase::{TimeBase, TimeStep};

/// Maximum allowed sensor dimension to prevent excessive memory allocation.
/// 32768 x 32768 = ~8 GB per f64 surface, far beyond any real event sensor.
pub const MAX_SENSOR_DIM: u32 = 32768;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::config::ConvConfig;
use crate::event::Event;
use crate::metrics::{Measurement, Recorder};
use crate::state::ConvState;
use crate::stats::IngestStats;
use crate::timebase::TimeBase;

/// How each event is written into the surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateMode {
    /// Decay and update the event pixel only; smoothing happens later over
    /// the whole frame.
    Point,
    /// Decay and update the kernel-sized patch around the event pixel,
    /// adding the signed kernel.
    Patch,
}

/// Outcome of one ingested batch.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BatchReport {
    /// Events written to the surface.
    pub applied: usize,
    /// Events skipped for out-of-frame coordinates.
    pub rejected: usize,
    /// Events whose time delta was clamped.
    pub discontinuities: usize,
    /// Global time after the batch, in seconds.
    pub global_time: f64,
    /// Wall-clock processing time.
    pub elapsed: Duration,
}

/// Applies event batches, in order, to the shared decay surface.
///
/// The engine is the only writer of the surface and of global time. Events
/// are processed strictly in arrival order: decay depends on the time since
/// each pixel's last update, and overlapping patches must land in temporal
/// order.
pub struct EventIngestEngine {
    state: Arc<ConvState>,
    time_base: TimeBase,
    global_time: f64,
    stats: IngestStats,
    recorder: Recorder,
    accuracy_log: bool,
}

impl EventIngestEngine {
    pub fn new(state: Arc<ConvState>, config: &ConvConfig) -> Self {
        let time_base = TimeBase::new(config.max_stamp, config.tick_seconds)
            .with_max_gap(config.max_gap_ticks);
        let global_time = state.global_time();
        Self {
            state,
            time_base,
            global_time,
            stats: IngestStats::default(),
            recorder: Recorder::disabled(),
            accuracy_log: config.accuracy_log,
        }
    }

    pub fn with_recorder(mut self, recorder: Recorder) -> Self {
        self.recorder = recorder;
        self
    }

    /// Apply one batch. In point mode, signals the handoff once afterwards
    /// if the batch was non-empty.
    pub fn ingest(&mut self, batch: &[Event]) -> BatchReport {
        let start = Instant::now();
        let mut report = BatchReport::default();
        let state = Arc::clone(&self.state);
        let log_accuracy = self.accuracy_log && self.recorder.enabled();

        for ev in batch {
            let step = self.time_base.step(ev.timestamp);
            if step.discontinuity {
                report.discontinuities += 1;
                self.stats.record_discontinuity();
                if self.stats.discontinuities() == 1 {
                    warn!(
                        stamp = ev.timestamp,
                        "timestamp discontinuity, clamping delta to zero (possible upstream data loss)"
                    );
                } else {
                    debug!(stamp = ev.timestamp, "timestamp discontinuity");
                }
            }
            self.global_time += step.dt;
            // Global time moves first so no pixel is ever stamped ahead of it.
            state.global_time.store(self.global_time);

            let (x, y) = (ev.x as usize, ev.y as usize);
            if !state.surface.contains(x, y) {
                report.rejected += 1;
                self.stats.record_rejected();
                trace!(x, y, "event outside frame");
                continue;
            }

            match state.mode {
                UpdateMode::Point => {
                    state
                        .surface
                        .apply_event(x, y, ev.polarity, self.global_time);
                    if log_accuracy {
                        let value = state.handoff.read_pixel(x, y);
                        self.recorder.emit(Measurement::Accuracy {
                            global_time: self.global_time,
                            value,
                            energy: value + ev.sign() * state.kernel.center(),
                        });
                    }
                }
                UpdateMode::Patch => {
                    let energy = state.surface.apply_event_patch(
                        x,
                        y,
                        ev.polarity,
                        self.global_time,
                        &state.kernel,
                    );
                    if log_accuracy {
                        self.recorder.emit(Measurement::Accuracy {
                            global_time: self.global_time,
                            value: state.surface.decayed_value(x, y, self.global_time),
                            energy,
                        });
                    }
                }
            }
            report.applied += 1;
            self.stats.record_event(self.global_time);
        }

        if !batch.is_empty() {
            self.stats.record_batch();
            // Only point updates leave a convolution pass pending.
            if state.mode == UpdateMode::Point {
                state.handoff.signal();
            }
        }

        report.global_time = self.global_time;
        report.elapsed = start.elapsed();
        if !batch.is_empty() {
            self.recorder.emit(Measurement::BatchLatency {
                stream_time: self.global_time,
                events: batch.len(),
                mean_event_seconds: report.elapsed.as_secs_f64() / batch.len() as f64,
            });
        }
        report
    }

    /// Global time after the last ingested event.
    pub fn global_time(&self) -> f64 {
        self.global_time
    }

    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    pub fn into_stats(self) -> IngestStats {
        self.stats
    }

    pub fn state(&self) -> &Arc<ConvState> {
        &self.state
    }
}

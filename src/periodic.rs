use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::frame::OutputFrame;
use crate::handoff::StopSignal;
use crate::metrics::{Measurement, Recorder};
use crate::state::ConvState;

/// Decays the whole accumulated image to the current global time and
/// convolves it with the kernel, once per period.
///
/// Reads run concurrently with ingest and take no snapshot, so consistency
/// is best-effort: each pixel reflects the latest update seen, but pixels of
/// one frame may reflect different global times while ingest is running.
pub struct PeriodicConvolutionEngine {
    state: Arc<ConvState>,
    decayed: Vec<f64>,
    scratch: OutputFrame,
    recorder: Recorder,
    cycles: u64,
}

impl PeriodicConvolutionEngine {
    pub fn new(state: Arc<ConvState>) -> Self {
        let (w, h) = (state.surface.width(), state.surface.height());
        Self {
            state,
            decayed: vec![0.0; w * h],
            scratch: OutputFrame::zeros(w, h),
            recorder: Recorder::disabled(),
            cycles: 0,
        }
    }

    pub fn with_recorder(mut self, recorder: Recorder) -> Self {
        self.recorder = recorder;
        self
    }

    /// Run one production cycle if new events arrived since the last one.
    /// Returns `true` if a frame was published.
    pub fn produce(&mut self) -> bool {
        if !self.state.handoff.try_acquire() {
            return false;
        }
        self.convolve();
        self.state.handoff.publish(&mut self.scratch);
        true
    }

    /// Decay and convolve into the scratch frame without publishing.
    fn convolve(&mut self) {
        let started_at = self.recorder.now();
        let tic = Instant::now();
        let state = &self.state;
        let t = state.global_time.load();
        state.surface.decay_region_into(t, &mut self.decayed);
        state.kernel.correlate_zero_border(
            &self.decayed,
            self.scratch.data_mut(),
            state.surface.width(),
            state.surface.height(),
        );
        self.scratch.set_reference_time(t);
        self.cycles += 1;
        self.recorder.emit(Measurement::FrameLatency {
            started_at,
            duration_seconds: tic.elapsed().as_secs_f64(),
        });
        trace!(cycle = self.cycles, global_time = t, "frame convolved");
    }

    /// Produce frames every `period` until stopped or until ingest finishes.
    ///
    /// A stop request discards any frame still being computed. When ingest
    /// finishes, one last cycle runs if its final batch has not been
    /// consumed yet. Returns the number of frames published by this call.
    pub fn run(&mut self, period: Duration, stop: &StopSignal, ingest_done: &AtomicBool) -> u64 {
        let mut published = 0;
        let mut next = Instant::now() + period;
        loop {
            if stop.wait_until(next) {
                debug!("production stopped");
                break;
            }
            let now = Instant::now();
            next += period;
            if next < now {
                // Overran; skip the missed ticks instead of bursting.
                next = now + period;
            }

            // Read before acquiring so a final batch signalled just before
            // ingest finished is still consumed below.
            let finished = ingest_done.load(Ordering::Acquire);
            if self.state.handoff.try_acquire() {
                self.convolve();
                if !self
                    .state
                    .handoff
                    .publish_unless_stopped(&mut self.scratch, stop)
                {
                    debug!("production stopped, in-flight frame discarded");
                    break;
                }
                published += 1;
            }
            if finished {
                debug!("ingest finished, production exiting");
                break;
            }
        }
        published
    }

    /// Convolution passes run so far, including discarded ones.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }
}

//! Two-thread runtime: an ingest task fed by an event source and, for the
//! approximate strategy, a production task on a fixed period.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info, warn};

use crate::config::ConvConfig;
use crate::error::{ConvError, Result};
use crate::event::Event;
use crate::frame::OutputFrame;
use crate::handoff::StopSignal;
use crate::ingest::EventIngestEngine;
use crate::metrics::{Measurement, Recorder};
use crate::periodic::PeriodicConvolutionEngine;
use crate::state::ConvState;
use crate::stats::IngestStats;
use crate::strategy::Strategy;

/// Result of one blocking read from an [`EventSource`].
#[derive(Clone, Debug, PartialEq)]
pub enum BatchRead {
    Batch(Vec<Event>),
    /// Nothing arrived within the timeout; the source is still open.
    Idle,
    /// End of stream or shutdown.
    Closed,
}

/// Supplier of ordered event batches.
pub trait EventSource: Send {
    /// Block for at most `timeout` waiting for the next batch.
    fn read_batch(&mut self, timeout: Duration) -> BatchRead;
}

/// Source fed through a crossbeam channel. An empty batch or a dropped
/// sender ends the stream.
pub struct ChannelSource {
    rx: Receiver<Vec<Event>>,
}

impl ChannelSource {
    pub fn new(rx: Receiver<Vec<Event>>) -> Self {
        Self { rx }
    }
}

impl EventSource for ChannelSource {
    fn read_batch(&mut self, timeout: Duration) -> BatchRead {
        match self.rx.recv_timeout(timeout) {
            Ok(batch) if batch.is_empty() => BatchRead::Closed,
            Ok(batch) => BatchRead::Batch(batch),
            Err(RecvTimeoutError::Timeout) => BatchRead::Idle,
            Err(RecvTimeoutError::Disconnected) => BatchRead::Closed,
        }
    }
}

/// Source replaying pre-recorded batches, then closing.
pub struct ReplaySource {
    batches: VecDeque<Vec<Event>>,
}

impl ReplaySource {
    pub fn new(batches: Vec<Vec<Event>>) -> Self {
        Self {
            batches: batches.into(),
        }
    }

    /// Split a flat recording into batches of `batch_size` events.
    pub fn chunked(events: &[Event], batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self::new(events.chunks(batch_size).map(|c| c.to_vec()).collect())
    }
}

impl EventSource for ReplaySource {
    fn read_batch(&mut self, _timeout: Duration) -> BatchRead {
        match self.batches.pop_front() {
            Some(batch) if !batch.is_empty() => BatchRead::Batch(batch),
            _ => BatchRead::Closed,
        }
    }
}

/// Totals reported when a pipeline is joined.
#[derive(Clone, Debug)]
pub struct PipelineSummary {
    pub stats: IngestStats,
    pub frames_produced: u64,
    pub global_time: f64,
    /// The frame a reader would see after both tasks exited.
    pub final_frame: OutputFrame,
}

/// Running convolver with its worker threads.
///
/// Dropping a pipeline requests stop and joins the threads.
pub struct Pipeline {
    state: Arc<ConvState>,
    strategy: Strategy,
    stop: Arc<StopSignal>,
    ingest_done: Arc<AtomicBool>,
    ingest: Option<JoinHandle<IngestStats>>,
    production: Option<JoinHandle<u64>>,
}

impl Pipeline {
    /// Validate `config` and start the worker threads.
    pub fn start<S>(config: &ConvConfig, source: S) -> Result<Self>
    where
        S: EventSource + 'static,
    {
        Self::start_with_measurements(config, source, None)
    }

    /// Like [`Pipeline::start`], also sending timing and accuracy
    /// measurements to `measurements`.
    pub fn start_with_measurements<S>(
        config: &ConvConfig,
        source: S,
        measurements: Option<Sender<Measurement>>,
    ) -> Result<Self>
    where
        S: EventSource + 'static,
    {
        let strategy = config.strategy;
        let state = ConvState::new(config, strategy.update_mode())?;
        let recorder = Recorder::new(measurements);
        let stop = Arc::new(StopSignal::new());
        let ingest_done = Arc::new(AtomicBool::new(false));

        let mut pipeline = Self {
            state: state.clone(),
            strategy,
            stop: stop.clone(),
            ingest_done: ingest_done.clone(),
            ingest: None,
            production: None,
        };

        if strategy == Strategy::Approximate {
            let mut producer = PeriodicConvolutionEngine::new(state.clone()).with_recorder(recorder.clone());
            let period = config.period();
            let stop = stop.clone();
            let done = ingest_done.clone();
            pipeline.production = Some(
                thread::Builder::new()
                    .name("event-conv-production".to_string())
                    .spawn(move || producer.run(period, &stop, &done))?,
            );
        }

        let engine = EventIngestEngine::new(state, config).with_recorder(recorder);
        let poll = config.poll_interval();
        // On spawn failure `pipeline` drops here and stops the production thread.
        pipeline.ingest = Some(
            thread::Builder::new()
                .name("event-conv-ingest".to_string())
                .spawn(move || ingest_loop(engine, source, poll, &stop, &ingest_done))?,
        );

        info!(
            strategy = %strategy,
            width = config.width,
            height = config.height,
            kernel_size = config.kernel_size,
            "pipeline started"
        );
        Ok(pipeline)
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// The latest complete frame.
    ///
    /// Approximate: the last frame published by the production task.
    /// Exact: the accumulator decayed to the current global time.
    pub fn current_frame(&self) -> OutputFrame {
        match self.strategy {
            Strategy::Approximate => self.state.handoff.latest(),
            Strategy::Exact => self.state.snapshot(),
        }
    }

    /// Frames published so far (approximate strategy).
    pub fn frames_produced(&self) -> u64 {
        self.state.handoff.generation()
    }

    pub fn global_time(&self) -> f64 {
        self.state.global_time()
    }

    /// True once the ingest task has exited.
    pub fn ingest_finished(&self) -> bool {
        self.ingest_done.load(Ordering::Acquire)
    }

    /// Ask both tasks to exit at their next suspension point. No frame is
    /// published once this returns.
    pub fn stop(&self) {
        if !self.stop.is_requested() {
            info!("pipeline stop requested");
        }
        self.stop.request();
        self.state.handoff.fence();
    }

    /// Wait for both tasks to exit. Without a prior [`Pipeline::stop`] this
    /// waits for the source to close.
    pub fn join(mut self) -> Result<PipelineSummary> {
        self.join_threads()
    }

    fn join_threads(&mut self) -> Result<PipelineSummary> {
        let ingest = self.ingest.take().ok_or(ConvError::AlreadyStopped)?;
        let stats = ingest.join().map_err(|_| {
            // Production must not wait forever for a finish flag that will never come.
            self.stop.request();
            ConvError::ThreadPanicked("ingest")
        });
        let frames = match self.production.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| ConvError::ThreadPanicked("production"))?,
            None => 0,
        };
        let stats = stats?;
        info!(
            events = stats.events(),
            batches = stats.batches(),
            rejected = stats.rejected(),
            discontinuities = stats.discontinuities(),
            frames,
            "pipeline finished"
        );
        Ok(PipelineSummary {
            stats,
            frames_produced: frames,
            global_time: self.state.global_time(),
            final_frame: self.current_frame(),
        })
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.ingest.is_some() || self.production.is_some() {
            self.stop.request();
            if let Some(handle) = self.ingest.take() {
                if handle.join().is_err() {
                    warn!("ingest thread panicked during shutdown");
                }
            }
            if let Some(handle) = self.production.take() {
                if handle.join().is_err() {
                    warn!("production thread panicked during shutdown");
                }
            }
        }
    }
}

fn ingest_loop<S: EventSource>(
    mut engine: EventIngestEngine,
    mut source: S,
    poll: Duration,
    stop: &StopSignal,
    done: &AtomicBool,
) -> IngestStats {
    loop {
        if stop.is_requested() {
            debug!("ingest stopped");
            break;
        }
        match source.read_batch(poll) {
            BatchRead::Batch(batch) => {
                if stop.is_requested() {
                    debug!("ingest stopped, dropping pending batch");
                    break;
                }
                engine.ingest(&batch);
            }
            BatchRead::Idle => continue,
            BatchRead::Closed => {
                info!(global_time = engine.global_time(), "event stream closed");
                break;
            }
        }
    }
    done.store(true, Ordering::Release);
    engine.into_stats()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::unbounded;

    #[test]
    fn test_channel_source_states() {
        let (tx, rx) = unbounded();
        let mut src = ChannelSource::new(rx);
        assert_eq!(src.read_batch(Duration::from_millis(1)), BatchRead::Idle);
        tx.send(vec![Event::new(0, 0, 1, true)]).unwrap();
        assert!(matches!(src.read_batch(Duration::from_millis(1)), BatchRead::Batch(b) if b.len() == 1));
        tx.send(Vec::new()).unwrap();
        assert_eq!(src.read_batch(Duration::from_millis(1)), BatchRead::Closed);
        drop(tx);
        assert_eq!(src.read_batch(Duration::from_millis(1)), BatchRead::Closed);
    }

    #[test]
    fn test_replay_source_chunks() {
        let events: Vec<Event> = (0..5).map(|i| Event::new(0, 0, i, true)).collect();
        let mut src = ReplaySource::chunked(&events, 2);
        let mut sizes = Vec::new();
        while let BatchRead::Batch(b) = src.read_batch(Duration::ZERO) {
            sizes.push(b.len());
        }
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn test_start_rejects_invalid_config() {
        let config = ConvConfig::new(0, 4);
        assert!(Pipeline::start(&config, ReplaySource::new(Vec::new())).is_err());
    }

    #[test]
    fn test_exact_pipeline_runs_to_end_of_stream() {
        let config = ConvConfig::new(8, 8)
            .with_strategy(Strategy::Exact)
            .with_clock(1000, 1e-3);
        let src = ReplaySource::new(vec![vec![Event::new(3, 3, 10, true)], vec![Event::new(4, 4, 20, false)]]);
        let pipeline = Pipeline::start(&config, src).unwrap();
        let summary = pipeline.join().unwrap();
        assert_eq!(summary.stats.events(), 2);
        assert_eq!(summary.stats.batches(), 2);
        assert_eq!(summary.frames_produced, 0);
        assert!((summary.global_time - 0.02).abs() < 1e-12);
        assert_eq!(summary.final_frame.reference_time(), summary.global_time);
    }
}

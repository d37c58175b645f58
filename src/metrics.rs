//! Timing and accuracy measurements for external logging.
//!
//! Measurements are plain numbers; storage and formatting belong to
//! whoever drains the channel.

use std::time::Instant;

use crossbeam::channel::Sender;

/// One measurement emitted by the ingest or production task.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Measurement {
    /// One ingest batch: stream time after the batch, event count, and the
    /// mean wall-clock processing time per event.
    BatchLatency {
        stream_time: f64,
        events: usize,
        mean_event_seconds: f64,
    },
    /// One production cycle: start (seconds since the recorder epoch) and
    /// wall-clock duration.
    FrameLatency {
        started_at: f64,
        duration_seconds: f64,
    },
    /// One event: global time, the value at the event pixel, and an energy
    /// figure (patch L1 norm, or predicted smoothed value for point updates).
    Accuracy {
        global_time: f64,
        value: f64,
        energy: f64,
    },
}

impl Measurement {
    /// Flatten to `(kind, a, b, c)`: 0 = batch, 1 = frame, 2 = accuracy.
    pub fn as_tuple(&self) -> (u8, f64, f64, f64) {
        match *self {
            Measurement::BatchLatency {
                stream_time,
                events,
                mean_event_seconds,
            } => (0, stream_time, events as f64, mean_event_seconds),
            Measurement::FrameLatency {
                started_at,
                duration_seconds,
            } => (1, started_at, duration_seconds, 0.0),
            Measurement::Accuracy {
                global_time,
                value,
                energy,
            } => (2, global_time, value, energy),
        }
    }
}

impl std::fmt::Display for Measurement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (kind, a, b, c) = self.as_tuple();
        write!(f, "{}, {}, {}, {}", kind, a, b, c)
    }
}

/// Optional measurement sink with a shared wall-clock epoch.
#[derive(Clone, Debug)]
pub struct Recorder {
    tx: Option<Sender<Measurement>>,
    epoch: Instant,
}

impl Recorder {
    pub fn new(tx: Option<Sender<Measurement>>) -> Self {
        Self {
            tx,
            epoch: Instant::now(),
        }
    }

    /// A recorder that drops everything.
    pub fn disabled() -> Self {
        Self::new(None)
    }

    #[inline]
    pub fn enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Seconds since the recorder was created.
    pub fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Send without blocking; measurements are dropped when a bounded
    /// channel is full or the receiver is gone.
    #[inline]
    pub fn emit(&self, m: Measurement) {
        if let Some(tx) = &self.tx {
            let _ = tx.try_send(m);
        }
    }
}

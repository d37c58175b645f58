//! Coordination between the ingest and production tasks.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::frame::OutputFrame;

/// Single-slot, lossy handoff between ingest and production.
///
/// Point-mode ingest raises the ready flag after each batch with `Release`
/// ordering, so every surface write of that batch happens-before a
/// production pass that wins [`FrameHandoff::try_acquire`]. Several batches
/// between two passes collapse into one pending signal; nothing is queued.
///
/// Produced frames are published into one slot that each cycle replaces
/// whole, so readers never see a half-written frame.
#[derive(Debug)]
pub struct FrameHandoff {
    ready: AtomicBool,
    generation: AtomicU64,
    published: Mutex<OutputFrame>,
}

impl FrameHandoff {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            ready: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            published: Mutex::new(OutputFrame::zeros(width, height)),
        }
    }

    /// Mark that new surface data is available.
    #[inline]
    pub fn signal(&self) {
        self.ready.store(true, Ordering::Release);
    }

    /// Atomically test-and-clear the ready flag. Exactly one caller wins
    /// per signal.
    #[inline]
    pub fn try_acquire(&self) -> bool {
        self.ready.swap(false, Ordering::AcqRel)
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Replace the published frame with `frame`. The previous frame is
    /// swapped back into `frame` so the caller can reuse its buffer.
    pub fn publish(&self, frame: &mut OutputFrame) {
        let mut slot = self.published.lock();
        std::mem::swap(&mut *slot, frame);
        self.generation.fetch_add(1, Ordering::Release);
    }

    /// Like [`FrameHandoff::publish`], but checks `stop` while holding the
    /// slot. Returns `false`, leaving `frame` and the slot untouched, once a
    /// stop has been requested.
    pub fn publish_unless_stopped(&self, frame: &mut OutputFrame, stop: &StopSignal) -> bool {
        let mut slot = self.published.lock();
        if stop.is_requested() {
            return false;
        }
        std::mem::swap(&mut *slot, frame);
        self.generation.fetch_add(1, Ordering::Release);
        true
    }

    /// Wait for any publish in progress to finish. After a stop request
    /// followed by this call, no further frame can appear.
    pub fn fence(&self) {
        drop(self.published.lock());
    }

    /// Copy of the most recently published frame.
    pub fn latest(&self) -> OutputFrame {
        self.published.lock().clone()
    }

    /// One pixel of the published frame, without copying it.
    pub fn read_pixel(&self, x: usize, y: usize) -> f64 {
        self.published.lock().get(x, y)
    }

    /// Number of frames published so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

/// Cooperative stop request shared by both tasks.
///
/// Timed waits wake as soon as a stop is requested.
#[derive(Debug, Default)]
pub struct StopSignal {
    requested: AtomicBool,
    lock: Mutex<bool>,
    cond: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::Release);
        let mut stopped = self.lock.lock();
        *stopped = true;
        self.cond.notify_all();
    }

    #[inline]
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Sleep until `deadline` or until a stop is requested.
    /// Returns `true` if stop was requested.
    pub fn wait_until(&self, deadline: Instant) -> bool {
        let mut stopped = self.lock.lock();
        while !*stopped {
            if self.cond.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        *stopped
    }

    /// Sleep for `timeout` or until a stop is requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.wait_until(Instant::now() + timeout)
    }
}

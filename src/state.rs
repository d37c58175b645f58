use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::ConvConfig;
use crate::error::Result;
use crate::frame::OutputFrame;
use crate::handoff::FrameHandoff;
use crate::ingest::UpdateMode;
use crate::kernel::Kernel;
use crate::surface::DecaySurface;

/// Monotonic stream time in seconds, written only by the ingest task.
#[derive(Debug, Default)]
pub struct GlobalTime(AtomicU64);

impl GlobalTime {
    #[inline]
    pub fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub(crate) fn store(&self, t: f64) {
        self.0.store(t.to_bits(), Ordering::Release);
    }
}

/// State shared by the ingest and production tasks of one convolver.
///
/// Kernel, mode, and dimensions are fixed at construction; the surface,
/// global time, and handoff are the only mutable parts.
#[derive(Debug)]
pub struct ConvState {
    pub(crate) surface: DecaySurface,
    pub(crate) global_time: GlobalTime,
    pub(crate) handoff: FrameHandoff,
    pub(crate) kernel: Kernel,
    pub(crate) mode: UpdateMode,
}

impl ConvState {
    /// Validate `config` and allocate the surface for `mode`.
    ///
    /// Patch updates need `(kernel_size - 1) / 2` cells of padding; point
    /// updates need none.
    pub fn new(config: &ConvConfig, mode: UpdateMode) -> Result<Arc<Self>> {
        config.validate()?;
        let pad = match mode {
            UpdateMode::Point => 0,
            UpdateMode::Patch => config.pad_size(),
        };
        let surface = DecaySurface::new(config.width, config.height, pad, config.alpha);
        let handoff = FrameHandoff::new(surface.width(), surface.height());
        Ok(Arc::new(Self {
            surface,
            global_time: GlobalTime::default(),
            handoff,
            kernel: Kernel::gaussian(config.kernel_size, config.sigma),
            mode,
        }))
    }

    pub fn surface(&self) -> &DecaySurface {
        &self.surface
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    pub fn handoff(&self) -> &FrameHandoff {
        &self.handoff
    }

    pub fn mode(&self) -> UpdateMode {
        self.mode
    }

    pub fn global_time(&self) -> f64 {
        self.global_time.load()
    }

    /// The unpadded surface decayed to the current global time.
    ///
    /// For patch updates this is the smoothed image itself.
    pub fn snapshot(&self) -> OutputFrame {
        let t = self.global_time();
        let mut data = vec![0.0; self.surface.width() * self.surface.height()];
        self.surface.decay_region_into(t, &mut data);
        OutputFrame::from_parts(self.surface.width(), self.surface.height(), t, data)
    }
}

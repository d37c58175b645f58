use std::sync::atomic::{AtomicU64, Ordering};

use crate::kernel::Kernel;

/// `f64` stored as raw bits in an `AtomicU64`.
///
/// Loads and stores are `Relaxed`; ordering between the ingest and
/// production tasks comes from the handoff flag.
#[derive(Debug, Default)]
struct AtomicCell(AtomicU64);

impl AtomicCell {
    #[inline]
    fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    fn store(&self, v: f64) {
        self.0.store(v.to_bits(), Ordering::Relaxed);
    }
}

/// Exponentially decaying image plus its surface of active events.
///
/// Each cell holds the value accumulated at the last update and the time of
/// that update; the value "now" is `value * exp(-alpha * (now - last))`.
/// Both arrays live in one padded buffer of `(width + 2 pad) x (height + 2 pad)`
/// cells so a kernel-sized patch around any in-frame pixel is always in range.
///
/// The surface has a single writer (the ingest task) and may be read
/// concurrently by one production task. Reads are best-effort: a full-frame
/// pass can observe some pixels before and some after a concurrent batch.
#[derive(Debug)]
pub struct DecaySurface {
    values: Vec<AtomicCell>,
    last_update: Vec<AtomicCell>,
    width: usize,
    height: usize,
    pad: usize,
    stride: usize,
    alpha: f64,
}

impl DecaySurface {
    /// Create a zeroed surface for a `width x height` frame with `pad` cells
    /// of border on every side and decay rate `alpha` (1/s).
    pub fn new(width: u32, height: u32, pad: usize, alpha: f64) -> Self {
        assert!(width > 0 && height > 0, "dimensions must be positive");
        assert!(
            width <= crate::MAX_SENSOR_DIM && height <= crate::MAX_SENSOR_DIM,
            "dimensions exceed maximum"
        );
        assert!(alpha > 0.0 && alpha.is_finite(), "alpha must be positive");
        let w = width as usize;
        let h = height as usize;
        let stride = w + 2 * pad;
        let n = stride
            .checked_mul(h + 2 * pad)
            .expect("dimension overflow");
        Self {
            values: (0..n).map(|_| AtomicCell::default()).collect(),
            last_update: (0..n).map(|_| AtomicCell::default()).collect(),
            width: w,
            height: h,
            pad,
            stride,
            alpha,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pad(&self) -> usize {
        self.pad
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// True if (`x`, `y`) addresses a pixel of the unpadded frame.
    #[inline]
    pub fn contains(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height
    }

    /// Buffer index of frame pixel (`x`, `y`).
    #[inline]
    fn index(&self, x: usize, y: usize) -> usize {
        (y + self.pad) * self.stride + x + self.pad
    }

    #[inline]
    fn decay_cell(&self, idx: usize, reference_time: f64) -> f64 {
        let elapsed = (reference_time - self.last_update[idx].load()).max(0.0);
        self.values[idx].load() * (-self.alpha * elapsed).exp()
    }

    /// Value of frame pixel (`x`, `y`) decayed to `reference_time`.
    ///
    /// A pixel updated after `reference_time` is returned undecayed rather
    /// than amplified.
    pub fn decayed_value(&self, x: usize, y: usize, reference_time: f64) -> f64 {
        self.decay_cell(self.index(x, y), reference_time)
    }

    /// Time of the last update of frame pixel (`x`, `y`).
    pub fn last_update(&self, x: usize, y: usize) -> f64 {
        self.last_update[self.index(x, y)].load()
    }

    /// Point update: decay pixel (`x`, `y`) to `reference_time`, add +1 for
    /// ON or -1 for OFF, and stamp it with `reference_time`.
    ///
    /// Returns the new value.
    pub fn apply_event(&self, x: usize, y: usize, polarity: bool, reference_time: f64) -> f64 {
        let idx = self.index(x, y);
        let sign = if polarity { 1.0 } else { -1.0 };
        let v = self.decay_cell(idx, reference_time) + sign;
        self.values[idx].store(v);
        self.last_update[idx].store(reference_time);
        v
    }

    /// Patch update: decay every cell of the `k x k` patch centred on frame
    /// pixel (`x`, `y`) to `reference_time` and add `+kernel` or `-kernel`.
    ///
    /// The patch may extend into the padding, which must be at least the
    /// kernel radius. Returns the L1 norm of the updated patch.
    pub fn apply_event_patch(
        &self,
        x: usize,
        y: usize,
        polarity: bool,
        reference_time: f64,
        kernel: &Kernel,
    ) -> f64 {
        let k = kernel.size();
        let r = kernel.radius();
        debug_assert!(r <= self.pad, "padding smaller than kernel radius");
        let sign = if polarity { 1.0 } else { -1.0 };
        // Padded coordinates of the patch's top-left corner.
        let top = y + self.pad - r;
        let left = x + self.pad - r;

        let mut energy = 0.0;
        for ky in 0..k {
            let row_start = (top + ky) * self.stride + left;
            let values = &self.values[row_start..row_start + k];
            let stamps = &self.last_update[row_start..row_start + k];
            for ((value, stamp), &w) in values.iter().zip(stamps).zip(kernel.row(ky)) {
                let elapsed = (reference_time - stamp.load()).max(0.0);
                let v = value.load() * (-self.alpha * elapsed).exp() + sign * w;
                value.store(v);
                stamp.store(reference_time);
                energy += v.abs();
            }
        }
        energy
    }

    /// Decay the whole unpadded frame to `reference_time` into `dst`
    /// (row-major, `width x height`).
    ///
    /// This is the vectorized read used by the periodic engine and by the
    /// exact strategy's frame accessor.
    pub fn decay_region_into(&self, reference_time: f64, dst: &mut [f64]) {
        assert_eq!(dst.len(), self.width * self.height, "destination size mismatch");
        for (y, out_row) in dst.chunks_exact_mut(self.width).enumerate() {
            let start = self.index(0, y);
            let values = &self.values[start..start + self.width];
            let stamps = &self.last_update[start..start + self.width];
            for ((out, value), stamp) in out_row.iter_mut().zip(values).zip(stamps) {
                let coef = self.alpha * (stamp.load() - reference_time).min(0.0);
                *out = value.load() * coef.exp();
            }
        }
    }

    /// Zero every value and timestamp, padding included.
    ///
    /// Must not race with [`DecaySurface::apply_event`]; callers reset only
    /// while no ingest task is running.
    pub fn reset(&self) {
        for cell in self.values.iter().chain(&self.last_update) {
            cell.store(0.0);
        }
    }
}

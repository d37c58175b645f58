/// A decayed, smoothed image at one reference time.
///
/// Same spatial size as the unpadded sensor frame, row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputFrame {
    width: usize,
    height: usize,
    reference_time: f64,
    data: Vec<f64>,
}

impl OutputFrame {
    /// An all-zero frame at time zero.
    pub fn zeros(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            reference_time: 0.0,
            data: vec![0.0; width * height],
        }
    }

    pub(crate) fn from_parts(width: usize, height: usize, reference_time: f64, data: Vec<f64>) -> Self {
        debug_assert_eq!(data.len(), width * height);
        Self {
            width,
            height,
            reference_time,
            data,
        }
    }

    pub(crate) fn set_reference_time(&mut self, t: f64) {
        self.reference_time = t;
    }

    pub(crate) fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Global time (seconds) the frame was decayed to.
    pub fn reference_time(&self) -> f64 {
        self.reference_time
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Value at pixel (`x`, `y`). Panics when out of range.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f64 {
        assert!(x < self.width && y < self.height, "pixel out of range");
        self.data[y * self.width + x]
    }

    /// L1 norm of the frame.
    pub fn energy(&self) -> f64 {
        self.data.iter().map(|v| v.abs()).sum()
    }

    /// Minimum and maximum pixel values.
    pub fn min_max(&self) -> (f64, f64) {
        self.data
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
    }

    /// Largest absolute per-pixel difference to `other`.
    pub fn max_abs_diff(&self, other: &OutputFrame) -> f64 {
        assert_eq!(self.data.len(), other.data.len(), "frame size mismatch");
        self.data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max)
    }

    /// Min-max normalise to `[0, 255]` with inverted colours, so positive
    /// activity shows dark on a light background. A flat frame maps to 255.
    pub fn to_u8_normalized(&self) -> Vec<u8> {
        let (lo, hi) = self.min_max();
        let range = hi - lo;
        if !(range > 0.0) {
            return vec![255; self.data.len()];
        }
        self.data
            .iter()
            .map(|&v| {
                let normalized = (v - lo) / range;
                ((1.0 - normalized) * 255.0).round().clamp(0.0, 255.0) as u8
            })
            .collect()
    }
}

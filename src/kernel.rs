/// Square, odd-sized, normalized 2-D Gaussian kernel.
///
/// Built as the outer product of a normalized 1-D Gaussian, so the weights
/// sum to one and the kernel is symmetric about its centre in both axes.
/// Immutable once built; shared freely between tasks.
#[derive(Clone, Debug, PartialEq)]
pub struct Kernel {
    size: usize,
    sigma: f64,
    weights: Vec<f64>, // row-major size x size
}

impl Kernel {
    /// Build a `size x size` Gaussian with spread `sigma`.
    pub fn gaussian(size: usize, sigma: f64) -> Self {
        assert!(size > 0 && size % 2 == 1, "kernel size must be positive and odd");
        assert!(sigma > 0.0 && sigma.is_finite(), "sigma must be positive");

        let taps = gaussian_1d(size, sigma);
        let mut weights = Vec::with_capacity(size * size);
        for &row in &taps {
            for &col in &taps {
                weights.push(row * col);
            }
        }
        Self {
            size,
            sigma,
            weights,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    /// Offset from the top-left corner to the centre tap, `(size - 1) / 2`.
    pub fn radius(&self) -> usize {
        (self.size - 1) / 2
    }

    /// Weight at (`row`, `col`).
    #[inline]
    pub fn at(&self, row: usize, col: usize) -> f64 {
        self.weights[row * self.size + col]
    }

    /// Weight of the centre tap.
    pub fn center(&self) -> f64 {
        let r = self.radius();
        self.at(r, r)
    }

    /// One row of weights.
    #[inline]
    pub fn row(&self, row: usize) -> &[f64] {
        &self.weights[row * self.size..(row + 1) * self.size]
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// 2-D correlation of `src` (`width x height`, row-major) with this kernel,
    /// written into `dst`. Samples outside the frame read as zero.
    pub fn correlate_zero_border(&self, src: &[f64], dst: &mut [f64], width: usize, height: usize) {
        assert_eq!(src.len(), width * height, "source size mismatch");
        assert_eq!(dst.len(), width * height, "destination size mismatch");
        let r = self.radius() as isize;
        let (w, h) = (width as isize, height as isize);

        for y in 0..h {
            for x in 0..w {
                let mut acc = 0.0;
                for ky in 0..self.size as isize {
                    let sy = y + ky - r;
                    if sy < 0 || sy >= h {
                        continue;
                    }
                    let src_row = &src[(sy * w) as usize..((sy + 1) * w) as usize];
                    let k_row = self.row(ky as usize);
                    for (kx, &kw) in k_row.iter().enumerate() {
                        let sx = x + kx as isize - r;
                        if sx < 0 || sx >= w {
                            continue;
                        }
                        acc += kw * src_row[sx as usize];
                    }
                }
                dst[(y * w + x) as usize] = acc;
            }
        }
    }
}

/// Normalized 1-D Gaussian taps centred on `(size - 1) / 2`.
fn gaussian_1d(size: usize, sigma: f64) -> Vec<f64> {
    let centre = (size as f64 - 1.0) * 0.5;
    let scale = -0.5 / (sigma * sigma);
    let mut taps: Vec<f64> = (0..size)
        .map(|i| {
            let d = i as f64 - centre;
            (scale * d * d).exp()
        })
        .collect();
    let sum: f64 = taps.iter().sum();
    for t in &mut taps {
        *t /= sum;
    }
    taps
}

use splines::{Interpolation, Key, Spline};

/// Catmull-Rom interpolant over FFT bins, sampled at arbitrary frequencies.
///
/// Each segment needs a knot on either side, so only `[x[1], x[n - 2])` can be
/// sampled. For an FFT that drops the DC bin and the top bin.
pub struct BinSpline {
    spline: Spline<f64, f64>,
}

impl BinSpline {
    /// Fit through `(x, y)`. Returns `None` when fewer than four knots are
    /// given, the lengths differ, or `x` is not strictly increasing.
    pub fn new(x: &[f64], y: &[f64]) -> Option<Self> {
        if x.len() < 4 || y.len() != x.len() {
            return None;
        }
        if x.windows(2).any(|w| !(w[0] < w[1])) {
            return None;
        }

        let keys = x
            .iter()
            .zip(y.iter())
            .map(|(&t, &value)| Key::new(t, value, Interpolation::CatmullRom))
            .collect();
        Some(Self {
            spline: Spline::from_vec(keys),
        })
    }

    /// Interpolated value at `at`, or `None` outside the sampled range.
    pub fn value(&self, at: f64) -> Option<f64> {
        // NaN would break the key search.
        if at.is_nan() {
            return None;
        }
        self.spline.sample(at)
    }
}

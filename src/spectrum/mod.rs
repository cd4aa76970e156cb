//! Octave-band analysis of linear FFT spectra.

mod aggregate;
mod octave;
mod spline;
mod weighting;

pub use aggregate::{BandAggregator, LevelMetric};
pub use octave::OctaveBands;
pub use weighting::WeightingCurve;

/// Per-band levels for one captured block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BandFrame {
    /// Band center frequencies, ascending
    pub band_hz: Vec<f64>,
    /// Weighted level of each band in dB (may be `-inf` for silent bands)
    pub band_db: Vec<f64>,
}

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use super::octave::{high_limit, low_limit};
use super::spline::BinSpline;
use super::{BandFrame, WeightingCurve};
use crate::audio::SpectrumFrame;

/// How a band's summed energy is turned into a level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, ValueEnum, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LevelMetric {
    #[default]
    Peak,
    Rms,
}

impl LevelMetric {
    pub fn next(&self) -> Self {
        match self {
            LevelMetric::Peak => LevelMetric::Rms,
            LevelMetric::Rms => LevelMetric::Peak,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LevelMetric::Peak => "peak",
            LevelMetric::Rms => "rms",
        }
    }
}

/// Folds a linear FFT spectrum onto octave bands.
#[derive(Debug, Clone, Copy)]
pub struct BandAggregator {
    pub bands_per_octave: u32,
    pub metric: LevelMetric,
    pub weighting: WeightingCurve,
}

/// Frequency step used to sample the interpolated spectrum inside a band.
const STEP_HZ: f64 = 1.0;

impl BandAggregator {
    /// Aggregate `spectrum` onto `bands` (ascending center frequencies).
    ///
    /// Bands with no energy come out as `-inf` dB; callers clamp downstream.
    pub fn aggregate(&self, spectrum: &SpectrumFrame, bands: &[f64]) -> BandFrame {
        let spline = BinSpline::new(&spectrum.bin_hz, &spectrum.amplitude);

        let band_db = bands
            .iter()
            .map(|&center| {
                let energy = match &spline {
                    Some(spline) => self.band_energy(spline, center),
                    None => 0.0,
                };
                let level = match self.metric {
                    LevelMetric::Rms => (energy * energy / 2.0).sqrt(),
                    LevelMetric::Peak => energy,
                };
                20.0 * level.log10() + self.weighting.offset_db(center)
            })
            .collect();

        BandFrame {
            band_hz: bands.to_vec(),
            band_db,
        }
    }

    fn band_energy(&self, spline: &BinSpline, center: f64) -> f64 {
        let high = high_limit(center, self.bands_per_octave);
        let mut k = low_limit(center, self.bands_per_octave);
        let mut sum = 0.0;
        while k < high {
            // Samples outside the interpolated range contribute nothing.
            if let Some(v) = spline.value(k) {
                sum += v * v;
            }
            k += STEP_HZ;
        }
        sum.sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SpectralTransform;
    use crate::spectrum::OctaveBands;
    use std::f64::consts::PI;

    fn sine_block(bin: f64, size: usize) -> Vec<f64> {
        (0..size)
            .map(|i| (2.0 * PI * bin * i as f64 / size as f64).sin())
            .collect()
    }

    fn aggregator(metric: LevelMetric) -> BandAggregator {
        BandAggregator {
            bands_per_octave: 6,
            metric,
            weighting: WeightingCurve::Z,
        }
    }

    #[test]
    fn sine_peaks_in_the_nearest_band() {
        let mut transform = SpectralTransform::new(1024, 48000);
        let spectrum = transform.process(&sine_block(100.0, 1024));
        assert_eq!(spectrum.bin_hz[100], 4687.5);

        let bands = OctaveBands::new().get_bands(1000.0, 6, 39.0, 16001.0);
        let frame = aggregator(LevelMetric::Peak).aggregate(&spectrum, &bands);
        assert_eq!(frame.band_hz.len(), frame.band_db.len());

        let nearest = frame
            .band_hz
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| (*a - 4687.5).abs().total_cmp(&(*b - 4687.5).abs()))
            .map(|(i, _)| i)
            .unwrap();
        let loudest = frame
            .band_db
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(loudest, nearest);

        let peak = frame.band_db[loudest];
        for (hz, db) in frame.band_hz.iter().zip(frame.band_db.iter()) {
            if *hz < 1000.0 {
                assert!(*db < peak - 40.0, "band {hz} Hz at {db} dB vs peak {peak}");
            }
        }
    }

    #[test]
    fn rms_metric_is_peak_scaled_by_root_two() {
        let mut transform = SpectralTransform::new(1024, 48000);
        let spectrum = transform.process(&sine_block(100.0, 1024));
        let bands = OctaveBands::new().get_bands(1000.0, 6, 39.0, 16001.0);

        let peak = aggregator(LevelMetric::Peak).aggregate(&spectrum, &bands);
        let rms = aggregator(LevelMetric::Rms).aggregate(&spectrum, &bands);

        let i = peak
            .band_db
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(i, _)| i)
            .unwrap();
        let expected = peak.band_db[i] - 20.0 * 2f64.sqrt().log10();
        assert!((rms.band_db[i] - expected).abs() < 1e-9);
    }

    #[test]
    fn weighting_offsets_each_band() {
        let mut transform = SpectralTransform::new(1024, 48000);
        let spectrum = transform.process(&sine_block(37.0, 1024));
        let bands = OctaveBands::new().get_bands(1000.0, 3, 100.0, 8000.0);

        let flat = aggregator(LevelMetric::Peak).aggregate(&spectrum, &bands);
        let weighted = BandAggregator {
            weighting: WeightingCurve::A,
            ..aggregator(LevelMetric::Peak)
        }
        .aggregate(&spectrum, &bands);

        for (i, &hz) in bands.iter().enumerate() {
            if flat.band_db[i].is_finite() {
                let diff = weighted.band_db[i] - flat.band_db[i];
                assert!((diff - WeightingCurve::A.offset_db(hz)).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn silence_yields_negative_infinity() {
        let mut transform = SpectralTransform::new(512, 44100);
        let spectrum = transform.process(&vec![0.0; 512]);
        let bands = OctaveBands::new().get_bands(1000.0, 6, 39.0, 16001.0);

        let frame = aggregator(LevelMetric::Rms).aggregate(&spectrum, &bands);
        assert!(frame.band_db.iter().all(|db| *db == f64::NEG_INFINITY));
    }

    #[test]
    fn degenerate_band_width_does_not_panic() {
        let mut transform = SpectralTransform::new(256, 48000);
        let spectrum = transform.process(&sine_block(10.0, 256));
        let narrow = BandAggregator {
            bands_per_octave: 100_000,
            ..aggregator(LevelMetric::Peak)
        };

        let frame = narrow.aggregate(&spectrum, &[1000.0]);
        assert_eq!(frame.band_db.len(), 1);
        assert!(!frame.band_db[0].is_nan());
    }
}

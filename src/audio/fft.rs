use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Compensates the energy lost to the Hann window.
const WINDOW_CORRECTION: f64 = 2.0;

/// Linear-bin magnitude spectrum of one audio block.
///
/// Frames are shared between threads once published and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumFrame {
    /// Frequency of each bin, ascending from 0 Hz
    pub bin_hz: Arc<[f64]>,
    /// Normalized magnitude of each bin
    pub amplitude: Vec<f64>,
}

#[cfg(test)]
impl SpectrumFrame {
    pub fn len(&self) -> usize {
        self.amplitude.len()
    }

    pub fn is_empty(&self) -> bool {
        self.amplitude.is_empty()
    }
}

/// Hann window + forward FFT + modulus for fixed-size blocks.
pub struct SpectralTransform {
    fft_size: usize,
    fft: Arc<dyn Fft<f64>>,
    buffer: Vec<Complex<f64>>,
    scratch: Vec<Complex<f64>>,
    window: Vec<f64>,
    bin_hz: Arc<[f64]>,
}

impl SpectralTransform {
    pub fn new(fft_size: usize, sample_rate: u32) -> Self {
        let fft_size = fft_size.max(2);
        let fft = FftPlanner::new().plan_fft_forward(fft_size);

        let window: Vec<f64> = (0..fft_size)
            .map(|i| {
                0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / (fft_size - 1) as f64).cos())
            })
            .collect();

        let bin_hz: Arc<[f64]> = (0..fft_size / 2)
            .map(|bin| bin as f64 * sample_rate as f64 / fft_size as f64)
            .collect();

        Self {
            fft_size,
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            scratch: vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()],
            fft,
            window,
            bin_hz,
        }
    }

    /// Transform one block. `samples` is only read; short blocks are zero-padded.
    pub fn process(&mut self, samples: &[f64]) -> SpectrumFrame {
        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let sample = samples.get(i).copied().unwrap_or(0.0);
            *slot = Complex::new(sample * self.window[i], 0.0);
        }

        self.fft
            .process_with_scratch(&mut self.buffer, &mut self.scratch);

        let scale = WINDOW_CORRECTION / (self.fft_size / 2) as f64;
        let amplitude = self.buffer[..self.fft_size / 2]
            .iter()
            .map(|c| c.norm() * scale)
            .collect();

        SpectrumFrame {
            bin_hz: Arc::clone(&self.bin_hz),
            amplitude,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn assert_approx(actual: f64, expected: f64, tolerance: f64) {
        assert!(
            (actual - expected).abs() <= tolerance,
            "expected {expected} +/- {tolerance}, got {actual}"
        );
    }

    #[test]
    fn bins_are_linearly_spaced_up_to_nyquist() {
        let mut transform = SpectralTransform::new(1024, 48000);
        let bins = transform.process(&[]).bin_hz;

        assert_eq!(bins.len(), 512);
        assert_eq!(bins[0], 0.0);
        assert_eq!(bins[1], 46.875);
        assert_eq!(bins[100], 4687.5);
        assert_eq!(bins[511], 511.0 * 48000.0 / 1024.0);
    }

    #[test]
    fn full_scale_sine_normalizes_near_unity() {
        for size in [512, 1024, 4096] {
            let mut transform = SpectralTransform::new(size, 48000);
            let bin = size / 8;
            let samples: Vec<f64> = (0..size)
                .map(|i| (2.0 * PI * bin as f64 * i as f64 / size as f64).sin())
                .collect();

            let frame = transform.process(&samples);
            assert_eq!(frame.len(), size / 2);
            assert_approx(frame.amplitude[bin], 1.0, 0.01);
            assert!(frame.amplitude[bin / 2] < 0.01);
        }
    }

    #[test]
    fn input_block_is_left_untouched() {
        let mut transform = SpectralTransform::new(256, 44100);
        let samples: Vec<f64> = (0..256).map(|i| (i as f64 * 0.1).sin()).collect();
        let copy = samples.clone();

        transform.process(&samples);
        assert_eq!(samples, copy);
    }

    #[test]
    fn repeated_calls_carry_no_state() {
        let mut transform = SpectralTransform::new(256, 44100);
        let a: Vec<f64> = (0..256).map(|i| (i as f64 * 0.3).sin()).collect();
        let b: Vec<f64> = (0..256).map(|i| (i as f64 * 0.05).cos()).collect();

        let first = transform.process(&a);
        transform.process(&b);
        let again = transform.process(&a);
        assert_eq!(first, again);
    }

    #[test]
    fn short_blocks_are_zero_padded() {
        let mut transform = SpectralTransform::new(256, 44100);
        let frame = transform.process(&[]);
        assert!(frame.amplitude.iter().all(|&a| a == 0.0));
    }
}

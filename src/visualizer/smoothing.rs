use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Moving-average flavour used across the smoothing window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, ValueEnum, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SmoothingMode {
    /// Simple moving average
    Sma,
    /// Linearly weighted, newest frame heaviest
    #[default]
    Wma,
    /// Weights `i^i` for the i-th oldest frame
    Ema,
}

impl SmoothingMode {
    pub fn all() -> &'static [SmoothingMode] {
        &[SmoothingMode::Sma, SmoothingMode::Wma, SmoothingMode::Ema]
    }

    pub fn next(&self) -> Self {
        let all = Self::all();
        let current = all.iter().position(|m| m == self).unwrap_or(0);
        all[(current + 1) % all.len()]
    }

    pub fn name(&self) -> &'static str {
        match self {
            SmoothingMode::Sma => "sma",
            SmoothingMode::Wma => "wma",
            SmoothingMode::Ema => "ema",
        }
    }

    /// Weight of the frame at 1-based position `i` (oldest first).
    ///
    /// `Ema` overflows to infinity from `i = 144`; windows are capped well below.
    pub(crate) fn weight(&self, i: usize) -> f64 {
        match self {
            SmoothingMode::Sma => 1.0,
            SmoothingMode::Wma => i as f64,
            SmoothingMode::Ema => (i as f64).powi(i as i32),
        }
    }
}

/// Moving average over the last few band frames.
///
/// Owned by the render side only.
#[derive(Debug, Default)]
pub struct TemporalSmoother {
    history: VecDeque<Vec<f64>>,
}

impl TemporalSmoother {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.history.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Smooth `band_db` against the history. Passes input through until
    /// `window_size` frames have been seen.
    pub fn filter(&mut self, band_db: &[f64], window_size: usize, mode: SmoothingMode) -> Vec<f64> {
        if window_size < 2 {
            return band_db.to_vec();
        }

        // A different band count means the layout changed; old frames are meaningless.
        if self
            .history
            .front()
            .is_some_and(|frame| frame.len() != band_db.len())
        {
            self.history.clear();
        }
        while self.history.len() > window_size {
            self.history.pop_front();
        }

        if self.history.len() < window_size {
            self.history.push_back(band_db.to_vec());
            return band_db.to_vec();
        }

        self.history.pop_front();
        self.history.push_back(band_db.to_vec());

        let weights: Vec<f64> = (1..=self.history.len()).map(|i| mode.weight(i)).collect();
        let total: f64 = weights.iter().sum();

        (0..band_db.len())
            .map(|band| {
                self.history
                    .iter()
                    .zip(weights.iter())
                    .map(|(frame, w)| frame[band] * w)
                    .sum::<f64>()
                    / total
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_all_approx(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected.iter()) {
            assert!((a - e).abs() < 1e-9, "expected {:?}, got {:?}", expected, actual);
        }
    }

    #[test]
    fn small_windows_disable_smoothing() {
        let mut smoother = TemporalSmoother::new();
        for window in [0, 1] {
            assert_eq!(smoother.filter(&[1.0, 2.0], window, SmoothingMode::Sma), vec![1.0, 2.0]);
        }
        assert!(smoother.is_empty());
    }

    #[test]
    fn passes_through_until_window_fills() {
        let mut smoother = TemporalSmoother::new();
        assert_eq!(smoother.filter(&[3.0], 3, SmoothingMode::Sma), vec![3.0]);
        assert_eq!(smoother.filter(&[6.0], 3, SmoothingMode::Sma), vec![6.0]);
        assert_eq!(smoother.filter(&[9.0], 3, SmoothingMode::Sma), vec![9.0]);
        assert_eq!(smoother.len(), 3);

        // Window is now [6, 9, 12].
        assert_all_approx(&smoother.filter(&[12.0], 3, SmoothingMode::Sma), &[9.0]);
    }

    #[test]
    fn constant_input_is_stable_for_every_mode() {
        for mode in SmoothingMode::all() {
            let mut smoother = TemporalSmoother::new();
            let frame = [-12.0, 0.0, 4.5, -60.0];
            for _ in 0..4 {
                smoother.filter(&frame, 4, *mode);
            }
            assert_all_approx(&smoother.filter(&frame, 4, *mode), &frame);
        }
    }

    #[test]
    fn weighted_modes_favour_recent_frames() {
        let feed = |mode| {
            let mut smoother = TemporalSmoother::new();
            for v in [0.0, 0.0, 0.0] {
                smoother.filter(&[v], 3, mode);
            }
            smoother.filter(&[0.0], 3, mode);
            smoother.filter(&[6.0], 3, mode)
        };

        // Window [0, 0, 6].
        assert_all_approx(&feed(SmoothingMode::Sma), &[2.0]);
        // Weights 1, 2, 3.
        assert_all_approx(&feed(SmoothingMode::Wma), &[3.0]);
        // Weights 1, 4, 27.
        assert_all_approx(&feed(SmoothingMode::Ema), &[6.0 * 27.0 / 32.0]);
    }

    #[test]
    fn band_count_change_restarts_history() {
        let mut smoother = TemporalSmoother::new();
        for _ in 0..3 {
            smoother.filter(&[1.0, 1.0], 2, SmoothingMode::Sma);
        }
        assert_eq!(smoother.len(), 2);

        assert_eq!(smoother.filter(&[5.0, 5.0, 5.0], 2, SmoothingMode::Sma), vec![5.0, 5.0, 5.0]);
        assert_eq!(smoother.len(), 1);
    }

    #[test]
    fn shrinking_the_window_drops_oldest_frames() {
        let mut smoother = TemporalSmoother::new();
        for v in [1.0, 2.0, 3.0, 4.0] {
            smoother.filter(&[v], 4, SmoothingMode::Sma);
        }
        // History trimmed to [3, 4] then rolls to [4, 10].
        assert_all_approx(&smoother.filter(&[10.0], 2, SmoothingMode::Sma), &[7.0]);
    }

    #[test]
    fn silent_bands_stay_silent() {
        let mut smoother = TemporalSmoother::new();
        let frame = [f64::NEG_INFINITY, -10.0];
        for _ in 0..3 {
            smoother.filter(&frame, 2, SmoothingMode::Wma);
        }
        let out = smoother.filter(&frame, 2, SmoothingMode::Wma);
        assert_eq!(out[0], f64::NEG_INFINITY);
        assert!((out[1] + 10.0).abs() < 1e-9);
    }
}

mod bars;
mod envelope;
mod smoothing;

pub use bars::BarVisualizer;
pub use envelope::BarEnvelopeFollower;
pub use smoothing::{SmoothingMode, TemporalSmoother};

use std::sync::Arc;
use std::time::Instant;

use crate::audio::{FrameExchange, SpectrumFrame};
use crate::config::{BarConfig, SmoothingConfig, SpectrumConfig};
use crate::spectrum::{BandAggregator, BandFrame, OctaveBands};

/// Render-side chain: fetch the latest spectrum, fold it onto octave bands,
/// smooth it over time and animate bar heights.
///
/// Every setting is read per frame, so spectrum, smoothing and bar changes
/// take effect without restarting capture.
pub struct BarPipeline {
    exchange: Arc<FrameExchange<SpectrumFrame>>,
    octaves: &'static OctaveBands,
    smoother: TemporalSmoother,
    follower: BarEnvelopeFollower,
    last_frame: Option<Instant>,
    bands: BandFrame,
    /// Settings `bands` was computed with.
    computed_with: Option<(SpectrumConfig, SmoothingConfig)>,
}

impl BarPipeline {
    pub fn new(exchange: Arc<FrameExchange<SpectrumFrame>>) -> Self {
        Self {
            exchange,
            octaves: OctaveBands::global(),
            smoother: TemporalSmoother::new(),
            follower: BarEnvelopeFollower::new(),
            last_frame: None,
            bands: BandFrame::default(),
            computed_with: None,
        }
    }

    /// Band levels behind the most recent bar heights.
    #[cfg(test)]
    pub fn bands(&self) -> &BandFrame {
        &self.bands
    }

    /// Bar heights in pixels for this render tick, or an empty list if no
    /// audio has been captured yet.
    pub fn next_frame(
        &mut self,
        spectrum: &SpectrumConfig,
        smoothing: &SmoothingConfig,
        bars: &BarConfig,
        now: Instant,
    ) -> Vec<f64> {
        let Some(delivery) = self.exchange.fetch_latest_or_stale() else {
            return Vec::new();
        };
        let fresh = delivery.is_fresh();
        let frame = delivery.into_inner();

        // Re-showing the same block must not count twice in the smoothing history.
        let settings_changed = self
            .computed_with
            .as_ref()
            .map_or(true, |(s, m)| s != spectrum || m != smoothing);
        if fresh || settings_changed {
            self.update_bands(&frame, spectrum, smoothing);
        }

        let elapsed_ms = self
            .last_frame
            .map(|last| now.saturating_duration_since(last).as_secs_f64() * 1000.0)
            .unwrap_or(0.0);
        self.last_frame = Some(now);

        self.follower.follow(&self.bands.band_db, elapsed_ms, bars)
    }

    fn update_bands(
        &mut self,
        frame: &SpectrumFrame,
        spectrum: &SpectrumConfig,
        smoothing: &SmoothingConfig,
    ) {
        let centers = self.octaves.get_bands(
            spectrum.frequency_center,
            spectrum.bands_per_octave,
            spectrum.frequency_start,
            spectrum.frequency_end,
        );
        let aggregator = BandAggregator {
            bands_per_octave: spectrum.bands_per_octave.max(1),
            metric: spectrum.level,
            weighting: spectrum.weighting,
        };
        let mut bands = aggregator.aggregate(frame, &centers);
        bands.band_db = self
            .smoother
            .filter(&bands.band_db, smoothing.window_size, smoothing.mode);

        self.bands = bands;
        self.computed_with = Some((spectrum.clone(), smoothing.clone()));
    }
}

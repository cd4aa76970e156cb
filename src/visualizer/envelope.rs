use crate::config::BarConfig;

/// Linear remap of a dB level to a bar height in pixels.
///
/// `signal_threshold` is the level treated as silence; it maps to zero.
pub fn db_to_pixels(db: f64, config: &BarConfig) -> f64 {
    let threshold = config.signal_threshold.abs();
    if threshold == 0.0 {
        return 0.0;
    }
    (db + threshold) * config.max_height / threshold * (config.amplification / 100.0)
}

/// Per-band state carried between frames.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BarState {
    pub previous_height: f64,
    pub decay_deceleration: f64,
}

/// One band's next height given its previous state.
///
/// Rises are adopted immediately. Falls faster than `max_height / millis_to_zero`
/// per millisecond are limited to that rate, and the drop ramps up towards it
/// in steps of `1 / acceleration_factor` so the bar starts falling gently.
pub fn decay(state: &mut BarState, new_height: f64, elapsed_ms: f64, config: &BarConfig) -> f64 {
    let old_height = state.previous_height;
    let rate_per_ms = config.max_height / config.millis_to_zero;
    let mut decay_size = rate_per_ms * elapsed_ms.max(0.0);

    let height = if new_height < old_height - decay_size {
        let step = decay_size / config.acceleration_factor;
        if state.decay_deceleration + step < decay_size {
            state.decay_deceleration += step;
            decay_size = state.decay_deceleration;
        }
        old_height - decay_size
    } else {
        state.decay_deceleration = 0.0;
        new_height
    };

    // NaN falls to the floor as well.
    let height = height.max(config.min_height);
    state.previous_height = height;
    height
}

/// Turns smoothed band levels into animated bar heights.
///
/// Owned by the render side only.
#[derive(Debug, Default)]
pub struct BarEnvelopeFollower {
    bars: Vec<BarState>,
}

impl BarEnvelopeFollower {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn bars(&self) -> &[BarState] {
        &self.bars
    }

    /// Heights for `band_db`, `elapsed_ms` after the previous call.
    ///
    /// A change in band count restarts every bar from the current frame.
    pub fn follow(&mut self, band_db: &[f64], elapsed_ms: f64, config: &BarConfig) -> Vec<f64> {
        if self.bars.len() != band_db.len() {
            self.bars = band_db
                .iter()
                .map(|&db| BarState {
                    previous_height: db_to_pixels(db, config).max(config.min_height),
                    decay_deceleration: 0.0,
                })
                .collect();
            return self.bars.iter().map(|bar| bar.previous_height).collect();
        }

        band_db
            .iter()
            .zip(self.bars.iter_mut())
            .map(|(&db, bar)| decay(bar, db_to_pixels(db, config), elapsed_ms, config))
            .collect()
    }
}

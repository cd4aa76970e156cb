//! Logarithmically spaced 1/N-octave band centers.
//!
//! Band sets depend only on a handful of user settings, so generated sets are
//! cached for the lifetime of the process and never evicted.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

/// Lowest frequency accepted for any band parameter. Smaller inputs are coerced.
pub const MIN_FREQUENCY_HZ: f64 = 1.0;

/// Highest frequency accepted for any band parameter, infinity included.
pub const MAX_FREQUENCY_HZ: f64 = 1_000_000.0;

/// Cache key. Floats compare by bit pattern so the key is `Eq` and `Hash`.
#[derive(Debug, Clone, Copy)]
pub struct OctaveBandKey {
    pub center: f64,
    pub bands_per_octave: u32,
    pub lower_limit: f64,
    pub upper_limit: f64,
}

impl OctaveBandKey {
    /// Build a key with every frequency clamped to
    /// [`MIN_FREQUENCY_HZ`]..=[`MAX_FREQUENCY_HZ`] and at least one band per octave.
    pub fn new(center: f64, bands_per_octave: u32, lower_limit: f64, upper_limit: f64) -> Self {
        Self {
            center: clamp_frequency(center),
            bands_per_octave: bands_per_octave.max(1),
            lower_limit: clamp_frequency(lower_limit),
            upper_limit: clamp_frequency(upper_limit),
        }
    }
}

fn clamp_frequency(hz: f64) -> f64 {
    if hz.is_nan() {
        MIN_FREQUENCY_HZ
    } else {
        hz.clamp(MIN_FREQUENCY_HZ, MAX_FREQUENCY_HZ)
    }
}

impl PartialEq for OctaveBandKey {
    fn eq(&self, other: &Self) -> bool {
        self.center.to_bits() == other.center.to_bits()
            && self.bands_per_octave == other.bands_per_octave
            && self.lower_limit.to_bits() == other.lower_limit.to_bits()
            && self.upper_limit.to_bits() == other.upper_limit.to_bits()
    }
}

impl Eq for OctaveBandKey {}

impl Hash for OctaveBandKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.center.to_bits());
        state.write_u32(self.bands_per_octave);
        state.write_u64(self.lower_limit.to_bits());
        state.write_u64(self.upper_limit.to_bits());
    }
}

/// Ascending band center frequencies, shared out of the cache.
pub type OctaveBandSet = Arc<[f64]>;

/// Memoizing band generator.
#[derive(Default)]
pub struct OctaveBands {
    entries: RwLock<HashMap<OctaveBandKey, OctaveBandSet>>,
}

impl OctaveBands {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide instance used by the render pipeline.
    pub fn global() -> &'static OctaveBands {
        static INSTANCE: OnceLock<OctaveBands> = OnceLock::new();
        INSTANCE.get_or_init(OctaveBands::new)
    }

    /// Band centers for a 1/`bands_per_octave` layout around `center`, bounded
    /// by `[lower_limit, upper_limit]`.
    pub fn get_bands(
        &self,
        center: f64,
        bands_per_octave: u32,
        lower_limit: f64,
        upper_limit: f64,
    ) -> OctaveBandSet {
        let key = OctaveBandKey::new(center, bands_per_octave, lower_limit, upper_limit);

        if let Some(existing) = self.entries.read().get(&key) {
            return Arc::clone(existing);
        }

        let mut entries = self.entries.write();
        Arc::clone(
            entries
                .entry(key)
                .or_insert_with(|| Arc::from(generate(&key))),
        )
    }

    /// Number of distinct band layouts generated so far.
    #[cfg(test)]
    pub fn cached_layouts(&self) -> usize {
        self.entries.read().len()
    }
}

fn generate(key: &OctaveBandKey) -> Vec<f64> {
    let ratio = 2f64.powf(1.0 / key.bands_per_octave as f64);
    let mut bands = vec![key.center];

    let mut freq = key.center / ratio;
    while freq >= key.lower_limit {
        bands.push(freq);
        freq /= ratio;
    }

    let mut freq = key.center * ratio;
    while freq <= key.upper_limit {
        bands.push(freq);
        freq *= ratio;
    }

    bands.sort_by(|a, b| a.total_cmp(b));
    bands.dedup();
    // The center itself may sit outside a narrowed range.
    bands.retain(|&f| f >= key.lower_limit && f <= key.upper_limit);
    bands
}

/// Lower edge of the band centered at `center`.
pub fn low_limit(center: f64, bands_per_octave: u32) -> f64 {
    center / 2f64.powf(1.0 / (2.0 * bands_per_octave.max(1) as f64))
}

/// Upper edge of the band centered at `center`.
pub fn high_limit(center: f64, bands_per_octave: u32) -> f64 {
    center * 2f64.powf(1.0 / (2.0 * bands_per_octave.max(1) as f64))
}

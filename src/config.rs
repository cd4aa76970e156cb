use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::audio::{AudioFormat, CaptureSettings};
use crate::color::ColorScheme;
use crate::spectrum::{LevelMetric, WeightingCurve};
use crate::visualizer::SmoothingMode;

/// Sample rates the capture side is tuned for.
pub const SUPPORTED_SAMPLE_RATES: [u32; 2] = [44100, 48000];

/// Bands-per-octave choices offered at runtime.
pub const OCTAVE_RESOLUTIONS: [u32; 4] = [3, 6, 12, 24];

pub const MAX_BANDS_PER_OCTAVE: u32 = 96;

/// EMA weights are `i^i` and overflow `f64` from a window of 144.
pub const MAX_SMOOTHING_WINDOW: usize = 64;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub spectrum: SpectrumConfig,
    pub smoothing: SmoothingConfig,
    pub bars: BarConfig,
    pub display: DisplayConfig,
}

/// Capture parameters. Any change here needs a capture restart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    /// Substring of the capture device name (empty = first available)
    pub device: String,
    pub sample_rate: u32,
    pub sample_bits: u16,
    pub channels: u16,
    pub signed: bool,
    pub big_endian: bool,
    /// Samples per analysis block
    pub buffer_size: usize,
    /// Samples shared between consecutive blocks
    pub buffer_overlap: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: String::new(),
            sample_rate: 48000,
            sample_bits: 16,
            channels: 1,
            signed: true,
            big_endian: false,
            buffer_size: 4096,
            buffer_overlap: 2048,
        }
    }
}

impl AudioConfig {
    pub fn format(&self) -> AudioFormat {
        AudioFormat {
            sample_rate: self.sample_rate,
            sample_bits: self.sample_bits,
            channels: self.channels,
            signed: self.signed,
            big_endian: self.big_endian,
        }
    }

    pub fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings {
            device: self.device.clone(),
            format: self.format(),
            buffer_size: self.buffer_size,
            buffer_overlap: self.buffer_overlap,
        }
    }

    /// Whether moving from `self` to `other` needs the capture restarted.
    pub fn requires_restart(&self, other: &AudioConfig) -> bool {
        self != other
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpectrumConfig {
    pub bands_per_octave: u32,
    pub frequency_start: f64,
    pub frequency_center: f64,
    pub frequency_end: f64,
    pub level: LevelMetric,
    pub weighting: WeightingCurve,
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            bands_per_octave: 6,
            frequency_start: 39.0,
            frequency_center: 1000.0,
            frequency_end: 16001.0,
            level: LevelMetric::Peak,
            weighting: WeightingCurve::A,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Frames averaged together; below 2 disables smoothing
    pub window_size: usize,
    pub mode: SmoothingMode,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            window_size: 3,
            mode: SmoothingMode::Wma,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BarConfig {
    pub min_height: f64,
    pub max_height: f64,
    /// Level in dB treated as silence
    pub signal_threshold: f64,
    /// Gain in percent
    pub amplification: f64,
    /// Fastest a full-height bar may fall to zero
    pub millis_to_zero: f64,
    /// Frames a falling bar takes to reach full decay speed
    pub acceleration_factor: f64,
}

impl Default for BarConfig {
    fn default() -> Self {
        Self {
            min_height: 2.0,
            max_height: 40.0,
            signal_threshold: -28.0,
            amplification: 100.0,
            millis_to_zero: 400.0,
            acceleration_factor: 4.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DisplayConfig {
    pub fps: u32,
    pub color_scheme: ColorScheme,
    pub bar_width: u16,
    pub bar_spacing: u16,
    pub mirror: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            fps: 60,
            color_scheme: ColorScheme::Spectrum,
            bar_width: 2,
            bar_spacing: 1,
            mirror: false,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Get the default XDG config path (~/.config/bandscope/config.toml)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("bandscope").join("config.toml"))
    }

    /// Load config from the default XDG path if it exists.
    /// Returns None if the file doesn't exist, logs a warning on parse errors.
    pub fn load_from_default_path() -> Option<Self> {
        let path = Self::default_path()?;
        if !path.exists() {
            return None;
        }
        match Self::load(&path) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!(
                    "Failed to parse config at {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                None
            }
        }
    }

    /// Initialize default config file at XDG path, returns the path
    pub fn init_default_config() -> Result<PathBuf> {
        let path = Self::default_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(&path, Self::generate_config_template())?;
        Ok(path)
    }

    /// Coerce out-of-range values instead of rejecting them.
    pub fn sanitize(&mut self) {
        let defaults = Config::default();

        let audio = &mut self.audio;
        if audio.buffer_size < 2 {
            warn!("buffer_size {} too small, using 2", audio.buffer_size);
            audio.buffer_size = 2;
        }
        if audio.buffer_overlap >= audio.buffer_size {
            warn!(
                "buffer_overlap {} must be below buffer_size {}",
                audio.buffer_overlap, audio.buffer_size
            );
            audio.buffer_overlap = audio.buffer_size - 1;
        }
        if audio.channels == 0 {
            audio.channels = 1;
        }
        if !SUPPORTED_SAMPLE_RATES.contains(&audio.sample_rate) {
            warn!(
                "Sample rate {} is not one of {:?}; capture may fail",
                audio.sample_rate, SUPPORTED_SAMPLE_RATES
            );
        }

        let spectrum = &mut self.spectrum;
        spectrum.bands_per_octave = spectrum.bands_per_octave.clamp(1, MAX_BANDS_PER_OCTAVE);
        for (value, default) in [
            (&mut spectrum.frequency_start, defaults.spectrum.frequency_start),
            (&mut spectrum.frequency_center, defaults.spectrum.frequency_center),
            (&mut spectrum.frequency_end, defaults.spectrum.frequency_end),
        ] {
            if !value.is_finite() {
                warn!("Frequency {} is not finite, using {}", value, default);
                *value = default;
            }
        }

        self.smoothing.window_size = self.smoothing.window_size.clamp(1, MAX_SMOOTHING_WINDOW);

        let bars = &mut self.bars;
        if !(bars.millis_to_zero > 0.0) {
            bars.millis_to_zero = defaults.bars.millis_to_zero;
        }
        if !(bars.acceleration_factor > 0.0) {
            bars.acceleration_factor = defaults.bars.acceleration_factor;
        }
        if bars.max_height < bars.min_height {
            bars.max_height = bars.min_height;
        }

        self.display.fps = self.display.fps.clamp(1, 240);
    }

    /// Merge CLI arguments into config (CLI takes priority)
    pub fn merge_args(&mut self, args: &crate::Args) {
        if let Some(ref device) = args.device {
            self.audio.device = device.clone();
        }
        if let Some(rate) = args.sample_rate {
            self.audio.sample_rate = rate;
        }
        if let Some(size) = args.buffer_size {
            self.audio.buffer_size = size;
        }
        if let Some(overlap) = args.buffer_overlap {
            self.audio.buffer_overlap = overlap;
        }

        if let Some(bands) = args.bands_per_octave {
            self.spectrum.bands_per_octave = bands;
        }
        if let Some(weighting) = args.weighting {
            self.spectrum.weighting = weighting;
        }
        if let Some(level) = args.level {
            self.spectrum.level = level;
        }

        if let Some(window) = args.smoothing_window {
            self.smoothing.window_size = window;
        }
        if let Some(mode) = args.smoothing_mode {
            self.smoothing.mode = mode;
        }

        if let Some(fps) = args.fps {
            self.display.fps = fps;
        }
        if let Some(ref colors) = args.colors {
            match colors.parse() {
                Ok(scheme) => self.display.color_scheme = scheme,
                Err(e) => warn!("{}", e),
            }
        }
        if args.mirror {
            self.display.mirror = true;
        }
    }

    /// Generate a commented TOML config template
    pub fn generate_config_template() -> String {
        r#"# Bandscope Configuration
# This file is auto-generated. Edit as needed.

[audio]
# Capture device name substring (empty = first available source)
device = ""
# Sample rate in Hz: 44100 or 48000
sample_rate = 48000
# Bits per sample (8 = unsigned, 16/24/32 = signed)
sample_bits = 16
channels = 1
signed = true
big_endian = false
# Samples per FFT block
buffer_size = 4096
# Samples shared between consecutive blocks (must be below buffer_size)
buffer_overlap = 2048

[spectrum]
# Bands per octave (3 = third-octave)
bands_per_octave = 6
# Frequency range in Hz
frequency_start = 39.0
frequency_center = 1000.0
frequency_end = 16001.0
# Band level: "peak" or "rms"
level = "peak"
# Weighting curve: "A", "B", "C" or "Z" (flat)
weighting = "A"

[smoothing]
# Frames averaged together (1 = off)
window_size = 3
# "sma", "wma" or "ema"
mode = "wma"

[bars]
min_height = 2.0
max_height = 40.0
# Level in dB shown as an empty bar
signal_threshold = -28.0
# Gain in percent
amplification = 100.0
# Fastest a full bar may fall to zero, in milliseconds
millis_to_zero = 400.0
# Frames a falling bar takes to reach full decay speed
acceleration_factor = 4.0

[display]
fps = 60
# Color scheme: "spectrum", "fire", "ocean", "monochrome"
color_scheme = "spectrum"
# Width of each bar in characters
bar_width = 2
# Spacing between bars in characters
bar_spacing = 1
# Bars grow from the middle
mirror = false
"#
        .to_string()
    }
}

mod backend;
mod capture;
mod exchange;
mod fft;
mod registry;

pub use backend::{AudioBackend, PulseBackend};
pub use capture::{CaptureSession, CaptureSettings};
pub use exchange::FrameExchange;
pub use fft::{SpectralTransform, SpectrumFrame};
pub use registry::AudioLineRegistry;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Capture errors. None of these are fatal to the host; sessions log them and
/// stay stopped until restarted.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    #[error("No capture device matches '{0}'")]
    DeviceUnavailable(String),

    #[error("Failed to open capture line on {device}: {reason}")]
    LineOpenFailed { device: String, reason: String },

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to enumerate capture devices: {0}")]
    Enumeration(String),

    #[error("Capture read failed: {0}")]
    Read(String),

    #[error("Thread error: {0}")]
    Thread(String),
}

/// Raw PCM layout of a capture line. Fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub sample_bits: u16,
    pub channels: u16,
    pub signed: bool,
    pub big_endian: bool,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            sample_bits: 16,
            channels: 1,
            signed: true,
            big_endian: false,
        }
    }
}

impl AudioFormat {
    pub fn bytes_per_sample(&self) -> usize {
        (self.sample_bits as usize).div_ceil(8)
    }

    /// Size of one interleaved frame (one sample per channel).
    pub fn frame_bytes(&self) -> usize {
        self.bytes_per_sample() * self.channels.max(1) as usize
    }
}

use libpulse_binding as pulse;
use libpulse_simple_binding as psimple;
use pulse::def::BufferAttr;
use pulse::sample::{Format, Spec};
use pulse::stream::Direction;
use tracing::{debug, info};

use super::{AudioFormat, CaptureError};

/// An open hardware capture line delivering raw interleaved PCM.
pub trait CaptureLine: Send {
    /// Block until `buf` is completely filled.
    fn read(&mut self, buf: &mut [u8]) -> Result<(), CaptureError>;

    /// Stop and close the line. Later reads fail.
    fn close(&mut self);
}

/// Device enumeration and line opening.
pub trait AudioBackend: Send + Sync {
    /// Names of the available capture devices, in preference order.
    fn list_input_devices(&self) -> Result<Vec<String>, CaptureError>;

    fn open_line(
        &self,
        device: &str,
        format: &AudioFormat,
        buffer_bytes: usize,
    ) -> Result<Box<dyn CaptureLine>, CaptureError>;
}

/// List available PulseAudio/PipeWire sources.
///
/// Returns a list of `(name, state)` tuples parsed from `pactl list short sources`.
pub fn list_sources() -> Result<Vec<(String, String)>, CaptureError> {
    let output = std::process::Command::new("pactl")
        .args(["list", "short", "sources"])
        .output()
        .map_err(|e| CaptureError::Enumeration(format!("failed to run pactl: {}", e)))?;

    if !output.status.success() {
        return Err(CaptureError::Enumeration(
            "pactl list short sources failed".to_string(),
        ));
    }

    let text = String::from_utf8_lossy(&output.stdout);
    let mut sources = Vec::new();
    for line in text.lines() {
        // Format: <id>\t<name>\t<module>\t<sample_spec>\t<state>
        let cols: Vec<&str> = line.split('\t').collect();
        if cols.len() >= 5 {
            sources.push((cols[1].to_string(), cols[4].to_string()));
        }
    }
    Ok(sources)
}

/// Capture through the PulseAudio simple API (also served by PipeWire).
#[derive(Debug, Default)]
pub struct PulseBackend;

impl PulseBackend {
    fn sample_spec(format: &AudioFormat) -> Result<Spec, CaptureError> {
        let sample_format = match (format.sample_bits, format.signed, format.big_endian) {
            (8, false, _) => Format::U8,
            (16, true, false) => Format::S16le,
            (16, true, true) => Format::S16be,
            (24, true, false) => Format::S24le,
            (24, true, true) => Format::S24be,
            (32, true, false) => Format::S32le,
            (32, true, true) => Format::S32be,
            (bits, signed, big_endian) => {
                return Err(CaptureError::UnsupportedFormat(format!(
                    "{} bit {} {}",
                    bits,
                    if signed { "signed" } else { "unsigned" },
                    if big_endian { "big-endian" } else { "little-endian" },
                )))
            }
        };

        let spec = Spec {
            format: sample_format,
            channels: format.channels.clamp(1, u8::MAX as u16) as u8,
            rate: format.sample_rate,
        };

        if !spec.is_valid() {
            return Err(CaptureError::UnsupportedFormat(format!("{:?}", format)));
        }
        Ok(spec)
    }
}

impl AudioBackend for PulseBackend {
    fn list_input_devices(&self) -> Result<Vec<String>, CaptureError> {
        // Sources that are already running come first so a blank device
        // setting picks whatever is live.
        let mut sources = list_sources()?;
        sources.sort_by_key(|(_, state)| state != "RUNNING");
        Ok(sources.into_iter().map(|(name, _)| name).collect())
    }

    fn open_line(
        &self,
        device: &str,
        format: &AudioFormat,
        buffer_bytes: usize,
    ) -> Result<Box<dyn CaptureLine>, CaptureError> {
        let spec = Self::sample_spec(format)?;
        let attr = BufferAttr {
            maxlength: u32::MAX,
            tlength: u32::MAX,
            prebuf: u32::MAX,
            minreq: u32::MAX,
            fragsize: buffer_bytes.min(u32::MAX as usize) as u32,
        };

        let simple = psimple::Simple::new(
            None,                // Use default server
            "bandscope",         // Application name
            Direction::Record,   // Recording stream
            Some(device),        // Source name
            "spectrum-analyzer", // Stream description
            &spec,               // Sample format
            None,                // Default channel map
            Some(&attr),         // Fragment size follows the capture buffer
        )
        .map_err(|e| CaptureError::LineOpenFailed {
            device: device.to_string(),
            reason: format!("{:?}", e),
        })?;

        info!(
            "Opened capture line on {} ({} Hz, {} bit, {} ch)",
            device, format.sample_rate, format.sample_bits, format.channels
        );

        Ok(Box::new(PulseLine {
            device: device.to_string(),
            simple: Some(simple),
        }))
    }
}

struct PulseLine {
    device: String,
    simple: Option<psimple::Simple>,
}

impl CaptureLine for PulseLine {
    fn read(&mut self, buf: &mut [u8]) -> Result<(), CaptureError> {
        match &self.simple {
            Some(simple) => simple
                .read(buf)
                .map_err(|e| CaptureError::Read(format!("{:?}", e))),
            None => Err(CaptureError::Read(format!("{} is closed", self.device))),
        }
    }

    fn close(&mut self) {
        if self.simple.take().is_some() {
            debug!("Closed capture line on {}", self.device);
        }
    }
}

/// Decode interleaved PCM frames into mono samples in [-1, 1), averaging channels.
///
/// Trailing bytes that do not form a whole frame are ignored.
pub fn decode_frames(bytes: &[u8], format: &AudioFormat) -> Vec<f64> {
    let width = format.bytes_per_sample();
    let channels = format.channels.max(1) as usize;
    if width == 0 || width > 4 {
        return Vec::new();
    }

    let bits = (width * 8) as u32;
    let full_scale = (1u64 << (bits - 1)) as f64;

    bytes
        .chunks_exact(width * channels)
        .map(|frame| {
            let sum: f64 = frame
                .chunks_exact(width)
                .map(|raw| {
                    let mut value: u32 = 0;
                    for i in 0..width {
                        let byte = if format.big_endian { raw[i] } else { raw[width - 1 - i] };
                        value = (value << 8) | byte as u32;
                    }
                    let sample = if format.signed {
                        // Sign-extend from the sample width.
                        let shift = 32 - bits;
                        (((value << shift) as i32) >> shift) as f64
                    } else {
                        value as f64 - full_scale
                    };
                    sample / full_scale
                })
                .sum();
            sum / channels as f64
        })
        .collect()
}

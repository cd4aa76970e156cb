use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::backend::{AudioBackend, CaptureLine};
use super::{AudioFormat, CaptureError};

/// Longest `release` waits for a reader to let go of a line before closing it.
const CLOSE_TIMEOUT: Duration = Duration::from_millis(500);

pub type SharedLine = Arc<Mutex<Box<dyn CaptureLine>>>;

/// One acquisition of a capture line. Releasing the same reference twice is a no-op.
#[derive(Clone)]
pub struct LineRef {
    device: String,
    ticket: u64,
    format: AudioFormat,
    buffer_bytes: usize,
    line: SharedLine,
}

impl LineRef {
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Format the line was opened with, which may differ from what this
    /// acquirer asked for if the line was already open.
    pub fn format(&self) -> &AudioFormat {
        &self.format
    }

    pub fn buffer_bytes(&self) -> usize {
        self.buffer_bytes
    }

    pub fn line(&self) -> &SharedLine {
        &self.line
    }
}

impl std::fmt::Debug for LineRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineRef")
            .field("device", &self.device)
            .field("ticket", &self.ticket)
            .field("format", &self.format)
            .finish()
    }
}

struct LineHandle {
    format: AudioFormat,
    buffer_bytes: usize,
    line: SharedLine,
    /// Outstanding acquisitions; the use count is its length.
    tickets: HashSet<u64>,
}

/// Process-wide authority over open capture lines, shared by reference count.
///
/// The first acquirer of a device decides the line's format and buffer size.
pub struct AudioLineRegistry {
    backend: Arc<dyn AudioBackend>,
    lines: Mutex<HashMap<String, LineHandle>>,
    next_ticket: AtomicU64,
}

impl AudioLineRegistry {
    pub fn new(backend: Arc<dyn AudioBackend>) -> Self {
        Self {
            backend,
            lines: Mutex::new(HashMap::new()),
            next_ticket: AtomicU64::new(1),
        }
    }

    pub fn backend(&self) -> &Arc<dyn AudioBackend> {
        &self.backend
    }

    /// Acquire `device`, opening it if no session holds it yet.
    pub fn acquire(
        &self,
        device: &str,
        format: &AudioFormat,
        buffer_bytes: usize,
    ) -> Result<LineRef, CaptureError> {
        // The map stays locked while opening so two sessions racing for the
        // same device cannot both open it.
        let mut lines = self.lines.lock();
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);

        if let Some(handle) = lines.get_mut(device) {
            handle.tickets.insert(ticket);
            debug!(
                "Reusing capture line on {} (use count {})",
                device,
                handle.tickets.len()
            );
            return Ok(LineRef {
                device: device.to_string(),
                ticket,
                format: handle.format,
                buffer_bytes: handle.buffer_bytes,
                line: Arc::clone(&handle.line),
            });
        }

        let line: SharedLine = Arc::new(Mutex::new(
            self.backend.open_line(device, format, buffer_bytes)?,
        ));
        lines.insert(
            device.to_string(),
            LineHandle {
                format: *format,
                buffer_bytes,
                line: Arc::clone(&line),
                tickets: HashSet::from([ticket]),
            },
        );

        Ok(LineRef {
            device: device.to_string(),
            ticket,
            format: *format,
            buffer_bytes,
            line,
        })
    }

    /// Drop one use of the line, closing it when no uses remain.
    pub fn release(&self, line_ref: &LineRef) {
        let mut lines = self.lines.lock();
        let Some(handle) = lines.get_mut(&line_ref.device) else {
            return;
        };
        if !handle.tickets.remove(&line_ref.ticket) {
            return;
        }
        if handle.tickets.is_empty() {
            let Some(handle) = lines.remove(&line_ref.device) else {
                return;
            };
            drop(lines);
            // A reader wedged in read() keeps the line locked; the backend
            // then closes it when the last reference drops.
            let guard = handle.line.try_lock_for(CLOSE_TIMEOUT);
            match guard {
                Some(mut line) => {
                    line.close();
                    info!("Closed capture line on {}", line_ref.device);
                }
                None => warn!(
                    "Capture line on {} busy; closing when its reader exits",
                    line_ref.device
                ),
            };
        } else {
            debug!(
                "Released capture line on {} (use count {})",
                line_ref.device,
                handle.tickets.len()
            );
        }
    }

    /// Current number of users of `device`, 0 if it is not open.
    pub fn use_count(&self, device: &str) -> usize {
        self.lines
            .lock()
            .get(device)
            .map(|handle| handle.tickets.len())
            .unwrap_or(0)
    }

    #[cfg(test)]
    pub fn is_open(&self, device: &str) -> bool {
        self.lines.lock().contains_key(device)
    }
}

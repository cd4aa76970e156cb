use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::backend::decode_frames;
use super::registry::LineRef;
use super::{
    AudioFormat, AudioLineRegistry, CaptureError, FrameExchange, SpectralTransform, SpectrumFrame,
};

/// How long `stop()` waits for the capture thread before detaching it.
const JOIN_TIMEOUT: Duration = Duration::from_millis(1000);

/// Pause after a failed read so a dead line does not spin the thread.
const READ_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Everything that requires a capture restart when changed.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSettings {
    /// Substring of the device name; blank picks the first available device
    pub device: String,
    pub format: AudioFormat,
    /// Samples per analysis block (FFT size)
    pub buffer_size: usize,
    /// Samples shared between consecutive blocks
    pub buffer_overlap: usize,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            device: String::new(),
            format: AudioFormat::default(),
            buffer_size: 4096,
            buffer_overlap: 2048,
        }
    }
}

impl CaptureSettings {
    /// New samples consumed between blocks.
    pub fn step(&self) -> usize {
        let size = self.buffer_size.max(2);
        size - self.buffer_overlap.min(size - 1)
    }
}

/// Cuts a continuous sample stream into fixed-size, overlapping blocks.
pub struct BlockAssembler {
    size: usize,
    step: usize,
    pending: Vec<f64>,
}

impl BlockAssembler {
    pub fn new(size: usize, step: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            step: step.clamp(1, size),
            pending: Vec::with_capacity(size * 2),
        }
    }

    /// Append samples and hand every completed block to `emit`.
    pub fn push(&mut self, samples: &[f64], mut emit: impl FnMut(&[f64])) {
        self.pending.extend_from_slice(samples);
        while self.pending.len() >= self.size {
            emit(&self.pending[..self.size]);
            self.pending.drain(..self.step);
        }
    }
}

struct Worker {
    stop_flag: Arc<AtomicBool>,
    thread: JoinHandle<()>,
    done_rx: mpsc::Receiver<()>,
    line: LineRef,
}

/// Signals the owning session when the capture thread exits, even by panic.
struct ExitSignal(mpsc::Sender<()>);

impl Drop for ExitSignal {
    fn drop(&mut self) {
        let _ = self.0.send(());
    }
}

/// One live capture: a device binding plus the thread pumping it into a
/// [`FrameExchange`].
pub struct CaptureSession {
    registry: Arc<AudioLineRegistry>,
    exchange: Arc<FrameExchange<SpectrumFrame>>,
    settings: Mutex<CaptureSettings>,
    /// Held across stop + start so concurrent restarts serialize.
    worker: Mutex<Option<Worker>>,
    capture_thread: Mutex<Option<ThreadId>>,
}

impl CaptureSession {
    pub fn new(
        registry: Arc<AudioLineRegistry>,
        exchange: Arc<FrameExchange<SpectrumFrame>>,
        settings: CaptureSettings,
    ) -> Self {
        Self {
            registry,
            exchange,
            settings: Mutex::new(settings),
            worker: Mutex::new(None),
            capture_thread: Mutex::new(None),
        }
    }

    #[cfg(test)]
    pub fn exchange(&self) -> &Arc<FrameExchange<SpectrumFrame>> {
        &self.exchange
    }

    pub fn settings(&self) -> CaptureSettings {
        self.settings.lock().clone()
    }

    /// Replace the settings used by the next `start()`.
    pub fn set_settings(&self, settings: CaptureSettings) {
        *self.settings.lock() = settings;
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Open the configured device and spawn the capture thread.
    ///
    /// Failures are logged and leave the session stopped; the error is returned
    /// for callers that want to report it.
    pub fn start(&self) -> Result<(), CaptureError> {
        let mut worker = self.worker.lock();
        self.start_locked(&mut worker)
    }

    /// Stop the capture thread and release the line.
    pub fn stop(&self) {
        if self.on_capture_thread() {
            error!("Capture session cannot be stopped from its own capture thread");
            return;
        }
        let mut worker = self.worker.lock();
        self.stop_locked(&mut worker);
    }

    /// Stop then start. Must not be called from the capture thread.
    pub fn restart(&self) -> Result<(), CaptureError> {
        if self.on_capture_thread() {
            error!("Capture session cannot be restarted from its own capture thread");
            return Err(CaptureError::Thread(
                "restart called from the capture thread".to_string(),
            ));
        }
        let mut worker = self.worker.lock();
        self.stop_locked(&mut worker);
        self.start_locked(&mut worker)
    }

    /// Restart on a short-lived worker thread so the caller never blocks.
    pub fn restart_async(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let session = Arc::clone(self);
        thread::Builder::new()
            .name("capture-restart".to_string())
            .spawn(move || {
                // Errors are already logged by start().
                let _ = session.restart();
            })
            .map_err(|e| error!("Failed to spawn restart thread: {}", e))
            .ok()
    }

    /// Final teardown.
    pub fn dispose(&self) {
        self.stop();
    }

    fn on_capture_thread(&self) -> bool {
        *self.capture_thread.lock() == Some(thread::current().id())
    }

    fn start_locked(&self, worker: &mut Option<Worker>) -> Result<(), CaptureError> {
        if worker.is_some() {
            debug!("Capture session already running");
            return Ok(());
        }

        let settings = self.settings();
        match self.spawn_worker(&settings) {
            Ok(new_worker) => {
                *self.capture_thread.lock() = Some(new_worker.thread.thread().id());
                *worker = Some(new_worker);
                Ok(())
            }
            Err(e) => {
                error!("Audio capture not started: {}", e);
                Err(e)
            }
        }
    }

    fn stop_locked(&self, worker: &mut Option<Worker>) {
        let Some(Worker {
            stop_flag,
            thread,
            done_rx,
            line,
        }) = worker.take()
        else {
            return;
        };

        stop_flag.store(true, Ordering::Relaxed);
        match done_rx.recv_timeout(JOIN_TIMEOUT) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if thread.join().is_err() {
                    warn!("Capture thread panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "Capture thread did not stop within {:?}; detaching it",
                    JOIN_TIMEOUT
                );
            }
        }

        *self.capture_thread.lock() = None;
        self.registry.release(&line);
        info!("Audio capture stopped on {}", line.device());
    }

    fn resolve_device(&self, wanted: &str) -> Result<String, CaptureError> {
        let devices = self.registry.backend().list_input_devices()?;
        let wanted = wanted.trim();
        devices
            .into_iter()
            .find(|name| wanted.is_empty() || name.contains(wanted))
            .ok_or_else(|| CaptureError::DeviceUnavailable(wanted.to_string()))
    }

    fn spawn_worker(&self, settings: &CaptureSettings) -> Result<Worker, CaptureError> {
        let device = self.resolve_device(&settings.device)?;
        let step = settings.step();
        let buffer_bytes = step * settings.format.frame_bytes();
        let line = self
            .registry
            .acquire(&device, &settings.format, buffer_bytes)?;

        // A shared line keeps its original format, so decode with that one.
        let format = *line.format();
        if format != settings.format || line.buffer_bytes() != buffer_bytes {
            warn!(
                "{} is already open as {:?} with {} byte fragments; requested {:?} with {}",
                device,
                format,
                line.buffer_bytes(),
                settings.format,
                buffer_bytes
            );
        }

        let stop_flag = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = mpsc::channel();
        let pump = CapturePump {
            line: line.clone(),
            format,
            buffer_size: settings.buffer_size.max(2),
            step,
            exchange: Arc::clone(&self.exchange),
            stop_flag: Arc::clone(&stop_flag),
        };

        let spawned = thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || {
                let _exit = ExitSignal(done_tx);
                pump.run();
            });

        let thread = match spawned {
            Ok(thread) => thread,
            Err(e) => {
                self.registry.release(&line);
                return Err(CaptureError::Thread(e.to_string()));
            }
        };

        info!(
            "Audio capture started on {} ({} Hz, block {}, step {}, {} session(s) on the line)",
            device,
            format.sample_rate,
            settings.buffer_size,
            step,
            self.registry.use_count(&device)
        );

        Ok(Worker {
            stop_flag,
            thread,
            done_rx,
            line,
        })
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        let mut worker = self.worker.get_mut().take();
        self.stop_locked(&mut worker);
    }
}

/// State owned by the capture thread.
struct CapturePump {
    line: LineRef,
    format: AudioFormat,
    buffer_size: usize,
    step: usize,
    exchange: Arc<FrameExchange<SpectrumFrame>>,
    stop_flag: Arc<AtomicBool>,
}

impl CapturePump {
    fn run(self) {
        let mut transform = SpectralTransform::new(self.buffer_size, self.format.sample_rate);
        let mut sink = BlockSink {
            analyze: |block: &[f64]| transform.process(block),
            exchange: Arc::clone(&self.exchange),
        };
        let mut assembler = BlockAssembler::new(self.buffer_size, self.step);
        let mut bytes = vec![0u8; self.step * self.format.frame_bytes()];

        loop {
            if self.stopping() {
                break;
            }

            let read = self.line.line().lock().read(&mut bytes);
            if let Err(e) = read {
                warn!("Capture read error on {}: {}", self.line.device(), e);
                thread::sleep(READ_RETRY_DELAY);
                continue;
            }

            if self.stopping() {
                break;
            }

            let samples = decode_frames(&bytes, &self.format);
            assembler.push(&samples, |block| {
                if self.stopping() {
                    return;
                }
                sink.accept(block);
            });
        }

        debug!("Stop flag set, ending capture loop");
    }

    fn stopping(&self) -> bool {
        self.stop_flag.load(Ordering::Relaxed)
    }
}

/// Analyzes blocks and publishes the results. A block whose analysis panics
/// is logged and dropped; the next block is handled normally.
struct BlockSink<F> {
    analyze: F,
    exchange: Arc<FrameExchange<SpectrumFrame>>,
}

impl<F: FnMut(&[f64]) -> SpectrumFrame> BlockSink<F> {
    /// Returns whether the block produced a frame.
    fn accept(&mut self, block: &[f64]) -> bool {
        match panic::catch_unwind(AssertUnwindSafe(|| (self.analyze)(block))) {
            Ok(frame) => {
                self.exchange.publish(frame);
                true
            }
            Err(_) => {
                error!("Spectral transform panicked; skipping block");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::registry::tests::FakeBackend;
    use std::time::Instant;

    fn session_with(
        backend: FakeBackend,
        device: &str,
    ) -> (Arc<CaptureSession>, Arc<AudioLineRegistry>) {
        let registry = Arc::new(AudioLineRegistry::new(Arc::new(backend)));
        let settings = CaptureSettings {
            device: device.to_string(),
            buffer_size: 256,
            buffer_overlap: 128,
            ..Default::default()
        };
        let session = Arc::new(CaptureSession::new(
            Arc::clone(&registry),
            Arc::new(FrameExchange::new()),
            settings,
        ));
        (session, registry)
    }

    fn wait_for_frame(session: &CaptureSession) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if session.exchange().fetch_latest_or_stale().is_some() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn assembler_emits_overlapping_blocks() {
        let mut assembler = BlockAssembler::new(4, 2);
        let mut blocks = Vec::new();

        assembler.push(&[1.0, 2.0, 3.0], |b| blocks.push(b.to_vec()));
        assert!(blocks.is_empty());

        assembler.push(&[4.0, 5.0, 6.0, 7.0, 8.0], |b| blocks.push(b.to_vec()));
        assert_eq!(
            blocks,
            vec![
                vec![1.0, 2.0, 3.0, 4.0],
                vec![3.0, 4.0, 5.0, 6.0],
                vec![5.0, 6.0, 7.0, 8.0],
            ]
        );
    }

    #[test]
    fn step_never_reaches_zero() {
        let settings = CaptureSettings {
            buffer_size: 1024,
            buffer_overlap: 4096,
            ..Default::default()
        };
        assert_eq!(settings.step(), 1);
        assert_eq!(CaptureSettings::default().step(), 2048);
    }

    #[test]
    fn blank_device_picks_first_and_publishes_frames() {
        let (session, registry) = session_with(FakeBackend::with_devices(&["mic", "monitor"]), "");
        session.start().unwrap();
        assert!(session.is_running());
        assert!(registry.is_open("mic"));
        assert!(wait_for_frame(&session));

        session.stop();
        assert!(!session.is_running());
        assert!(!registry.is_open("mic"));
    }

    #[test]
    fn device_is_matched_by_case_sensitive_substring() {
        let (session, registry) = session_with(
            FakeBackend::with_devices(&["alsa_input.usb", "alsa_output.monitor"]),
            "monitor",
        );
        session.start().unwrap();
        assert!(registry.is_open("alsa_output.monitor"));
        session.stop();

        let (session, _) = session_with(FakeBackend::with_devices(&["Monitor"]), "monitor");
        assert_eq!(
            session.start(),
            Err(CaptureError::DeviceUnavailable("monitor".to_string()))
        );
        assert!(!session.is_running());
    }

    #[test]
    fn open_failure_leaves_session_stopped_and_retryable() {
        let backend = FakeBackend {
            refuse: vec!["mic".to_string()],
            ..FakeBackend::with_devices(&["mic"])
        };
        let (session, registry) = session_with(backend, "mic");

        assert!(matches!(
            session.start(),
            Err(CaptureError::LineOpenFailed { .. })
        ));
        assert!(!session.is_running());
        assert!(!registry.is_open("mic"));

        session.set_settings(CaptureSettings {
            device: "nope".to_string(),
            ..session.settings()
        });
        assert!(session.restart().is_err());
        assert!(!session.is_running());
    }

    #[test]
    fn sessions_share_one_line() {
        let backend = FakeBackend::with_devices(&["mic"]);
        let opened = Arc::clone(&backend.opened);
        let (first, registry) = session_with(backend, "mic");
        let second = CaptureSession::new(
            Arc::clone(&registry),
            Arc::new(FrameExchange::new()),
            first.settings(),
        );

        first.start().unwrap();
        second.start().unwrap();
        assert_eq!(registry.use_count("mic"), 2);
        assert_eq!(opened.load(Ordering::SeqCst), 1);

        first.stop();
        assert!(registry.is_open("mic"));
        assert!(wait_for_frame(&second));

        second.dispose();
        assert!(!registry.is_open("mic"));
    }

    #[test]
    fn restart_releases_the_old_line_first() {
        let backend = FakeBackend::with_devices(&["mic", "line-in"]);
        let closed = Arc::clone(&backend.closed);
        let (session, registry) = session_with(backend, "mic");

        session.start().unwrap();
        session.set_settings(CaptureSettings {
            device: "line-in".to_string(),
            ..session.settings()
        });
        session.restart().unwrap();

        assert!(!registry.is_open("mic"));
        assert!(registry.is_open("line-in"));
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        session.stop();
    }

    #[test]
    fn restart_async_runs_off_the_calling_thread() {
        let (session, registry) = session_with(FakeBackend::with_devices(&["mic"]), "mic");
        session.start().unwrap();

        let handles: Vec<_> = (0..4).filter_map(|_| session.restart_async()).collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(session.is_running());
        assert_eq!(registry.use_count("mic"), 1);
        session.stop();
        assert_eq!(registry.use_count("mic"), 0);
    }

    #[test]
    fn dropping_a_running_session_releases_its_line() {
        let (session, registry) = session_with(FakeBackend::with_devices(&["mic"]), "mic");
        session.start().unwrap();
        drop(session);
        assert!(!registry.is_open("mic"));
    }

    #[test]
    fn stop_detaches_a_wedged_reader_and_restart_recovers() {
        let backend = FakeBackend::with_devices(&["mic"]);
        let wedged = Arc::clone(&backend.wedged);
        let reads = Arc::clone(&backend.reads);
        let closed = Arc::clone(&backend.closed);
        let (session, registry) = session_with(backend, "mic");

        wedged.store(true, Ordering::SeqCst);
        session.start().unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while reads.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(reads.load(Ordering::SeqCst) > 0);

        let started = Instant::now();
        session.stop();
        let took = started.elapsed();

        assert!(took >= JOIN_TIMEOUT, "stop returned after {took:?}");
        assert!(took < Duration::from_millis(2500), "stop blocked for {took:?}");
        assert!(!session.is_running());
        assert!(!registry.is_open("mic"));
        // The busy line is left for the detached reader to drop.
        assert_eq!(closed.load(Ordering::SeqCst), 0);

        wedged.store(false, Ordering::SeqCst);
        session.restart().unwrap();
        assert!(session.is_running());
        assert_eq!(registry.use_count("mic"), 1);
        assert!(wait_for_frame(&session));
        session.stop();
        assert!(!registry.is_open("mic"));
    }

    #[test]
    fn panicking_block_is_skipped_and_later_blocks_publish() {
        let exchange = Arc::new(FrameExchange::new());
        let worker_exchange = Arc::clone(&exchange);

        let worker = thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || {
                let mut transform = SpectralTransform::new(8, 48000);
                let mut blocks = 0;
                let mut sink = BlockSink {
                    analyze: |block: &[f64]| {
                        blocks += 1;
                        if blocks == 2 {
                            panic!("corrupt block");
                        }
                        transform.process(block)
                    },
                    exchange: worker_exchange,
                };

                let mut assembler = BlockAssembler::new(8, 8);
                let mut accepted = Vec::new();
                assembler.push(&[0.5; 32], |block| accepted.push(sink.accept(block)));
                accepted
            })
            .unwrap();

        let accepted = worker.join().expect("capture thread survived the panic");
        assert_eq!(accepted, vec![true, false, true, true]);
        assert!(exchange.fetch_latest_or_stale().unwrap().is_fresh());
    }
}

use parking_lot::Mutex;
use std::sync::Arc;

/// A frame handed out by [`FrameExchange::fetch_latest_or_stale`].
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery<T> {
    /// Published since the last fetch; delivered exactly once.
    Fresh(Arc<T>),
    /// Nothing new was published; this is the previously delivered frame.
    Stale(Arc<T>),
}

impl<T> Delivery<T> {
    pub fn is_fresh(&self) -> bool {
        matches!(self, Delivery::Fresh(_))
    }

    pub fn into_inner(self) -> Arc<T> {
        match self {
            Delivery::Fresh(frame) | Delivery::Stale(frame) => frame,
        }
    }
}

struct Slots<T> {
    current: Option<Arc<T>>,
    previous: Option<Arc<T>>,
}

/// Single-slot, last-writer-wins mailbox between the capture thread and the
/// render loop. Neither side ever waits on the other beyond a short lock.
pub struct FrameExchange<T> {
    slots: Mutex<Slots<T>>,
}

impl<T> Default for FrameExchange<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FrameExchange<T> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(Slots {
                current: None,
                previous: None,
            }),
        }
    }

    /// Replace the pending frame. An undelivered older frame is dropped.
    pub fn publish(&self, frame: T) {
        self.slots.lock().current = Some(Arc::new(frame));
    }

    /// Take the pending frame, or fall back to the last delivered one.
    /// Returns `None` only if nothing has ever been published.
    pub fn fetch_latest_or_stale(&self) -> Option<Delivery<T>> {
        let mut slots = self.slots.lock();
        match slots.current.take() {
            Some(frame) => {
                slots.previous = Some(Arc::clone(&frame));
                Some(Delivery::Fresh(frame))
            }
            None => slots.previous.clone().map(Delivery::Stale),
        }
    }
}

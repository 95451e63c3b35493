use camfeed_common::frame::Frame;
use camfeed_common::shutdown::ShutdownListener;
use std::sync::Arc;
use tokio::sync::watch;

/// Single-slot hand-off of the latest processed frame.
///
/// One producer publishes, any number of readers take `Arc` handles to the
/// most recent frame. The slot lock is held only to swap or clone the `Arc`,
/// so readers never observe a partially written frame and never hold up the
/// producer while they encode.
#[derive(Debug, Clone)]
pub struct SharedFrameBuffer {
    tx: Arc<watch::Sender<Option<Arc<Frame>>>>,
}

impl SharedFrameBuffer {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Replace the held frame and wake every subscriber.
    pub fn publish(&self, frame: Frame) {
        self.tx.send_replace(Some(Arc::new(frame)));
    }

    /// The most recently published frame, or `None` before the first publish.
    pub fn read_latest(&self) -> Option<Arc<Frame>> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self, shutdown: ShutdownListener) -> FrameSubscriber {
        let mut rx = self.tx.subscribe();
        // Hand out whatever is already held on the first `next_frame`.
        rx.mark_changed();
        FrameSubscriber { rx, shutdown }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for SharedFrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// A reader that suspends until a frame newer than the last one it saw exists.
#[derive(Debug)]
pub struct FrameSubscriber {
    rx: watch::Receiver<Option<Arc<Frame>>>,
    shutdown: ShutdownListener,
}

impl FrameSubscriber {
    /// Wait for the next unseen frame. Returns `None` once shutdown is
    /// requested or the buffer is gone.
    ///
    /// Frames published while the caller was busy are skipped; only the
    /// newest is returned.
    pub async fn next_frame(&mut self) -> Option<Arc<Frame>> {
        loop {
            if self.shutdown.is_triggered() {
                return None;
            }
            tokio::select! {
                changed = self.rx.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
                _ = self.shutdown.wait() => return None,
            }
            let latest = self.rx.borrow_and_update().clone();
            if latest.is_some() {
                return latest;
            }
        }
    }
}

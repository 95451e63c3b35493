use std::sync::Arc;
use tokio::sync::watch;

/// Owner side of the process shutdown signal.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

/// Cloneable handle observed by every long-running loop.
#[derive(Debug, Clone)]
pub struct ShutdownListener {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn listener(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
        }
    }

    /// Fire the signal. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Fires the shutdown signal when dropped, including while a task unwinds
/// from a panic.
#[derive(Debug)]
pub struct ShutdownGuard {
    shutdown: Arc<Shutdown>,
}

impl ShutdownGuard {
    pub fn new(shutdown: Arc<Shutdown>) -> Self {
        Self { shutdown }
    }
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownListener {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown has been requested, or the owner was dropped.
    pub async fn wait(&mut self) {
        loop {
            let fired = *self.rx.borrow_and_update();
            if fired {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn wait_resolves_after_trigger() {
        let shutdown = Shutdown::new();
        let mut listener = shutdown.listener();
        assert!(!listener.is_triggered());

        let waiter = tokio::spawn(async move { listener.wait().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        shutdown.trigger();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn listener_created_after_trigger_sees_it() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        let mut late = shutdown.listener();
        tokio::time::timeout(Duration::from_millis(100), late.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn dropping_owner_releases_waiters() {
        let shutdown = Shutdown::new();
        let mut listener = shutdown.listener();
        drop(shutdown);
        tokio::time::timeout(Duration::from_millis(100), listener.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn guard_fires_when_task_panics() {
        let shutdown = Arc::new(Shutdown::new());
        let mut listener = shutdown.listener();

        let guard = ShutdownGuard::new(Arc::clone(&shutdown));
        let task = tokio::spawn(async move {
            let _guard = guard;
            tokio::task::yield_now().await;
            panic!("worker failed");
        });

        assert!(task.await.unwrap_err().is_panic());
        tokio::time::timeout(Duration::from_secs(1), listener.wait())
            .await
            .unwrap();
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn guard_fires_on_normal_return() {
        let shutdown = Arc::new(Shutdown::new());
        {
            let _guard = ShutdownGuard::new(Arc::clone(&shutdown));
            assert!(!shutdown.is_triggered());
        }
        assert!(shutdown.is_triggered());
    }
}

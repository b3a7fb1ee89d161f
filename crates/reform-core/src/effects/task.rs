//! Cooperative cancellation.

use async_trait::async_trait;
use tokio::sync::watch;

/// Cooperative cancellation token.
#[async_trait]
pub trait CancellationToken: Send + Sync {
    /// Resolves when cancellation is requested.
    async fn cancelled(&self);

    /// Non-blocking cancellation check.
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// The cancelling side of a [`WatchCancellationToken`].
///
/// Dropping the source counts as cancellation for every token it handed out.
#[derive(Debug)]
pub struct CancellationSource {
    tx: watch::Sender<bool>,
}

impl CancellationSource {
    /// Create a source that has not been cancelled.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Whether [`CancellationSource::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// A token observing this source.
    pub fn token(&self) -> WatchCancellationToken {
        WatchCancellationToken {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Token backed by a `tokio::sync::watch` channel.
#[derive(Debug, Clone)]
pub struct WatchCancellationToken {
    rx: watch::Receiver<bool>,
}

#[async_trait]
impl CancellationToken for WatchCancellationToken {
    async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }
}

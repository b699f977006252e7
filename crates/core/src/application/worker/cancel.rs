// Cancellation Token
// Checked at every suspension point of the pool

use std::sync::Arc;
use tokio::sync::watch;

/// Cancellation signal observed by workers, producer and consumer
#[derive(Clone, Debug)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// Check if cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait for cancellation.
    ///
    /// Resolves immediately if already cancelled. Never resolves if every
    /// [`CancelHandle`] is dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        let handle_dropped = rx.wait_for(|cancelled| *cancelled).await.is_err();
        if handle_dropped {
            std::future::pending::<()>().await;
        }
    }
}

/// Cancellation trigger (cloneable, one-way)
#[derive(Clone, Debug)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Signal cancellation to every token
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// New token observing this handle
    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }
}

/// Create a cancellation channel
pub fn cancel_channel() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx: Arc::new(tx) }, CancelToken { rx })
}

//! One-shot broadcast closing signal.

use std::sync::Arc;

use tokio::sync::watch;

/// Broadcast one-shot event shared by every suspension point of a session.
///
/// Clones observe the same signal. [`fire`](Self::fire) flips it at most
/// once; every pending and future [`fired`](Self::fired) call resolves after
/// that.
#[derive(Debug, Clone)]
pub struct ClosingSignal {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl ClosingSignal {
    /// Create an unfired signal.
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Fire the signal. Returns `true` only for the call that fired it.
    pub fn fire(&self) -> bool {
        self.tx.send_if_modified(|fired| {
            if *fired {
                false
            } else {
                *fired = true;
                true
            }
        })
    }

    /// Whether the signal has fired.
    pub fn is_fired(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the signal has fired (immediately if it already has).
    pub async fn fired(&self) {
        let mut rx = self.rx.clone();
        // The sender lives as long as any clone of this signal, so this
        // only returns once the flag is set.
        let _ = rx.wait_for(|fired| *fired).await;
    }
}

impl Default for ClosingSignal {
    fn default() -> Self {
        Self::new()
    }
}

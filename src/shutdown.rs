//! Cooperative shutdown signal shared by the watcher tasks.
//!
//! A cloneable handle over a watch channel: the supervisor holds the
//! [`ShutdownTrigger`], every watcher and the retry middleware hold a
//! [`Shutdown`] and select on [`Shutdown::cancelled`] at their suspension
//! points.

use tokio::sync::watch;

/// Sender half, owned by the supervisor.
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Receiver half, cloned into every task that must stop on shutdown.
#[derive(Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// Create a connected trigger/handle pair.
pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

impl Shutdown {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown is triggered (or the trigger is dropped).
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if *rx.borrow() {
            return;
        }
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
        // Trigger dropped without firing: treat as cancelled so tasks exit.
    }

    /// A handle that is never cancelled, for one-shot CLI paths.
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        // Leak the sender so the channel stays open for the process lifetime.
        std::mem::forget(tx);
        Shutdown { rx }
    }
}

//! Online/offline signal with debounced change notifications.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(2);

/// Operations gated by connectivity. Reads and writes work offline; only
/// authentication requires a live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
    Delete,
    Auth,
}

/// Single source of truth for the device's online/offline state.
///
/// `is_online` answers instantly; `subscribe` delivers transitions only
/// after the signal holds steady for the debounce window, so flappy
/// networks do not hammer the sync engine.
pub struct ConnectivityMonitor {
    online: AtomicBool,
    raw_tx: watch::Sender<bool>,
    debounced_tx: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    /// Create a monitor with the production debounce window (~2s).
    /// Must be called inside a tokio runtime.
    pub fn new(initially_online: bool) -> Arc<Self> {
        Self::with_debounce(initially_online, DEFAULT_DEBOUNCE)
    }

    pub fn with_debounce(initially_online: bool, debounce: Duration) -> Arc<Self> {
        let (raw_tx, mut raw_rx) = watch::channel(initially_online);
        let (debounced_tx, _) = watch::channel(initially_online);

        let publisher = debounced_tx.clone();
        tokio::spawn(async move {
            while raw_rx.changed().await.is_ok() {
                loop {
                    let candidate = *raw_rx.borrow_and_update();
                    tokio::time::sleep(debounce).await;
                    if *raw_rx.borrow() == candidate {
                        publisher.send_if_modified(|current| {
                            if *current != candidate {
                                *current = candidate;
                                true
                            } else {
                                false
                            }
                        });
                        break;
                    }
                }
            }
        });

        Arc::new(Self {
            online: AtomicBool::new(initially_online),
            raw_tx,
            debounced_tx,
        })
    }

    /// Point-in-time check; never waits on the debounce window.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Relaxed)
    }

    /// Feed a raw connectivity transition from the platform layer.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Relaxed);
        let _ = self.raw_tx.send(online);
    }

    /// Debounced transition stream; emits once per stable change.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.debounced_tx.subscribe()
    }

    pub fn can_perform(&self, operation: Operation) -> bool {
        match operation {
            Operation::Auth => self.is_online(),
            Operation::Read | Operation::Write | Operation::Delete => true,
        }
    }
}

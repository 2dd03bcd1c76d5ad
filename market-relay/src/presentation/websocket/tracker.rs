use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Counts WebSocket handlers that have not finished yet
///
/// A handler stays counted from the upgrade request until its writer has
/// flushed (or been aborted), so shutdown can wait for every socket to close.
#[derive(Debug)]
pub struct ConnectionTracker {
    live: watch::Sender<usize>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        let (live, _) = watch::channel(0);
        ConnectionTracker { live }
    }

    /// Count one handler until the returned guard is dropped
    pub fn enter(self: &Arc<Self>) -> ConnectionGuard {
        self.live.send_modify(|n| *n += 1);
        ConnectionGuard {
            tracker: Arc::clone(self),
        }
    }

    pub fn live(&self) -> usize {
        *self.live.borrow()
    }

    /// Wait until no handler is left. Returns false if `timeout` ran out first.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let mut live = self.live.subscribe();
        let idle = async move {
            loop {
                if *live.borrow_and_update() == 0 {
                    return;
                }
                if live.changed().await.is_err() {
                    return;
                }
            }
        };
        tokio::time::timeout(timeout, idle).await.is_ok()
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ConnectionGuard {
    tracker: Arc<ConnectionTracker>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.tracker.live.send_modify(|n| *n = n.saturating_sub(1));
    }
}

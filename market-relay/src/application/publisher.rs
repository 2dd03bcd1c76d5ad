use crate::application::ports::{SendQueue, SnapshotFetcher, SubscriptionReader};
use crate::domain::{BroadcastMessage, PublishTask, Symbol};
use crate::infrastructure::TaskHandler;
use chrono::Utc;
use dashmap::DashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Symbols whose publish task has been scheduled but not finished
#[derive(Debug, Default)]
pub struct InFlightSymbols {
    symbols: DashSet<Symbol>,
}

impl InFlightSymbols {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a symbol in flight. Returns false if it already was.
    pub fn try_acquire(&self, symbol: &Symbol) -> bool {
        self.symbols.insert(symbol.clone())
    }

    pub fn release(&self, symbol: &Symbol) {
        self.symbols.remove(symbol);
    }

    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.symbols.contains(symbol)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// Releases the in-flight mark however the task ends, including by panic.
struct InFlightGuard<'a> {
    in_flight: &'a InFlightSymbols,
    symbol: &'a Symbol,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.release(self.symbol);
    }
}

/// Result of one publish task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Frame handed to `recipients` send queues
    Delivered { recipients: usize },
    /// Fetch failed; the symbol is retried on the next tick
    FetchFailed,
    /// Snapshot could not be serialized
    EncodeFailed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublisherStats {
    pub published: u64,
    pub fetch_failures: u64,
    pub deliveries: u64,
}

/// Fetch-and-publish for one symbol per task
///
/// Runs on pool workers. The subscriber set is re-read after the fetch, so a
/// connection that left while the fetch was running is not written to.
pub struct SnapshotPublisher {
    fetcher: Arc<dyn SnapshotFetcher>,
    subscriptions: Arc<dyn SubscriptionReader>,
    send_queue: Arc<dyn SendQueue>,
    in_flight: Arc<InFlightSymbols>,
    published: AtomicU64,
    fetch_failures: AtomicU64,
    deliveries: AtomicU64,
}

impl SnapshotPublisher {
    pub fn new(
        fetcher: Arc<dyn SnapshotFetcher>,
        subscriptions: Arc<dyn SubscriptionReader>,
        send_queue: Arc<dyn SendQueue>,
        in_flight: Arc<InFlightSymbols>,
    ) -> Self {
        SnapshotPublisher {
            fetcher,
            subscriptions,
            send_queue,
            in_flight,
            published: AtomicU64::new(0),
            fetch_failures: AtomicU64::new(0),
            deliveries: AtomicU64::new(0),
        }
    }

    pub fn publish(&self, task: &PublishTask) -> PublishOutcome {
        let _guard = InFlightGuard {
            in_flight: &self.in_flight,
            symbol: &task.symbol,
        };

        let snapshot = match self.fetcher.fetch(&task.symbol) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.fetch_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    symbol = %task.symbol,
                    tick_at = task.tick_at,
                    error = %e,
                    "Fetch failed; skipping symbol this tick"
                );
                return PublishOutcome::FetchFailed;
            }
        };

        let message =
            BroadcastMessage::new(task.symbol.clone(), snapshot, Utc::now().timestamp_millis());
        let payload = match message.to_payload() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(symbol = %task.symbol, error = %e, "Failed to encode broadcast");
                return PublishOutcome::EncodeFailed;
            }
        };

        let recipients = self.subscriptions.subscribers(&task.symbol);
        for connection in &recipients {
            self.send_queue.post(*connection, payload.clone());
        }

        self.published.fetch_add(1, Ordering::Relaxed);
        self.deliveries
            .fetch_add(recipients.len() as u64, Ordering::Relaxed);
        tracing::debug!(
            symbol = %task.symbol,
            recipients = recipients.len(),
            "Snapshot published"
        );

        PublishOutcome::Delivered {
            recipients: recipients.len(),
        }
    }

    pub fn stats(&self) -> PublisherStats {
        PublisherStats {
            published: self.published.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
        }
    }
}

impl TaskHandler<PublishTask> for SnapshotPublisher {
    fn handle(&self, task: PublishTask) {
        self.publish(&task);
    }
}

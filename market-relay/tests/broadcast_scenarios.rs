//! Broadcast scenario tests
//!
//! Wires the registry, worker pool, publisher and scheduler together with a
//! scripted fetcher and checks what each connection's send queue receives.

use chrono::Utc;
use market_relay::{
    BroadcastMessage, BroadcastScheduler, ConnectionId, ConnectionSendQueues, FetchError,
    InFlightSymbols, InMemorySubscriptionRegistry, OverlapPolicy, Payload, PublishTask, SendQueue,
    Snapshot, SnapshotFetcher, SnapshotPublisher, SubscriptionReader, SubscriptionWriter, Symbol,
    TaskHandler, WorkerPool,
};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError};

// ============================================================================
// Test Fixtures
// ============================================================================

struct Harness {
    registry: Arc<InMemorySubscriptionRegistry>,
    send_queues: Arc<ConnectionSendQueues>,
    pool: Arc<WorkerPool<PublishTask>>,
    scheduler: BroadcastScheduler,
}

impl Harness {
    fn new(fetcher: Arc<dyn SnapshotFetcher>, policy: OverlapPolicy) -> Self {
        let registry = Arc::new(InMemorySubscriptionRegistry::new());
        let send_queues = Arc::new(ConnectionSendQueues::new());
        let in_flight = Arc::new(InFlightSymbols::new());

        let publisher = Arc::new(SnapshotPublisher::new(
            fetcher,
            Arc::clone(&registry) as Arc<dyn SubscriptionReader>,
            Arc::clone(&send_queues) as Arc<dyn SendQueue>,
            Arc::clone(&in_flight),
        ));
        let pool = Arc::new(
            WorkerPool::new(
                4,
                "scenario",
                publisher as Arc<dyn TaskHandler<PublishTask>>,
            )
            .unwrap(),
        );
        let scheduler = BroadcastScheduler::new(
            Arc::clone(&registry) as Arc<dyn SubscriptionReader>,
            Arc::clone(&pool),
            in_flight,
            policy,
            Duration::from_secs(10),
        );

        Harness {
            registry,
            send_queues,
            pool,
            scheduler,
        }
    }

    /// Open a connection the way the WebSocket layer does
    fn connect(&self) -> (ConnectionId, mpsc::Receiver<Payload>) {
        let id = ConnectionId::new();
        let rx = self.send_queues.open(id, 64);
        self.registry.add_connection(id);
        (id, rx)
    }

    fn disconnect(&self, id: ConnectionId) {
        self.registry.remove_connection(id);
        self.send_queues.unregister(id);
    }

    fn subscribe(&self, id: ConnectionId, symbol: &str) {
        self.registry.subscribe(id, &sym(symbol)).unwrap();
    }

    /// Shut the pool down; every queued task has finished when this returns.
    fn finish(&self) {
        self.pool.shutdown();
    }
}

fn sym(s: &str) -> Symbol {
    Symbol::new(s).unwrap()
}

fn drain(rx: &mut mpsc::Receiver<Payload>) -> Vec<Payload> {
    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push(frame);
    }
    frames
}

fn price_fetcher(price: u64) -> Arc<dyn SnapshotFetcher> {
    Arc::new(move |_: &Symbol| -> Result<Snapshot, FetchError> { Ok(json!({ "price": price })) })
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_subscriber_receives_snapshot_for_tick() {
    let harness = Harness::new(price_fetcher(100), OverlapPolicy::SkipInFlight);
    let (a, mut rx) = harness.connect();
    harness.subscribe(a, "BTC-PERPETUAL");

    let tick_start = Utc::now().timestamp_millis();
    let report = harness.scheduler.tick(tick_start).unwrap();
    assert_eq!(report.scheduled, 1);
    harness.finish();
    let tick_end = Utc::now().timestamp_millis();

    let frames = drain(&mut rx);
    assert_eq!(frames.len(), 1);

    let message: BroadcastMessage = serde_json::from_str(&frames[0]).unwrap();
    assert!(message.timestamp >= tick_start && message.timestamp <= tick_end);
    assert_eq!(
        &*frames[0],
        format!(
            r#"{{"symbol":"BTC-PERPETUAL","data":{{"price":100}},"timestamp":{}}}"#,
            message.timestamp
        )
    );
}

#[test]
fn test_disconnect_before_tick_skips_only_that_connection() {
    let harness = Harness::new(price_fetcher(100), OverlapPolicy::SkipInFlight);
    let (a, mut rx_a) = harness.connect();
    let (b, mut rx_b) = harness.connect();
    harness.subscribe(a, "BTC-PERPETUAL");
    harness.subscribe(b, "BTC-PERPETUAL");

    harness.disconnect(a);

    harness.scheduler.tick(Utc::now().timestamp_millis()).unwrap();
    harness.finish();

    assert!(matches!(rx_a.try_recv(), Err(TryRecvError::Disconnected)));
    assert_eq!(drain(&mut rx_b).len(), 1);
    assert!(harness.registry.subscriptions_of(a).is_empty());
}

#[test]
fn test_failed_symbol_does_not_block_other_symbols() {
    let fetcher = |symbol: &Symbol| -> Result<Snapshot, FetchError> {
        if symbol.as_str() == "ETH-PERPETUAL" {
            Err(FetchError::Api {
                code: 10004,
                message: "instrument_not_found".to_string(),
            })
        } else {
            Ok(json!({ "instrument_name": symbol.as_str() }))
        }
    };
    let harness = Harness::new(Arc::new(fetcher), OverlapPolicy::SkipInFlight);

    let (x_sub, mut rx_x) = harness.connect();
    let (y_sub, mut rx_y) = harness.connect();
    harness.subscribe(x_sub, "ETH-PERPETUAL");
    harness.subscribe(y_sub, "BTC-PERPETUAL");

    let report = harness.scheduler.tick(Utc::now().timestamp_millis()).unwrap();
    assert_eq!(report.scheduled, 2);
    harness.finish();

    assert!(drain(&mut rx_x).is_empty());
    let frames = drain(&mut rx_y);
    assert_eq!(frames.len(), 1);
    let message: BroadcastMessage = serde_json::from_str(&frames[0]).unwrap();
    assert_eq!(message.symbol, sym("BTC-PERPETUAL"));
}

#[test]
fn test_all_subscribers_get_byte_identical_frames() {
    let harness = Harness::new(price_fetcher(7), OverlapPolicy::SkipInFlight);
    let mut receivers = Vec::new();
    for _ in 0..10 {
        let (id, rx) = harness.connect();
        harness.subscribe(id, "BTC-PERPETUAL");
        receivers.push(rx);
    }

    harness.scheduler.tick(Utc::now().timestamp_millis()).unwrap();
    harness.finish();

    let frames: Vec<Payload> = receivers
        .iter_mut()
        .map(|rx| {
            let mut frames = drain(rx);
            assert_eq!(frames.len(), 1);
            frames.remove(0)
        })
        .collect();
    assert!(frames.iter().all(|f| f.as_bytes() == frames[0].as_bytes()));
}

#[test]
fn test_removed_connection_gets_nothing_from_later_ticks() {
    let harness = Harness::new(price_fetcher(1), OverlapPolicy::Allow);
    let (gone, mut rx_gone) = harness.connect();
    let (stays, mut rx_stays) = harness.connect();
    harness.subscribe(gone, "BTC-PERPETUAL");
    harness.subscribe(gone, "ETH-PERPETUAL");
    harness.subscribe(stays, "BTC-PERPETUAL");

    // Only the registry entry goes; the queue stays open so any stray post would show.
    harness.registry.remove_connection(gone);

    for tick in 0..5 {
        harness.scheduler.tick(tick).unwrap();
    }
    harness.finish();

    assert!(drain(&mut rx_gone).is_empty());
    assert_eq!(drain(&mut rx_stays).len(), 5);
    assert_eq!(
        harness.registry.subscribed_symbols(),
        vec![sym("BTC-PERPETUAL")]
    );
}

#[test]
fn test_unsubscribe_of_absent_pair_changes_nothing() {
    let harness = Harness::new(price_fetcher(1), OverlapPolicy::SkipInFlight);
    let (a, mut rx_a) = harness.connect();
    let (b, _rx_b) = harness.connect();
    harness.subscribe(a, "BTC-PERPETUAL");

    assert!(!harness.registry.unsubscribe(b, &sym("BTC-PERPETUAL")));
    assert!(!harness.registry.unsubscribe(a, &sym("ETH-PERPETUAL")));

    harness.scheduler.tick(0).unwrap();
    harness.finish();

    assert_eq!(drain(&mut rx_a).len(), 1);
    assert_eq!(harness.registry.subscribers(&sym("BTC-PERPETUAL")), vec![a]);
}

#[test]
fn test_slow_fetch_is_not_scheduled_twice() {
    let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
    let release_rx = parking_lot::Mutex::new(release_rx);
    let fetches = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fetches);

    let fetcher = move |_: &Symbol| -> Result<Snapshot, FetchError> {
        counter.fetch_add(1, Ordering::SeqCst);
        let _ = release_rx.lock().recv_timeout(Duration::from_secs(5));
        Ok(json!({ "price": 1 }))
    };
    let harness = Harness::new(Arc::new(fetcher), OverlapPolicy::SkipInFlight);
    let (a, mut rx) = harness.connect();
    harness.subscribe(a, "BTC-PERPETUAL");

    assert_eq!(harness.scheduler.tick(1).unwrap().scheduled, 1);
    let second = harness.scheduler.tick(2).unwrap();
    assert_eq!(second.scheduled, 0);
    assert_eq!(second.skipped, 1);

    release_tx.send(()).unwrap();
    harness.finish();

    assert_eq!(fetches.load(Ordering::SeqCst), 1);
    assert_eq!(drain(&mut rx).len(), 1);
}

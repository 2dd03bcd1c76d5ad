//! Market Data Relay
//!
//! Fetches order book snapshots on a fixed interval and fans them out to
//! WebSocket clients that subscribed to the symbol.
//!
//! # Architecture
//!
//! - **Domain**: Symbols, connection ids, wire messages and error types
//! - **Application**: Control handling, broadcast scheduling and publishing, plus the ports they use
//! - **Infrastructure**: Subscription registry, worker pool, send queues, config and the Deribit fetcher
//! - **Presentation**: WebSocket and health endpoints
//!
//! # Wire format
//!
//! Clients send `{"action":"subscribe","symbol":"BTC-PERPETUAL"}` (or
//! `"unsubscribe"`) and receive `{"symbol":...,"data":...,"timestamp":...}`
//! once per broadcast interval for every subscribed symbol.
//!
//! # Example
//!
//! ```ignore
//! use market_relay::{DeribitOrderBookFetcher, Relay, RelayConfig};
//!
//! let config = RelayConfig::default();
//! let fetcher = Arc::new(DeribitOrderBookFetcher::new(&config.fetcher, Handle::current())?);
//! Relay::new(config, fetcher)?.run(shutdown_signal()).await?;
//! ```

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;

pub use domain::{
    BroadcastMessage, ConnectionId, ControlRequest, FetchError, ParseError, Payload, PublishTask,
    RegistryError, SendError, Snapshot, Symbol, TimestampMs,
};

pub use application::{
    BroadcastScheduler, ControlError, ControlHandler, ControlOutcome, InFlightSymbols,
    OverlapPolicy, PublishOutcome, PublisherStats, SnapshotPublisher, TickReport,
};

pub use application::ports::{SendQueue, SnapshotFetcher, SubscriptionReader, SubscriptionWriter};

pub use infrastructure::{
    BroadcastConfig, ConfigError, ConnectionSendQueues, DeribitOrderBookFetcher, FetcherConfig,
    InMemorySubscriptionRegistry, PoolError, PoolStats, RelayConfig, ServerConfig, TaskHandler,
    WorkerPool,
};

pub use presentation::{ConnectionTracker, HealthResponse, HealthState, WsState};

use axum::{Router, routing::get};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Serve(std::io::Error),
}

/// The relay server
///
/// Owns every shared component. Shutdown runs in order: stop ticking and
/// accepting, drain the worker pool, then close client connections.
pub struct Relay {
    pub config: RelayConfig,
    pub registry: Arc<InMemorySubscriptionRegistry>,
    pub send_queues: Arc<ConnectionSendQueues>,
    pub in_flight: Arc<InFlightSymbols>,
    pub publisher: Arc<SnapshotPublisher>,
    pub pool: Arc<WorkerPool<PublishTask>>,
    pub scheduler: Arc<BroadcastScheduler>,
    pub control: Arc<ControlHandler>,
    pub tracker: Arc<ConnectionTracker>,
    stop_ticks: watch::Sender<bool>,
    close_connections: watch::Sender<bool>,
}

impl Relay {
    /// Wire up the relay and start its worker threads
    pub fn new(config: RelayConfig, fetcher: Arc<dyn SnapshotFetcher>) -> Result<Self, RelayError> {
        config.validate()?;

        let registry = Arc::new(InMemorySubscriptionRegistry::new());
        let send_queues = Arc::new(ConnectionSendQueues::new());
        let in_flight = Arc::new(InFlightSymbols::new());

        let publisher = Arc::new(SnapshotPublisher::new(
            fetcher,
            Arc::clone(&registry) as Arc<dyn SubscriptionReader>,
            Arc::clone(&send_queues) as Arc<dyn SendQueue>,
            Arc::clone(&in_flight),
        ));

        let pool = Arc::new(WorkerPool::new(
            config.broadcast.workers,
            "relay-worker",
            Arc::clone(&publisher) as Arc<dyn TaskHandler<PublishTask>>,
        )?);

        let scheduler = Arc::new(BroadcastScheduler::new(
            Arc::clone(&registry) as Arc<dyn SubscriptionReader>,
            Arc::clone(&pool),
            Arc::clone(&in_flight),
            config.broadcast.overlap,
            config.broadcast.interval(),
        ));

        let control = Arc::new(ControlHandler::new(
            Arc::clone(&registry) as Arc<dyn SubscriptionWriter>
        ));

        let (stop_ticks, _) = watch::channel(false);
        let (close_connections, _) = watch::channel(false);

        Ok(Relay {
            config,
            registry,
            send_queues,
            in_flight,
            publisher,
            pool,
            scheduler,
            control,
            tracker: Arc::new(ConnectionTracker::new()),
            stop_ticks,
            close_connections,
        })
    }

    /// Create WebSocket state
    pub fn ws_state(&self) -> Arc<WsState> {
        Arc::new(WsState {
            control: Arc::clone(&self.control),
            send_queues: Arc::clone(&self.send_queues),
            send_buffer: self.config.server.send_buffer,
            drain_timeout: self.config.server.drain_timeout(),
            close_connections: self.close_connections.subscribe(),
            tracker: Arc::clone(&self.tracker),
        })
    }

    pub fn health_state(&self) -> Arc<HealthState> {
        Arc::new(HealthState {
            registry: Arc::clone(&self.registry),
            pool: Arc::clone(&self.pool),
            publisher: Arc::clone(&self.publisher),
            in_flight: Arc::clone(&self.in_flight),
            tracker: Arc::clone(&self.tracker),
        })
    }

    /// `/ws` for clients, `/health` for operators
    pub fn router(&self) -> Router {
        let ws = Router::new()
            .route("/ws", get(presentation::ws_handler))
            .with_state(self.ws_state());
        let health = Router::new()
            .route("/health", get(presentation::health_handler))
            .with_state(self.health_state());

        ws.merge(health).layer(TraceLayer::new_for_http())
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), RelayError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let scheduler = tokio::spawn(Arc::clone(&self.scheduler).run(self.stop_ticks.subscribe()));

        let stop_ticks = self.stop_ticks.clone();
        let signal = async move {
            shutdown.await;
            tracing::info!("Shutdown requested");
            let _ = stop_ticks.send(true);
        };

        let served = axum::serve(listener, self.router())
            .with_graceful_shutdown(signal)
            .await
            .map_err(RelayError::Serve);

        // Reached early only on a server error; ticks must stop either way.
        let _ = self.stop_ticks.send(true);
        if let Err(e) = scheduler.await {
            tracing::error!(error = %e, "Scheduler task failed");
        }

        // Running and queued tasks finish while clients are still attached.
        let pool = Arc::clone(&self.pool);
        if let Err(e) = tokio::task::spawn_blocking(move || pool.shutdown()).await {
            tracing::error!(error = %e, "Worker pool shutdown failed");
        }

        let _ = self.close_connections.send(true);
        self.wait_for_connections().await;

        tracing::info!("Relay stopped");
        served
    }

    /// Bind the configured address and serve until `shutdown` resolves
    pub async fn run<F>(self, shutdown: F) -> Result<(), RelayError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.config.server.addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| RelayError::Bind {
                addr: addr.clone(),
                source,
            })?;

        tracing::info!(addr = %addr, "Market data relay listening");
        self.serve(listener, shutdown).await
    }

    /// Wait for every WebSocket handler to finish flushing and close
    async fn wait_for_connections(&self) {
        // Each handler bounds its own flush by the drain timeout.
        let grace = self.config.server.drain_timeout() + Duration::from_millis(500);

        if !self.tracker.wait_idle(grace).await {
            tracing::warn!(
                remaining = self.tracker.live(),
                "Connections still open after drain timeout"
            );
            self.send_queues.close_all();
        }
    }
}

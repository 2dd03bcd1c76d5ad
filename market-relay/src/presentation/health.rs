use axum::{Json, extract::State};
use serde::Serialize;
use std::sync::Arc;

use crate::application::{InFlightSymbols, SnapshotPublisher};
use crate::domain::PublishTask;
use crate::infrastructure::{InMemorySubscriptionRegistry, PoolStats, WorkerPool};
use crate::presentation::ConnectionTracker;

pub struct HealthState {
    pub registry: Arc<InMemorySubscriptionRegistry>,
    pub pool: Arc<WorkerPool<PublishTask>>,
    pub publisher: Arc<SnapshotPublisher>,
    pub in_flight: Arc<InFlightSymbols>,
    pub tracker: Arc<ConnectionTracker>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub connections: usize,
    /// Open sockets, including ones still flushing after close
    pub sockets: usize,
    pub symbols: usize,
    pub in_flight: usize,
    pub pool: PoolStats,
    pub published: u64,
    pub fetch_failures: u64,
    pub deliveries: u64,
}

/// `GET /health`
pub async fn health_handler(State(state): State<Arc<HealthState>>) -> Json<HealthResponse> {
    let publisher = state.publisher.stats();

    Json(HealthResponse {
        status: if state.pool.is_running() {
            "ok"
        } else {
            "shutting_down"
        },
        connections: state.registry.connection_count(),
        sockets: state.tracker.live(),
        symbols: state.registry.symbol_count(),
        in_flight: state.in_flight.len(),
        pool: state.pool.stats(),
        published: publisher.published,
        fetch_failures: publisher.fetch_failures,
        deliveries: publisher.deliveries,
    })
}

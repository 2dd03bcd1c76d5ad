pub mod config;
pub mod fetcher;
pub mod registry;
pub mod send_queue;
pub mod worker_pool;

pub use config::{BroadcastConfig, ConfigError, FetcherConfig, RelayConfig, ServerConfig};
pub use fetcher::DeribitOrderBookFetcher;
pub use registry::InMemorySubscriptionRegistry;
pub use send_queue::ConnectionSendQueues;
pub use worker_pool::{PoolError, PoolStats, TaskHandler, WorkerPool};

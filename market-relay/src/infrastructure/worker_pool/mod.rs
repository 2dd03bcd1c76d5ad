mod pool;
mod worker;

pub use pool::{PoolError, PoolStats, WorkerPool};
pub use worker::TaskHandler;

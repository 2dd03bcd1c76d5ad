mod send_queue;
mod snapshot_fetcher;
mod subscriptions;

pub use send_queue::SendQueue;
pub use snapshot_fetcher::SnapshotFetcher;
pub use subscriptions::{SubscriptionReader, SubscriptionWriter};

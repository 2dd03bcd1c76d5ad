pub mod control;
pub mod ports;
pub mod publisher;
pub mod scheduler;

pub use control::{ControlError, ControlHandler, ControlOutcome};
pub use publisher::{InFlightSymbols, PublishOutcome, PublisherStats, SnapshotPublisher};
pub use scheduler::{BroadcastScheduler, OverlapPolicy, TickReport};

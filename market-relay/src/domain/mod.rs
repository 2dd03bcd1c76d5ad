mod connection;
mod error;
mod message;
mod symbol;

pub use connection::ConnectionId;
pub use error::{FetchError, ParseError, RegistryError, SendError};
pub use message::{
    BroadcastMessage, ControlRequest, Payload, PublishTask, Snapshot, TimestampMs,
};
pub use symbol::Symbol;

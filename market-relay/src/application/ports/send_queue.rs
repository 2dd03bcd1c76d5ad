use crate::domain::{ConnectionId, Payload};

/// Hands outbound frames to a connection's own serial writer.
///
/// `post` is callable from any thread and never blocks. Posting to a closed
/// or unknown connection is a no-op (logged at low severity); nothing
/// escapes to the caller.
pub trait SendQueue: Send + Sync {
    fn post(&self, connection: ConnectionId, payload: Payload);
}

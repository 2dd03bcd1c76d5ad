use crate::application::ports::SendQueue;
use crate::domain::{ConnectionId, Payload, SendError};
use dashmap::DashMap;
use tokio::sync::mpsc;

/// Per-connection outbound queues
///
/// Each connection registers the sending half of a bounded channel whose
/// receiver is drained by that connection's single writer task, so frames
/// posted from many worker threads reach the socket one at a time.
/// A full queue drops the frame rather than blocking the poster.
#[derive(Debug, Default)]
pub struct ConnectionSendQueues {
    queues: DashMap<ConnectionId, mpsc::Sender<Payload>>,
}

impl ConnectionSendQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a queue of `capacity` frames for a connection
    pub fn open(&self, connection: ConnectionId, capacity: usize) -> mpsc::Receiver<Payload> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.register(connection, tx);
        rx
    }

    pub fn register(&self, connection: ConnectionId, sender: mpsc::Sender<Payload>) {
        self.queues.insert(connection, sender);
    }

    /// Drop the sending half; the writer drains what is queued, then exits.
    pub fn unregister(&self, connection: ConnectionId) -> bool {
        self.queues.remove(&connection).is_some()
    }

    pub fn try_post(&self, connection: ConnectionId, payload: Payload) -> Result<(), SendError> {
        let sender = self
            .queues
            .get(&connection)
            .ok_or(SendError::UnknownConnection(connection))?;

        sender.try_send(payload).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::Full(connection),
            mpsc::error::TrySendError::Closed(_) => SendError::Closed(connection),
        })
    }

    /// Unregister every queue (shutdown)
    pub fn close_all(&self) {
        self.queues.clear();
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}

impl SendQueue for ConnectionSendQueues {
    fn post(&self, connection: ConnectionId, payload: Payload) {
        match self.try_post(connection, payload) {
            Ok(()) => {}
            Err(e @ SendError::Full(_)) => {
                tracing::warn!(connection = %connection, error = %e, "Slow consumer; frame dropped");
            }
            Err(e) => {
                tracing::debug!(connection = %connection, error = %e, "Send skipped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(s: &str) -> Payload {
        Payload::from(s)
    }

    #[test]
    fn test_post_reaches_registered_connection() {
        let queues = ConnectionSendQueues::new();
        let conn = ConnectionId::new();
        let mut rx = queues.open(conn, 8);

        queues.post(conn, payload("a"));
        queues.post(conn, payload("b"));

        assert_eq!(&*rx.try_recv().unwrap(), "a");
        assert_eq!(&*rx.try_recv().unwrap(), "b");
    }

    #[test]
    fn test_unknown_connection_is_noop() {
        let queues = ConnectionSendQueues::new();
        let conn = ConnectionId::new();

        assert_eq!(
            queues.try_post(conn, payload("x")),
            Err(SendError::UnknownConnection(conn))
        );
        // Must not panic
        queues.post(conn, payload("x"));
    }

    #[test]
    fn test_closed_connection_is_noop() {
        let queues = ConnectionSendQueues::new();
        let conn = ConnectionId::new();
        let rx = queues.open(conn, 8);
        drop(rx);

        assert_eq!(
            queues.try_post(conn, payload("x")),
            Err(SendError::Closed(conn))
        );
        queues.post(conn, payload("x"));
    }

    #[test]
    fn test_full_queue_drops_frame() {
        let queues = ConnectionSendQueues::new();
        let conn = ConnectionId::new();
        let mut rx = queues.open(conn, 1);

        queues.post(conn, payload("first"));
        assert_eq!(
            queues.try_post(conn, payload("second")),
            Err(SendError::Full(conn))
        );

        assert_eq!(&*rx.try_recv().unwrap(), "first");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_unregister_drains_then_closes() {
        let queues = ConnectionSendQueues::new();
        let conn = ConnectionId::new();
        let mut rx = queues.open(conn, 8);

        queues.post(conn, payload("last"));
        assert!(queues.unregister(conn));
        assert!(!queues.unregister(conn));

        assert_eq!(&*rx.try_recv().unwrap(), "last");
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
        assert!(queues.is_empty());
    }
}

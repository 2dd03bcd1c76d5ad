use crate::domain::{ConnectionId, RegistryError, Symbol};

/// Read side of the subscription index.
///
/// Every method returns an owned copy taken under a shared lock, so callers
/// can do network I/O without holding it.
pub trait SubscriptionReader: Send + Sync {
    /// Symbols with at least one subscriber
    fn subscribed_symbols(&self) -> Vec<Symbol>;

    /// Current subscribers of one symbol
    fn subscribers(&self, symbol: &Symbol) -> Vec<ConnectionId>;

    /// Symbols one connection is subscribed to
    fn subscriptions_of(&self, connection: ConnectionId) -> Vec<Symbol>;

    fn is_connected(&self, connection: ConnectionId) -> bool;
}

/// Write side: connection lifecycle and subscription changes.
///
/// All mutations take an exclusive lock.
pub trait SubscriptionWriter: Send + Sync {
    /// Returns false if the connection was already registered
    fn add_connection(&self, connection: ConnectionId) -> bool;

    /// Deregisters the connection and purges it from every symbol.
    /// Returns the symbols it was subscribed to.
    fn remove_connection(&self, connection: ConnectionId) -> Vec<Symbol>;

    /// Idempotent. Returns true if the pair was newly inserted.
    fn subscribe(&self, connection: ConnectionId, symbol: &Symbol) -> Result<bool, RegistryError>;

    /// No-op if the pair is absent. Returns true if something was removed.
    fn unsubscribe(&self, connection: ConnectionId, symbol: &Symbol) -> bool;
}

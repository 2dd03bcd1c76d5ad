use crate::application::ports::{SubscriptionReader, SubscriptionWriter};
use crate::domain::{ConnectionId, RegistryError, Symbol};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

/// Symbol -> subscribers, plus the reverse map so that disconnect cleanup
/// only touches the symbols of the departing connection.
#[derive(Debug, Default)]
struct SubscriptionIndex {
    by_symbol: HashMap<Symbol, HashSet<ConnectionId>>,
    by_connection: HashMap<ConnectionId, HashSet<Symbol>>,
}

impl SubscriptionIndex {
    fn insert(&mut self, connection: ConnectionId, symbol: &Symbol) -> bool {
        let inserted = self
            .by_symbol
            .entry(symbol.clone())
            .or_default()
            .insert(connection);
        if inserted {
            self.by_connection
                .entry(connection)
                .or_default()
                .insert(symbol.clone());
        }
        inserted
    }

    fn remove(&mut self, connection: ConnectionId, symbol: &Symbol) -> bool {
        let Some(subscribers) = self.by_symbol.get_mut(symbol) else {
            return false;
        };
        if !subscribers.remove(&connection) {
            return false;
        }
        if subscribers.is_empty() {
            self.by_symbol.remove(symbol);
        }

        if let Some(symbols) = self.by_connection.get_mut(&connection) {
            symbols.remove(symbol);
            if symbols.is_empty() {
                self.by_connection.remove(&connection);
            }
        }
        true
    }

    fn purge(&mut self, connection: ConnectionId) -> Vec<Symbol> {
        let symbols: Vec<Symbol> = self
            .by_connection
            .remove(&connection)
            .map(|s| s.into_iter().collect())
            .unwrap_or_default();

        for symbol in &symbols {
            if let Some(subscribers) = self.by_symbol.get_mut(symbol) {
                subscribers.remove(&connection);
                if subscribers.is_empty() {
                    self.by_symbol.remove(symbol);
                }
            }
        }
        symbols
    }
}

/// In-memory connection registry and subscription index
///
/// Each half sits behind its own reader/writer lock. Mutations that touch
/// both always lock `connections` before `index`, which keeps membership
/// checks and disconnect purges atomic with respect to each other.
#[derive(Debug, Default)]
pub struct InMemorySubscriptionRegistry {
    connections: RwLock<HashSet<ConnectionId>>,
    index: RwLock<SubscriptionIndex>,
}

impl InMemorySubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    pub fn symbol_count(&self) -> usize {
        self.index.read().by_symbol.len()
    }
}

impl SubscriptionReader for InMemorySubscriptionRegistry {
    fn subscribed_symbols(&self) -> Vec<Symbol> {
        self.index.read().by_symbol.keys().cloned().collect()
    }

    fn subscribers(&self, symbol: &Symbol) -> Vec<ConnectionId> {
        self.index
            .read()
            .by_symbol
            .get(symbol)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    fn subscriptions_of(&self, connection: ConnectionId) -> Vec<Symbol> {
        self.index
            .read()
            .by_connection
            .get(&connection)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn is_connected(&self, connection: ConnectionId) -> bool {
        self.connections.read().contains(&connection)
    }
}

impl SubscriptionWriter for InMemorySubscriptionRegistry {
    fn add_connection(&self, connection: ConnectionId) -> bool {
        self.connections.write().insert(connection)
    }

    fn remove_connection(&self, connection: ConnectionId) -> Vec<Symbol> {
        let mut connections = self.connections.write();
        connections.remove(&connection);
        self.index.write().purge(connection)
    }

    fn subscribe(&self, connection: ConnectionId, symbol: &Symbol) -> Result<bool, RegistryError> {
        // Held until the insert lands so a concurrent disconnect cannot slip in between.
        let connections = self.connections.read();
        if !connections.contains(&connection) {
            return Err(RegistryError::UnknownConnection(connection));
        }
        Ok(self.index.write().insert(connection, symbol))
    }

    fn unsubscribe(&self, connection: ConnectionId, symbol: &Symbol) -> bool {
        self.index.write().remove(connection, symbol)
    }
}

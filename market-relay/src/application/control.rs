use crate::application::ports::SubscriptionWriter;
use crate::domain::{ConnectionId, ControlRequest, ParseError, RegistryError, Symbol};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// What a control message did to the index
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlOutcome {
    /// `added` is false when the pair already existed
    Subscribed { symbol: Symbol, added: bool },
    /// `removed` is false when the pair was not present
    Unsubscribed { symbol: Symbol, removed: bool },
}

/// Connection lifecycle and inbound control messages
///
/// A connection is `Connected` from [`on_open`](Self::on_open) until
/// [`on_close`](Self::on_close); subscribe/unsubscribe are self-transitions.
/// Invalid messages are logged and dropped; they never close the connection.
pub struct ControlHandler {
    subscriptions: Arc<dyn SubscriptionWriter>,
}

impl ControlHandler {
    pub fn new(subscriptions: Arc<dyn SubscriptionWriter>) -> Self {
        ControlHandler { subscriptions }
    }

    pub fn on_open(&self, connection: ConnectionId) {
        self.subscriptions.add_connection(connection);
        tracing::info!(connection = %connection, "Client connected");
    }

    /// Terminal transition: purge the connection from every symbol.
    pub fn on_close(&self, connection: ConnectionId) {
        let symbols = self.subscriptions.remove_connection(connection);
        tracing::info!(
            connection = %connection,
            subscriptions = symbols.len(),
            "Client disconnected"
        );
    }

    pub fn on_message(
        &self,
        connection: ConnectionId,
        bytes: &[u8],
    ) -> Result<ControlOutcome, ControlError> {
        let request = match ControlRequest::parse(bytes) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(connection = %connection, error = %e, "Control message discarded");
                return Err(e.into());
            }
        };

        match request {
            ControlRequest::Subscribe(symbol) => {
                match self.subscriptions.subscribe(connection, &symbol) {
                    Ok(added) => {
                        tracing::info!(connection = %connection, symbol = %symbol, added, "Subscribed");
                        Ok(ControlOutcome::Subscribed { symbol, added })
                    }
                    Err(e) => {
                        tracing::warn!(connection = %connection, symbol = %symbol, error = %e, "Subscribe rejected");
                        Err(e.into())
                    }
                }
            }
            ControlRequest::Unsubscribe(symbol) => {
                let removed = self.subscriptions.unsubscribe(connection, &symbol);
                tracing::info!(connection = %connection, symbol = %symbol, removed, "Unsubscribed");
                Ok(ControlOutcome::Unsubscribed { symbol, removed })
            }
        }
    }
}

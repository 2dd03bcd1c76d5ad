//! Error taxonomy for the relay core.
//!
//! Every variant here is contained at the task or connection boundary; none
//! of them stops the scheduler, the worker pool or unrelated deliveries.

use thiserror::Error;

use super::ConnectionId;

/// Malformed inbound control message. Dropped and logged; the connection
/// stays open.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("malformed JSON: {0}")]
    Malformed(String),
    #[error("control message must be a JSON object")]
    NotAnObject,
    #[error("missing 'action' field")]
    MissingAction,
    #[error("unknown action: {0}")]
    UnknownAction(String),
    #[error("missing 'symbol' field")]
    MissingSymbol,
    #[error("invalid symbol: {0}")]
    InvalidSymbol(&'static str),
}

/// Market data fetch failure for one symbol in one tick.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Network or communication failure
    #[error("network error: {0}")]
    Network(String),
    /// Venue returned an error response
    #[error("API error {code}: {message}")]
    Api { code: i64, message: String },
    /// Response body could not be decoded
    #[error("parse error: {0}")]
    Parse(String),
}

/// Write to a connection that cannot take it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("connection {0} is not registered")]
    UnknownConnection(ConnectionId),
    #[error("connection {0} is closed")]
    Closed(ConnectionId),
    #[error("send queue for connection {0} is full")]
    Full(ConnectionId),
}

/// Registry mutation rejected because it would break membership invariants.
///
/// Removing something that is not present is never an error; those calls
/// are no-ops.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("connection {0} is not registered")]
    UnknownConnection(ConnectionId),
}

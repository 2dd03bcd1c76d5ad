use axum::extract::ws::Utf8Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ParseError, Symbol};

/// Opaque market data payload for one symbol.
pub type Snapshot = Value;

/// Epoch milliseconds.
pub type TimestampMs = i64;

/// Serialized outbound frame, shared by every subscriber of one tick.
///
/// Reference counted: cloning it per subscriber copies no bytes, and the
/// socket writer sends it as a text frame as-is.
pub type Payload = Utf8Bytes;

/// Inbound control message.
///
/// Wire shape: `{"action": "subscribe" | "unsubscribe", "symbol": "<string>"}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlRequest {
    Subscribe(Symbol),
    Unsubscribe(Symbol),
}

impl ControlRequest {
    /// Parse a raw frame. Extra fields are ignored.
    pub fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| ParseError::Malformed(e.to_string()))?;
        let Value::Object(mut fields) = value else {
            return Err(ParseError::NotAnObject);
        };

        let action = match fields.remove("action") {
            Some(Value::String(action)) => action,
            Some(other) => return Err(ParseError::UnknownAction(other.to_string())),
            None => return Err(ParseError::MissingAction),
        };

        match action.as_str() {
            "subscribe" => Ok(ControlRequest::Subscribe(Self::symbol(
                fields.remove("symbol"),
            )?)),
            "unsubscribe" => Ok(ControlRequest::Unsubscribe(Self::symbol(
                fields.remove("symbol"),
            )?)),
            _ => Err(ParseError::UnknownAction(action)),
        }
    }

    fn symbol(field: Option<Value>) -> Result<Symbol, ParseError> {
        match field {
            Some(Value::String(s)) => Symbol::new(s).map_err(ParseError::InvalidSymbol),
            Some(_) => Err(ParseError::InvalidSymbol("symbol must be a string")),
            None => Err(ParseError::MissingSymbol),
        }
    }

    pub fn symbol_ref(&self) -> &Symbol {
        match self {
            ControlRequest::Subscribe(symbol) | ControlRequest::Unsubscribe(symbol) => symbol,
        }
    }
}

/// Outbound broadcast message, immutable once built.
///
/// Wire shape: `{"symbol": "<string>", "data": <snapshot>, "timestamp": <epoch ms>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastMessage {
    pub symbol: Symbol,
    pub data: Snapshot,
    pub timestamp: TimestampMs,
}

impl BroadcastMessage {
    pub fn new(symbol: Symbol, data: Snapshot, timestamp: TimestampMs) -> Self {
        BroadcastMessage {
            symbol,
            data,
            timestamp,
        }
    }

    /// Serialize once; the result is cloned (not re-encoded) per subscriber.
    pub fn to_payload(&self) -> Result<Payload, serde_json::Error> {
        serde_json::to_string(self).map(Payload::from)
    }
}

/// One unit of fetch-and-publish work: a symbol and the tick that scheduled it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishTask {
    pub symbol: Symbol,
    pub tick_at: TimestampMs,
}

impl PublishTask {
    pub fn new(symbol: Symbol, tick_at: TimestampMs) -> Self {
        PublishTask { symbol, tick_at }
    }
}

pub mod health;
pub mod websocket;

pub use health::{HealthResponse, HealthState, health_handler};
pub use websocket::{ConnectionGuard, ConnectionTracker, WsState, ws_handler};

mod handler;
mod tracker;

pub use handler::{WsState, ws_handler};
pub use tracker::{ConnectionGuard, ConnectionTracker};

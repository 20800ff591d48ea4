//! Room-scoped realtime relay.
//!
//! The broker the pipeline publishes through: an authenticated `/ping`
//! ingress fans each message out to every WebSocket subscriber of the named
//! room. One room per tenant; membership is implicit.

mod rooms;
mod server;

pub use rooms::RoomRegistry;
pub use server::{router, RelayState};

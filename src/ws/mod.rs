//! WebSocket transport for presentation adapters

pub mod handler;
pub mod protocol;

//! WebSocket transports.

mod client;
pub use client::WsClientTransport;

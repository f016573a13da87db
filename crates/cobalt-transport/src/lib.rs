//! # Cobalt Transport
//!
//! Network transports for the Cobalt bot framework. Each one implements the
//! [`Transport`](cobalt_core::Transport) collaborator from `cobalt-core`:
//! `connect` yields a [`Connection`](cobalt_core::Connection) whose outbound
//! queue is drained by one writer task and whose inbound stream ends with a
//! single closure signal.
//!
//! ## Features
//!
//! - `ws-client`: WebSocket client ([`websocket::WsClientTransport`])
//! - `full`: every transport
//!
//! ```rust,ignore
//! use cobalt_transport::websocket::WsClientTransport;
//!
//! let transport = WsClientTransport::new("ws://127.0.0.1:6700")
//!     .access_token(Some("secret".into()));
//! let connection = transport.connect().await?;
//! ```

#[cfg(feature = "ws-client")]
pub mod websocket;

#[cfg(feature = "ws-client")]
pub use websocket::WsClientTransport;

//! # Cobalt Core
//!
//! The core types of the Cobalt bot framework: the event model, per-matcher
//! state, the wire codec, and the call/response gateway that pairs outbound
//! calls with their replies.
//!
//! ## Layers
//!
//! - **Model**: [`Event`], [`Message`] / [`Segment`], [`State`] and [`FromState`]
//! - **Codec**: [`ApiRequest`], [`ApiResponse`] and [`Frame::decode`]
//! - **Gateway**: [`CorrelationTable`], [`ApiCaller`] / [`EchoApiCaller`], [`Bot`]
//! - **Transport**: [`Transport`], [`Connection`], [`Incoming`]
//!
//! ## Data Flow
//!
//! ```text
//!                 ┌──────────────┐ reply  ┌───────────────────┐
//! inbound frame ─▶│ Frame::decode│───────▶│ CorrelationTable  │──▶ waiting caller
//!                 └──────────────┘        └───────────────────┘
//!                        │ event
//!                        ▼
//!                  dispatch loop (cobalt-framework)
//! ```

pub mod api;
pub mod bot;
pub mod caller;
pub mod correlation;
pub mod error;
pub mod event;
pub mod message;
pub mod state;
pub mod transport;

pub use api::{ApiRequest, ApiResponse, Frame};
pub use bot::{Bot, LoginInfo};
pub use caller::{ApiCaller, DEFAULT_API_TIMEOUT, EchoApiCaller};
pub use correlation::CorrelationTable;
pub use error::{
    ApiError, ApiResult, DecodeError, DecodeResult, StateError, StateResult, TransportError,
    TransportResult,
};
pub use event::{Event, EventType, Sender};
pub use message::{Message, Segment};
pub use state::{FromState, State};
pub use transport::{
    Connection, DEFAULT_BUFFER, Incoming, MemoryTransport, RemotePeer, Transport,
};

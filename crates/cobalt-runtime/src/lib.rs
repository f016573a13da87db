//! Cobalt Runtime - orchestration layer for the Cobalt bot framework.
//!
//! This crate provides:
//! - Layered configuration ([`config`]) with figment
//! - Logging setup ([`logging`]) with tracing-subscriber
//! - The connection driver ([`driver`]): the reader task that pairs replies
//!   with pending calls and hands events to the dispatcher
//! - [`CobaltRuntime`], which starts plugins, connects and runs until
//!   shutdown
//!
//! ```rust,ignore
//! use cobalt_runtime::CobaltRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = CobaltRuntime::new().plugin(MyPlugin);
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{CobaltConfig, ConfigError, ConfigLoader, ConfigResult};
pub use driver::{Driver, Session};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{CobaltRuntime, RuntimeBuilder, wait_for_shutdown};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros for plugin code.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}

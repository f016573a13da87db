//! # Cobalt
//!
//! An event-driven bot framework for OneBot-style chat gateways.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐ frames ┌──────────┐ replies ┌──────────────────┐
//! │ Transport │───────▶│  Driver  │────────▶│ CorrelationTable │──▶ waiting calls
//! └───────────┘        └──────────┘         └──────────────────┘
//!                           │ events (one task each)
//!                           ▼
//!                    ┌────────────┐  priority order   ┌─────────────────────────┐
//!                    │ Dispatcher │──────────────────▶│ matcher: rules → handler │
//!                    └────────────┘                   └─────────────────────────┘
//! ```
//!
//! - **Runtime**: configuration, logging, plugin start-up and the connection driver
//! - **Engine**: registers matchers and owns the priority-ordered store
//! - **Matchers**: an event type, a chain of rules and a handler, with
//!   priority, block and temp flags
//! - **Handlers**: async functions taking a [`MatcherContext`](prelude::MatcherContext)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cobalt::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = CobaltRuntime::new();
//!     runtime.engine().on_command("ping").handle(|ctx: MatcherContext| async move {
//!         ctx.send("pong").await?;
//!         Ok::<_, ApiError>(())
//!     });
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` (default) / `yaml-config`: configuration file formats
//! - `json-log`: JSON log lines
//! - `ws-client`: WebSocket client transport and [`CobaltRuntime::run`](prelude::CobaltRuntime::run)

pub use cobalt_core as core;
pub use cobalt_framework as framework;
pub use cobalt_runtime as runtime;
pub use cobalt_transport as transport;

// Targets of `#[derive(FromState)]`.
pub use cobalt_core::{FromState, State, StateError, StateResult};
pub use cobalt_macros::FromState;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use cobalt::prelude::*;
/// ```
pub mod prelude {
    // Runtime
    pub use cobalt_runtime::{CobaltRuntime, RuntimeError, RuntimeResult};

    // Registration and dispatch
    pub use cobalt_framework::rule::{
        self, Rule, admin_permission, check_group, check_user, only_group, only_private,
        only_to_me, owner_permission, super_user_permission,
    };
    pub use cobalt_framework::{
        DEFAULT_PRIORITY, Engine, FrameworkError, FrameworkResult, Matcher, MatcherBuilder,
        MatcherContext, Options, Plugin, PluginInfo, Response,
    };

    // Model and calls
    pub use cobalt_core::{
        ApiError, ApiResult, Bot, Event, EventType, FromState, LoginInfo, Message, Segment,
        State, StateError, StateResult,
    };
    pub use cobalt_macros::FromState;
}

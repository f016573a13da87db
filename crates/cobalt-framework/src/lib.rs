//! # Cobalt Framework
//!
//! Matcher registration, rule evaluation and the dispatch loop.
//!
//! - [`Engine`]: registration API and bot-wide [`Options`]
//! - [`Matcher`] / [`MatcherBuilder`]: handler registrations
//! - [`MatcherStore`]: the priority-ordered registration store
//! - [`Dispatcher`]: routes each event through the store
//! - [`MatcherContext`]: what handlers receive, including
//!   [`get`](MatcherContext::get) for multi-turn conversations
//! - [`rule`]: the built-in rule library
//! - [`Plugin`]: start-up bundles of matchers
//!
//! ```text
//!  event ─▶ Dispatcher ─▶ snapshot ─▶ [p=-1 block] [p=0] [p=0] [p=10] ...
//!                                         │
//!                          type ─▶ rules ─▶ handler ─▶ temp / reject / block
//! ```

pub mod context;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod handler;
pub mod matcher;
pub mod plugin;
pub mod rule;
pub mod store;

pub use context::MatcherContext;
pub use dispatcher::{DispatchReport, Dispatcher};
pub use engine::{Engine, Options};
pub use error::{FrameworkError, FrameworkResult};
pub use handler::{BoxedHandler, Handler, IntoResponse, Response, into_handler};
pub use matcher::{DEFAULT_PRIORITY, Matcher, MatcherBuilder, MatcherId};
pub use plugin::{Plugin, PluginInfo};
pub use rule::Rule;
pub use store::MatcherStore;

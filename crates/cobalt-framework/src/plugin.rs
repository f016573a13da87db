//! Plugins.
//!
//! A plugin is a bundle of matchers registered together at start-up:
//!
//! ```rust,ignore
//! struct Ping;
//!
//! impl Plugin for Ping {
//!     fn info(&self) -> PluginInfo {
//!         PluginInfo::new("ping", "cobalt", "0.1.0", "replies pong")
//!     }
//!
//!     fn start(&self, engine: &Engine) -> anyhow::Result<()> {
//!         engine.on_full_match("ping").handle(|ctx: MatcherContext| async move {
//!             let _ = ctx.send("pong").await;
//!         });
//!         Ok(())
//!     }
//! }
//! ```

use crate::engine::Engine;

/// Descriptive metadata logged when a plugin is loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginInfo {
    /// Plugin name.
    pub name: String,
    /// Author.
    pub author: String,
    /// Version string.
    pub version: String,
    /// Free-form description.
    pub details: String,
}

impl PluginInfo {
    /// Creates plugin info.
    pub fn new(
        name: impl Into<String>,
        author: impl Into<String>,
        version: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            author: author.into(),
            version: version.into(),
            details: details.into(),
        }
    }
}

/// A bundle of matchers.
pub trait Plugin: Send + Sync {
    /// Metadata for logs.
    fn info(&self) -> PluginInfo;

    /// Registers the plugin's matchers.
    fn start(&self, engine: &Engine) -> anyhow::Result<()>;
}

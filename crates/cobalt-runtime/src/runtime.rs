//! Runtime orchestration.
//!
//! [`CobaltRuntime`] owns the configuration, the [`Engine`] and the plugins.
//! Running it starts every plugin, connects the transport, learns the bot's
//! own id and then reads until the connection closes or shutdown is
//! requested.
//!
//! ```rust,ignore
//! use cobalt_runtime::CobaltRuntime;
//!
//! let runtime = CobaltRuntime::builder()
//!     .config_file("cobalt.toml")
//!     .build()?
//!     .plugin(Echo);
//!
//! runtime.run().await?;
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::signal;
use tracing::{debug, info, warn};

use cobalt_core::Transport;
use cobalt_framework::{Engine, Plugin};

use crate::config::{CobaltConfig, ConfigLoader, ConfigResult};
use crate::driver::Session;
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

/// The Cobalt runtime.
pub struct CobaltRuntime {
    config: CobaltConfig,
    engine: Engine,
    plugins: Vec<Box<dyn Plugin>>,
    plugins_started: AtomicBool,
}

impl CobaltRuntime {
    /// Loads configuration from the current directory and the environment,
    /// falling back to defaults if loading fails.
    pub fn new() -> Self {
        match ConfigLoader::new().with_current_dir().load() {
            Ok(config) => Self::from_config(config),
            Err(e) => {
                let runtime = Self::from_config(CobaltConfig::default());
                warn!(error = %e, "Failed to load configuration, using defaults");
                runtime
            }
        }
    }

    /// Creates a runtime builder for custom configuration.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from configuration, installing the global logger.
    pub fn from_config(config: CobaltConfig) -> Self {
        logging::init_from_config(&config.logging);

        info!(
            log_level = %config.logging.level,
            url = %config.connection.url,
            command_prefix = %config.bot.command_prefix,
            "Runtime initialized from configuration"
        );

        Self {
            engine: Engine::new(config.bot.to_options()),
            config,
            plugins: Vec::new(),
            plugins_started: AtomicBool::new(false),
        }
    }

    /// The configuration.
    pub fn config(&self) -> &CobaltConfig {
        &self.config
    }

    /// The engine matchers are registered on.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Adds a plugin, started when the runtime runs.
    pub fn plugin(mut self, plugin: impl Plugin + 'static) -> Self {
        self.plugins.push(Box::new(plugin));
        self
    }

    /// Starts every plugin in registration order. Later calls do nothing.
    ///
    /// # Errors
    /// [`RuntimeError::Plugin`] for the first plugin whose start hook fails.
    pub fn start_plugins(&self) -> RuntimeResult<()> {
        if self.plugins_started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        for plugin in &self.plugins {
            self.engine
                .start_plugin(plugin.as_ref())
                .map_err(|e| RuntimeError::Plugin {
                    name: plugin.info().name,
                    reason: format!("{e:#}"),
                })?;
        }
        info!(
            plugins = self.plugins.len(),
            matchers = self.engine.store().len(),
            "Plugins started"
        );
        Ok(())
    }

    /// Connects `transport` and starts reading.
    ///
    /// Fetches the login info once connected; failure to do so is logged and
    /// leaves the bot's own id unknown.
    pub async fn connect(&self, transport: &dyn Transport) -> RuntimeResult<Session> {
        info!(transport = transport.name(), "Connecting");
        let connection = transport.connect().await?;
        let session = Session::start(
            connection,
            self.engine.dispatcher(),
            self.config.api.timeout(),
        );

        match session.bot().refresh_self_id().await {
            Ok(login) => info!(
                self_id = login.user_id,
                nickname = %login.nickname,
                "Connected"
            ),
            Err(e) => warn!(error = %e, "Failed to fetch login info"),
        }
        Ok(session)
    }

    /// Starts plugins, connects and reads until the connection closes or
    /// `shutdown` resolves.
    ///
    /// On return the store is cleared, which ends any waiting continuation.
    ///
    /// # Errors
    /// Plugin start and connect failures, and [`RuntimeError::Disconnected`]
    /// if the gateway closed the connection first.
    pub async fn run_with<F>(&self, transport: &dyn Transport, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        self.start_plugins()?;
        let mut session = self.connect(transport).await?;

        let result = tokio::select! {
            _ = shutdown => {
                info!("Shutting down");
                session.abort();
                Ok(())
            }
            reason = session.closed() => {
                warn!(reason = ?reason, "Connection closed by gateway");
                Err(RuntimeError::Disconnected(reason))
            }
        };

        let removed = self.engine.clear();
        debug!(removed, "Cleared matcher store");
        result
    }

    /// Connects to the configured WebSocket gateway and runs until Ctrl+C,
    /// SIGTERM, or disconnection.
    #[cfg(feature = "ws-client")]
    pub async fn run(&self) -> RuntimeResult<()> {
        use cobalt_transport::websocket::WsClientTransport;

        let transport = WsClientTransport::new(&self.config.connection.url)
            .access_token(self.config.connection.access_token.clone())
            .buffer(self.config.api.outbound_buffer);

        info!("Cobalt runtime is now running. Press Ctrl+C to stop.");
        self.run_with(&transport, wait_for_shutdown()).await
    }
}

impl Default for CobaltRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves on Ctrl+C or, on unix, SIGTERM.
///
/// If no signal handler can be installed it never resolves.
pub async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    result = signal::ctrl_c() => match result {
                        Ok(()) => info!("Received Ctrl+C, shutting down"),
                        Err(e) => {
                            warn!(error = %e, "Failed to listen for Ctrl+C");
                            sigterm.recv().await;
                            info!("Received SIGTERM, shutting down");
                        }
                    },
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
                return;
            }
            Err(e) => warn!(error = %e, "Failed to register SIGTERM handler"),
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            futures::future::pending::<()>().await;
        }
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for a [`CobaltRuntime`] with custom configuration sources.
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
}

impl RuntimeBuilder {
    /// Searches the current directory by default.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
        }
    }

    /// Loads this configuration file instead of searching.
    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile.
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Disables `COBALT_*` environment overrides.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges configuration values programmatically.
    pub fn merge(mut self, config: CobaltConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Loads the configuration and builds the runtime.
    pub fn build(self) -> ConfigResult<CobaltRuntime> {
        let config = self.config_loader.load()?;
        Ok(CobaltRuntime::from_config(config))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

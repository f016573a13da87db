//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{ApiConfig, CobaltConfig, ConnectionConfig, LogOutput, LoggingConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &CobaltConfig) -> ConfigResult<()> {
    validate_connection(&config.connection)?;
    validate_api(&config.api)?;
    validate_logging(&config.logging)?;
    Ok(())
}

fn validate_connection(connection: &ConnectionConfig) -> ConfigResult<()> {
    validate_url(&connection.url)
}

fn validate_api(api: &ApiConfig) -> ConfigResult<()> {
    if api.timeout_secs == 0 {
        return Err(ConfigError::validation("api.timeout_secs must be greater than 0"));
    }
    if api.outbound_buffer == 0 {
        return Err(ConfigError::validation(
            "api.outbound_buffer must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "logging.file_path is required when logging.output is \"file\"",
        ));
    }
    Ok(())
}

fn validate_url(url: &str) -> ConfigResult<()> {
    const SCHEMES: [&str; 2] = ["ws://", "wss://"];

    if url.is_empty() {
        return Err(ConfigError::invalid_url(url, "URL is empty"));
    }
    if !SCHEMES.iter().any(|s| url.starts_with(s)) {
        return Err(ConfigError::invalid_url(
            url,
            format!("URL must start with one of: {SCHEMES:?}"),
        ));
    }
    if url.len() == url.find("://").map_or(0, |i| i + 3) {
        return Err(ConfigError::invalid_url(url, "URL has no host"));
    }
    Ok(())
}

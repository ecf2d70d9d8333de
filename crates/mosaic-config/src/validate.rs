//! Post-merge configuration validation.

use tracing::warn;

use crate::error::{ConfigError, ConfigResult};
use crate::types::FrameworkConfig;

/// Validate a fully-merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &FrameworkConfig) -> ConfigResult<()> {
    validate_sandbox(config);
    validate_assets(config)?;
    validate_fetch(config)?;
    validate_logging(config)?;
    Ok(())
}

fn validate_sandbox(config: &FrameworkConfig) {
    if let crate::types::SandboxSetting::Options(o) = config.sandbox
        && o.strict_style_isolation
        && o.experimental_style_isolation
    {
        warn!(
            "strict_style_isolation and experimental_style_isolation are both set; \
             strict_style_isolation takes precedence"
        );
    }
}

fn validate_assets(config: &FrameworkConfig) -> ConfigResult<()> {
    config.exclude_asset_matcher().map(|_| ())
}

fn validate_fetch(config: &FrameworkConfig) -> ConfigResult<()> {
    if config.fetch.timeout_secs == 0 {
        return Err(ConfigError::ValidationError {
            field: "fetch.timeout_secs".to_owned(),
            message: "timeout_secs must be greater than zero".to_owned(),
        });
    }
    for name in config.fetch.headers.keys() {
        if name.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                field: "fetch.headers".to_owned(),
                message: "header names must not be empty".to_owned(),
            });
        }
    }
    Ok(())
}

fn validate_logging(config: &FrameworkConfig) -> ConfigResult<()> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.logging.level.as_str()) {
        return Err(ConfigError::ValidationError {
            field: "logging.level".to_owned(),
            message: format!(
                "unsupported log level '{}'; expected one of: {}",
                config.logging.level,
                valid_levels.join(", ")
            ),
        });
    }

    let valid_formats = ["pretty", "compact", "json", "full"];
    if !valid_formats.contains(&config.logging.format.as_str()) {
        return Err(ConfigError::ValidationError {
            field: "logging.format".to_owned(),
            message: format!(
                "unsupported log format '{}'; expected one of: {}",
                config.logging.format,
                valid_formats.join(", ")
            ),
        });
    }

    Ok(())
}

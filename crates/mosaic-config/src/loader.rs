//! Config file discovery and layered loading.
//!
//! Implements the `FrameworkConfig::load()` algorithm:
//! 1. Parse `defaults.toml` → base
//! 2. Merge the config file, if present, recording which fields it set
//! 3. Apply `MOSAIC_*` env var fallbacks for unset fields
//! 4. Deserialize merged tree → `FrameworkConfig`
//! 5. Validate

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::env::apply_env_fallbacks;
use crate::merge::{FieldSources, deep_merge_tracking};
use crate::types::FrameworkConfig;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Maximum allowed config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: usize = 1_048_576;

/// Load the configuration with layered precedence.
///
/// A missing file is not an error; the defaults and env layer still apply.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file is malformed, or if the final
/// merged configuration fails validation.
pub fn load<S: ::std::hash::BuildHasher>(
    path: Option<&Path>,
    env_vars: &HashMap<String, String, S>,
) -> ConfigResult<FrameworkConfig> {
    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
            path: "<embedded defaults>".to_owned(),
            source: e,
        })?;

    let mut sources = FieldSources::new();
    if let Some(path) = path
        && let Some(overlay) = try_load_file(path)?
    {
        deep_merge_tracking(&mut merged, &overlay, "", &mut sources);
        info!(path = %path.display(), "loaded mosaic config");
    }

    let env_count = apply_env_fallbacks(&mut merged, &sources, env_vars);
    if env_count > 0 {
        debug!(count = env_count, "applied environment variable fallbacks");
    }

    let config: FrameworkConfig =
        merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError {
                path: "<merged config>".to_owned(),
                source: e,
            })?;

    validate::validate(&config)?;
    Ok(config)
}

/// Load a config from a specific file path (no layering).
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read or parsed.
pub fn load_file(path: &Path) -> ConfigResult<FrameworkConfig> {
    let content = read_bounded(path)?;
    from_toml_str(&content, &path.display().to_string())
}

/// Parse and validate a TOML document. `origin` names it in errors.
///
/// # Errors
///
/// Returns a [`ConfigError`] if parsing or validation fails.
pub fn from_toml_str(content: &str, origin: &str) -> ConfigResult<FrameworkConfig> {
    let config: FrameworkConfig = toml::from_str(content).map_err(|e| ConfigError::ParseError {
        path: origin.to_owned(),
        source: e,
    })?;
    validate::validate(&config)?;
    Ok(config)
}

/// Try to load a file, returning `None` if the file doesn't exist.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let content = match read_bounded(path) {
        Ok(c) => c,
        Err(ConfigError::ReadError { source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            debug!(path = %path.display(), "config file not found, skipping");
            return Ok(None);
        },
        Err(e) => return Err(e),
    };

    let value: toml::Value = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(Some(value))
}

/// Read a file in one go and reject anything over the size limit.
fn read_bounded(path: &Path) -> ConfigResult<String> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    if content.len() > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "config file is {} bytes, exceeding the {MAX_CONFIG_FILE_SIZE} byte limit",
                content.len()
            ),
        });
    }
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SandboxSetting;
    use std::io::Write;

    #[test]
    fn test_defaults_only() {
        let config = load(None, &HashMap::new()).unwrap();
        assert_eq!(config, FrameworkConfig::default());
    }

    #[test]
    fn test_missing_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(Some(&dir.path().join("absent.toml")), &HashMap::new()).unwrap();
        assert!(config.singular);
    }

    #[test]
    fn test_file_overrides_defaults_and_beats_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "singular = false\n[sandbox]\nloose = true").unwrap();

        let env = HashMap::from([
            ("MOSAIC_SINGULAR".to_owned(), "true".to_owned()),
            ("MOSAIC_LOG_LEVEL".to_owned(), "debug".to_owned()),
        ]);
        let config = load(Some(file.path()), &env).unwrap();

        assert!(!config.singular);
        assert!(config.sandbox.loose());
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_env_can_disable_sandbox() {
        let env = HashMap::from([("MOSAIC_SANDBOX".to_owned(), "false".to_owned())]);
        let config = load(None, &env).unwrap();
        assert_eq!(config.sandbox, SandboxSetting::Toggle(false));
    }

    #[test]
    fn test_load_file_rejects_invalid_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[logging]\nlevel = \"loud\"").unwrap();
        let err = load_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }

    #[test]
    fn test_parse_error_names_origin() {
        let err = from_toml_str("singular = [", "inline-test").unwrap_err();
        assert!(err.to_string().contains("inline-test"));
    }
}

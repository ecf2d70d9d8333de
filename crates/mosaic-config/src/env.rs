//! Environment variable fallbacks.
//!
//! Env vars are **fallback**, not override: they only apply to fields that
//! the config file did not set.

use std::collections::HashMap;

use tracing::debug;

use crate::merge::FieldSources;

/// Mapping from environment variable name to config field path.
struct EnvMapping {
    var_name: &'static str,
    field_path: &'static str,
}

/// All supported `MOSAIC_*` env var mappings.
const ENV_MAPPINGS: &[EnvMapping] = &[
    EnvMapping {
        var_name: "MOSAIC_SINGULAR",
        field_path: "singular",
    },
    EnvMapping {
        var_name: "MOSAIC_SANDBOX",
        field_path: "sandbox",
    },
    EnvMapping {
        var_name: "MOSAIC_AUTO_START",
        field_path: "auto_start",
    },
    EnvMapping {
        var_name: "MOSAIC_FETCH_TIMEOUT_SECS",
        field_path: "fetch.timeout_secs",
    },
    EnvMapping {
        var_name: "MOSAIC_LOG_LEVEL",
        field_path: "logging.level",
    },
    EnvMapping {
        var_name: "MOSAIC_LOG_FORMAT",
        field_path: "logging.format",
    },
];

/// Snapshot the process environment.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars().collect()
}

/// Apply environment variable fallbacks to fields that were **not** set by
/// the file layer.
///
/// Returns the number of env vars applied.
pub fn apply_env_fallbacks<S: ::std::hash::BuildHasher>(
    merged: &mut toml::Value,
    sources: &FieldSources,
    env_vars: &HashMap<String, String, S>,
) -> usize {
    let mut count: usize = 0;

    for mapping in ENV_MAPPINGS {
        if sources.contains(mapping.field_path) {
            continue;
        }

        if let Some(val) = env_vars.get(mapping.var_name) {
            debug!(
                var = mapping.var_name,
                field = mapping.field_path,
                "applying env var fallback"
            );
            set_field_from_string(merged, mapping.field_path, val);
            count = count.saturating_add(1);
        }
    }

    count
}

/// Set a dotted field path to a value coerced from its string form.
fn set_field_from_string(root: &mut toml::Value, path: &str, val: &str) {
    let toml_val = coerce_to_toml_value(val);
    let mut segments: Vec<&str> = path.split('.').collect();
    let Some(leaf) = segments.pop() else {
        return;
    };

    let mut current = root;
    for segment in segments {
        let Some(table) = current.as_table_mut() else {
            return;
        };
        current = table
            .entry(segment.to_owned())
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
    }

    if let Some(table) = current.as_table_mut() {
        table.insert(leaf.to_owned(), toml_val);
    }
}

/// Booleans and integers keep their type; everything else is a string.
fn coerce_to_toml_value(val: &str) -> toml::Value {
    match val.trim() {
        "true" => toml::Value::Boolean(true),
        "false" => toml::Value::Boolean(false),
        other => other
            .parse::<i64>()
            .map_or_else(|_| toml::Value::String(val.to_owned()), toml::Value::Integer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_only_fills_unset_fields() {
        let mut merged: toml::Value = toml::from_str("singular = true\n[logging]\nlevel = \"info\"").unwrap();
        let mut sources = FieldSources::new();
        sources.insert("logging.level".to_owned());

        let env = HashMap::from([
            ("MOSAIC_SINGULAR".to_owned(), "false".to_owned()),
            ("MOSAIC_LOG_LEVEL".to_owned(), "trace".to_owned()),
        ]);
        let applied = apply_env_fallbacks(&mut merged, &sources, &env);

        assert_eq!(applied, 1);
        assert_eq!(merged["singular"].as_bool(), Some(false));
        assert_eq!(merged["logging"]["level"].as_str(), Some("info"));
    }

    #[test]
    fn test_integer_coercion() {
        let mut merged: toml::Value = toml::from_str("[fetch]\ntimeout_secs = 30").unwrap();
        let env = HashMap::from([("MOSAIC_FETCH_TIMEOUT_SECS".to_owned(), "12".to_owned())]);
        apply_env_fallbacks(&mut merged, &FieldSources::new(), &env);
        assert_eq!(merged["fetch"]["timeout_secs"].as_integer(), Some(12));
    }
}

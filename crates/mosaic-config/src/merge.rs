//! Deep merge of TOML values.
//!
//! The merge operates on raw [`toml::Value`] trees rather than deserialized
//! structs, so a key missing from an overlay never overrides the base.

use std::collections::HashSet;

/// Dotted paths of every leaf an overlay layer set.
pub type FieldSources = HashSet<String>;

/// Deep-merge `overlay` into `base`, recording each leaf path the overlay
/// set in `sources`.
///
/// - Tables merge recursively per-field.
/// - Scalars and arrays from the overlay **replace** the base value.
pub fn deep_merge_tracking(
    base: &mut toml::Value,
    overlay: &toml::Value,
    prefix: &str,
    sources: &mut FieldSources,
) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                if let Some(base_val) = base_table.get_mut(key) {
                    deep_merge_tracking(base_val, overlay_val, &path, sources);
                } else {
                    base_table.insert(key.clone(), overlay_val.clone());
                    record_leaves(overlay_val, &path, sources);
                }
            }
        },
        (base, overlay) => {
            *base = overlay.clone();
            record_leaves(overlay, prefix, sources);
        },
    }
}

fn record_leaves(value: &toml::Value, path: &str, sources: &mut FieldSources) {
    match value {
        // A table replacing a scalar (e.g. `sandbox = { ... }` over
        // `sandbox = true`) marks the parent as set too.
        toml::Value::Table(table) => {
            sources.insert(path.to_owned());
            for (key, child) in table {
                record_leaves(child, &format!("{path}.{key}"), sources);
            }
        },
        _ => {
            sources.insert(path.to_owned());
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlay_replaces_scalars_and_records_paths() {
        let mut base: toml::Value = toml::from_str("singular = true\n[fetch]\ntimeout_secs = 30").unwrap();
        let overlay: toml::Value = toml::from_str("[fetch]\ntimeout_secs = 5").unwrap();
        let mut sources = FieldSources::new();

        deep_merge_tracking(&mut base, &overlay, "", &mut sources);

        assert_eq!(base["fetch"]["timeout_secs"].as_integer(), Some(5));
        assert_eq!(base["singular"].as_bool(), Some(true));
        assert!(sources.contains("fetch.timeout_secs"));
        assert!(!sources.contains("singular"));
    }

    #[test]
    fn test_table_over_scalar() {
        let mut base: toml::Value = toml::from_str("sandbox = true").unwrap();
        let overlay: toml::Value = toml::from_str("[sandbox]\nloose = true").unwrap();
        let mut sources = FieldSources::new();

        deep_merge_tracking(&mut base, &overlay, "", &mut sources);

        assert_eq!(base["sandbox"]["loose"].as_bool(), Some(true));
        assert!(sources.contains("sandbox"));
    }
}

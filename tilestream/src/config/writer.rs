//! INI serialization logic for converting `EngineConfig` → INI string.

use std::path::Path;

use super::settings::EngineConfig;

/// Convert an `EngineConfig` to a commented INI string for saving.
pub(super) fn to_config_string(config: &EngineConfig) -> String {
    let max_depth = config
        .refinement
        .max_depth
        .map(|d| d.to_string())
        .unwrap_or_default();

    format!(
        r#"[refinement]
; Error metric above which a tile is replaced by its children
threshold = {}
; Deepest level to subdivide to (empty = the layer's maximum zoom)
max_depth = {}

[cache]
; How long a tile must stay invisible before its content is released
cleanup_delay_ms = {}
; Events buffered per subscriber
event_capacity = {}

[fetch]
; Maximum concurrent tile downloads
max_in_flight = {}
; Per-request timeout in seconds
timeout_secs = {}

[logging]
directory = {}
file = {}
"#,
        config.refinement.threshold,
        max_depth,
        config.cache.cleanup_delay_ms,
        config.cache.event_capacity,
        config.fetch.max_in_flight,
        config.fetch.timeout_secs,
        path_to_string(&config.logging.directory),
        config.logging.file,
    )
}

/// Convert a path to string, using `~` for the home directory.
fn path_to_string(path: &Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(stripped) = path.strip_prefix(&home) {
            return format!("~/{}", stripped.display());
        }
    }
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::super::settings::EngineConfig;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.ini");

        let mut config = EngineConfig::default();
        config.refinement.threshold = 4.25;
        config.refinement.max_depth = Some(21);
        config.cache.cleanup_delay_ms = 2500;
        config.fetch.max_in_flight = 32;
        config.logging.directory = PathBuf::from("/tmp/tilestream-logs");

        config.save_to(&config_path).unwrap();
        let loaded = EngineConfig::load_from(&config_path).unwrap();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_default_writes_empty_max_depth() {
        let content = super::to_config_string(&EngineConfig::default());
        assert!(content.contains("max_depth = \n"));
        assert!(content.contains("threshold = 16\n"));
    }
}

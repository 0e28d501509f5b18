//! INI parsing logic for converting `Ini` → `EngineConfig`.
//!
//! The single place where INI key names are mapped to struct fields.

use std::path::PathBuf;
use std::str::FromStr;

use ini::{Ini, Properties};

use super::defaults::clamp_max_in_flight;
use super::file::ConfigFileError;
use super::settings::EngineConfig;

/// Parse an `Ini` object into an `EngineConfig`.
///
/// Starts from `EngineConfig::default()` and overlays any values found.
pub(super) fn parse_ini(ini: &Ini) -> Result<EngineConfig, ConfigFileError> {
    let mut config = EngineConfig::default();

    // [refinement] section
    if let Some(section) = ini.section(Some("refinement")) {
        let threshold =
            parse_value::<f64>(section, "refinement", "threshold", "expected a number")?;
        if let Some(v) = threshold {
            if !v.is_finite() || v < 0.0 {
                return Err(invalid(
                    "refinement",
                    "threshold",
                    &v.to_string(),
                    "must be a non-negative number",
                ));
            }
            config.refinement.threshold = v;
        }
        config.refinement.max_depth = parse_value::<u32>(
            section,
            "refinement",
            "max_depth",
            "expected a level between 0 and 31",
        )?;
        if let Some(depth) = config.refinement.max_depth {
            if depth > crate::coord::MAX_LEVEL {
                return Err(invalid(
                    "refinement",
                    "max_depth",
                    &depth.to_string(),
                    "expected a level between 0 and 31",
                ));
            }
        }
    }

    // [cache] section
    if let Some(section) = ini.section(Some("cache")) {
        if let Some(v) =
            parse_value(section, "cache", "cleanup_delay_ms", "expected milliseconds")?
        {
            config.cache.cleanup_delay_ms = v;
        }
        if let Some(v) =
            parse_value::<usize>(section, "cache", "event_capacity", "expected a positive integer")?
        {
            if v == 0 {
                return Err(invalid("cache", "event_capacity", "0", "expected a positive integer"));
            }
            config.cache.event_capacity = v;
        }
    }

    // [fetch] section
    if let Some(section) = ini.section(Some("fetch")) {
        if let Some(v) =
            parse_value(section, "fetch", "max_in_flight", "expected a positive integer")?
        {
            config.fetch.max_in_flight = clamp_max_in_flight(v);
        }
        if let Some(v) = parse_value::<u64>(section, "fetch", "timeout_secs", "expected seconds")? {
            if v == 0 {
                return Err(invalid("fetch", "timeout_secs", "0", "must be at least 1"));
            }
            config.fetch.timeout_secs = v;
        }
    }

    // [logging] section
    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.directory = expand_tilde(v);
            }
        }
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.file = v.to_string();
            }
        }
    }

    Ok(config)
}

/// Parses `key` from `section`; empty values count as unset.
fn parse_value<T: FromStr>(
    section: &Properties,
    section_name: &str,
    key: &str,
    reason: &str,
) -> Result<Option<T>, ConfigFileError> {
    match section.get(key).map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| invalid(section_name, key, v, reason)),
    }
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Expand a leading `~/` to the home directory.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn load(content: &str) -> Result<EngineConfig, ConfigFileError> {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.ini");
        std::fs::write(&config_path, content).unwrap();
        EngineConfig::load_from(&config_path)
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = load(
            r#"
[refinement]
threshold = 8.5

[fetch]
max_in_flight = 4
"#,
        )
        .unwrap();

        assert_eq!(config.refinement.threshold, 8.5);
        assert!(config.refinement.max_depth.is_none());
        assert_eq!(config.fetch.max_in_flight, 4);
        assert_eq!(config.fetch.timeout_secs, 30);
        assert_eq!(config.cache.cleanup_delay_ms, 1000);
    }

    #[test]
    fn test_empty_max_depth_is_unset() {
        let config = load("[refinement]\nmax_depth =\n").unwrap();
        assert!(config.refinement.max_depth.is_none());

        let config = load("[refinement]\nmax_depth = 22\n").unwrap();
        assert_eq!(config.refinement.max_depth, Some(22));
        assert_eq!(
            config.policy(),
            crate::refine::RefinementPolicy::new(16.0).with_max_depth(22)
        );
    }

    #[test]
    fn test_invalid_threshold() {
        let err = load("[refinement]\nthreshold = lots\n").unwrap_err();
        match err {
            ConfigFileError::InvalidValue {
                section,
                key,
                value,
                ..
            } => {
                assert_eq!(section, "refinement");
                assert_eq!(key, "threshold");
                assert_eq!(value, "lots");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_max_depth() {
        let err = load("[refinement]\nmax_depth = 40\n").unwrap_err();
        assert!(err.to_string().contains("max_depth"));
    }

    #[test]
    fn test_zero_event_capacity_rejected() {
        let err = load("[cache]\nevent_capacity = 0\n").unwrap_err();
        assert!(err.to_string().contains("event_capacity"));
    }

    #[test]
    fn test_max_in_flight_clamped() {
        let config = load("[fetch]\nmax_in_flight = 0\n").unwrap();
        assert_eq!(config.fetch.max_in_flight, 1);
    }

    #[test]
    fn test_logging_section() {
        let config = load("[logging]\ndirectory = /var/log/tiles\nfile = engine.log\n").unwrap();
        assert_eq!(config.logging.directory, PathBuf::from("/var/log/tiles"));
        assert_eq!(config.logging.file, "engine.log");
    }

    #[test]
    fn test_expand_tilde() {
        let expanded = expand_tilde("~/tiles/logs");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expanded, home.join("tiles/logs"));
        }
        assert_eq!(expand_tilde("relative"), PathBuf::from("relative"));
    }
}

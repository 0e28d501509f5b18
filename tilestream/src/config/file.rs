//! Reading and writing the engine config file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use ini::Ini;
use thiserror::Error;
use tracing::{debug, info};

use super::defaults::{CONFIG_DIR_NAME, CONFIG_FILE_NAME};
use super::settings::EngineConfig;

/// Errors loading or saving an [`EngineConfig`].
#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("Cannot parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },

    #[error("Cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot create directory {}: {source}", path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A key holds a value the engine cannot use
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },
}

impl EngineConfig {
    /// Loads `~/.tilestream/config.ini`.
    pub fn load() -> Result<Self, ConfigFileError> {
        Self::load_from(&config_file_path())
    }

    /// Loads `path`, falling back to the defaults when it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path).map_err(|source| ConfigFileError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        super::parser::parse_ini(&ini)
    }

    /// Writes the full configuration to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigFileError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ConfigFileError::Directory {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        fs::write(path, super::writer::to_config_string(self)).map_err(|source| {
            ConfigFileError::Write {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    /// Writes the defaults to `path` unless a file is already there.
    ///
    /// Returns whether a file was created.
    pub fn init_at(path: &Path) -> Result<bool, ConfigFileError> {
        if path.exists() {
            return Ok(false);
        }
        Self::default().save_to(path)?;
        info!(path = %path.display(), "Created config file");
        Ok(true)
    }
}

/// `~/.tilestream`, or `./.tilestream` without a home directory.
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

/// `~/.tilestream/config.ini`.
pub fn config_file_path() -> PathBuf {
    config_directory().join(CONFIG_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::defaults::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();

        assert_eq!(config.refinement.threshold, 16.0);
        assert!(config.refinement.max_depth.is_none());
        assert_eq!(config.cache.cleanup_delay_ms, 1000);
        assert_eq!(config.cache.event_capacity, 64);
        assert_eq!(config.fetch.max_in_flight, 16);
        assert_eq!(config.fetch.timeout_secs, 30);
        assert_eq!(config.logging.file, DEFAULT_LOG_FILE);
    }

    #[test]
    fn test_load_nonexistent_returns_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.ini");

        let config = EngineConfig::load_from(&config_path).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_invalid_value_in_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.ini");
        fs::write(&config_path, "[cache]\ncleanup_delay_ms = soon\n").unwrap();

        match EngineConfig::load_from(&config_path).unwrap_err() {
            ConfigFileError::InvalidValue { section, key, value, .. } => {
                assert_eq!(section, "cache");
                assert_eq!(key, "cleanup_delay_ms");
                assert_eq!(value, "soon");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_init_at_creates_once() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.ini");

        assert!(EngineConfig::init_at(&config_path).unwrap());
        assert_eq!(
            EngineConfig::load_from(&config_path).unwrap(),
            EngineConfig::default()
        );

        fs::write(&config_path, "[fetch]\nmax_in_flight = 4\n").unwrap();
        assert!(!EngineConfig::init_at(&config_path).unwrap());
        assert_eq!(
            EngineConfig::load_from(&config_path).unwrap().fetch.max_in_flight,
            4
        );
    }

    #[test]
    fn test_config_path_under_home() {
        let path = config_file_path();
        assert!(path.ends_with(".tilestream/config.ini"));
    }
}

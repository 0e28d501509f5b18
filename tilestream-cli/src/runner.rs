//! CLI runner for common setup and operations.
//!
//! Encapsulates config loading, logging initialization and file operations
//! to reduce duplication across command handlers.

use std::path::{Path, PathBuf};

use tilestream::config::{config_file_path, EngineConfig};
use tilestream::layer::{preprocess_data_layer, LayerConfig, LayerOptions};
use tilestream::logging::{init_logging, LoggingGuard};
use tilestream::provider::AsyncReqwestClient;
use tracing::info;

use crate::error::CliError;

/// Runner that manages CLI lifecycle and common operations.
pub struct CliRunner {
    /// Logging guard - keeps logging active while runner exists
    #[allow(dead_code)]
    logging_guard: LoggingGuard,
    config: EngineConfig,
    config_path: PathBuf,
}

impl CliRunner {
    /// Create a runner, loading config from `config_path` (or the default
    /// path) and initializing logging.
    ///
    /// # Arguments
    ///
    /// * `config_path` - Explicit config file, if given on the command line
    /// * `verbose` - Also print log events to stderr
    pub fn new(config_path: Option<PathBuf>, verbose: bool) -> Result<Self, CliError> {
        let config_path = config_path.unwrap_or_else(config_file_path);
        let config = EngineConfig::load_from(&config_path)?;

        let logging_guard =
            init_logging(&config.logging.directory, &config.logging.file, verbose)
                .map_err(|e| CliError::LoggingInit(e.to_string()))?;

        Ok(Self {
            logging_guard,
            config,
            config_path,
        })
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Log startup information for a command.
    pub fn log_startup(&self, command: &str) {
        info!(version = tilestream::VERSION, command, "TileStream CLI starting");
    }

    /// Create the HTTP client with the configured timeout.
    pub fn create_client(&self) -> Result<AsyncReqwestClient, CliError> {
        AsyncReqwestClient::with_timeout(self.config.fetch.timeout_secs).map_err(CliError::Client)
    }
}

/// Read a whole file.
pub fn read_file(path: &Path) -> Result<Vec<u8>, CliError> {
    std::fs::read(path).map_err(|error| CliError::FileRead {
        path: path.to_path_buf(),
        error,
    })
}

/// Write `data` to `path`.
pub fn write_file(path: &Path, data: &[u8]) -> Result<(), CliError> {
    std::fs::write(path, data).map_err(|error| CliError::FileWrite {
        path: path.to_path_buf(),
        error,
    })
}

/// Load and validate a layer definition from a JSON file.
pub fn load_layer(path: &Path) -> Result<LayerConfig, CliError> {
    let bytes = read_file(path)?;
    let options: LayerOptions = serde_json::from_slice(&bytes).map_err(|error| CliError::Json {
        path: path.to_path_buf(),
        error,
    })?;
    Ok(preprocess_data_layer(options)?)
}

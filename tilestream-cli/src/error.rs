//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and exit code 1.

use std::fmt;
use std::path::PathBuf;
use std::process;

use tilestream::config::ConfigFileError;
use tilestream::decode::DecodeError;
use tilestream::fetch::FetchError;
use tilestream::layer::ConfigurationError;
use tilestream::provider::TransportError;
use tilestream::semantic::SemanticError;
use tilestream::tileset::TilesetError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Engine configuration file error
    Config(ConfigFileError),
    /// Layer definition rejected
    Layer(ConfigurationError),
    /// Tile address argument could not be parsed
    InvalidAddress(String),
    /// Failed to create the HTTP client
    Client(TransportError),
    /// Failed to fetch a tile
    Fetch(FetchError),
    /// Failed to load a tileset
    Tileset(TilesetError),
    /// Failed to decode tile content
    Decode(DecodeError),
    /// Failed to look up feature metadata
    Semantic(SemanticError),
    /// Input file is not valid JSON
    Json { path: PathBuf, error: serde_json::Error },
    /// Failed to read input file
    FileRead { path: PathBuf, error: std::io::Error },
    /// Failed to write output file
    FileWrite { path: PathBuf, error: std::io::Error },
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Tileset(TilesetError::Extension(_)) => {
                eprintln!();
                eprintln!("The tileset requires extensions this build cannot interpret.");
                eprintln!("Supported: {}", tilestream::extension::BATCH_TABLE_HIERARCHY);
            }
            CliError::Layer(_) => {
                eprintln!();
                eprintln!("A layer file needs at least: id, projection, extent and url.");
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(e) => write!(f, "Configuration error: {}", e),
            CliError::Layer(e) => write!(f, "Invalid layer: {}", e),
            CliError::InvalidAddress(msg) => write!(f, "Invalid tile address: {}", msg),
            CliError::Client(e) => write!(f, "Failed to create HTTP client: {}", e),
            CliError::Fetch(e) => write!(f, "Failed to fetch tile: {}", e),
            CliError::Tileset(e) => write!(f, "Failed to load tileset: {}", e),
            CliError::Decode(e) => write!(f, "Failed to decode tile: {}", e),
            CliError::Semantic(e) => write!(f, "Feature lookup failed: {}", e),
            CliError::Json { path, error } => {
                write!(f, "Invalid JSON in '{}': {}", path.display(), error)
            }
            CliError::FileRead { path, error } => {
                write!(f, "Failed to read file '{}': {}", path.display(), error)
            }
            CliError::FileWrite { path, error } => {
                write!(f, "Failed to write file '{}': {}", path.display(), error)
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            CliError::Layer(e) => Some(e),
            CliError::Client(e) => Some(e),
            CliError::Fetch(e) => Some(e),
            CliError::Tileset(e) => Some(e),
            CliError::Decode(e) => Some(e),
            CliError::Semantic(e) => Some(e),
            CliError::Json { error, .. } => Some(error),
            CliError::FileRead { error, .. } => Some(error),
            CliError::FileWrite { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e)
    }
}

impl From<ConfigurationError> for CliError {
    fn from(e: ConfigurationError) -> Self {
        CliError::Layer(e)
    }
}

impl From<FetchError> for CliError {
    fn from(e: FetchError) -> Self {
        CliError::Fetch(e)
    }
}

impl From<TilesetError> for CliError {
    fn from(e: TilesetError) -> Self {
        CliError::Tileset(e)
    }
}

impl From<DecodeError> for CliError {
    fn from(e: DecodeError) -> Self {
        CliError::Decode(e)
    }
}

impl From<SemanticError> for CliError {
    fn from(e: SemanticError) -> Self {
        CliError::Semantic(e)
    }
}

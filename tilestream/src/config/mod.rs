//! Engine configuration file.
//!
//! [`EngineConfig`] is read from `~/.tilestream/config.ini`. A missing file
//! yields the defaults; keys left out of a present file keep their defaults.
//!
//! ```ini
//! [refinement]
//! threshold = 16.0
//! max_depth =
//!
//! [cache]
//! cleanup_delay_ms = 1000
//! event_capacity = 64
//!
//! [fetch]
//! max_in_flight = 16
//! timeout_secs = 30
//!
//! [logging]
//! directory = logs
//! file = tilestream.log
//! ```

mod defaults;
mod file;
mod parser;
mod settings;
mod writer;

pub use defaults::*;
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{CacheSettings, EngineConfig, FetchSettings, LoggingSettings, RefinementSettings};

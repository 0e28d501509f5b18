//! Default values for all configuration settings.

use std::path::PathBuf;

use super::settings::*;
use crate::cache::{DEFAULT_CLEANUP_DELAY, DEFAULT_EVENT_CAPACITY};
use crate::fetch::DEFAULT_MAX_IN_FLIGHT;
use crate::provider::DEFAULT_TIMEOUT_SECS;
use crate::refine::DEFAULT_THRESHOLD;

/// Name of the config directory under the home directory.
pub const CONFIG_DIR_NAME: &str = ".tilestream";

/// Name of the config file.
pub const CONFIG_FILE_NAME: &str = "config.ini";

/// Default log directory.
pub const DEFAULT_LOG_DIRECTORY: &str = "logs";

/// Default log file name.
pub const DEFAULT_LOG_FILE: &str = "tilestream.log";

/// Largest accepted in-flight cap.
pub const MAX_IN_FLIGHT_LIMIT: usize = 256;

/// Clamp the in-flight cap to `1..=MAX_IN_FLIGHT_LIMIT`.
pub fn clamp_max_in_flight(value: usize) -> usize {
    value.clamp(1, MAX_IN_FLIGHT_LIMIT)
}

impl Default for RefinementSettings {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            max_depth: None,
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            cleanup_delay_ms: DEFAULT_CLEANUP_DELAY.as_millis() as u64,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(DEFAULT_LOG_DIRECTORY),
            file: DEFAULT_LOG_FILE.to_string(),
        }
    }
}

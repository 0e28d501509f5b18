//! Configuration management CLI commands.
//!
//! Provides `config show`, `config path` and `config init`.

use clap::Subcommand;
use tilestream::config::EngineConfig;

use crate::error::CliError;
use crate::runner::CliRunner;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,

    /// Show the configuration file path
    Path,

    /// Write a config file with default values if none exists
    Init,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands, runner: &CliRunner) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show => {
            print_config(runner.config());
            Ok(())
        }
        ConfigCommands::Path => {
            println!("{}", runner.config_path().display());
            Ok(())
        }
        ConfigCommands::Init => run_init(runner),
    }
}

fn run_init(runner: &CliRunner) -> Result<(), CliError> {
    let path = runner.config_path();
    if EngineConfig::init_at(path)? {
        println!("Created {}", path.display());
    } else {
        println!("Config file already exists: {}", path.display());
    }
    Ok(())
}

fn print_config(config: &EngineConfig) {
    let policy = config.policy();
    let cache = config.cache_config();
    let max_depth = policy
        .explicit_max_depth()
        .map(|d| d.to_string())
        .unwrap_or_else(|| "(layer zoom max)".to_string());

    println!("[refinement]");
    println!("  threshold        = {}", policy.threshold());
    println!("  max_depth        = {}", max_depth);
    println!("[cache]");
    println!("  cleanup_delay_ms = {}", cache.cleanup_delay.as_millis());
    println!("  event_capacity   = {}", cache.event_capacity);
    println!("[fetch]");
    println!("  max_in_flight    = {}", config.fetch.max_in_flight);
    println!("  timeout_secs     = {}", config.fetch.timeout_secs);
    println!("[logging]");
    println!("  directory        = {}", config.logging.directory.display());
    println!("  file             = {}", config.logging.file);
}

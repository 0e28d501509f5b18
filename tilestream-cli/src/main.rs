//! TileStream CLI - Command-line interface
//!
//! Inspect layers and tilesets, fetch single tiles and look up feature
//! metadata with the TileStream library.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;
use commands::feature::FeatureArgs;
use commands::fetch::FetchArgs;
use commands::resolve::ResolveArgs;
use commands::stream::StreamArgs;
use commands::tileset::TilesetArgs;
use error::CliError;
use runner::CliRunner;

#[derive(Parser)]
#[command(name = "tilestream")]
#[command(version = tilestream::VERSION)]
#[command(about = "Hierarchical LOD tile streaming tools", long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.tilestream/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print log output to stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective address and offset of a tile
    Resolve(ResolveArgs),

    /// Fetch one tile through the pipeline
    Fetch(FetchArgs),

    /// Load a tileset.json, validate extensions and summarize the tree
    Tileset(TilesetArgs),

    /// Run refinement cycles over a tileset and fetch what is displayed
    Stream(StreamArgs),

    /// Print feature metadata of a b3dm tile as JSON
    Feature(FeatureArgs),

    /// Engine configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        e.exit();
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let runner = CliRunner::new(cli.config, cli.verbose)?;

    match cli.command {
        Commands::Resolve(args) => commands::resolve::run(args),
        Commands::Fetch(args) => commands::fetch::run(args, &runner).await,
        Commands::Tileset(args) => commands::tileset::run(args),
        Commands::Stream(args) => commands::stream::run(args, &runner).await,
        Commands::Feature(args) => commands::feature::run(args),
        Commands::Config(command) => commands::config::run(command, &runner),
    }
}

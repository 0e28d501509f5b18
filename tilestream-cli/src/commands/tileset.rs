//! `tileset` command: load a tileset and summarize its tree.

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::Args;
use tilestream::extension::ExtensionRegistry;
use tilestream::tileset::Tileset;

use super::common::file_url;
use crate::error::CliError;
use crate::runner::read_file;

#[derive(Debug, Args)]
pub struct TilesetArgs {
    /// Path to tileset.json
    pub path: PathBuf,

    /// URL content URIs are resolved against (defaults to the file's location)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Print every node
    #[arg(long)]
    pub tree: bool,
}

/// Loads a tileset, validates its extensions and prints a summary.
pub fn run(args: TilesetArgs) -> Result<(), CliError> {
    let bytes = read_file(&args.path)?;
    let base_url = match args.base_url {
        Some(url) => url,
        None => file_url(&args.path)?,
    };

    let tileset = Tileset::from_slice(&bytes, &base_url, &ExtensionRegistry::with_builtin())?;

    println!("Tileset:   {}", args.path.display());
    println!("Version:   {}", tileset.version());
    println!("Base URL:  {}", tileset.base_url());
    println!("Nodes:     {}", tileset.len());
    println!("Depth:     {}", tileset.depth());
    println!("Error:     {}", tileset.geometric_error());

    let report = tileset.validation();
    if !tileset.extensions_used().is_empty() {
        println!("Extensions used:     {}", tileset.extensions_used().join(", "));
    }
    if !tileset.extensions_required().is_empty() {
        println!("Extensions required: {}", tileset.extensions_required().join(", "));
    }
    if !report.supported.is_empty() {
        println!("Supported:           {}", report.supported.join(", "));
    }
    for warning in &report.warnings {
        println!("Warning: {}", warning);
    }

    let mut per_level: BTreeMap<u32, (usize, usize)> = BTreeMap::new();
    for node in tileset.nodes() {
        let entry = per_level.entry(node.address.level).or_default();
        entry.0 += 1;
        if node.content_uri.is_some() {
            entry.1 += 1;
        }
    }
    println!();
    println!("Level  Nodes  With content");
    for (level, (nodes, with_content)) in &per_level {
        println!("{:>5}  {:>5}  {:>12}", level, nodes, with_content);
    }

    if args.tree {
        println!();
        for node in tileset.nodes() {
            println!(
                "{}{}  error={} refine={:?} {}",
                "  ".repeat(node.address.level as usize),
                node.address,
                node.geometric_error,
                node.refine,
                node.content_uri.as_deref().unwrap_or("-")
            );
        }
    }

    Ok(())
}

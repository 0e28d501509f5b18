//! `resolve` command: where a tile's content comes from.

use std::path::PathBuf;

use clap::Args;
use tilestream::fetch::resolve;
use tilestream::layer::{tile_inside_limit, tile_texture_count};

use super::common::parse_address;
use crate::error::CliError;
use crate::runner::load_layer;

#[derive(Debug, Args)]
pub struct ResolveArgs {
    /// Layer definition (JSON)
    #[arg(long)]
    pub layer: PathBuf,

    /// Tile address as level/row/col
    pub address: String,
}

/// Prints the effective address and offset for one tile.
pub fn run(args: ResolveArgs) -> Result<(), CliError> {
    let layer = load_layer(&args.layer)?;
    let address = parse_address(&args.address, layer.crs())?;
    let resolution = resolve(&address, &layer);
    let offset = resolution.offset;

    println!(
        "Layer:     {} ({}, zoom {}..={})",
        layer.id,
        layer.crs(),
        layer.zoom.min,
        layer.zoom.max
    );
    println!("Requested: {}", resolution.requested);
    println!("Effective: {}", resolution.effective);
    println!(
        "Offset:    x={} y={} w={} h={}",
        offset.x, offset.y, offset.width, offset.height
    );
    println!(
        "In range:  {}",
        if tile_inside_limit(&address, &layer, layer.zoom.max) {
            "yes"
        } else {
            "no"
        }
    );
    println!("Textures:  {}", tile_texture_count(&address, &layer));

    Ok(())
}

//! `fetch` command: download and decode one tile.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::Args;
use tilestream::decode::{AutoDecoder, ContentPayload};
use tilestream::extension::ExtensionRegistry;
use tilestream::fetch::FetchPipeline;
use tracing::info;

use super::common::{format_bytes, parse_address};
use crate::error::CliError;
use crate::runner::{load_layer, write_file, CliRunner};

#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Layer definition (JSON)
    #[arg(long)]
    pub layer: PathBuf,

    /// Tile address as level/row/col
    pub address: String,

    /// Write the content here: PNG for rasters, the glTF body for meshes
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

/// Fetches one tile through the pipeline and reports what arrived.
pub async fn run(args: FetchArgs, runner: &CliRunner) -> Result<(), CliError> {
    runner.log_startup("fetch");

    let layer = load_layer(&args.layer)?;
    let address = parse_address(&args.address, layer.crs())?;
    let decoder = AutoDecoder::new(Arc::new(ExtensionRegistry::with_builtin()));
    let pipeline = FetchPipeline::new(runner.create_client()?, decoder, layer)?
        .with_max_in_flight(runner.config().fetch.max_in_flight);

    println!("Fetching {} from layer '{}'...", address, pipeline.layer().id);
    let start = Instant::now();
    let handle = pipeline.fetch(address).await?;
    let elapsed = start.elapsed();
    info!(address = %address, elapsed_ms = elapsed.as_millis() as u64, "Tile fetched");

    println!("Fetched in {:.2}s", elapsed.as_secs_f64());
    println!("  Source:  {}", handle.source_address);
    if handle.is_fallback() {
        let offset = handle.offset_within_parent;
        println!(
            "  Offset:  x={} y={} w={} h={}",
            offset.x, offset.y, offset.width, offset.height
        );
    }
    println!("  Kind:    {}", handle.payload.kind());
    println!("  Size:    {}", format_bytes(handle.payload.byte_size()));

    match handle.payload.as_ref() {
        ContentPayload::Raster(raster) => {
            println!("  Image:   {}x{} ({:?})", raster.width(), raster.height(), raster.format);
            if let Some(path) = &args.output {
                raster.image.save(path).map_err(|e| CliError::FileWrite {
                    path: path.clone(),
                    error: std::io::Error::other(e.to_string()),
                })?;
                println!("Saved {}", path.display());
            }
        }
        ContentPayload::Mesh(mesh) => {
            println!("  Features: {}", mesh.batch_length);
            if let Some(center) = mesh.rtc_center {
                println!("  RTC center: {:?}", center);
            }
            if let Some(path) = &args.output {
                write_file(path, &mesh.gltf)?;
                println!("Saved {}", path.display());
            }
        }
    }

    Ok(())
}

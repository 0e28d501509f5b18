//! `stream` command: run refinement cycles over a tileset.
//!
//! Every node is offered with its geometric error times `--scale` as the
//! metric, standing in for a camera's screen-space error. Cycles repeat until
//! the set of candidates settles, then pending fetches are awaited.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::Args;
use tilestream::coord::TileAddress;
use tilestream::decode::AutoDecoder;
use tilestream::engine::{Candidate, TileEngine, UpdateReport};
use tilestream::extension::ExtensionRegistry;
use tilestream::tileset::Tileset;
use tokio::runtime::Handle;
use tracing::info;

use super::common::{file_url, format_bytes};
use crate::error::CliError;
use crate::runner::{read_file, CliRunner};

#[derive(Debug, Args)]
pub struct StreamArgs {
    /// Path to tileset.json
    pub path: PathBuf,

    /// HTTP(S) URL content URIs are resolved against
    #[arg(long)]
    pub base_url: Option<String>,

    /// Multiplier applied to each node's geometric error
    #[arg(long, default_value_t = 1.0)]
    pub scale: f64,

    /// Stop after this many cycles even if refinement has not settled
    #[arg(long, default_value_t = 32)]
    pub max_cycles: usize,
}

/// Candidates for the next cycle: what stayed displayed plus new children.
fn next_frontier(report: &UpdateReport) -> BTreeSet<TileAddress> {
    report
        .displayed
        .iter()
        .chain(&report.children)
        .copied()
        .collect()
}

/// Refines a tileset with the configured policy, cache and fetch limits.
pub async fn run(args: StreamArgs, runner: &CliRunner) -> Result<(), CliError> {
    runner.log_startup("stream");

    let bytes = read_file(&args.path)?;
    let base_url = match args.base_url {
        Some(url) => url,
        None => file_url(&args.path)?,
    };
    let registry = Arc::new(ExtensionRegistry::with_builtin());
    let tileset = Tileset::from_slice(&bytes, &base_url, &registry)?;

    let config = runner.config();
    let mut engine = TileEngine::for_tileset(
        &tileset,
        runner.create_client()?,
        AutoDecoder::new(registry),
        config,
        Handle::current(),
    );
    println!(
        "Streaming {} nodes (threshold {}, max in flight {})",
        tileset.len(),
        engine.policy().threshold(),
        engine.pipeline().limiter().max_concurrent()
    );

    let metric = |address: &TileAddress| {
        tileset
            .node(address)
            .map(|node| node.geometric_error * args.scale)
            .unwrap_or(0.0)
    };

    let start = Instant::now();
    let mut frontier = BTreeSet::from([tileset.root()]);
    for cycle in 1..=args.max_cycles {
        let candidates: Vec<_> = frontier
            .iter()
            .map(|address| Candidate::new(*address, metric(address)))
            .collect();
        let report = engine.update(&candidates, Instant::now());
        println!(
            "Cycle {:>2}: displayed={} subdivided={} out_of_range={} fetches={}",
            cycle,
            report.displayed.len(),
            report.subdivided.len(),
            report.out_of_range.len(),
            report.fetches_started
        );

        let next = next_frontier(&report);
        if next == frontier {
            break;
        }
        frontier = next;
    }

    while engine.next_completion().await {}
    engine.apply_completions(Instant::now());

    let stats = engine.cache().stats();
    info!(
        ready = stats.ready,
        errored = stats.errored,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Stream finished"
    );
    println!();
    println!("Ready:    {}", stats.ready);
    println!("Errored:  {}", stats.errored);
    println!("Visible:  {}", stats.visible);
    println!("Content:  {}", format_bytes(stats.content_bytes));
    println!("Elapsed:  {:.2}s", start.elapsed().as_secs_f64());

    Ok(())
}

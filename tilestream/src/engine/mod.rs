//! Refinement cycle driver.
//!
//! [`TileEngine`] is the single owner of the content cache. Each
//! [`update`](TileEngine::update) classifies the caller's candidate tiles,
//! grows the tree where tiles subdivide, updates visibility and starts
//! fetches for displayed tiles that hold no content. Fetches run on the
//! tokio runtime and report back through a channel that
//! [`apply_completions`](TileEngine::apply_completions) drains, so every
//! state change happens on the owner's side.

mod daemon;

pub use daemon::{SweepDaemon, DEFAULT_SWEEP_INTERVAL};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, trace, warn};

use crate::cache::{CacheEvent, ContentCache, NodeState, Sweepable, TreeError};
use crate::config::EngineConfig;
use crate::coord::TileAddress;
use crate::decode::ContentDecoder;
use crate::fetch::{ContentHandle, FetchError, FetchPipeline};
use crate::provider::AsyncHttpClient;
use crate::refine::{Refinement, RefinementPolicy};
use crate::semantic::{get_info_from_intersect_object, FeatureInfo, SemanticError};
use crate::tileset::Tileset;

/// Engine errors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Tile {0} is not in the tree")]
    UnknownNode(TileAddress),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Semantic(#[from] SemanticError),
}

/// A tile the caller considers for display, with its error metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub address: TileAddress,
    /// Externally computed error, compared against the policy threshold
    pub metric: f64,
}

impl Candidate {
    pub fn new(address: TileAddress, metric: f64) -> Self {
        Self { address, metric }
    }
}

/// Outcome of one update cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateReport {
    /// Candidates displayed this cycle
    pub displayed: Vec<TileAddress>,
    /// Candidates replaced by their children
    pub subdivided: Vec<TileAddress>,
    /// Children of subdivided candidates, to be offered next cycle
    pub children: Vec<TileAddress>,
    /// Candidates with nothing to request
    pub out_of_range: Vec<TileAddress>,
    /// Candidates that could not be placed in the tree
    pub rejected: Vec<TileAddress>,
    /// Fetches started this cycle
    pub fetches_started: usize,
    /// Previously displayed nodes that dropped out
    pub hidden: usize,
}

type Completion = (TileAddress, Result<ContentHandle, FetchError>);

/// Owner of the refinement cycle for one layer.
pub struct TileEngine<C, D> {
    pipeline: FetchPipeline<C, D>,
    cache: ContentCache,
    policy: RefinementPolicy,
    runtime: Handle,
    /// Nodes that stay displayed under their children (additive refinement)
    additive: HashSet<TileAddress>,
    /// Nodes displayed by the previous cycle
    displayed: HashSet<TileAddress>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    pending: usize,
}

impl<C, D> TileEngine<C, D>
where
    C: AsyncHttpClient,
    D: ContentDecoder,
{
    /// Creates an engine. The layer is the pipeline's; fetches are spawned
    /// on `runtime`.
    pub fn new(
        pipeline: FetchPipeline<C, D>,
        cache: ContentCache,
        policy: RefinementPolicy,
        runtime: Handle,
    ) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            pipeline,
            cache,
            policy,
            runtime,
            additive: HashSet::new(),
            displayed: HashSet::new(),
            completions_tx,
            completions_rx,
            pending: 0,
        }
    }

    /// Creates an engine over a loaded tileset, configured from `config`.
    ///
    /// Content is located through the tileset's URIs, and nodes refined with
    /// `ADD` stay displayed under their children.
    pub fn for_tileset(
        tileset: &Tileset,
        client: C,
        decoder: D,
        config: &EngineConfig,
        runtime: Handle,
    ) -> Self {
        let pipeline = FetchPipeline::with_locator(
            client,
            decoder,
            tileset.layer_config(tileset.base_url().as_str()),
            Arc::new(tileset.locator()),
        )
        .with_max_in_flight(config.fetch.max_in_flight);
        let cache = ContentCache::with_tree(tileset.tree().clone(), config.cache_config());

        Self::new(pipeline, cache, config.policy(), runtime)
            .with_additive(tileset.additive_nodes())
    }

    /// Marks nodes that stay displayed when they subdivide.
    pub fn with_additive(mut self, addresses: impl IntoIterator<Item = TileAddress>) -> Self {
        self.additive.extend(addresses);
        self
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    pub fn pipeline(&self) -> &FetchPipeline<C, D> {
        &self.pipeline
    }

    pub fn policy(&self) -> &RefinementPolicy {
        &self.policy
    }

    /// Fetches started and not yet applied.
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Subscribes to cache state changes.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.cache.subscribe()
    }

    /// Runs one refinement cycle over `candidates`.
    pub fn update(&mut self, candidates: &[Candidate], now: Instant) -> UpdateReport {
        let mut report = UpdateReport::default();
        let mut displayed = HashSet::with_capacity(candidates.len());

        for candidate in candidates {
            let address = candidate.address;
            if let Err(e) = self.cache.ensure_node(&address) {
                warn!(address = %address, error = %e, "Candidate rejected");
                report.rejected.push(address);
                continue;
            }

            let decision = self
                .policy
                .classify(&address, candidate.metric, self.pipeline.layer());

            match decision {
                Refinement::Subdivide => {
                    let children = match self.cache.materialize_children(&address) {
                        Ok(children) => children,
                        Err(e) => {
                            warn!(address = %address, error = %e, "Subdivision failed");
                            report.rejected.push(address);
                            continue;
                        }
                    };
                    // Nothing is requested below the layer's minimum zoom.
                    let below_min = address.level < self.pipeline.layer().zoom.min;
                    if children.is_empty() {
                        if below_min {
                            report.out_of_range.push(address);
                        } else {
                            // A leaf with nothing below it keeps displaying itself.
                            self.display(address, &mut displayed, &mut report);
                        }
                        continue;
                    }
                    if self.additive.contains(&address) && !below_min {
                        self.display(address, &mut displayed, &mut report);
                    }
                    report.subdivided.push(address);
                    report.children.extend(children);
                }
                Refinement::Display { .. } => {
                    self.display(address, &mut displayed, &mut report);
                }
                Refinement::OutOfRange => {
                    report.out_of_range.push(address);
                }
            }
        }

        for address in self.displayed.difference(&displayed) {
            self.cache.mark_invisible(address, now);
            report.hidden += 1;
        }
        self.displayed = displayed;

        debug!(
            candidates = candidates.len(),
            displayed = report.displayed.len(),
            subdivided = report.subdivided.len(),
            fetches = report.fetches_started,
            hidden = report.hidden,
            "Update cycle"
        );

        report
    }

    fn display(
        &mut self,
        address: TileAddress,
        displayed: &mut HashSet<TileAddress>,
        report: &mut UpdateReport,
    ) {
        if !displayed.insert(address) {
            return;
        }
        self.cache.mark_visible(&address);
        report.displayed.push(address);

        // Errored nodes wait for a sweep to reset them before retrying.
        let is_empty = matches!(self.cache.state(&address), Some(NodeState::Empty));
        if is_empty && self.cache.begin_fetch(&address) {
            self.spawn_fetch(address);
            report.fetches_started += 1;
        }
    }

    fn spawn_fetch(&mut self, address: TileAddress) {
        let pipeline = self.pipeline.clone();
        let completions = self.completions_tx.clone();
        self.pending += 1;
        self.runtime.spawn(async move {
            let result = pipeline.fetch(address).await;
            if completions.send((address, result)).is_err() {
                trace!(address = %address, "Engine dropped before fetch completed");
            }
        });
    }

    /// Applies finished fetches to the cache; returns how many were applied.
    pub fn apply_completions(&mut self, now: Instant) -> usize {
        let mut applied = 0;
        while let Ok((address, result)) = self.completions_rx.try_recv() {
            self.pending = self.pending.saturating_sub(1);
            if self.cache.complete_fetch(&address, result, now) {
                applied += 1;
            }
        }
        applied
    }

    /// Waits for the next fetch to finish and applies it.
    ///
    /// Returns false when no fetch is pending.
    pub async fn next_completion(&mut self) -> bool {
        if self.pending == 0 {
            return false;
        }
        match self.completions_rx.recv().await {
            Some((address, result)) => {
                self.pending = self.pending.saturating_sub(1);
                self.cache.complete_fetch(&address, result, Instant::now());
                true
            }
            None => false,
        }
    }

    /// Releases content of nodes that stayed invisible past the cleanup delay.
    pub fn sweep(&mut self, now: Instant) -> Vec<TileAddress> {
        self.cache.sweep(now)
    }

    /// Content to draw for `address`, if it is displayed and ready.
    pub fn displayable(&self, address: &TileAddress) -> Option<&ContentHandle> {
        self.cache.displayable(address)
    }

    /// Metadata of feature `feature_id` picked on `address`.
    pub fn feature_info(
        &self,
        address: &TileAddress,
        feature_id: u32,
    ) -> Result<Option<FeatureInfo>, EngineError> {
        if !self.cache.tree().contains(address) {
            return Err(EngineError::UnknownNode(*address));
        }
        Ok(get_info_from_intersect_object(
            self.cache.tree(),
            feature_id,
            address,
        )?)
    }
}

impl<C, D> Sweepable for TileEngine<C, D>
where
    C: AsyncHttpClient,
    D: ContentDecoder,
{
    fn sweep(&mut self, now: Instant) -> usize {
        TileEngine::sweep(self, now).len()
    }
}

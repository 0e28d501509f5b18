//! Asynchronous tile fetching with ancestor fallback.
//!
//! A requested tile deeper than the layer's maximum level is served from its
//! ancestor at that level: [`resolve`] picks the effective address and the
//! sub-rectangle of the ancestor the requested tile covers.
//!
//! [`FetchPipeline::fetch`] runs locate → transport → decode for the effective
//! address. Concurrent requests for the same effective address share one load
//! ([`RequestCoalescer`]), and transport calls are capped by a
//! [`ConcurrencyLimiter`]. Decoding runs on tokio's blocking pool.
//!
//! ```text
//! fetch(requested)
//!     │ resolve ─► effective + offset
//!     ▼
//! coalescer ── in flight? ──► wait for shared result
//!     │ new
//!     ▼
//! detached load: locator ─► limiter ─► transport ─► spawn_blocking(decode)
//!     │
//!     ▼
//! ContentHandle { payload (shared), requested, source_address, offset }
//! ```

mod coalesce;
mod error;
mod limiter;
mod locator;

pub use coalesce::{CoalescerStats, RequestCoalescer};
pub use error::{FetchError, LocatorError};
pub use limiter::{ConcurrencyLimiter, ConcurrencyPermit, DEFAULT_MAX_IN_FLIGHT};
pub use locator::{TemplateLocator, TileLocator};

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use coalesce::SharedResult;

use crate::coord::{OffsetRect, TileAddress};
use crate::decode::{ContentDecoder, ContentPayload};
use crate::layer::{tile_inside_limit, ConfigurationError, LayerConfig};
use crate::provider::AsyncHttpClient;

/// Where a requested tile's content comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    /// Address the caller asked for
    pub requested: TileAddress,
    /// Address whose content is fetched
    pub effective: TileAddress,
    /// Part of the effective tile covered by the requested tile
    pub offset: OffsetRect,
}

impl Resolution {
    /// Returns true if content comes from an ancestor.
    pub fn is_fallback(&self) -> bool {
        self.requested != self.effective
    }
}

/// Resolves `address` against the layer's zoom range.
///
/// Addresses up to `zoom.max` resolve to themselves with the identity offset;
/// deeper addresses resolve to their ancestor at `zoom.max`.
pub fn resolve(address: &TileAddress, layer: &LayerConfig) -> Resolution {
    let effective = address.parent_at(layer.zoom.max);
    let offset = address
        .offset_to_parent(&effective)
        .unwrap_or(OffsetRect::IDENTITY);

    Resolution {
        requested: *address,
        effective,
        offset,
    }
}

/// Loaded content as seen by one requester.
///
/// Requesters sharing an effective address share the payload; each handle
/// carries its own requested address and offset.
#[derive(Debug, Clone)]
pub struct ContentHandle {
    pub payload: Arc<ContentPayload>,
    pub requested: TileAddress,
    pub source_address: TileAddress,
    pub offset_within_parent: OffsetRect,
    pub premultiply_alpha: bool,
}

impl ContentHandle {
    /// Returns true if both handles reference the same loaded payload.
    pub fn shares_payload(&self, other: &ContentHandle) -> bool {
        Arc::ptr_eq(&self.payload, &other.payload)
    }

    pub fn is_fallback(&self) -> bool {
        self.requested != self.source_address
    }
}

/// Fetch pipeline for one layer.
///
/// Cheap to clone; clones share the coalescer and limiter.
pub struct FetchPipeline<C, D> {
    client: Arc<C>,
    decoder: Arc<D>,
    layer: Arc<LayerConfig>,
    locator: Arc<dyn TileLocator>,
    coalescer: Arc<RequestCoalescer>,
    limiter: Arc<ConcurrencyLimiter>,
}

impl<C, D> Clone for FetchPipeline<C, D> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            decoder: Arc::clone(&self.decoder),
            layer: Arc::clone(&self.layer),
            locator: Arc::clone(&self.locator),
            coalescer: Arc::clone(&self.coalescer),
            limiter: Arc::clone(&self.limiter),
        }
    }
}

impl<C, D> FetchPipeline<C, D>
where
    C: AsyncHttpClient,
    D: ContentDecoder,
{
    /// Creates a pipeline locating tiles through the layer's URL template.
    pub fn new(client: C, decoder: D, layer: LayerConfig) -> Result<Self, ConfigurationError> {
        let locator = TemplateLocator::from_layer(&layer)?;
        Ok(Self::with_locator(client, decoder, layer, Arc::new(locator)))
    }

    /// Creates a pipeline with a custom locator.
    pub fn with_locator(
        client: C,
        decoder: D,
        layer: LayerConfig,
        locator: Arc<dyn TileLocator>,
    ) -> Self {
        Self {
            client: Arc::new(client),
            decoder: Arc::new(decoder),
            layer: Arc::new(layer),
            locator,
            coalescer: Arc::new(RequestCoalescer::new()),
            limiter: Arc::new(ConcurrencyLimiter::default()),
        }
    }

    /// Sets the cap on concurrent transport requests.
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.limiter = Arc::new(ConcurrencyLimiter::new(max_in_flight, "http"));
        self
    }

    pub fn layer(&self) -> &LayerConfig {
        &self.layer
    }

    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    pub fn coalescer(&self) -> &RequestCoalescer {
        &self.coalescer
    }

    /// Resolves `address` against this pipeline's layer.
    pub fn resolve(&self, address: &TileAddress) -> Resolution {
        resolve(address, &self.layer)
    }

    /// Fetches content for `requested`.
    ///
    /// Fails with [`FetchError::OutOfRange`] when the layer holds no data for
    /// the tile at any level up to `zoom.max`. Transport and decode failures
    /// are returned as-is; nothing is retried here.
    pub async fn fetch(&self, requested: TileAddress) -> Result<ContentHandle, FetchError> {
        let layer = &self.layer;
        if !tile_inside_limit(&requested, layer, layer.zoom.max) {
            return Err(FetchError::OutOfRange {
                address: requested,
                min: layer.zoom.min,
                max: layer.zoom.max,
            });
        }

        let resolution = self.resolve(&requested);
        if resolution.is_fallback() {
            trace!(
                requested = %requested,
                effective = %resolution.effective,
                "Falling back to ancestor tile"
            );
        }

        let payload = self.load_shared(resolution.effective).await?;

        Ok(ContentHandle {
            payload,
            requested,
            source_address: resolution.effective,
            offset_within_parent: resolution.offset,
            premultiply_alpha: layer.is_transparent,
        })
    }

    /// Joins or starts the load for `effective`.
    async fn load_shared(&self, effective: TileAddress) -> SharedResult {
        let registration = self.coalescer.register(effective).await;

        if registration.is_new_request() {
            // The load runs detached so it completes even if this caller's
            // future is dropped.
            let pipeline = self.clone();
            let load = tokio::spawn(async move { pipeline.load(effective).await });
            let coalescer = Arc::clone(&self.coalescer);
            tokio::spawn(async move {
                let result = load.await.unwrap_or_else(|e| {
                    warn!(address = %effective, error = %e, "Load task failed");
                    Err(FetchError::Abandoned {
                        address: effective,
                        reason: e.to_string(),
                    })
                });
                coalescer.complete(effective, result).await;
            });
        }

        wait(effective, registration.into_receiver()).await
    }

    /// Locates, downloads and decodes one effective tile.
    async fn load(&self, effective: TileAddress) -> SharedResult {
        let url = self.locator.locate(&effective)?;

        let bytes = {
            let _permit = self
                .limiter
                .acquire()
                .await
                .map_err(|e| FetchError::Abandoned {
                    address: effective,
                    reason: e.to_string(),
                })?;
            self.client.get(&url, &self.layer.network).await?
        };
        debug!(address = %effective, url = %url, bytes = bytes.len(), "Tile downloaded");

        let decoder = Arc::clone(&self.decoder);
        let payload = tokio::task::spawn_blocking(move || decoder.decode(&effective, &bytes))
            .await
            .map_err(|e| FetchError::Abandoned {
                address: effective,
                reason: e.to_string(),
            })??;

        Ok(Arc::new(payload))
    }
}

async fn wait(
    effective: TileAddress,
    mut receiver: broadcast::Receiver<SharedResult>,
) -> SharedResult {
    receiver
        .recv()
        .await
        .unwrap_or_else(|e| {
            Err(FetchError::Abandoned {
                address: effective,
                reason: e.to_string(),
            })
        })
}

//! Integration tests for the refinement engine.
//!
//! These tests drive complete update cycles against an in-memory transport:
//! - Quadtree refinement over a raster layer
//! - Tileset loading, mesh decoding and feature picking
//! - Request coalescing across deep tiles
//! - Delayed eviction and cache events
//! - Additive refinement and minimum zoom over tilesets

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::runtime::Handle;
use tilestream::cache::{CacheConfig, CacheEvent, ContentCache, NodeState};
use tilestream::config::EngineConfig;
use tilestream::coord::{CrsId, TileAddress};
use tilestream::decode::{AutoDecoder, ContentDecoder, ContentPayload};
use tilestream::engine::{Candidate, TileEngine};
use tilestream::extension::{ExtensionError, ExtensionRegistry, BATCH_TABLE_HIERARCHY};
use tilestream::fetch::{FetchError, FetchPipeline};
use tilestream::layer::{web_mercator_layer, NetworkOptions, ZoomRange};
use tilestream::provider::{AsyncHttpClient, TransportError};
use tilestream::refine::RefinementPolicy;
use tilestream::tileset::{Tileset, TilesetError};

// =============================================================================
// Test Helpers
// =============================================================================

/// In-memory transport serving fixed bodies per URL.
#[derive(Clone, Default)]
struct RoutedClient {
    routes: Arc<HashMap<String, Vec<u8>>>,
    fallback: Option<Arc<Vec<u8>>>,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl RoutedClient {
    fn with_routes(routes: HashMap<String, Vec<u8>>) -> Self {
        Self {
            routes: Arc::new(routes),
            ..Default::default()
        }
    }

    /// Serves `body` for every URL.
    fn serving(body: Vec<u8>) -> Self {
        Self {
            fallback: Some(Arc::new(body)),
            ..Default::default()
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AsyncHttpClient for RoutedClient {
    async fn get(&self, url: &str, _network: &NetworkOptions) -> Result<Vec<u8>, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.routes
            .get(url)
            .cloned()
            .or_else(|| self.fallback.as_deref().cloned())
            .ok_or_else(|| TransportError::Status {
                url: url.to_string(),
                status: 404,
            })
    }
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 255]));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(image)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

/// Assembles a b3dm container, optionally with a batch table.
fn b3dm(batch_length: u32, batch_table: Option<&serde_json::Value>) -> Vec<u8> {
    let feature_json = json!({ "BATCH_LENGTH": batch_length }).to_string();
    let batch_json = batch_table.map(|t| t.to_string()).unwrap_or_default();
    let gltf = b"glTF-body";
    let total = 28 + feature_json.len() + batch_json.len() + gltf.len();

    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(b"b3dm");
    for word in [1, total, feature_json.len(), 0, batch_json.len(), 0] {
        out.extend_from_slice(&(word as u32).to_le_bytes());
    }
    out.extend_from_slice(feature_json.as_bytes());
    out.extend_from_slice(batch_json.as_bytes());
    out.extend_from_slice(gltf);
    out
}

fn mercator(level: u32, row: u32, col: u32) -> TileAddress {
    TileAddress::new(level, row, col, CrsId::Epsg3857).unwrap()
}

fn local(level: u32, col: u32) -> TileAddress {
    TileAddress::new(level, 0, col, CrsId::Local).unwrap()
}

async fn drain<C, D>(engine: &mut TileEngine<C, D>)
where
    C: AsyncHttpClient,
    D: ContentDecoder,
{
    while engine.next_completion().await {}
}

fn raster_engine(client: RoutedClient) -> TileEngine<RoutedClient, AutoDecoder> {
    let layer = web_mercator_layer(
        "ortho",
        ZoomRange::new(0, 2),
        "mock://tiles/{z}/{x}/{y}.png",
    )
    .unwrap();
    let decoder = AutoDecoder::new(Arc::new(ExtensionRegistry::with_builtin()));
    let pipeline = FetchPipeline::new(client, decoder, layer).unwrap();
    TileEngine::new(
        pipeline,
        ContentCache::new(CacheConfig::default()),
        RefinementPolicy::new(16.0).with_max_depth(4),
        Handle::current(),
    )
}

// =============================================================================
// Integration Tests
// =============================================================================

#[tokio::test]
async fn test_quadtree_refinement_cycle() {
    let client = RoutedClient::serving(png(4, 4));
    let mut engine = raster_engine(client.clone());
    let now = Instant::now();

    let report = engine.update(&[Candidate::new(mercator(0, 0, 0), 200.0)], now);
    assert_eq!(report.subdivided, vec![mercator(0, 0, 0)]);
    assert_eq!(report.fetches_started, 0);

    let candidates: Vec<_> = report
        .children
        .iter()
        .map(|address| Candidate::new(*address, 2.0))
        .collect();
    let report = engine.update(&candidates, now);
    assert_eq!(report.displayed.len(), 4);
    assert_eq!(report.fetches_started, 4);

    drain(&mut engine).await;
    assert_eq!(client.call_count(), 4);

    for child in mercator(0, 0, 0).children() {
        let handle = engine.displayable(&child).expect("child content");
        assert_eq!(handle.source_address, child);
        match handle.payload.as_ref() {
            ContentPayload::Raster(raster) => assert_eq!(raster.width(), 4),
            other => panic!("expected raster, got {}", other.kind()),
        }
    }
    assert!(engine.displayable(&mercator(0, 0, 0)).is_none());
}

#[tokio::test]
async fn test_tiles_beyond_zoom_share_ancestor_content() {
    let client = RoutedClient::serving(png(2, 2)).with_delay(Duration::from_millis(10));
    let mut engine = raster_engine(client.clone());
    let now = Instant::now();

    // Subdivide down to level 3, below the layer's deepest level 2.
    let mut candidates = vec![Candidate::new(mercator(0, 0, 0), 100.0)];
    for _ in 0..3 {
        let report = engine.update(&candidates, now);
        candidates = report
            .children
            .iter()
            .filter(|a| a.row < 2 && a.col < 2)
            .map(|a| Candidate::new(*a, 100.0))
            .collect();
    }
    assert!(candidates.iter().all(|c| c.address.level == 3));
    assert_eq!(candidates.len(), 4);

    let report = engine.update(&candidates, now);
    assert_eq!(report.displayed.len(), 4);
    drain(&mut engine).await;

    // All four level-3 tiles fall back to the same level-2 tile.
    assert_eq!(client.call_count(), 1);
    let first = engine.displayable(&candidates[0].address).unwrap();
    for candidate in &candidates[1..] {
        let handle = engine.displayable(&candidate.address).unwrap();
        assert_eq!(handle.source_address, mercator(2, 0, 0));
        assert!(handle.shares_payload(first));
        assert!(handle.is_fallback());
        assert_ne!(handle.offset_within_parent, first.offset_within_parent);
    }
}

#[tokio::test]
async fn test_concurrent_fetches_are_coalesced() {
    let client = RoutedClient::serving(png(2, 2)).with_delay(Duration::from_millis(20));
    let layer = web_mercator_layer("ortho", ZoomRange::new(0, 18), "mock://{z}/{x}/{y}").unwrap();
    let decoder = AutoDecoder::new(Arc::new(ExtensionRegistry::new()));
    let pipeline = FetchPipeline::new(client.clone(), decoder, layer).unwrap();

    let base = mercator(20, 1000, 1000);
    let requests: Vec<_> = base
        .siblings()
        .into_iter()
        .chain(std::iter::once(base))
        .map(|address| {
            let pipeline = pipeline.clone();
            async move { pipeline.fetch(address).await }
        })
        .collect();

    let results = futures::future::join_all(requests).await;

    assert_eq!(client.call_count(), 1);
    let handles: Vec<_> = results.into_iter().map(Result::unwrap).collect();
    for handle in &handles {
        assert_eq!(handle.source_address, base.parent_at(18));
        assert!(handle.shares_payload(&handles[0]));
    }
    assert_eq!(pipeline.coalescer().in_flight_count().await, 0);
}

#[tokio::test]
async fn test_eviction_timeline() {
    let mut engine = raster_engine(RoutedClient::serving(png(2, 2)));
    let mut events = engine.subscribe();
    let tile = mercator(1, 1, 0);
    let t0 = Instant::now();

    engine.update(&[Candidate::new(tile, 1.0)], t0);
    drain(&mut engine).await;
    assert!(matches!(
        events.recv().await.unwrap(),
        CacheEvent::Ready { address, .. } if address == tile
    ));

    engine.update(&[], t0);
    assert!(engine.sweep(t0 + Duration::from_millis(999)).is_empty());
    assert!(engine.cache().content(&tile).is_some());

    assert_eq!(engine.sweep(t0 + Duration::from_millis(1000)), vec![tile]);
    assert!(matches!(engine.cache().state(&tile), Some(NodeState::Empty)));
    assert_eq!(
        events.recv().await.unwrap(),
        CacheEvent::Evicted { address: tile }
    );

    // Visible again before the delay: nothing is released.
    engine.update(&[Candidate::new(tile, 1.0)], t0 + Duration::from_secs(2));
    drain(&mut engine).await;
    engine.update(&[], t0 + Duration::from_secs(3));
    engine.update(&[Candidate::new(tile, 1.0)], t0 + Duration::from_millis(3500));
    assert!(engine.sweep(t0 + Duration::from_secs(10)).is_empty());
    assert!(engine.displayable(&tile).is_some());
}

#[tokio::test]
async fn test_transport_failure_marks_node_errored() {
    let mut engine = raster_engine(RoutedClient::with_routes(HashMap::new()));
    let tile = mercator(2, 1, 1);

    engine.update(&[Candidate::new(tile, 1.0)], Instant::now());
    drain(&mut engine).await;

    match engine.cache().state(&tile) {
        Some(NodeState::Errored(FetchError::Transport(TransportError::Status { status, .. }))) => {
            assert_eq!(*status, 404)
        }
        other => panic!("unexpected state {:?}", other),
    }
    // Siblings are unaffected.
    assert!(matches!(
        engine.cache().state(&mercator(2, 1, 0)),
        Some(NodeState::Empty)
    ));
}

fn city_tileset() -> serde_json::Value {
    json!({
        "asset": {"version": "1.0"},
        "geometricError": 500,
        "extensionsUsed": [BATCH_TABLE_HIERARCHY],
        "root": {
            "boundingVolume": {"region": [-1.3, 0.6, -1.2, 0.7, 0, 120]},
            "geometricError": 100,
            "refine": "REPLACE",
            "children": [
                {"boundingVolume": {"sphere": [0, 0, 0, 50]}, "geometricError": 0,
                 "content": {"uri": "blocks/north.b3dm"}},
                {"boundingVolume": {"sphere": [100, 0, 0, 50]}, "geometricError": 0,
                 "content": {"uri": "blocks/south.b3dm"}}
            ]
        }
    })
}

fn block_batch_table() -> serde_json::Value {
    json!({
        "height": [12.5, 30.0],
        "extensions": {
            BATCH_TABLE_HIERARCHY: {
                "classes": [
                    {"name": "Wall", "length": 2, "instances": {"color": ["white", "red"]}},
                    {"name": "Building", "length": 1, "instances": {"name": ["Town Hall"]}}
                ],
                "instancesLength": 3,
                "classIds": [0, 0, 1],
                "parentCounts": [1, 1, 0],
                "parentIds": [2, 2]
            }
        }
    })
}

#[tokio::test]
async fn test_tileset_cycle_and_feature_picking() {
    let registry = Arc::new(ExtensionRegistry::with_builtin());
    let bytes = serde_json::to_vec(&city_tileset()).unwrap();
    let tileset = Tileset::from_slice(&bytes, "https://city.example/data/tileset.json", &registry)
        .unwrap();

    let mut routes = HashMap::new();
    routes.insert(
        "https://city.example/data/blocks/north.b3dm".to_string(),
        b3dm(2, Some(&block_batch_table())),
    );
    routes.insert(
        "https://city.example/data/blocks/south.b3dm".to_string(),
        b3dm(1, None),
    );
    let client = RoutedClient::with_routes(routes);

    let pipeline = FetchPipeline::with_locator(
        client.clone(),
        AutoDecoder::new(Arc::clone(&registry)),
        tileset.layer_config("city"),
        Arc::new(tileset.locator()),
    );
    let cache = ContentCache::with_tree(tileset.tree().clone(), CacheConfig::default());
    let mut engine = TileEngine::new(
        pipeline,
        cache,
        RefinementPolicy::default(),
        Handle::current(),
    );
    let now = Instant::now();

    let report = engine.update(&[Candidate::new(tileset.root(), 100.0)], now);
    assert_eq!(report.children, vec![local(1, 0), local(1, 1)]);

    let candidates: Vec<_> = report
        .children
        .iter()
        .map(|a| Candidate::new(*a, 0.0))
        .collect();
    engine.update(&candidates, now);
    drain(&mut engine).await;
    assert_eq!(client.call_count(), 2);

    let info = engine.feature_info(&local(1, 0), 1).unwrap().unwrap();
    assert_eq!(info.source, local(1, 0));
    assert_eq!(info.properties["height"], json!(30.0));
    let hierarchy = &info.extensions[BATCH_TABLE_HIERARCHY];
    assert_eq!(hierarchy["class"], json!("Wall"));
    assert_eq!(hierarchy["ancestors"], json!(["Building"]));
    assert_eq!(hierarchy["properties"]["color"], json!("red"));
    assert_eq!(hierarchy["properties"]["name"], json!("Town Hall"));

    // The south block has no batch table and its parent holds no content.
    assert!(engine.feature_info(&local(1, 1), 0).unwrap().is_none());
}

/// Root (REPLACE) over an ADD park with one child, and a leaf plaza.
fn park_tileset() -> serde_json::Value {
    json!({
        "asset": {"version": "1.0"},
        "geometricError": 500,
        "root": {
            "boundingVolume": {"region": [-1.3, 0.6, -1.2, 0.7, 0, 120]},
            "geometricError": 100,
            "refine": "REPLACE",
            "children": [
                {"boundingVolume": {"sphere": [0, 0, 0, 50]}, "geometricError": 10,
                 "refine": "ADD", "content": {"uri": "park.b3dm"},
                 "children": [
                     {"boundingVolume": {"sphere": [0, 0, 0, 10]}, "geometricError": 0,
                      "content": {"uri": "park/trees.b3dm"}}
                 ]},
                {"boundingVolume": {"sphere": [100, 0, 0, 50]}, "geometricError": 0,
                 "content": {"uri": "plaza.b3dm"}}
            ]
        }
    })
}

fn park_routes() -> RoutedClient {
    let mut routes = HashMap::new();
    for uri in ["park.b3dm", "park/trees.b3dm", "plaza.b3dm"] {
        routes.insert(format!("https://city.example/park/{}", uri), b3dm(1, None));
    }
    RoutedClient::with_routes(routes)
}

fn park() -> Tileset {
    let bytes = serde_json::to_vec(&park_tileset()).unwrap();
    Tileset::from_slice(
        &bytes,
        "https://city.example/park/tileset.json",
        &ExtensionRegistry::with_builtin(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_additive_parent_stays_displayed_with_children() {
    let tileset = park();
    let client = park_routes();
    let config = EngineConfig::default();
    let mut engine = TileEngine::for_tileset(
        &tileset,
        client.clone(),
        AutoDecoder::new(Arc::new(ExtensionRegistry::with_builtin())),
        &config,
        Handle::current(),
    );
    assert_eq!(engine.policy(), &config.policy());
    assert_eq!(engine.cache().config(), &config.cache_config());
    assert_eq!(
        engine.pipeline().limiter().max_concurrent(),
        config.fetch.max_in_flight
    );
    let now = Instant::now();

    // The REPLACE root is not displayed once it subdivides.
    let report = engine.update(&[Candidate::new(tileset.root(), 100.0)], now);
    assert!(report.displayed.is_empty());
    assert_eq!(report.children, vec![local(1, 0), local(1, 1)]);

    let report = engine.update(&[Candidate::new(local(1, 0), 100.0)], now);
    assert_eq!(report.displayed, vec![local(1, 0)]);
    assert_eq!(report.subdivided, vec![local(1, 0)]);
    assert_eq!(report.children, vec![local(2, 0)]);
    assert_eq!(report.fetches_started, 1);

    let report = engine.update(
        &[
            Candidate::new(local(1, 0), 100.0),
            Candidate::new(local(2, 0), 0.0),
        ],
        now,
    );
    assert_eq!(report.displayed, vec![local(1, 0), local(2, 0)]);
    assert_eq!(report.hidden, 0);
    assert_eq!(report.fetches_started, 1);

    drain(&mut engine).await;
    assert_eq!(client.call_count(), 2);
    assert!(engine.displayable(&local(1, 0)).is_some());
    assert!(engine.displayable(&local(2, 0)).is_some());
}

#[tokio::test]
async fn test_leaf_below_min_zoom_is_out_of_range() {
    let tileset = park();
    let client = park_routes();
    let mut layer = tileset.layer_config("park");
    layer.zoom = ZoomRange::new(2, 2);
    let pipeline = FetchPipeline::with_locator(
        client.clone(),
        AutoDecoder::new(Arc::new(ExtensionRegistry::with_builtin())),
        layer,
        Arc::new(tileset.locator()),
    );
    let cache = ContentCache::with_tree(tileset.tree().clone(), CacheConfig::default());
    let mut engine = TileEngine::new(
        pipeline,
        cache,
        RefinementPolicy::default(),
        Handle::current(),
    )
    .with_additive(tileset.additive_nodes());

    let report = engine.update(
        &[
            Candidate::new(local(1, 0), 100.0),
            Candidate::new(local(1, 1), 100.0),
        ],
        Instant::now(),
    );

    // The plaza leaf has nothing to subdivide into; the ADD park is below
    // the minimum zoom, so only its child is offered.
    assert_eq!(report.out_of_range, vec![local(1, 1)]);
    assert_eq!(report.subdivided, vec![local(1, 0)]);
    assert_eq!(report.children, vec![local(2, 0)]);
    assert!(report.displayed.is_empty());
    assert_eq!(report.fetches_started, 0);
    assert_eq!(engine.pending(), 0);
    assert!(matches!(
        engine.cache().state(&local(1, 1)),
        Some(NodeState::Empty)
    ));
    assert_eq!(client.call_count(), 0);
}

#[test]
fn test_unsupported_required_extension_blocks_tileset() {
    let mut descriptor = city_tileset();
    descriptor["extensionsUsed"] = json!(["VENDOR_points"]);
    descriptor["extensionsRequired"] = json!(["VENDOR_points"]);
    let bytes = serde_json::to_vec(&descriptor).unwrap();

    let err = Tileset::from_slice(&bytes, "https://x/", &ExtensionRegistry::with_builtin())
        .unwrap_err();
    match err {
        TilesetError::Extension(ExtensionError::Required { names }) => {
            assert_eq!(names, vec!["VENDOR_points".to_string()]);
        }
        other => panic!("unexpected error {other}"),
    }
}

//! Explicit tileset trees.
//!
//! A tileset descriptor (`tileset.json`) lists a tree of nodes, each with a
//! bounding volume, a geometric error, an optional content URI and an
//! optional transform. Loading a tileset validates its declared extensions
//! first, then assigns every node a `CrsId::Local` address (`level` is the
//! depth, `row` is 0, `col` is the breadth-first index within the level) and
//! builds the [`TileTree`] the content cache runs on.

mod descriptor;
mod locator;

pub use descriptor::{
    compose, Asset, BoundingVolume, ContentDescriptor, Refine, TileDescriptor, TilesetDescriptor,
    IDENTITY_TRANSFORM,
};
pub use locator::TilesetLocator;

use std::collections::{BTreeMap, VecDeque};

use reqwest::Url;
use thiserror::Error;
use tracing::info;

use crate::cache::{TileTree, TreeError};
use crate::coord::{CrsId, TileAddress, MAX_LEVEL};
use crate::extension::{ExtensionError, ExtensionRegistry, ValidationReport};
use crate::layer::{Extent, LayerConfig, NetworkOptions, Origin, TilingScheme, ZoomRange};

/// Tileset loading errors.
#[derive(Debug, Error)]
pub enum TilesetError {
    /// The descriptor is not valid JSON for the model
    #[error("Invalid tileset descriptor: {0}")]
    Json(#[from] serde_json::Error),

    /// A required extension is not supported
    #[error(transparent)]
    Extension(#[from] ExtensionError),

    /// The base URL could not be parsed
    #[error("Invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    /// A node declares no bounding volume
    #[error("Tile at depth {depth} (index {index}) has no bounding volume")]
    MissingBoundingVolume { depth: u32, index: u32 },

    /// The tree is deeper than an address can express
    #[error("Tileset is deeper than {MAX_LEVEL} levels")]
    TooDeep,

    /// The node tree could not be built
    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// Per-node metadata of a loaded tileset.
#[derive(Debug, Clone, PartialEq)]
pub struct TilesetNode {
    pub address: TileAddress,
    pub bounding_volume: BoundingVolume,
    pub geometric_error: f64,
    /// Effective refinement mode, after inheritance
    pub refine: Refine,
    pub content_uri: Option<String>,
    /// Transform to the parent's frame
    pub transform: [f64; 16],
    /// Transform to the tileset's frame, composed down the tree
    pub world_transform: [f64; 16],
}

/// A loaded tileset: topology plus per-node metadata.
#[derive(Debug, Clone)]
pub struct Tileset {
    version: String,
    geometric_error: f64,
    extensions_used: Vec<String>,
    extensions_required: Vec<String>,
    validation: ValidationReport,
    base_url: Url,
    root: TileAddress,
    nodes: BTreeMap<TileAddress, TilesetNode>,
    tree: TileTree,
}

impl Tileset {
    /// Parses and loads a descriptor from JSON bytes.
    pub fn from_slice(
        bytes: &[u8],
        base_url: &str,
        registry: &ExtensionRegistry,
    ) -> Result<Self, TilesetError> {
        let descriptor: TilesetDescriptor = serde_json::from_slice(bytes)?;
        Self::load(descriptor, base_url, registry)
    }

    /// Loads a tileset.
    ///
    /// Extension validation happens before anything else; an unsupported
    /// required extension fails the load.
    pub fn load(
        descriptor: TilesetDescriptor,
        base_url: &str,
        registry: &ExtensionRegistry,
    ) -> Result<Self, TilesetError> {
        let validation =
            registry.validate(&descriptor.extensions_used, &descriptor.extensions_required)?;

        let base_url = Url::parse(base_url).map_err(|e| TilesetError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;

        let root = TileAddress::root(CrsId::Local);
        let mut tree = TileTree::new();
        tree.insert_root(root)?;
        let mut nodes = BTreeMap::new();
        let mut next_col: Vec<u32> = vec![1];

        // Breadth-first: (descriptor, address, inherited refine, parent world transform)
        let mut queue = VecDeque::new();
        queue.push_back((
            &descriptor.root,
            root,
            Refine::default(),
            IDENTITY_TRANSFORM,
        ));

        while let Some((tile, address, inherited, parent_world)) = queue.pop_front() {
            if !tile.bounding_volume.is_defined() {
                return Err(TilesetError::MissingBoundingVolume {
                    depth: address.level,
                    index: address.col,
                });
            }

            let refine = tile.refine.unwrap_or(inherited);
            let transform = tile.transform.unwrap_or(IDENTITY_TRANSFORM);
            let world_transform = compose(&parent_world, &transform);

            if !tile.children.is_empty() {
                let level = address.level + 1;
                if level > MAX_LEVEL {
                    return Err(TilesetError::TooDeep);
                }
                if next_col.len() <= level as usize {
                    next_col.push(0);
                }
                for child in &tile.children {
                    let col = next_col[level as usize];
                    next_col[level as usize] += 1;
                    let child_address = TileAddress {
                        level,
                        row: 0,
                        col,
                        crs: CrsId::Local,
                    };
                    tree.insert_child(address, child_address)?;
                    queue.push_back((child, child_address, refine, world_transform));
                }
            }

            nodes.insert(
                address,
                TilesetNode {
                    address,
                    bounding_volume: tile.bounding_volume.clone(),
                    geometric_error: tile.geometric_error,
                    refine,
                    content_uri: tile.content.as_ref().map(|c| c.uri.clone()),
                    transform,
                    world_transform,
                },
            );
        }

        info!(
            version = %descriptor.asset.version,
            nodes = nodes.len(),
            depth = next_col.len(),
            extensions = validation.supported.len(),
            "Tileset loaded"
        );

        Ok(Self {
            version: descriptor.asset.version,
            geometric_error: descriptor.geometric_error,
            extensions_used: descriptor.extensions_used,
            extensions_required: descriptor.extensions_required,
            validation,
            base_url,
            root,
            nodes,
            tree,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn geometric_error(&self) -> f64 {
        self.geometric_error
    }

    pub fn extensions_used(&self) -> &[String] {
        &self.extensions_used
    }

    pub fn extensions_required(&self) -> &[String] {
        &self.extensions_required
    }

    /// Outcome of extension validation.
    pub fn validation(&self) -> &ValidationReport {
        &self.validation
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn root(&self) -> TileAddress {
        self.root
    }

    pub fn node(&self, address: &TileAddress) -> Option<&TilesetNode> {
        self.nodes.get(address)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &TilesetNode> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Deepest level in the tree.
    pub fn depth(&self) -> u32 {
        self.tree.max_level().unwrap_or(0)
    }

    /// Nodes refined with `ADD`, which stay displayed under their children.
    pub fn additive_nodes(&self) -> impl Iterator<Item = TileAddress> + '_ {
        self.nodes
            .values()
            .filter(|node| node.refine == Refine::Add)
            .map(|node| node.address)
    }

    /// Node topology for a [`ContentCache`](crate::cache::ContentCache).
    pub fn tree(&self) -> &TileTree {
        &self.tree
    }

    /// Locator resolving node content URIs against the base URL.
    pub fn locator(&self) -> TilesetLocator {
        TilesetLocator::new(
            self.base_url.clone(),
            self.nodes
                .iter()
                .map(|(address, node)| (*address, node.content_uri.clone())),
        )
    }

    /// A layer description covering the whole tree, for driving the fetch
    /// pipeline and refinement over this tileset.
    pub fn layer_config(&self, id: &str) -> LayerConfig {
        let (west, south, east, north) = self
            .node(&self.root)
            .and_then(|node| node.bounding_volume.horizontal_bounds())
            .unwrap_or((0.0, 0.0, 0.0, 0.0));

        LayerConfig {
            id: id.to_string(),
            extent: Extent {
                crs: CrsId::Local,
                west,
                south,
                east,
                north,
            },
            zoom: ZoomRange::new(0, self.depth()),
            origin: Origin::Top,
            scheme: TilingScheme::default(),
            url_template: None,
            is_transparent: false,
            network: NetworkOptions::default(),
            level_limits: BTreeMap::new(),
        }
    }
}

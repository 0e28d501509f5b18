//! Tile tree arena.
//!
//! Nodes are stored in a map keyed by address; parent and child links are
//! addresses. Pyramid topology grows lazily as nodes are subdivided; tileset
//! trees are inserted explicitly.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;

use crate::coord::{CrsId, TileAddress};
use crate::fetch::{ContentHandle, FetchError};
use crate::semantic::{SemanticSource, SemanticTable};

/// Tree topology errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    /// The address is not in the tree and cannot be derived
    #[error("Tile {0} is not in the tree")]
    UnknownNode(TileAddress),

    /// The address is already in the tree
    #[error("Tile {0} is already in the tree")]
    AlreadyPresent(TileAddress),
}

/// Content state of a node.
#[derive(Debug, Clone, Default)]
pub enum NodeState {
    #[default]
    Empty,
    Loading,
    Ready(ContentHandle),
    Errored(FetchError),
}

impl NodeState {
    pub fn is_empty(&self) -> bool {
        matches!(self, NodeState::Empty)
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, NodeState::Loading)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, NodeState::Ready(_))
    }

    pub fn is_errored(&self) -> bool {
        matches!(self, NodeState::Errored(_))
    }

    /// Short state name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            NodeState::Empty => "empty",
            NodeState::Loading => "loading",
            NodeState::Ready(_) => "ready",
            NodeState::Errored(_) => "errored",
        }
    }
}

/// One node of the tile tree.
#[derive(Debug, Clone)]
pub struct TileNode {
    address: TileAddress,
    parent: Option<TileAddress>,
    children: Vec<TileAddress>,
    pub(crate) state: NodeState,
    pub(crate) last_visible_at: Option<Instant>,
    pub(crate) visible: bool,
}

impl TileNode {
    fn new(address: TileAddress, parent: Option<TileAddress>) -> Self {
        Self {
            address,
            parent,
            children: Vec::new(),
            state: NodeState::Empty,
            last_visible_at: None,
            visible: false,
        }
    }

    pub fn address(&self) -> TileAddress {
        self.address
    }

    pub fn parent(&self) -> Option<TileAddress> {
        self.parent
    }

    pub fn children(&self) -> &[TileAddress] {
        &self.children
    }

    pub fn state(&self) -> &NodeState {
        &self.state
    }

    /// When the node last stopped being visible, if it is invisible.
    pub fn last_visible_at(&self) -> Option<Instant> {
        self.last_visible_at
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn content(&self) -> Option<&ContentHandle> {
        match &self.state {
            NodeState::Ready(handle) => Some(handle),
            _ => None,
        }
    }
}

/// Arena of tile nodes keyed by address.
#[derive(Debug, Clone, Default)]
pub struct TileTree {
    nodes: HashMap<TileAddress, TileNode>,
    roots: Vec<TileAddress>,
}

impl TileTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a root node.
    pub fn insert_root(&mut self, address: TileAddress) -> Result<(), TreeError> {
        if self.nodes.contains_key(&address) {
            return Err(TreeError::AlreadyPresent(address));
        }
        self.nodes.insert(address, TileNode::new(address, None));
        self.roots.push(address);
        Ok(())
    }

    /// Adds `child` under `parent`.
    pub fn insert_child(
        &mut self,
        parent: TileAddress,
        child: TileAddress,
    ) -> Result<(), TreeError> {
        if self.nodes.contains_key(&child) {
            return Err(TreeError::AlreadyPresent(child));
        }
        let parent_node = self
            .nodes
            .get_mut(&parent)
            .ok_or(TreeError::UnknownNode(parent))?;
        parent_node.children.push(child);
        self.nodes.insert(child, TileNode::new(child, Some(parent)));
        Ok(())
    }

    /// Returns the node's children, creating the four pyramid children of
    /// a childless pyramid node first.
    ///
    /// Tileset (`CrsId::Local`) nodes never gain children here.
    pub fn materialize_children(
        &mut self,
        address: &TileAddress,
    ) -> Result<Vec<TileAddress>, TreeError> {
        let node = self
            .nodes
            .get(address)
            .ok_or(TreeError::UnknownNode(*address))?;

        if node.children.is_empty() && address.crs != CrsId::Local {
            for child in address.children() {
                if !self.nodes.contains_key(&child) {
                    self.insert_child(*address, child)?;
                }
            }
        }

        Ok(self.children(address).to_vec())
    }

    /// Makes sure a pyramid address is in the tree, adding the path from its
    /// root (with siblings) as needed.
    pub fn ensure(&mut self, address: &TileAddress) -> Result<(), TreeError> {
        if self.nodes.contains_key(address) {
            return Ok(());
        }
        if address.crs == CrsId::Local {
            return Err(TreeError::UnknownNode(*address));
        }
        match address.parent() {
            None => self.insert_root(*address),
            Some(parent) => {
                self.ensure(&parent)?;
                self.materialize_children(&parent).map(|_| ())
            }
        }
    }

    pub fn get(&self, address: &TileAddress) -> Option<&TileNode> {
        self.nodes.get(address)
    }

    pub(crate) fn get_mut(&mut self, address: &TileAddress) -> Option<&mut TileNode> {
        self.nodes.get_mut(address)
    }

    pub fn contains(&self, address: &TileAddress) -> bool {
        self.nodes.contains_key(address)
    }

    pub fn roots(&self) -> &[TileAddress] {
        &self.roots
    }

    pub fn parent(&self, address: &TileAddress) -> Option<TileAddress> {
        self.nodes.get(address).and_then(TileNode::parent)
    }

    pub fn children(&self, address: &TileAddress) -> &[TileAddress] {
        self.nodes
            .get(address)
            .map(TileNode::children)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &TileNode> {
        self.nodes.values()
    }

    /// Depth of the deepest node, or `None` for an empty tree.
    pub fn max_level(&self) -> Option<u32> {
        self.nodes.keys().map(|a| a.level).max()
    }
}

impl SemanticSource for TileTree {
    fn semantic_table(&self, address: &TileAddress) -> Option<Arc<SemanticTable>> {
        self.get(address)
            .and_then(TileNode::content)
            .and_then(|handle| handle.payload.semantic_table())
    }

    fn structural_parent(&self, address: &TileAddress) -> Option<TileAddress> {
        self.parent(address)
    }
}

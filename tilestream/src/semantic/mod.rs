//! Per-feature semantic metadata.
//!
//! Mesh tiles may carry a batch table: a set of named columns with one value
//! per feature. Geometry references rows by feature id. [`SemanticIndex`]
//! answers "what is feature N of this tile", walking up the tile tree when
//! the table is stored on a structural ancestor.

mod binary;

pub(crate) use binary::column_values;
pub use binary::ComponentType;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{trace, warn};

use crate::coord::TileAddress;
use crate::extension::{ExtensionError, ExtensionRegistry, SemanticContribution};

/// Keys of a batch table that are not feature columns.
const RESERVED_KEYS: [&str; 2] = ["extensions", "extras"];

/// Semantic lookup errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SemanticError {
    /// Feature id is not smaller than the table length
    #[error("Feature {feature_id} out of range (table has {len} features)")]
    FeatureOutOfRange { feature_id: u32, len: u32 },

    /// The batch table is not a JSON object
    #[error("Invalid batch table: {0}")]
    InvalidTable(String),

    /// A column definition could not be understood
    #[error("Invalid column '{column}': {reason}")]
    InvalidColumn { column: String, reason: String },

    /// A JSON column has fewer entries than features
    #[error("Column '{column}' has {actual} values, expected {expected}")]
    ColumnLength {
        column: String,
        expected: usize,
        actual: usize,
    },

    /// A binary column extends past the binary body
    #[error(
        "Column '{column}' reads {length} bytes at offset {offset}, binary body has {available}"
    )]
    BinaryOutOfBounds {
        column: String,
        offset: usize,
        length: usize,
        available: usize,
    },

    /// An extension handler rejected its fragment
    #[error(transparent)]
    Extension(#[from] ExtensionError),
}

/// Columnar per-feature metadata for one tile.
#[derive(Debug, Clone, Default)]
pub struct SemanticTable {
    len: u32,
    columns: BTreeMap<String, Vec<Value>>,
    extensions: BTreeMap<String, Arc<dyn SemanticContribution>>,
}

impl SemanticTable {
    /// Creates an empty table for `len` features.
    pub fn new(len: u32) -> Self {
        Self {
            len,
            ..Default::default()
        }
    }

    /// Adds a column. Missing trailing values read as `null`.
    pub fn with_column(mut self, name: impl Into<String>, mut values: Vec<Value>) -> Self {
        values.resize(self.len as usize, Value::Null);
        self.columns.insert(name.into(), values);
        self
    }

    /// Attaches an extension's contribution.
    pub fn with_extension(
        mut self,
        name: impl Into<String>,
        contribution: Arc<dyn SemanticContribution>,
    ) -> Self {
        self.extensions.insert(name.into(), contribution);
        self
    }

    /// Builds a table from a batch table's JSON header and binary body.
    ///
    /// Extensions found in the table's `extensions` object are interpreted by
    /// the matching registered handler; unregistered ones are skipped.
    pub fn from_batch_table(
        json: &Value,
        binary: &[u8],
        len: u32,
        registry: &ExtensionRegistry,
    ) -> Result<Self, SemanticError> {
        let object = match json {
            Value::Null => return Ok(Self::new(len)),
            Value::Object(object) => object,
            other => {
                return Err(SemanticError::InvalidTable(format!(
                    "expected an object, found {}",
                    json_kind(other)
                )))
            }
        };

        let mut table = Self::new(len);
        for (name, definition) in object {
            if RESERVED_KEYS.contains(&name.as_str()) {
                continue;
            }
            let values = column_values(name, definition, binary, len as usize)?;
            table.columns.insert(name.clone(), values);
        }

        if let Some(extensions) = object.get("extensions").and_then(Value::as_object) {
            for (name, fragment) in extensions {
                match registry.get(name) {
                    Some(handler) => {
                        let contribution = handler.interpret(fragment, binary)?;
                        table.extensions.insert(name.clone(), contribution);
                    }
                    None => {
                        warn!(extension = %name, "Skipping batch table extension with no handler");
                    }
                }
            }
        }

        trace!(
            features = len,
            columns = table.columns.len(),
            extensions = table.extensions.len(),
            "Semantic table built"
        );
        Ok(table)
    }

    /// Number of features.
    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    pub fn extension_names(&self) -> impl Iterator<Item = &str> {
        self.extensions.keys().map(String::as_str)
    }

    fn check(&self, feature_id: u32) -> Result<(), SemanticError> {
        if feature_id >= self.len {
            Err(SemanticError::FeatureOutOfRange {
                feature_id,
                len: self.len,
            })
        } else {
            Ok(())
        }
    }

    /// The value of one column for one feature.
    pub fn property(&self, feature_id: u32, name: &str) -> Result<Option<&Value>, SemanticError> {
        self.check(feature_id)?;
        Ok(self
            .columns
            .get(name)
            .and_then(|values| values.get(feature_id as usize)))
    }

    /// All column values for one feature.
    pub fn properties(&self, feature_id: u32) -> Result<BTreeMap<String, Value>, SemanticError> {
        self.check(feature_id)?;
        Ok(self
            .columns
            .iter()
            .map(|(name, values)| {
                let value = values
                    .get(feature_id as usize)
                    .cloned()
                    .unwrap_or(Value::Null);
                (name.clone(), value)
            })
            .collect())
    }

    /// Extension contributions for one feature, keyed by extension name.
    pub fn extension_info(&self, feature_id: u32) -> Result<BTreeMap<String, Value>, SemanticError> {
        self.check(feature_id)?;
        Ok(self
            .extensions
            .iter()
            .filter_map(|(name, contribution)| {
                contribution
                    .feature_info(feature_id)
                    .map(|info| (name.clone(), info))
            })
            .collect())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Resolved metadata for one feature.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureInfo {
    pub feature_id: u32,
    /// Tile whose table answered the query
    pub source: TileAddress,
    /// Base column values
    pub properties: BTreeMap<String, Value>,
    /// Extension contributions keyed by extension name
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, Value>,
}

/// Tree access needed by semantic lookups.
pub trait SemanticSource {
    /// The semantic table held by the node's loaded content, if any.
    fn semantic_table(&self, address: &TileAddress) -> Option<Arc<SemanticTable>>;

    /// The node's structural parent in the tree.
    fn structural_parent(&self, address: &TileAddress) -> Option<TileAddress>;
}

/// Feature metadata lookup.
pub struct SemanticIndex;

impl SemanticIndex {
    /// Resolves feature `feature_id` starting at `address`.
    ///
    /// Walks structural parents until a node with a table is found. Returns
    /// `Ok(None)` when no node on the path has one.
    pub fn resolve<T: SemanticSource + ?Sized>(
        tree: &T,
        address: &TileAddress,
        feature_id: u32,
    ) -> Result<Option<FeatureInfo>, SemanticError> {
        let mut current = Some(*address);

        while let Some(node) = current {
            if let Some(table) = tree.semantic_table(&node) {
                let info = FeatureInfo {
                    feature_id,
                    source: node,
                    properties: table.properties(feature_id)?,
                    extensions: table.extension_info(feature_id)?,
                };
                trace!(address = %address, source = %node, feature_id, "Feature resolved");
                return Ok(Some(info));
            }
            current = tree.structural_parent(&node);
        }

        Ok(None)
    }
}

/// Picking entry point: metadata for the feature hit at `address`.
pub fn get_info_from_intersect_object<T: SemanticSource + ?Sized>(
    tree: &T,
    feature_id: u32,
    address: &TileAddress,
) -> Result<Option<FeatureInfo>, SemanticError> {
    SemanticIndex::resolve(tree, address, feature_id)
}

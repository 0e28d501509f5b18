//! Tileset extension registry.
//!
//! Datasets declare the extensions they use (`extensionsUsed`) and the ones a
//! client must understand (`extensionsRequired`). Handlers for known
//! extensions are registered by name in an [`ExtensionRegistry`]; validation
//! runs once per tileset load, before any content is processed.
//!
//! A handler turns the extension's fragment of a batch table into a
//! [`SemanticContribution`], which answers per-feature queries alongside the
//! table's own columns.

mod hierarchy;

pub use hierarchy::{BatchTableHierarchyHandler, HierarchyContribution, BATCH_TABLE_HIERARCHY};

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// Per-feature data contributed by an extension.
pub trait SemanticContribution: Send + Sync + fmt::Debug {
    /// Structured data for one feature, or `None` if the extension has
    /// nothing to say about it.
    fn feature_info(&self, feature_id: u32) -> Option<Value>;
}

/// Interprets one named extension.
///
/// Implementations must be thread-safe; a registry is shared across decode
/// tasks.
pub trait ExtensionHandler: Send + Sync {
    /// Extension name as declared by datasets (e.g. `3DTILES_batch_table_hierarchy`).
    fn name(&self) -> &str;

    /// Interprets the extension's fragment of a batch table.
    ///
    /// `binary` is the batch table's binary body, which the fragment may
    /// reference by byte offset.
    fn interpret(
        &self,
        fragment: &Value,
        binary: &[u8],
    ) -> Result<Arc<dyn SemanticContribution>, ExtensionError>;
}

/// Extension errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtensionError {
    /// The dataset requires extensions no handler is registered for
    #[error("Unsupported required extension(s): {}", .names.join(", "))]
    Required { names: Vec<String> },

    /// An extension fragment could not be interpreted
    #[error("Malformed {extension} extension: {reason}")]
    Malformed { extension: String, reason: String },
}

/// Advisory findings from [`ExtensionRegistry::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionWarning {
    /// An optional extension is used but not supported; it will be ignored
    Unsupported { name: String },
    /// An extension is listed as required but missing from the used list
    RequiredNotUsed { name: String },
}

impl fmt::Display for ExtensionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtensionWarning::Unsupported { name } => {
                write!(f, "extension '{}' is not supported and will be ignored", name)
            }
            ExtensionWarning::RequiredNotUsed { name } => {
                write!(f, "extension '{}' is required but not listed as used", name)
            }
        }
    }
}

/// Outcome of a successful validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Declared extensions a handler exists for
    pub supported: Vec<String>,
    /// Advisory findings, already logged
    pub warnings: Vec<ExtensionWarning>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Name to handler mapping.
#[derive(Clone, Default)]
pub struct ExtensionRegistry {
    handlers: HashMap<String, Arc<dyn ExtensionHandler>>,
}

impl ExtensionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in handlers.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register_handler(Arc::new(BatchTableHierarchyHandler));
        registry
    }

    /// Registers `handler` under `name`, returning any handler it replaces.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        handler: Arc<dyn ExtensionHandler>,
    ) -> Option<Arc<dyn ExtensionHandler>> {
        let name = name.into();
        debug!(extension = %name, "Extension handler registered");
        self.handlers.insert(name, handler)
    }

    /// Registers `handler` under its own name.
    pub fn register_handler(
        &mut self,
        handler: Arc<dyn ExtensionHandler>,
    ) -> Option<Arc<dyn ExtensionHandler>> {
        let name = handler.name().to_string();
        self.register(name, handler)
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ExtensionHandler>> {
        self.handlers.get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Checks a dataset's declared extensions against the registry.
    ///
    /// Fails with [`ExtensionError::Required`] when any required extension
    /// (listed in `required`, whether or not it also appears in `used`) has
    /// no handler. Unsupported optional extensions only produce warnings.
    pub fn validate<S: AsRef<str>>(
        &self,
        used: &[S],
        required: &[S],
    ) -> Result<ValidationReport, ExtensionError> {
        let used: BTreeSet<&str> = used.iter().map(AsRef::as_ref).collect();
        let required: BTreeSet<&str> = required.iter().map(AsRef::as_ref).collect();

        let missing: Vec<String> = required
            .iter()
            .filter(|name| !self.is_registered(name))
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ExtensionError::Required { names: missing });
        }

        let mut report = ValidationReport::default();
        for name in used.union(&required) {
            if self.is_registered(name) {
                report.supported.push(name.to_string());
            } else {
                report.warnings.push(ExtensionWarning::Unsupported {
                    name: name.to_string(),
                });
            }
        }
        for name in required.difference(&used) {
            report.warnings.push(ExtensionWarning::RequiredNotUsed {
                name: name.to_string(),
            });
        }

        for warning in &report.warnings {
            warn!("{}", warning);
        }

        Ok(report)
    }
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("handlers", &self.names())
            .finish()
    }
}

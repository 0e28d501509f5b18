//! `3DTILES_batch_table_hierarchy` support.
//!
//! The extension groups features into classes with per-class properties and
//! links instances into a parent hierarchy. A feature's info is its class,
//! its ancestors' classes, and the properties found walking up from the
//! instance (nearest instance wins).

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{Map, Value};

use super::{ExtensionError, ExtensionHandler, SemanticContribution};
use crate::semantic::column_values;

/// Extension name.
pub const BATCH_TABLE_HIERARCHY: &str = "3DTILES_batch_table_hierarchy";

/// Handler for [`BATCH_TABLE_HIERARCHY`].
#[derive(Debug, Default, Clone, Copy)]
pub struct BatchTableHierarchyHandler;

impl ExtensionHandler for BatchTableHierarchyHandler {
    fn name(&self) -> &str {
        BATCH_TABLE_HIERARCHY
    }

    fn interpret(
        &self,
        fragment: &Value,
        binary: &[u8],
    ) -> Result<Arc<dyn SemanticContribution>, ExtensionError> {
        Ok(Arc::new(HierarchyContribution::parse(fragment, binary)?))
    }
}

#[derive(Debug)]
struct HierarchyClass {
    name: String,
    /// Property name to one value per instance of the class
    instances: Map<String, Value>,
}

#[derive(Debug)]
struct Instance {
    class_id: usize,
    /// Index among the instances of the same class
    index_in_class: usize,
    parents: Vec<usize>,
}

/// Parsed hierarchy for one batch table.
#[derive(Debug)]
pub struct HierarchyContribution {
    classes: Vec<HierarchyClass>,
    instances: Vec<Instance>,
}

fn malformed(reason: impl Into<String>) -> ExtensionError {
    ExtensionError::Malformed {
        extension: BATCH_TABLE_HIERARCHY.to_string(),
        reason: reason.into(),
    }
}

fn as_indices(name: &str, values: Vec<Value>) -> Result<Vec<usize>, ExtensionError> {
    values
        .into_iter()
        .map(|v| {
            v.as_u64()
                .map(|n| n as usize)
                .ok_or_else(|| malformed(format!("{} must contain non-negative integers", name)))
        })
        .collect()
}

impl HierarchyContribution {
    /// Parses the extension fragment.
    pub fn parse(fragment: &Value, binary: &[u8]) -> Result<Self, ExtensionError> {
        let instance_count = fragment
            .get("instancesLength")
            .and_then(Value::as_u64)
            .ok_or_else(|| malformed("instancesLength is required"))? as usize;

        let class_defs = fragment
            .get("classes")
            .and_then(Value::as_array)
            .ok_or_else(|| malformed("classes is required"))?;

        let mut classes = Vec::with_capacity(class_defs.len());
        for def in class_defs {
            let name = def
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| malformed("every class needs a name"))?;
            let length = def
                .get("length")
                .and_then(Value::as_u64)
                .ok_or_else(|| malformed(format!("class '{}' needs a length", name)))?
                as usize;

            let mut instances = Map::new();
            if let Some(props) = def.get("instances").and_then(Value::as_object) {
                for (prop, definition) in props {
                    let values = column_values(prop, definition, binary, length)
                        .map_err(|e| malformed(e.to_string()))?;
                    instances.insert(prop.clone(), Value::Array(values));
                }
            }
            classes.push(HierarchyClass {
                name: name.to_string(),
                instances,
            });
        }

        let class_ids = fragment
            .get("classIds")
            .ok_or_else(|| malformed("classIds is required"))
            .and_then(|def| {
                column_values("classIds", def, binary, instance_count)
                    .map_err(|e| malformed(e.to_string()))
            })
            .and_then(|values| as_indices("classIds", values))?;

        let parents = Self::parse_parents(fragment, binary, instance_count)?;

        let mut seen_per_class = vec![0usize; classes.len()];
        let mut instances = Vec::with_capacity(instance_count);
        for (class_id, parents) in class_ids.into_iter().zip(parents) {
            let counter = seen_per_class
                .get_mut(class_id)
                .ok_or_else(|| malformed(format!("class id {} does not exist", class_id)))?;
            let index_in_class = *counter;
            *counter += 1;

            if let Some(parent) = parents.iter().find(|p| **p >= instance_count) {
                return Err(malformed(format!("parent id {} does not exist", parent)));
            }
            instances.push(Instance {
                class_id,
                index_in_class,
                parents,
            });
        }

        Ok(Self { classes, instances })
    }

    /// Per-instance parent lists.
    ///
    /// Without `parentCounts` every instance has exactly one parent id; an
    /// instance that is its own parent is a root.
    fn parse_parents(
        fragment: &Value,
        binary: &[u8],
        instance_count: usize,
    ) -> Result<Vec<Vec<usize>>, ExtensionError> {
        let Some(parent_ids_def) = fragment.get("parentIds") else {
            return Ok(vec![Vec::new(); instance_count]);
        };

        let counts = match fragment.get("parentCounts") {
            Some(def) => Some(
                column_values("parentCounts", def, binary, instance_count)
                    .map_err(|e| malformed(e.to_string()))
                    .and_then(|v| as_indices("parentCounts", v))?,
            ),
            None => None,
        };
        let total = match &counts {
            Some(c) => c
                .iter()
                .try_fold(0usize, |acc, &n| acc.checked_add(n))
                .ok_or_else(|| malformed("parentCounts total overflows"))?,
            None => instance_count,
        };

        let ids = column_values("parentIds", parent_ids_def, binary, total)
            .map_err(|e| malformed(e.to_string()))
            .and_then(|v| as_indices("parentIds", v))?;

        let parents = match counts {
            Some(counts) => {
                let mut offset = 0usize;
                let mut parents = Vec::with_capacity(counts.len());
                for (instance, count) in counts.into_iter().enumerate() {
                    let end = offset
                        .checked_add(count)
                        .ok_or_else(|| malformed("parentCounts total overflows"))?;
                    let list = ids
                        .get(offset..end)
                        .ok_or_else(|| malformed("parentIds is shorter than parentCounts"))?
                        .iter()
                        .copied()
                        .filter(|p| *p != instance)
                        .collect();
                    parents.push(list);
                    offset = end;
                }
                parents
            }
            None => ids
                .into_iter()
                .enumerate()
                .map(|(instance, parent)| {
                    if parent == instance {
                        Vec::new()
                    } else {
                        vec![parent]
                    }
                })
                .collect(),
        };
        Ok(parents)
    }

    fn instance_properties(&self, instance: &Instance) -> impl Iterator<Item = (&String, &Value)> {
        let class = &self.classes[instance.class_id];
        let index = instance.index_in_class;
        class.instances.iter().filter_map(move |(name, values)| {
            values
                .as_array()
                .and_then(|values| values.get(index))
                .map(|value| (name, value))
        })
    }
}

impl SemanticContribution for HierarchyContribution {
    fn feature_info(&self, feature_id: u32) -> Option<Value> {
        let start = feature_id as usize;
        let root = self.instances.get(start)?;

        let mut properties = Map::new();
        let mut ancestors = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = vec![start];

        // Breadth-first so nearer instances set properties first.
        while !queue.is_empty() {
            let mut next = Vec::new();
            for id in queue {
                if !visited.insert(id) {
                    continue;
                }
                let instance = &self.instances[id];
                if id != start {
                    ancestors.push(Value::from(self.classes[instance.class_id].name.clone()));
                }
                for (name, value) in self.instance_properties(instance) {
                    properties
                        .entry(name.clone())
                        .or_insert_with(|| value.clone());
                }
                next.extend(instance.parents.iter().copied());
            }
            queue = next;
        }

        let mut info = Map::new();
        info.insert(
            "class".to_string(),
            Value::from(self.classes[root.class_id].name.clone()),
        );
        info.insert("ancestors".to_string(), Value::Array(ancestors));
        info.insert("properties".to_string(), Value::Object(properties));
        Some(Value::Object(info))
    }
}

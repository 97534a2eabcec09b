//! DependencyResolver — layered topological sort.
//!
//! Repeatedly peels off every node whose remaining dependencies are all
//! satisfied. Each peel is one layer. Nodes within a layer have no edges
//! between them, so a layer can be processed in any order or concurrently.
//!
//! Layer members are sorted lexicographically so the output never depends
//! on input iteration order.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::error::{EngineError, EngineResult};

/// One node of a dependency graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub id: String,
    pub deps: Vec<String>,
}

impl Entry {
    pub fn new(id: impl Into<String>, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            id: id.into(),
            deps: deps.into_iter().map(Into::into).collect(),
        }
    }
}

/// Sort `entries` into dependency layers.
///
/// Entries sharing an ID are merged. A cycle, a self-dependency or a
/// reference to an ID not in the input fails the whole sort.
pub fn layered_topological_sort(entries: &[Entry]) -> EngineResult<Vec<Vec<String>>> {
    let mut remaining: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for entry in entries {
        remaining
            .entry(entry.id.as_str())
            .or_default()
            .extend(entry.deps.iter().map(String::as_str));
    }

    let mut layers = Vec::new();
    while !remaining.is_empty() {
        let layer: Vec<&str> = remaining
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(id, _)| *id)
            .collect();

        if layer.is_empty() {
            let unresolved: Vec<&str> = remaining.keys().copied().collect();
            return Err(EngineError::Dependency(format!(
                "can't resolve dependencies; may be circular or have missing relationships (unresolved: {})",
                unresolved.join(", ")
            )));
        }

        for id in &layer {
            remaining.remove(id);
        }
        for deps in remaining.values_mut() {
            for id in &layer {
                deps.remove(id);
            }
        }

        debug!(level = layers.len(), layer = ?layer, "resolved layer");
        layers.push(layer.into_iter().map(str::to_string).collect());
    }

    Ok(layers)
}

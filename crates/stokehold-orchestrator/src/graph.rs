//! Dependency graph layering for cache hydration

use std::collections::{HashMap, HashSet};

use crate::error::OrchestratorError;

/// Partition caches into hydration layers: every cache in layer N has all
/// of its dependencies in earlier layers
///
/// Input is `(name, dependencies)` in registration order; within a layer the
/// input order is preserved. An unknown dependency or a cycle is a fatal
/// structural error.
pub(crate) fn hydration_layers(
    nodes: &[(String, Vec<String>)],
) -> Result<Vec<Vec<String>>, OrchestratorError> {
    let known: HashSet<&str> = nodes.iter().map(|(name, _)| name.as_str()).collect();

    for (name, deps) in nodes {
        for dep in deps {
            if !known.contains(dep.as_str()) {
                return Err(OrchestratorError::UnknownDependency {
                    cache: name.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    let mut remaining: HashMap<&str, HashSet<&str>> = nodes
        .iter()
        .map(|(name, deps)| {
            (
                name.as_str(),
                deps.iter().map(String::as_str).collect::<HashSet<_>>(),
            )
        })
        .collect();

    let mut layers = Vec::new();
    while !remaining.is_empty() {
        // In registration order, everything whose dependencies have settled
        let layer: Vec<String> = nodes
            .iter()
            .filter(|(name, _)| {
                remaining
                    .get(name.as_str())
                    .is_some_and(|deps| deps.is_empty())
            })
            .map(|(name, _)| name.clone())
            .collect();

        if layer.is_empty() {
            let mut stuck: Vec<String> = remaining.keys().map(|s| s.to_string()).collect();
            stuck.sort();
            return Err(OrchestratorError::DependencyCycle(stuck));
        }

        for name in &layer {
            remaining.remove(name.as_str());
        }
        for deps in remaining.values_mut() {
            for name in &layer {
                deps.remove(name.as_str());
            }
        }

        layers.push(layer);
    }

    Ok(layers)
}

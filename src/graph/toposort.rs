//! Layered topological sort of a dependency map.
use std::collections::{BTreeMap, BTreeSet};

use crate::errors::CyclicDependencyError;
use crate::model::EntityKey;

/// Group keys into layers; every key comes in a later layer than all of its
/// dependencies. Layers are sorted by key.
///
/// Self-loops are ignored. Keys that only appear as dependencies are added
/// with no dependencies of their own.
///
/// # Errors
/// Returns `CyclicDependencyError` with whatever could not be ordered when the
/// map contains a cycle.
pub fn layers(
    depends_on: &BTreeMap<EntityKey, BTreeSet<EntityKey>>,
) -> Result<Vec<Vec<EntityKey>>, CyclicDependencyError> {
    let mut remaining: BTreeMap<EntityKey, BTreeSet<EntityKey>> = BTreeMap::new();
    for (key, deps) in depends_on {
        let deps: BTreeSet<EntityKey> = deps.iter().filter(|d| *d != key).cloned().collect();
        for d in &deps {
            remaining.entry(d.clone()).or_default();
        }
        remaining.entry(key.clone()).or_default().extend(deps);
    }

    let mut out = Vec::new();
    while !remaining.is_empty() {
        let ready: BTreeSet<EntityKey> =
            remaining.iter().filter(|(_, deps)| deps.is_empty()).map(|(k, _)| k.clone()).collect();
        if ready.is_empty() {
            return Err(CyclicDependencyError { residual: remaining });
        }
        remaining.retain(|k, _| !ready.contains(k));
        for deps in remaining.values_mut() {
            deps.retain(|d| !ready.contains(d));
        }
        out.push(ready.into_iter().collect());
    }
    Ok(out)
}

/// Total order over every key in `depends_on`, dependencies first.
///
/// # Errors
/// See [`layers`].
pub fn sort(
    depends_on: &BTreeMap<EntityKey, BTreeSet<EntityKey>>,
) -> Result<Vec<EntityKey>, CyclicDependencyError> {
    Ok(layers(depends_on)?.into_iter().flatten().collect())
}

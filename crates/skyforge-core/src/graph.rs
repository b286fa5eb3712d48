//! Dependency resolution over tasks
//!
//! Edges come from each task's declared dependencies. The order is computed
//! with Kahn's algorithm; among tasks that are ready at the same time the
//! smallest key (kind, then name) goes first, so repeated runs produce the
//! same order.

use crate::error::{Error, Result};
use crate::task::TaskKey;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Order `edges` (task -> tasks it depends on) so that every task comes after
/// all of its dependencies
pub fn topological_order(edges: &BTreeMap<TaskKey, Vec<TaskKey>>) -> Result<Vec<TaskKey>> {
    let mut pending: BTreeMap<&TaskKey, usize> = BTreeMap::new();
    let mut dependents: HashMap<&TaskKey, Vec<&TaskKey>> = HashMap::new();

    for (task, deps) in edges {
        let unique: BTreeSet<&TaskKey> = deps.iter().collect();
        for dep in &unique {
            if !edges.contains_key(*dep) {
                return Err(Error::MissingDependency {
                    task: task.clone(),
                    dependency: (*dep).clone(),
                });
            }
            dependents.entry(*dep).or_default().push(task);
        }
        pending.insert(task, unique.len());
    }

    let mut ready: BTreeSet<&TaskKey> = pending
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(task, _)| *task)
        .collect();
    let mut order = Vec::with_capacity(edges.len());

    while let Some(task) = ready.pop_first() {
        order.push(task.clone());
        for dependent in dependents.get(task).into_iter().flatten() {
            if let Some(count) = pending.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(dependent);
                }
            }
        }
    }

    if order.len() < edges.len() {
        let placed: BTreeSet<&TaskKey> = order.iter().collect();
        let remaining: BTreeSet<&TaskKey> =
            edges.keys().filter(|k| !placed.contains(k)).collect();
        let cycle = find_cycle(&remaining, |task| {
            edges
                .get(task)
                .map(|deps| deps.iter().collect::<BTreeSet<_>>())
                .unwrap_or_default()
        });
        tracing::debug!(remaining = remaining.len(), "dependency graph contains a cycle");
        return Err(Error::CyclicDependency { cycle });
    }

    Ok(order)
}

/// Walk from the smallest remaining node along edges that stay inside
/// `remaining` until a node repeats. Every remaining node must have at least
/// one such edge, which holds for the leftovers of Kahn's algorithm.
///
/// The returned cycle starts and ends with the same node.
pub(crate) fn find_cycle<'a, K, F, I>(remaining: &BTreeSet<&'a K>, next: F) -> Vec<K>
where
    K: Ord + Clone + 'a,
    F: Fn(&'a K) -> I,
    I: IntoIterator<Item = &'a K>,
{
    let Some(mut current) = remaining.first().copied() else {
        return Vec::new();
    };
    let mut path: Vec<&'a K> = Vec::new();
    let mut seen: BTreeMap<&'a K, usize> = BTreeMap::new();

    loop {
        if let Some(&start) = seen.get(current) {
            let mut cycle: Vec<K> = path[start..].iter().map(|k| (*k).clone()).collect();
            cycle.push(current.clone());
            return cycle;
        }
        seen.insert(current, path.len());
        path.push(current);

        match next(current).into_iter().find(|k| remaining.contains(k)) {
            Some(k) => current = k,
            None => return path.into_iter().cloned().collect(),
        }
    }
}

//! Tree Merger.
//!
//! Trees are folded in input order. Siblings are matched by title; matched
//! nodes merge their children one level deeper, and each scalar field keeps the
//! first non-empty value seen. Later trees only add children or fill gaps, so
//! the result depends on input order: callers pass the main store first.

use tracing::debug;

use crate::hierarchy::{Hierarchy, HierarchyNode};

/// Merges `trees` into one canonical tree with recomputed paths.
pub fn merge(trees: &[Hierarchy]) -> Hierarchy {
    let mut merged = trees.iter().fold(Hierarchy::default(), |mut acc, tree| {
        merge_items(&mut acc.items, tree.items.clone());
        acc
    });
    merged.reindex();
    debug!(trees = trees.len(), nodes = merged.count_nodes(), "Merged hierarchies");
    merged
}

/// Main store first, then its sub-stores in discovery order.
pub fn merge_stores(main: Hierarchy, subs: Vec<Hierarchy>) -> Hierarchy {
    let mut trees = Vec::with_capacity(subs.len() + 1);
    trees.push(main);
    trees.extend(subs);
    merge(&trees)
}

/// Unions `from` into `into` by title, keeping `into`'s order and appending new titles.
pub fn merge_items(into: &mut Vec<HierarchyNode>, from: Vec<HierarchyNode>) {
    for node in from {
        match into.iter_mut().find(|n| n.title == node.title) {
            Some(existing) => merge_node(existing, node),
            None => into.push(node),
        }
    }
}

/// Merges `from` into `into`; `into` wins every populated field, kind included.
pub fn merge_node(into: &mut HierarchyNode, from: HierarchyNode) {
    into.text = first_non_empty(into.text.take(), from.text);
    into.image_url = first_non_empty(into.image_url.take(), from.image_url);
    into.link_url = first_non_empty(into.link_url.take(), from.link_url);
    into.synonym = first_non_empty(into.synonym.take(), from.synonym);
    merge_items(&mut into.items, from.items);
}

/// The first value that is present and not blank.
pub fn first_non_empty(first: Option<String>, second: Option<String>) -> Option<String> {
    let filled = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
    if filled(&first) || !filled(&second) {
        first.or(second)
    } else {
        second
    }
}

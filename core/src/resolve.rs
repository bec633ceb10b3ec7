use crate::error::CoreResult;
use crate::model::attribution::{AttributionId, Universe};
use crate::model::resource::{NodeId, ResourceTree};
use crate::store::links::LinkTable;
use crate::store::AttributionStore;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Attributions that apply to a resource, and where they come from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Resolved {
    pub ids: Vec<AttributionId>,
    /// `None` when the resource owns the entry (or nothing applies).
    pub inherited_from: Option<String>,
}

impl Resolved {
    pub fn is_inherited(&self) -> bool {
        self.inherited_from.is_some()
    }

    pub fn id_set(&self) -> BTreeSet<AttributionId> {
        self.ids.iter().cloned().collect()
    }
}

pub fn effective_attributions(
    tree: &ResourceTree,
    store: &AttributionStore,
    universe: Universe,
    path: &str,
) -> CoreResult<Resolved> {
    let id = tree.require(path)?;
    let links = store.table(universe).links();
    Ok(match entry_source(tree, links, id) {
        Some(source) if source == id => Resolved {
            ids: links.ids_at(path).unwrap_or_default().to_vec(),
            inherited_from: None,
        },
        Some(source) => {
            let source_path = &tree.node(source).path;
            Resolved {
                ids: links.ids_at(source_path).unwrap_or_default().to_vec(),
                inherited_from: Some(source_path.clone()),
            }
        }
        None => Resolved::default(),
    })
}

/// Node whose link entry `id` resolves to: itself, or the nearest ancestor
/// with an entry, never crossing a breakpoint.
fn entry_source(tree: &ResourceTree, links: &LinkTable, id: NodeId) -> Option<NodeId> {
    if tree.node(id).is_breakpoint {
        return None;
    }
    if links.has_entry(&tree.node(id).path) {
        return Some(id);
    }
    for ancestor in tree.ancestors(id) {
        let node = tree.node(ancestor);
        if node.is_breakpoint {
            return None;
        }
        if links.has_entry(&node.path) {
            return Some(ancestor);
        }
    }
    None
}

/// Per-node entry source for the whole tree in one pre-order pass.
pub(crate) fn entry_sources(tree: &ResourceTree, links: &LinkTable) -> Vec<Option<NodeId>> {
    let mut sources = vec![None; tree.len()];
    for &id in tree.pre_order() {
        let node = tree.node(id);
        sources[id] = if node.is_breakpoint {
            None
        } else if links.has_entry(&node.path) {
            Some(id)
        } else {
            node.parent.and_then(|p| sources[p])
        };
    }
    sources
}

/// Folder-content aggregates of one universe at one store version.
#[derive(Debug, Clone)]
pub struct FolderAggregates {
    pub version: u64,
    per_node: Vec<BTreeSet<AttributionId>>,
}

impl FolderAggregates {
    pub fn compute(tree: &ResourceTree, store: &AttributionStore, universe: Universe) -> Self {
        let links = store.table(universe).links();
        let sources = entry_sources(tree, links);
        let mut per_node: Vec<BTreeSet<AttributionId>> = vec![BTreeSet::new(); tree.len()];
        for id in tree.post_order() {
            if tree.node(id).is_breakpoint {
                continue;
            }
            let mut acc = BTreeSet::new();
            for &child in tree.children(id) {
                let child_node = tree.node(child);
                if child_node.is_breakpoint {
                    continue;
                }
                if tree.is_leaf(child) {
                    if let Some(src) = sources[child] {
                        let ids = links.ids_at(&tree.node(src).path).unwrap_or_default();
                        acc.extend(ids.iter().cloned());
                    }
                } else {
                    acc.extend(per_node[child].iter().cloned());
                }
            }
            per_node[id] = acc;
        }
        Self {
            version: store.version(),
            per_node,
        }
    }

    pub fn at(&self, id: NodeId) -> &BTreeSet<AttributionId> {
        &self.per_node[id]
    }
}

/// Memoizes folder aggregates by store version, never by content.
#[derive(Debug, Default)]
pub struct AggregateCache {
    entries: HashMap<Universe, Arc<FolderAggregates>>,
}

impl AggregateCache {
    pub fn get(
        &mut self,
        tree: &ResourceTree,
        store: &AttributionStore,
        universe: Universe,
    ) -> Arc<FolderAggregates> {
        if let Some(hit) = self.entries.get(&universe) {
            if hit.version == store.version() {
                return Arc::clone(hit);
            }
        }
        tracing::debug!(?universe, version = store.version(), "recomputing folder aggregates");
        let fresh = Arc::new(FolderAggregates::compute(tree, store, universe));
        self.entries.insert(universe, Arc::clone(&fresh));
        fresh
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

pub fn folder_aggregate(
    tree: &ResourceTree,
    store: &AttributionStore,
    cache: &mut AggregateCache,
    universe: Universe,
    path: &str,
) -> CoreResult<BTreeSet<AttributionId>> {
    let id = tree.require(path)?;
    Ok(cache.get(tree, store, universe).at(id).clone())
}

/// Ids of the universe that neither apply to `path` nor appear below it.
pub fn unrelated(
    tree: &ResourceTree,
    store: &AttributionStore,
    cache: &mut AggregateCache,
    universe: Universe,
    path: &str,
) -> CoreResult<BTreeSet<AttributionId>> {
    let related: BTreeSet<AttributionId> = effective_attributions(tree, store, universe, path)?
        .ids
        .into_iter()
        .chain(folder_aggregate(tree, store, cache, universe, path)?)
        .collect();
    Ok(store
        .table(universe)
        .ids()
        .filter(|id| !related.contains(*id))
        .cloned()
        .collect())
}

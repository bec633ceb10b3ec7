use crate::error::CoreResult;
use crate::model::attribution::{AttributionId, Criticality, Universe};
use crate::model::resource::{NodeId, ResourceTree};
use crate::resolve::entry_sources;
use crate::sources::SourceRegistry;
use crate::store::AttributionStore;
use serde::Serialize;
use std::collections::BTreeMap;

/// Review state of one file; the first matching bucket wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressBucket {
    Confirmed,
    PreSelectedOnly,
    SignalsOnly,
    CriticalInheritedSignals,
    None,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgressStatistics {
    pub store_version: u64,
    pub total_files: usize,
    pub confirmed: usize,
    pub pre_selected_only: usize,
    pub signals_only: usize,
    pub critical_inherited_signals: usize,
    pub none: usize,
    /// Files with at least one visible high-criticality signal.
    pub high_critical_files: usize,
    /// Files whose most critical visible signal is medium.
    pub medium_critical_files: usize,
}

impl ProgressStatistics {
    fn count(&mut self, bucket: ProgressBucket) {
        match bucket {
            ProgressBucket::Confirmed => self.confirmed += 1,
            ProgressBucket::PreSelectedOnly => self.pre_selected_only += 1,
            ProgressBucket::SignalsOnly => self.signals_only += 1,
            ProgressBucket::CriticalInheritedSignals => self.critical_inherited_signals += 1,
            ProgressBucket::None => self.none += 1,
        }
    }

    pub fn bucket_count(&self, bucket: ProgressBucket) -> usize {
        match bucket {
            ProgressBucket::Confirmed => self.confirmed,
            ProgressBucket::PreSelectedOnly => self.pre_selected_only,
            ProgressBucket::SignalsOnly => self.signals_only,
            ProgressBucket::CriticalInheritedSignals => self.critical_inherited_signals,
            ProgressBucket::None => self.none,
        }
    }
}

/// Resolution sources of both universes, computed once per pass.
struct Sources {
    manual: Vec<Option<NodeId>>,
    external: Vec<Option<NodeId>>,
}

impl Sources {
    fn new(tree: &ResourceTree, store: &AttributionStore) -> Self {
        Self {
            manual: entry_sources(tree, store.manual().links()),
            external: entry_sources(tree, store.external().links()),
        }
    }
}

fn ids_from<'a>(
    tree: &ResourceTree,
    store: &'a AttributionStore,
    universe: Universe,
    source: Option<NodeId>,
) -> &'a [AttributionId] {
    source
        .and_then(|src| store.table(universe).links().ids_at(&tree.node(src).path))
        .unwrap_or_default()
}

fn max_criticality<'a>(
    store: &AttributionStore,
    ids: impl IntoIterator<Item = &'a AttributionId>,
) -> Option<Criticality> {
    ids.into_iter()
        .filter(|id| !store.is_hidden(id))
        .filter_map(|id| store.external().entity(id))
        .filter_map(|info| info.criticality)
        .max()
}

fn classify(
    tree: &ResourceTree,
    store: &AttributionStore,
    sources: &Sources,
    id: NodeId,
) -> ProgressBucket {
    let manual = ids_from(tree, store, Universe::Manual, sources.manual[id]);
    let records: Vec<_> = manual
        .iter()
        .filter_map(|a| store.manual().entity(a))
        .collect();
    if records.iter().any(|info| !info.pre_selected) {
        return ProgressBucket::Confirmed;
    }
    if !records.is_empty() {
        return ProgressBucket::PreSelectedOnly;
    }

    let source = sources.external[id];
    let signals = ids_from(tree, store, Universe::External, source);
    let visible = signals.iter().any(|s| !store.is_hidden(s));
    if source == Some(id) && visible {
        return ProgressBucket::SignalsOnly;
    }
    if source.is_some() && max_criticality(store, signals).is_some() {
        return ProgressBucket::CriticalInheritedSignals;
    }
    ProgressBucket::None
}

pub fn bucket_of(
    tree: &ResourceTree,
    store: &AttributionStore,
    path: &str,
) -> CoreResult<ProgressBucket> {
    let id = tree.require(path)?;
    Ok(classify(tree, store, &Sources::new(tree, store), id))
}

pub fn progress_statistics(tree: &ResourceTree, store: &AttributionStore) -> ProgressStatistics {
    let sources = Sources::new(tree, store);
    let mut stats = ProgressStatistics {
        store_version: store.version(),
        ..ProgressStatistics::default()
    };
    for id in tree.files() {
        stats.total_files += 1;
        stats.count(classify(tree, store, &sources, id));
        let signals = ids_from(tree, store, Universe::External, sources.external[id]);
        match max_criticality(store, signals) {
            Some(Criticality::High) => stats.high_critical_files += 1,
            Some(Criticality::Medium) => stats.medium_critical_files += 1,
            None => {}
        }
    }
    tracing::debug!(
        version = stats.store_version,
        files = stats.total_files,
        confirmed = stats.confirmed,
        "progress statistics computed"
    );
    stats
}

/// Next file after `current` (pre-order, wrapping around) that is not
/// confirmed. `current` itself is considered last.
pub fn next_unconfirmed(
    tree: &ResourceTree,
    store: &AttributionStore,
    current: &str,
) -> CoreResult<Option<String>> {
    let current_id = tree.require(current)?;
    let order = tree.pre_order();
    let start = order
        .iter()
        .position(|&id| id == current_id)
        .map(|p| p + 1)
        .unwrap_or(0);
    let sources = Sources::new(tree, store);
    let found = order[start..]
        .iter()
        .chain(order[..start].iter())
        .copied()
        .filter(|&id| tree.node(id).is_file())
        .find(|&id| classify(tree, store, &sources, id) != ProgressBucket::Confirmed);
    Ok(found.map(|id| tree.node(id).path.clone()))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LicenseCounts {
    /// Visible signals per source display name.
    pub signals_per_source: BTreeMap<String, usize>,
    pub manual: usize,
    pub high_critical: usize,
    pub medium_critical: usize,
}

/// Per license name: how often scanners reported it and how often the
/// auditor attributed it.
pub fn license_statistics(
    store: &AttributionStore,
    sources: &SourceRegistry,
) -> BTreeMap<String, LicenseCounts> {
    let mut out: BTreeMap<String, LicenseCounts> = BTreeMap::new();
    for (id, info) in store.external().entities() {
        if store.is_hidden(id) {
            continue;
        }
        let Some(license) = info.license_name.as_deref().map(str::trim) else {
            continue;
        };
        if license.is_empty() {
            continue;
        }
        let counts = out.entry(license.to_string()).or_default();
        let source = info
            .source
            .as_ref()
            .map(|s| sources.display_name(&s.name).to_string())
            .unwrap_or_default();
        *counts.signals_per_source.entry(source).or_default() += 1;
        match info.criticality {
            Some(Criticality::High) => counts.high_critical += 1,
            Some(Criticality::Medium) => counts.medium_critical += 1,
            None => {}
        }
    }
    for info in store.manual().entities().values() {
        if let Some(license) = info.license_name.as_deref().map(str::trim) {
            if !license.is_empty() {
                out.entry(license.to_string()).or_default().manual += 1;
            }
        }
    }
    out
}

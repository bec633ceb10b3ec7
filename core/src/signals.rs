use crate::error::CoreResult;
use crate::model::attribution::{AttributionId, PackageInfo, Universe};
use crate::model::resource::ResourceTree;
use crate::resolve::AggregateCache;
use crate::sources::SourceRegistry;
use crate::store::AttributionStore;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// External attributions with identical content, shown and hidden as one.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MergedSignal {
    pub representative: AttributionId,
    pub member_ids: Vec<AttributionId>,
    pub content_hash: Option<String>,
    pub info: PackageInfo,
    pub hidden: bool,
    pub source_display_name: Option<String>,
    pub priority: i32,
}

/// Field values of the first member, comments concatenated (no repeats)
/// and origin ids unioned across all members.
pub(crate) fn merge_members(
    store: &AttributionStore,
    members: &[AttributionId],
) -> Option<PackageInfo> {
    let mut info = members.iter().find_map(|id| store.get(id))?.clone();
    let mut comments: Vec<String> = Vec::new();
    let mut origins: BTreeSet<String> = BTreeSet::new();
    for (id, member) in members.iter().filter_map(|id| store.get(id).map(|i| (id, i))) {
        for c in &member.comments {
            if !c.trim().is_empty() && !comments.contains(c) {
                comments.push(c.clone());
            }
        }
        if member.origin_ids.is_empty() {
            origins.insert(id.to_string());
        } else {
            origins.extend(member.origin_ids.iter().cloned());
        }
    }
    info.comments = comments;
    info.origin_ids = origins.into_iter().collect();
    Some(info)
}

pub fn merge_signals<'a>(
    store: &AttributionStore,
    sources: &SourceRegistry,
    ids: impl IntoIterator<Item = &'a AttributionId>,
    include_hidden: bool,
) -> Vec<MergedSignal> {
    let mut groups: BTreeMap<String, Vec<AttributionId>> = BTreeMap::new();
    let mut seen = BTreeSet::new();
    for id in ids {
        if store.external().entity(id).is_none() || !seen.insert(id.clone()) {
            continue;
        }
        if !include_hidden && store.is_hidden(id) {
            continue;
        }
        let key = match store.content_hash(id) {
            Some(h) => format!("h:{}", h),
            None => format!("i:{}", id),
        };
        groups.entry(key).or_default().push(id.clone());
    }

    let mut out: Vec<MergedSignal> = groups
        .into_values()
        .filter_map(|mut members| {
            members.sort();
            let info = merge_members(store, &members)?;
            let representative = members[0].clone();
            let source_display_name = info
                .source
                .as_ref()
                .map(|s| sources.display_name(&s.name).to_string());
            Some(MergedSignal {
                content_hash: store.content_hash(&representative).map(str::to_string),
                hidden: store.is_hidden(&representative),
                priority: sources.priority_of(&info),
                source_display_name,
                representative,
                member_ids: members,
                info,
            })
        })
        .collect();
    out.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.info.display_name().cmp(&b.info.display_name()))
            .then_with(|| a.representative.cmp(&b.representative))
    });
    out
}

/// Signals a resource owns directly (signals are never inherited here).
pub fn signals_on(
    tree: &ResourceTree,
    store: &AttributionStore,
    sources: &SourceRegistry,
    path: &str,
    include_hidden: bool,
) -> CoreResult<Vec<MergedSignal>> {
    tree.require(path)?;
    let ids = store.external().links().ids_at(path).unwrap_or_default();
    Ok(merge_signals(store, sources, ids, include_hidden))
}

pub fn signals_in_folder(
    tree: &ResourceTree,
    store: &AttributionStore,
    cache: &mut AggregateCache,
    sources: &SourceRegistry,
    path: &str,
    include_hidden: bool,
) -> CoreResult<Vec<MergedSignal>> {
    let id = tree.require(path)?;
    let aggregates = cache.get(tree, store, Universe::External);
    Ok(merge_signals(store, sources, aggregates.at(id), include_hidden))
}

use crate::error::CoreResult;
use crate::model::attribution::{AttributionId, PackageInfo, Universe};
use crate::model::resource::ResourceTree;
use crate::sources::{FrequentLicensesInput, SourceInfo};
use crate::store::integrity::{issue, IntegrityIssue, IntegritySummary};
use crate::store::{AttributionStore, UniverseTable};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMetadata {
    #[serde(default)]
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_creation_date: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttributionsBlock {
    #[serde(default)]
    pub attributions: BTreeMap<AttributionId, PackageInfo>,
    #[serde(default)]
    pub resources_to_attributions: BTreeMap<String, Vec<AttributionId>>,
}

/// Parsed project handed over by the file collaborator on open/import.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoadSnapshot {
    #[serde(default)]
    pub metadata: ProjectMetadata,
    #[serde(default)]
    pub resources: Value,
    #[serde(default)]
    pub manual_attributions: AttributionsBlock,
    #[serde(default)]
    pub external_attributions: AttributionsBlock,
    #[serde(default)]
    pub resolved_external_attributions: BTreeSet<AttributionId>,
    #[serde(default)]
    pub attribution_breakpoints: BTreeSet<String>,
    #[serde(default)]
    pub files_with_children: BTreeSet<String>,
    #[serde(default)]
    pub base_urls_for_sources: BTreeMap<String, Option<String>>,
    #[serde(default)]
    pub frequent_licenses: FrequentLicensesInput,
    #[serde(default)]
    pub external_attribution_sources: BTreeMap<String, SourceInfo>,
}

/// Everything the persistence collaborator writes back. Signals and
/// breakpoints are scanner input and never part of it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SavePayload {
    pub manual_attributions: BTreeMap<AttributionId, PackageInfo>,
    pub resources_to_attributions: BTreeMap<String, Vec<AttributionId>>,
    pub resolved_external_attributions: BTreeSet<AttributionId>,
}

pub trait ProjectPersistence {
    fn save(&mut self, payload: &SavePayload) -> Result<(), String>;
}

impl LoadSnapshot {
    pub fn from_json_slice(bytes: &[u8]) -> CoreResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// The snapshot a reopen would produce after `payload` was persisted.
    pub fn with_saved_state(mut self, payload: &SavePayload) -> Self {
        self.manual_attributions = AttributionsBlock {
            attributions: payload.manual_attributions.clone(),
            resources_to_attributions: payload.resources_to_attributions.clone(),
        };
        self.resolved_external_attributions = payload.resolved_external_attributions.clone();
        self
    }

    pub fn build(&self) -> CoreResult<(ResourceTree, AttributionStore)> {
        let (tree, store, _) = self.build_checked()?;
        Ok((tree, store))
    }

    /// Like [`LoadSnapshot::build`], also returning one issue per link,
    /// entity or hidden id that had to be dropped or repaired.
    pub fn build_checked(
        &self,
    ) -> CoreResult<(ResourceTree, AttributionStore, Vec<IntegrityIssue>)> {
        let tree = ResourceTree::from_resources(
            &self.resources,
            &self.attribution_breakpoints,
            &self.files_with_children,
        )?;
        let mut issues = Vec::new();
        let manual = build_table(&tree, &self.manual_attributions, Universe::Manual, &mut issues);
        let external =
            build_table(&tree, &self.external_attributions, Universe::External, &mut issues);
        let mut store = AttributionStore::from_tables(
            manual,
            external,
            self.resolved_external_attributions.clone(),
        )?;
        for id in &self.resolved_external_attributions {
            if store.external().entity(id).is_none() {
                issues.push(issue(
                    "CHK.HIDDEN.EXTERNAL_ONLY",
                    format!("hidden id {} is not a signal", id),
                ));
            }
        }
        issues.extend(widen_hidden_to_groups(&mut store));
        tracing::info!(
            resources = tree.len(),
            manual = store.manual().len(),
            external = store.external().len(),
            hidden = store.hidden_ids().len(),
            dropped = issues.len(),
            "project snapshot loaded"
        );
        Ok((tree, store, issues))
    }

    /// Integrity of the loaded store plus everything dropped on the way in.
    pub fn validate(&self) -> CoreResult<IntegritySummary> {
        let (tree, store, dropped) = self.build_checked()?;
        let mut summary = store.integrity_summary(&tree);
        summary.merge(dropped);
        Ok(summary)
    }
}

fn build_table(
    tree: &ResourceTree,
    block: &AttributionsBlock,
    universe: Universe,
    issues: &mut Vec<IntegrityIssue>,
) -> UniverseTable {
    let tag = match universe {
        Universe::Manual => "MANUAL",
        Universe::External => "EXTERNAL",
    };
    let mut table = UniverseTable::default();
    for (path, ids) in &block.resources_to_attributions {
        let Some(node) = tree.get(path) else {
            tracing::warn!(%path, ?universe, "dropping links of unknown resource");
            issues.push(issue(
                &format!("CHK.{}.UNKNOWN_RESOURCE", tag),
                format!("links at unknown resource {} dropped", path),
            ));
            continue;
        };
        if node.is_breakpoint {
            tracing::warn!(%path, ?universe, "dropping links on breakpoint");
            issues.push(issue(
                &format!("CHK.{}.BREAKPOINT_CLOSURE", tag),
                format!("links on breakpoint {} dropped", path),
            ));
            continue;
        }
        if ids.is_empty() && universe == Universe::Manual {
            table.links.ensure_entry(path);
            continue;
        }
        for id in ids {
            if block.attributions.contains_key(id) {
                table.links.insert(path, id);
            } else {
                tracing::warn!(%path, %id, ?universe, "dropping link to unknown attribution");
                issues.push(issue(
                    &format!("CHK.{}.DANGLING_LINK", tag),
                    format!("link from {} to missing entity {} dropped", path, id),
                ));
            }
        }
    }
    for (id, info) in &block.attributions {
        if table.links.link_count(id) > 0 {
            table.entities.insert(id.clone(), info.clone());
        } else {
            tracing::debug!(%id, ?universe, "dropping attribution without links");
            issues.push(issue(
                &format!("CHK.{}.NO_ORPHANS", tag),
                format!("{} has no links and was dropped", id),
            ));
        }
    }
    table
}

// Hiding acts on whole content-hash groups; a partially hidden group in the
// input is widened so that invariant holds from the start.
fn widen_hidden_to_groups(store: &mut AttributionStore) -> Vec<IntegrityIssue> {
    let widened: BTreeSet<AttributionId> = store
        .hidden_ids()
        .iter()
        .flat_map(|id| store.hash_group(id))
        .collect();
    let added: Vec<IntegrityIssue> = widened
        .iter()
        .filter(|id| !store.is_hidden(id))
        .map(|id| {
            issue(
                "CHK.HIDDEN.WHOLE_GROUP",
                format!("{} hidden along with its hash group", id),
            )
        })
        .collect();
    if !added.is_empty() {
        tracing::debug!(
            before = store.hidden_ids().len(),
            after = widened.len(),
            "widened hidden signals to their hash groups"
        );
        *store.hidden_mut() = widened;
    }
    added
}

impl AttributionStore {
    pub fn save_payload(&self) -> SavePayload {
        SavePayload {
            manual_attributions: self.manual().entities().clone(),
            resources_to_attributions: self
                .manual()
                .links()
                .entries()
                .map(|(path, ids)| (path.clone(), ids.to_vec()))
                .collect(),
            resolved_external_attributions: self.hidden_ids().clone(),
        }
    }
}

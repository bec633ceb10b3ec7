use crate::determinism::ids::new_manual_id;
use crate::error::{CoreError, CoreResult};
use crate::model::attribution::{AttributionId, Confidence, PackageInfo, Universe};
use crate::model::resource::ResourceTree;
use crate::signals::merge_members;
use crate::store::AttributionStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Whether a change applies to one resource (fork and relink) or to every
/// resource sharing the attribution (edit the entity in place).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationScope {
    Local,
    Global,
}

/// What one committed transaction did to the store.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct MutationReport {
    pub operation: &'static str,
    pub changed: bool,
    pub version: u64,
    pub created: Vec<AttributionId>,
    pub updated: Vec<AttributionId>,
    pub deleted: Vec<AttributionId>,
    pub linked: Vec<(String, AttributionId)>,
    pub unlinked: Vec<(String, AttributionId)>,
    pub hidden: Vec<AttributionId>,
    pub unhidden: Vec<AttributionId>,
}

impl MutationReport {
    fn new(operation: &'static str) -> Self {
        Self {
            operation,
            ..Self::default()
        }
    }

    fn touched(&self) -> bool {
        !(self.created.is_empty()
            && self.updated.is_empty()
            && self.deleted.is_empty()
            && self.linked.is_empty()
            && self.unlinked.is_empty()
            && self.hidden.is_empty()
            && self.unhidden.is_empty())
    }
}

fn rejected(err: CoreError) -> CoreError {
    if err.is_invariant_violation() {
        tracing::warn!(%err, "mutation rejected");
    }
    err
}

impl AttributionStore {
    fn finish(&mut self, mut report: MutationReport) -> MutationReport {
        report.changed = report.touched() || report.changed;
        report.version = if report.changed {
            self.bump()
        } else {
            self.version()
        };
        tracing::debug!(
            operation = report.operation,
            changed = report.changed,
            version = report.version,
            "mutation committed"
        );
        report
    }

    fn check_writable(&self, tree: &ResourceTree, path: &str) -> CoreResult<()> {
        let id = tree.require(path)?;
        if tree.node(id).is_breakpoint {
            return Err(CoreError::BreakpointViolation {
                path: path.to_string(),
            });
        }
        Ok(())
    }

    fn check_manual(&self, id: &AttributionId) -> CoreResult<&PackageInfo> {
        match self.require(id)? {
            (Universe::Manual, info) => Ok(info),
            (Universe::External, _) => Err(CoreError::ImmutableSignal(id.to_string())),
        }
    }

    fn check_owned(&self, path: &str, id: &AttributionId) -> CoreResult<()> {
        if !self.manual().links().is_linked(path, id) {
            return Err(CoreError::NotLinked {
                path: path.to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    fn fresh_manual_id(&self) -> AttributionId {
        loop {
            let id = AttributionId::new(new_manual_id());
            if self.universe_of(&id).is_none() {
                return id;
            }
        }
    }

    fn apply_link(&mut self, path: &str, id: &AttributionId, report: &mut MutationReport) {
        if self.table_mut(Universe::Manual).links.insert(path, id) {
            report.linked.push((path.to_string(), id.clone()));
        }
    }

    fn apply_unlink(&mut self, path: &str, id: &AttributionId, report: &mut MutationReport) {
        if self.table_mut(Universe::Manual).links.remove(path, id) {
            report.unlinked.push((path.to_string(), id.clone()));
            if self.collect_if_orphan(Universe::Manual, id) {
                report.deleted.push(id.clone());
            }
        }
    }

    fn apply_swap(
        &mut self,
        path: &str,
        old: &AttributionId,
        new: &AttributionId,
        report: &mut MutationReport,
    ) {
        let already = self.manual().links().is_linked(path, new);
        if self.table_mut(Universe::Manual).links.swap(path, old, new) {
            report.unlinked.push((path.to_string(), old.clone()));
            if !already {
                report.linked.push((path.to_string(), new.clone()));
            }
            if self.collect_if_orphan(Universe::Manual, old) {
                report.deleted.push(old.clone());
            }
        }
    }

    fn apply_insert(&mut self, info: PackageInfo, report: &mut MutationReport) -> AttributionId {
        let id = self.fresh_manual_id();
        self.table_mut(Universe::Manual)
            .entities
            .insert(id.clone(), info);
        report.created.push(id.clone());
        id
    }

    // Fork: copy with the edit applied goes where the original sat at `path`;
    // every other resource keeps the untouched original.
    fn apply_fork(
        &mut self,
        path: &str,
        id: &AttributionId,
        info: PackageInfo,
        report: &mut MutationReport,
    ) -> AttributionId {
        let fork = self.apply_insert(info, report);
        self.apply_swap(path, id, &fork, report);
        fork
    }

    fn apply_global_delete(&mut self, id: &AttributionId, report: &mut MutationReport) {
        let paths = self.table_mut(Universe::Manual).links.remove_all_of(id);
        for p in paths {
            report.unlinked.push((p, id.clone()));
        }
        if self.collect_if_orphan(Universe::Manual, id) {
            report.deleted.push(id.clone());
        }
    }

    /// Adds `id` to `path`'s own links. Signals cannot be linked by hand.
    pub fn link(
        &mut self,
        tree: &ResourceTree,
        path: &str,
        id: &AttributionId,
    ) -> CoreResult<MutationReport> {
        self.check_writable(tree, path).map_err(rejected)?;
        self.check_manual(id).map_err(rejected)?;
        let mut report = MutationReport::new("ATTRIBUTION_LINKED");
        self.apply_link(path, id, &mut report);
        Ok(self.finish(report))
    }

    pub fn unlink(
        &mut self,
        tree: &ResourceTree,
        path: &str,
        id: &AttributionId,
    ) -> CoreResult<MutationReport> {
        tree.require(path).map_err(rejected)?;
        self.check_manual(id).map_err(rejected)?;
        self.check_owned(path, id).map_err(rejected)?;
        let mut report = MutationReport::new("ATTRIBUTION_UNLINKED");
        self.apply_unlink(path, id, &mut report);
        Ok(self.finish(report))
    }

    /// Explicit empty entry: `path` stops inheriting from its ancestors.
    pub fn override_parent(
        &mut self,
        tree: &ResourceTree,
        path: &str,
    ) -> CoreResult<MutationReport> {
        self.check_writable(tree, path).map_err(rejected)?;
        let mut report = MutationReport::new("PARENT_OVERRIDDEN");
        if self.table_mut(Universe::Manual).links.ensure_entry(path) {
            report.changed = true;
        }
        Ok(self.finish(report))
    }

    /// New manual attribution linked at `path`.
    pub fn create(
        &mut self,
        tree: &ResourceTree,
        path: &str,
        info: PackageInfo,
    ) -> CoreResult<(AttributionId, MutationReport)> {
        self.check_writable(tree, path).map_err(rejected)?;
        let mut report = MutationReport::new("ATTRIBUTION_CREATED");
        let id = self.apply_insert(info, &mut report);
        self.apply_link(path, &id, &mut report);
        Ok((id, self.finish(report)))
    }

    fn validate_delete(
        &self,
        tree: &ResourceTree,
        path: &str,
        id: &AttributionId,
        scope: MutationScope,
    ) -> CoreResult<()> {
        match scope {
            MutationScope::Local => {
                self.check_writable(tree, path)?;
                self.check_manual(id)?;
                self.check_owned(path, id)
            }
            MutationScope::Global => {
                tree.require(path)?;
                self.check_manual(id).map(|_| ())
            }
        }
    }

    fn apply_delete(
        &mut self,
        path: &str,
        id: &AttributionId,
        scope: MutationScope,
        report: &mut MutationReport,
    ) {
        match scope {
            MutationScope::Local => self.apply_unlink(path, id, report),
            MutationScope::Global => self.apply_global_delete(id, report),
        }
    }

    pub fn delete(
        &mut self,
        tree: &ResourceTree,
        path: &str,
        id: &AttributionId,
        scope: MutationScope,
    ) -> CoreResult<MutationReport> {
        self.validate_delete(tree, path, id, scope)
            .map_err(rejected)?;
        let mut report = MutationReport::new("ATTRIBUTION_DELETED");
        self.apply_delete(path, id, scope, &mut report);
        Ok(self.finish(report))
    }

    pub fn delete_selected(
        &mut self,
        tree: &ResourceTree,
        path: &str,
        ids: &BTreeSet<AttributionId>,
        scope: MutationScope,
    ) -> CoreResult<MutationReport> {
        for id in ids {
            self.validate_delete(tree, path, id, scope)
                .map_err(rejected)?;
        }
        let mut report = MutationReport::new("ATTRIBUTION_DELETED");
        for id in ids {
            self.apply_delete(path, id, scope, &mut report);
        }
        Ok(self.finish(report))
    }

    fn validate_confirm(
        &self,
        tree: &ResourceTree,
        path: &str,
        id: &AttributionId,
        scope: MutationScope,
    ) -> CoreResult<()> {
        self.check_writable(tree, path)?;
        self.check_manual(id)?;
        if scope == MutationScope::Local {
            self.check_owned(path, id)?;
        }
        Ok(())
    }

    fn apply_confirm(
        &mut self,
        path: &str,
        id: &AttributionId,
        scope: MutationScope,
        report: &mut MutationReport,
    ) {
        let Some(current) = self.manual().entity(id) else {
            return;
        };
        if !current.pre_selected {
            return;
        }
        let mut confirmed = current.clone();
        confirmed.pre_selected = false;
        match scope {
            MutationScope::Global => {
                self.table_mut(Universe::Manual)
                    .entities
                    .insert(id.clone(), confirmed);
                report.updated.push(id.clone());
            }
            MutationScope::Local => {
                self.apply_fork(path, id, confirmed, report);
            }
        }
    }

    /// Marks a pre-selected attribution as reviewed.
    pub fn confirm(
        &mut self,
        tree: &ResourceTree,
        path: &str,
        id: &AttributionId,
        scope: MutationScope,
    ) -> CoreResult<MutationReport> {
        self.validate_confirm(tree, path, id, scope)
            .map_err(rejected)?;
        let mut report = MutationReport::new("ATTRIBUTION_CONFIRMED");
        self.apply_confirm(path, id, scope, &mut report);
        Ok(self.finish(report))
    }

    pub fn confirm_selected(
        &mut self,
        tree: &ResourceTree,
        path: &str,
        ids: &BTreeSet<AttributionId>,
        scope: MutationScope,
    ) -> CoreResult<MutationReport> {
        for id in ids {
            self.validate_confirm(tree, path, id, scope)
                .map_err(rejected)?;
        }
        let mut report = MutationReport::new("ATTRIBUTION_CONFIRMED");
        for id in ids {
            self.apply_confirm(path, id, scope, &mut report);
        }
        Ok(self.finish(report))
    }

    /// Replaces the fields of `id`. Returns the id now holding the edit at
    /// `path`: a fork when local scope hits a record other resources share,
    /// `id` itself otherwise.
    pub fn update(
        &mut self,
        tree: &ResourceTree,
        path: &str,
        id: &AttributionId,
        info: PackageInfo,
        scope: MutationScope,
    ) -> CoreResult<(AttributionId, MutationReport)> {
        self.check_writable(tree, path).map_err(rejected)?;
        let current = self.check_manual(id).map_err(rejected)?;
        if scope == MutationScope::Local {
            self.check_owned(path, id).map_err(rejected)?;
        }
        let mut report = MutationReport::new("ATTRIBUTION_UPDATED");
        if *current == info {
            return Ok((id.clone(), self.finish(report)));
        }
        let shared = self.manual().links().link_count(id) > 1;
        let holder = match scope {
            MutationScope::Local if shared => self.apply_fork(path, id, info, &mut report),
            MutationScope::Global | MutationScope::Local => {
                self.table_mut(Universe::Manual)
                    .entities
                    .insert(id.clone(), info);
                report.updated.push(id.clone());
                id.clone()
            }
        };
        Ok((holder, self.finish(report)))
    }

    /// Moves every link of `marked` onto `target`; `marked` disappears.
    pub fn replace(
        &mut self,
        marked: &AttributionId,
        target: &AttributionId,
    ) -> CoreResult<MutationReport> {
        let mut report = MutationReport::new("ATTRIBUTION_REPLACED");
        self.check_manual(target).map_err(rejected)?;
        if marked == target {
            return Ok(self.finish(report));
        }
        match self.universe_of(marked) {
            None => return Ok(self.finish(report)),
            Some(Universe::External) => {
                return Err(rejected(CoreError::ImmutableSignal(marked.to_string())))
            }
            Some(Universe::Manual) => {}
        }
        let paths: Vec<String> = self.manual().links().paths_of(marked).cloned().collect();
        for path in &paths {
            self.apply_swap(path, marked, target, &mut report);
        }
        if self.collect_if_orphan(Universe::Manual, marked) {
            report.deleted.push(marked.clone());
        }
        Ok(self.finish(report))
    }

    fn signal_group(&self, id: &AttributionId) -> CoreResult<Vec<AttributionId>> {
        match self.require(id)? {
            (Universe::External, _) => Ok(self.hash_group(id)),
            (Universe::Manual, _) => Err(CoreError::InvalidInput(format!(
                "{} is not a signal and cannot be hidden",
                id
            ))),
        }
    }

    fn apply_hidden(&mut self, group: Vec<AttributionId>, hide: bool, report: &mut MutationReport) {
        for member in group {
            if hide {
                if self.hidden_mut().insert(member.clone()) {
                    report.hidden.push(member);
                }
            } else if self.hidden_mut().remove(&member) {
                report.unhidden.push(member);
            }
        }
    }

    /// Hides the whole merged signal `id` belongs to.
    pub fn hide(&mut self, id: &AttributionId) -> CoreResult<MutationReport> {
        self.hide_selected(&BTreeSet::from([id.clone()]))
    }

    pub fn unhide(&mut self, id: &AttributionId) -> CoreResult<MutationReport> {
        self.unhide_selected(&BTreeSet::from([id.clone()]))
    }

    pub fn hide_selected(&mut self, ids: &BTreeSet<AttributionId>) -> CoreResult<MutationReport> {
        self.set_hidden(ids, true, "SIGNALS_HIDDEN")
    }

    pub fn unhide_selected(&mut self, ids: &BTreeSet<AttributionId>) -> CoreResult<MutationReport> {
        self.set_hidden(ids, false, "SIGNALS_UNHIDDEN")
    }

    fn set_hidden(
        &mut self,
        ids: &BTreeSet<AttributionId>,
        hide: bool,
        operation: &'static str,
    ) -> CoreResult<MutationReport> {
        let mut groups = Vec::with_capacity(ids.len());
        for id in ids {
            groups.push(self.signal_group(id).map_err(rejected)?);
        }
        let mut report = MutationReport::new(operation);
        for group in groups {
            self.apply_hidden(group, hide, &mut report);
        }
        Ok(self.finish(report))
    }

    /// Turns a (possibly merged) signal into a manual attribution on `path`.
    /// The signal itself is left as it is.
    pub fn promote(
        &mut self,
        tree: &ResourceTree,
        signal_id: &AttributionId,
        path: &str,
        default_confidence: Confidence,
    ) -> CoreResult<(AttributionId, MutationReport)> {
        self.check_writable(tree, path).map_err(rejected)?;
        let group = self.signal_group(signal_id).map_err(rejected)?;
        let info = self.merged_info(&group, default_confidence)?;
        let mut report = MutationReport::new("SIGNAL_PROMOTED");
        let id = self.apply_insert(info, &mut report);
        self.apply_link(path, &id, &mut report);
        Ok((id, self.finish(report)))
    }

    fn merged_info(
        &self,
        group: &[AttributionId],
        default_confidence: Confidence,
    ) -> CoreResult<PackageInfo> {
        let mut info = merge_members(self, group)
            .ok_or_else(|| CoreError::UnknownAttribution(format!("{:?}", group)))?;
        info.attribution_confidence = Some(info.confidence_or(default_confidence));
        info.pre_selected = false;
        Ok(info)
    }
}

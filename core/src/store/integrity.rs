use super::AttributionStore;
use crate::model::attribution::Universe;
use crate::model::resource::ResourceTree;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntegrityIssue {
    pub check_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegritySummary {
    pub overall: String, // PASS|FAIL
    pub store_version: u64,
    pub manual_count: usize,
    pub external_count: usize,
    pub hidden_count: usize,
    pub issues: Vec<IntegrityIssue>,
}

impl AttributionStore {
    pub fn verify_integrity(&self, tree: &ResourceTree) -> Vec<IntegrityIssue> {
        let mut issues = Vec::new();
        for universe in [Universe::Manual, Universe::External] {
            let table = self.table(universe);
            let tag = match universe {
                Universe::Manual => "MANUAL",
                Universe::External => "EXTERNAL",
            };
            for id in table.ids() {
                if table.links.link_count(id) == 0 {
                    issues.push(issue(
                        &format!("CHK.{}.NO_ORPHANS", tag),
                        format!("{} has no links", id),
                    ));
                }
            }
            for id in table.links.linked_ids() {
                if !table.entities.contains_key(id) {
                    issues.push(issue(
                        &format!("CHK.{}.DANGLING_LINK", tag),
                        format!("link references missing entity {}", id),
                    ));
                }
            }
            for (path, _) in table.links.entries() {
                match tree.get(path) {
                    None => issues.push(issue(
                        &format!("CHK.{}.UNKNOWN_RESOURCE", tag),
                        format!("link entry at unknown resource {}", path),
                    )),
                    Some(node) if node.is_breakpoint => issues.push(issue(
                        &format!("CHK.{}.BREAKPOINT_CLOSURE", tag),
                        format!("breakpoint {} holds a link entry", path),
                    )),
                    Some(_) => {}
                }
            }
        }
        for id in self.manual().ids() {
            if self.external().entity(id).is_some() {
                issues.push(issue(
                    "CHK.UNIVERSE_SEPARATION",
                    format!("{} exists in both universes", id),
                ));
            }
        }
        for id in self.hidden_ids() {
            if self.external().entity(id).is_none() {
                issues.push(issue(
                    "CHK.HIDDEN.EXTERNAL_ONLY",
                    format!("hidden id {} is not a signal", id),
                ));
            }
            if self.hash_group(id).iter().any(|m| !self.is_hidden(m)) {
                issues.push(issue(
                    "CHK.HIDDEN.WHOLE_GROUP",
                    format!("hash group of {} is only partly hidden", id),
                ));
            }
        }
        issues
    }

    pub fn integrity_summary(&self, tree: &ResourceTree) -> IntegritySummary {
        let issues = self.verify_integrity(tree);
        IntegritySummary {
            overall: if issues.is_empty() { "PASS" } else { "FAIL" }.to_string(),
            store_version: self.version(),
            manual_count: self.manual().len(),
            external_count: self.external().len(),
            hidden_count: self.hidden_ids().len(),
            issues,
        }
    }
}

impl IntegritySummary {
    /// Adds issues found outside the store, such as input dropped at load.
    pub fn merge(&mut self, issues: impl IntoIterator<Item = IntegrityIssue>) {
        self.issues.extend(issues);
        if !self.issues.is_empty() {
            self.overall = "FAIL".to_string();
        }
    }
}

pub(crate) fn issue(check_id: &str, message: String) -> IntegrityIssue {
    IntegrityIssue {
        check_id: check_id.to_string(),
        message,
    }
}

use crate::model::attribution::AttributionId;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// `resource path -> ordered set of ids`, with the reverse index kept in step.
///
/// An entry may exist with no ids: that is an explicit "do not inherit"
/// marker created by overriding the parent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkTable {
    by_path: BTreeMap<String, Vec<AttributionId>>,
    by_id: HashMap<AttributionId, BTreeSet<String>>,
}

impl LinkTable {
    pub fn has_entry(&self, path: &str) -> bool {
        self.by_path.contains_key(path)
    }

    pub fn ids_at(&self, path: &str) -> Option<&[AttributionId]> {
        self.by_path.get(path).map(Vec::as_slice)
    }

    pub fn is_linked(&self, path: &str, id: &AttributionId) -> bool {
        self.by_id
            .get(id)
            .map(|paths| paths.contains(path))
            .unwrap_or(false)
    }

    pub fn paths_of(&self, id: &AttributionId) -> impl Iterator<Item = &String> + '_ {
        self.by_id.get(id).into_iter().flat_map(|paths| paths.iter())
    }

    pub fn link_count(&self, id: &AttributionId) -> usize {
        self.by_id.get(id).map(BTreeSet::len).unwrap_or(0)
    }

    pub fn linked_ids(&self) -> impl Iterator<Item = &AttributionId> + '_ {
        self.by_id.keys()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &[AttributionId])> + '_ {
        self.by_path.iter().map(|(p, ids)| (p, ids.as_slice()))
    }

    pub fn entry_count(&self) -> usize {
        self.by_path.len()
    }

    pub(crate) fn insert(&mut self, path: &str, id: &AttributionId) -> bool {
        let ids = self.by_path.entry(path.to_string()).or_default();
        if ids.contains(id) {
            return false;
        }
        ids.push(id.clone());
        self.by_id
            .entry(id.clone())
            .or_default()
            .insert(path.to_string());
        true
    }

    /// Removes one link. Dropping the last id of a resource drops its entry,
    /// so the resource inherits again.
    pub(crate) fn remove(&mut self, path: &str, id: &AttributionId) -> bool {
        let Some(ids) = self.by_path.get_mut(path) else {
            return false;
        };
        let before = ids.len();
        ids.retain(|x| x != id);
        if ids.len() == before {
            return false;
        }
        if ids.is_empty() {
            self.by_path.remove(path);
        }
        if let Some(paths) = self.by_id.get_mut(id) {
            paths.remove(path);
            if paths.is_empty() {
                self.by_id.remove(id);
            }
        }
        true
    }

    /// Puts `new` where `old` sat in `path`'s ordered set; if `new` is
    /// already there, `old` is just removed.
    pub(crate) fn swap(&mut self, path: &str, old: &AttributionId, new: &AttributionId) -> bool {
        if !self.is_linked(path, old) {
            return false;
        }
        if self.is_linked(path, new) {
            return self.remove(path, old);
        }
        if let Some(ids) = self.by_path.get_mut(path) {
            for slot in ids.iter_mut() {
                if slot == old {
                    *slot = new.clone();
                }
            }
        }
        if let Some(paths) = self.by_id.get_mut(old) {
            paths.remove(path);
            if paths.is_empty() {
                self.by_id.remove(old);
            }
        }
        self.by_id
            .entry(new.clone())
            .or_default()
            .insert(path.to_string());
        true
    }

    pub(crate) fn ensure_entry(&mut self, path: &str) -> bool {
        if self.by_path.contains_key(path) {
            return false;
        }
        self.by_path.insert(path.to_string(), Vec::new());
        true
    }

    pub(crate) fn remove_all_of(&mut self, id: &AttributionId) -> Vec<String> {
        let paths: Vec<String> = self.paths_of(id).cloned().collect();
        for p in &paths {
            self.remove(p, id);
        }
        paths
    }
}

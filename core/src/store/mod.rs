pub mod integrity;
pub mod links;

use crate::determinism::canonical::content_hash;
use crate::error::{CoreError, CoreResult};
use crate::model::attribution::{AttributionId, PackageInfo, Universe};
use links::LinkTable;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// Entity table plus link table of one universe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UniverseTable {
    pub(crate) entities: BTreeMap<AttributionId, PackageInfo>,
    pub(crate) links: LinkTable,
}

impl UniverseTable {
    pub fn entity(&self, id: &AttributionId) -> Option<&PackageInfo> {
        self.entities.get(id)
    }

    pub fn entities(&self) -> &BTreeMap<AttributionId, PackageInfo> {
        &self.entities
    }

    pub fn links(&self) -> &LinkTable {
        &self.links
    }

    pub fn ids(&self) -> impl Iterator<Item = &AttributionId> + '_ {
        self.entities.keys()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// The in-memory attribution state of one loaded project.
///
/// Cloning is cheap: the tables sit behind `Arc` and are copied on first
/// write, so a clone handed to the recompute worker stays frozen.
#[derive(Debug, Clone, Default)]
pub struct AttributionStore {
    manual: Arc<UniverseTable>,
    external: Arc<UniverseTable>,
    hidden: Arc<BTreeSet<AttributionId>>,
    hash_index: Arc<HashMap<AttributionId, String>>,
    hash_groups: Arc<BTreeMap<String, Vec<AttributionId>>>,
    version: u64,
}

impl AttributionStore {
    pub(crate) fn from_tables(
        manual: UniverseTable,
        external: UniverseTable,
        hidden: BTreeSet<AttributionId>,
    ) -> CoreResult<Self> {
        if let Some(id) = manual.ids().find(|id| external.entities.contains_key(*id)) {
            return Err(CoreError::InvalidInput(format!(
                "attribution id {} is both manual and external",
                id
            )));
        }
        let mut hash_index = HashMap::new();
        let mut hash_groups: BTreeMap<String, Vec<AttributionId>> = BTreeMap::new();
        for (id, info) in &external.entities {
            let hash = content_hash(&info.identity())?;
            hash_groups.entry(hash.clone()).or_default().push(id.clone());
            hash_index.insert(id.clone(), hash);
        }
        let hidden = hidden
            .into_iter()
            .filter(|id| external.entities.contains_key(id))
            .collect();
        Ok(Self {
            manual: Arc::new(manual),
            external: Arc::new(external),
            hidden: Arc::new(hidden),
            hash_index: Arc::new(hash_index),
            hash_groups: Arc::new(hash_groups),
            version: 1,
        })
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn bump(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    pub fn table(&self, universe: Universe) -> &UniverseTable {
        match universe {
            Universe::Manual => &self.manual,
            Universe::External => &self.external,
        }
    }

    pub(crate) fn table_mut(&mut self, universe: Universe) -> &mut UniverseTable {
        match universe {
            Universe::Manual => Arc::make_mut(&mut self.manual),
            Universe::External => Arc::make_mut(&mut self.external),
        }
    }

    pub fn manual(&self) -> &UniverseTable {
        &self.manual
    }

    pub fn external(&self) -> &UniverseTable {
        &self.external
    }

    pub fn universe_of(&self, id: &AttributionId) -> Option<Universe> {
        if self.manual.entities.contains_key(id) {
            Some(Universe::Manual)
        } else if self.external.entities.contains_key(id) {
            Some(Universe::External)
        } else {
            None
        }
    }

    pub fn get(&self, id: &AttributionId) -> Option<&PackageInfo> {
        self.manual
            .entities
            .get(id)
            .or_else(|| self.external.entities.get(id))
    }

    pub fn require(&self, id: &AttributionId) -> CoreResult<(Universe, &PackageInfo)> {
        if let Some(info) = self.manual.entities.get(id) {
            return Ok((Universe::Manual, info));
        }
        if let Some(info) = self.external.entities.get(id) {
            return Ok((Universe::External, info));
        }
        Err(CoreError::UnknownAttribution(id.to_string()))
    }

    pub fn is_hidden(&self, id: &AttributionId) -> bool {
        self.hidden.contains(id)
    }

    pub fn hidden_ids(&self) -> &BTreeSet<AttributionId> {
        &self.hidden
    }

    pub(crate) fn hidden_mut(&mut self) -> &mut BTreeSet<AttributionId> {
        Arc::make_mut(&mut self.hidden)
    }

    pub fn content_hash(&self, id: &AttributionId) -> Option<&str> {
        self.hash_index.get(id).map(String::as_str)
    }

    /// Every external id sharing `id`'s content hash, or just `id` when it
    /// has none.
    pub fn hash_group(&self, id: &AttributionId) -> Vec<AttributionId> {
        self.hash_index
            .get(id)
            .and_then(|h| self.hash_groups.get(h))
            .cloned()
            .unwrap_or_else(|| vec![id.clone()])
    }

    pub fn hash_groups(&self) -> &BTreeMap<String, Vec<AttributionId>> {
        &self.hash_groups
    }

    /// Drops an entity once nothing links it any more, together with the
    /// signal indexes that mention it.
    pub(crate) fn collect_if_orphan(&mut self, universe: Universe, id: &AttributionId) -> bool {
        if self.table(universe).links.link_count(id) > 0 {
            return false;
        }
        if self.table_mut(universe).entities.remove(id).is_none() {
            return false;
        }
        if universe == Universe::External {
            if self.hidden.contains(id) {
                self.hidden_mut().remove(id);
            }
            if let Some(hash) = Arc::make_mut(&mut self.hash_index).remove(id) {
                let groups = Arc::make_mut(&mut self.hash_groups);
                if let Some(members) = groups.get_mut(&hash) {
                    members.retain(|m| m != id);
                    if members.is_empty() {
                        groups.remove(&hash);
                    }
                }
            }
        }
        true
    }
}

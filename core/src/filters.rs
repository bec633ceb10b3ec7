use crate::model::attribution::{AttributionId, Confidence, PackageInfo};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributionFilter {
    FirstParty,
    ThirdParty,
    NeedsFollowUp,
    PreSelected,
    Confirmed,
    ExcludedFromNotice,
    NeedsReview,
    CurrentlyPreferred,
    PreviouslyPreferred,
    LowConfidence,
    Incomplete,
}

impl AttributionFilter {
    pub const ALL: [AttributionFilter; 11] = [
        AttributionFilter::FirstParty,
        AttributionFilter::ThirdParty,
        AttributionFilter::NeedsFollowUp,
        AttributionFilter::PreSelected,
        AttributionFilter::Confirmed,
        AttributionFilter::ExcludedFromNotice,
        AttributionFilter::NeedsReview,
        AttributionFilter::CurrentlyPreferred,
        AttributionFilter::PreviouslyPreferred,
        AttributionFilter::LowConfidence,
        AttributionFilter::Incomplete,
    ];

    pub fn label(self) -> &'static str {
        match self {
            AttributionFilter::FirstParty => "First Party",
            AttributionFilter::ThirdParty => "Third Party",
            AttributionFilter::NeedsFollowUp => "Needs Follow-Up",
            AttributionFilter::PreSelected => "Pre-selected",
            AttributionFilter::Confirmed => "Confirmed",
            AttributionFilter::ExcludedFromNotice => "Excluded from Notice",
            AttributionFilter::NeedsReview => "Needs Review by QA",
            AttributionFilter::CurrentlyPreferred => "Currently Preferred",
            AttributionFilter::PreviouslyPreferred => "Previously Preferred",
            AttributionFilter::LowConfidence => "Low Confidence",
            AttributionFilter::Incomplete => "Incomplete",
        }
    }

    pub fn matches(self, info: &PackageInfo) -> bool {
        match self {
            AttributionFilter::FirstParty => info.first_party,
            AttributionFilter::ThirdParty => !info.first_party,
            AttributionFilter::NeedsFollowUp => info.follow_up,
            AttributionFilter::PreSelected => info.pre_selected,
            AttributionFilter::Confirmed => !info.pre_selected,
            AttributionFilter::ExcludedFromNotice => info.exclude_from_notice,
            AttributionFilter::NeedsReview => info.needs_review,
            AttributionFilter::CurrentlyPreferred => info.preferred,
            AttributionFilter::PreviouslyPreferred => info.was_preferred,
            AttributionFilter::LowConfidence => {
                info.attribution_confidence == Some(Confidence::Low)
            }
            AttributionFilter::Incomplete => !info.first_party && info.is_incomplete(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FilterOption {
    pub filter: AttributionFilter,
    pub label: &'static str,
    pub count: usize,
    pub selected: bool,
}

/// Selected filters (combined with AND), search text and the counts shown
/// next to each filter option.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    selected: BTreeSet<AttributionFilter>,
    search: String,
    counted_version: Option<u64>,
    counts: BTreeMap<AttributionFilter, usize>,
}

impl FilterState {
    pub fn selected(&self) -> &BTreeSet<AttributionFilter> {
        &self.selected
    }

    pub fn select(&mut self, filter: AttributionFilter) {
        self.selected.insert(filter);
        self.counted_version = None;
    }

    pub fn deselect(&mut self, filter: AttributionFilter) {
        self.selected.remove(&filter);
        self.counted_version = None;
    }

    pub fn toggle(&mut self, filter: AttributionFilter) {
        if self.selected.contains(&filter) {
            self.deselect(filter);
        } else {
            self.select(filter);
        }
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn set_search(&mut self, text: &str) {
        let text = text.trim().to_lowercase();
        if text != self.search {
            self.search = text;
            self.counted_version = None;
        }
    }

    fn search_matches(&self, info: &PackageInfo) -> bool {
        self.search.is_empty() || info.search_text().contains(&self.search)
    }

    pub fn matches(&self, info: &PackageInfo) -> bool {
        self.selected.iter().all(|f| f.matches(info)) && self.search_matches(info)
    }

    pub fn apply(&self, entities: &BTreeMap<AttributionId, PackageInfo>) -> Vec<AttributionId> {
        entities
            .iter()
            .filter(|(_, info)| self.matches(info))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Per filter: records of the current set (after search) it matches.
    pub fn counts_for(
        &self,
        entities: &BTreeMap<AttributionId, PackageInfo>,
    ) -> BTreeMap<AttributionFilter, usize> {
        let mut counts: BTreeMap<AttributionFilter, usize> =
            AttributionFilter::ALL.iter().map(|f| (*f, 0)).collect();
        for info in entities.values().filter(|info| self.search_matches(info)) {
            for f in AttributionFilter::ALL {
                if f.matches(info) {
                    *counts.entry(f).or_default() += 1;
                }
            }
        }
        counts
    }

    /// Recounts once per store version; selected filters whose count dropped
    /// to zero are deselected and returned.
    pub fn refresh(
        &mut self,
        version: u64,
        entities: &BTreeMap<AttributionId, PackageInfo>,
    ) -> Vec<AttributionFilter> {
        if self.counted_version == Some(version) {
            return Vec::new();
        }
        self.counts = self.counts_for(entities);
        let dropped: Vec<AttributionFilter> = self
            .selected
            .iter()
            .copied()
            .filter(|f| self.counts.get(f).copied().unwrap_or(0) == 0)
            .collect();
        for f in &dropped {
            tracing::debug!(filter = f.label(), "deselecting filter with no matches");
            self.selected.remove(f);
        }
        self.counted_version = Some(version);
        dropped
    }

    pub fn options(&self) -> Vec<FilterOption> {
        AttributionFilter::ALL
            .iter()
            .map(|f| FilterOption {
                filter: *f,
                label: f.label(),
                count: self.counts.get(f).copied().unwrap_or(0),
                selected: self.selected.contains(f),
            })
            .collect()
    }

    pub fn counts(&self) -> &BTreeMap<AttributionFilter, usize> {
        &self.counts
    }
}

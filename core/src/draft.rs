use crate::error::{CoreError, CoreResult};
use crate::model::attribution::{AttributionId, Confidence, PackageInfo};
use crate::model::purl::{parse_purl, validate_license_expression};
use crate::model::resource::ResourceTree;
use crate::mutate::{MutationReport, MutationScope};
use crate::sources::FrequentLicenses;
use crate::store::AttributionStore;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Short message for the user; transient notices dismiss themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub transient: bool,
}

impl Notice {
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
            transient: true,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
            transient: true,
        }
    }
}

/// The attribution being edited on one resource, next to what it was loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    pub resource: String,
    /// `None` while creating a new attribution.
    pub attribution_id: Option<AttributionId>,
    pub persisted: PackageInfo,
    pub edited: PackageInfo,
    /// Free purl text; may not parse.
    pub purl_text: String,
}

impl Draft {
    fn new(resource: &str, attribution_id: Option<AttributionId>, persisted: PackageInfo) -> Self {
        let purl_text = persisted.purl().unwrap_or_default();
        Self {
            resource: resource.to_string(),
            attribution_id,
            edited: persisted.clone(),
            persisted,
            purl_text,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.edited != self.persisted
            || self.purl_text != self.persisted.purl().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "target", rename_all = "snake_case")]
pub enum NavigationAction {
    SelectResource(String),
    SelectAttribution(Option<AttributionId>),
    SwitchView(String),
    OpenProject(String),
    ImportProject(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationDecision {
    Proceed(NavigationAction),
    /// Held until the pending draft is saved or discarded.
    Suspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Save,
    SaveGlobally,
    Discard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftOutcome {
    /// Navigation that was waiting on this resolution.
    pub resume: Option<NavigationAction>,
    /// Id now holding the saved draft.
    pub attribution_id: Option<AttributionId>,
    pub report: Option<MutationReport>,
}

#[derive(Debug, Clone, Default)]
pub struct DraftTracker {
    draft: Option<Draft>,
    pending: Option<NavigationAction>,
}

impl DraftTracker {
    pub fn current(&self) -> Option<&Draft> {
        self.draft.as_ref()
    }

    pub fn pending(&self) -> Option<&NavigationAction> {
        self.pending.as_ref()
    }

    pub fn is_dirty(&self) -> bool {
        self.draft.as_ref().is_some_and(Draft::is_dirty)
    }

    /// Starts editing, replacing a clean draft. A dirty draft stays and the
    /// selection is held as the pending navigation instead.
    pub fn begin(
        &mut self,
        resource: &str,
        attribution_id: Option<AttributionId>,
        persisted: PackageInfo,
    ) -> NavigationDecision {
        let action = match &attribution_id {
            Some(id) => NavigationAction::SelectAttribution(Some(id.clone())),
            None => NavigationAction::SelectResource(resource.to_string()),
        };
        if let NavigationDecision::Suspended = self.request_navigation(action.clone()) {
            return NavigationDecision::Suspended;
        }
        self.draft = Some(Draft::new(resource, attribution_id, persisted));
        NavigationDecision::Proceed(action)
    }

    /// Follows a committed mutation that touched the record being edited.
    /// Unsaved edits are kept; a clean draft whose record disappeared is
    /// closed.
    pub fn sync(&mut self, store: &AttributionStore, report: &MutationReport) {
        let Some(draft) = self.draft.as_mut() else {
            return;
        };
        let Some(id) = draft.attribution_id.clone() else {
            return;
        };
        let dirty = draft.is_dirty();

        // A local fork at the draft's resource takes over the record there.
        let forked = report
            .unlinked
            .iter()
            .any(|(path, old)| *path == draft.resource && *old == id)
            .then(|| {
                report
                    .linked
                    .iter()
                    .find(|(path, new)| *path == draft.resource && report.created.contains(new))
                    .map(|(_, new)| new.clone())
            })
            .flatten();
        let current = forked.clone().unwrap_or(id);

        match store.manual().entity(&current) {
            Some(info) if forked.is_some() || report.updated.contains(&current) => {
                draft.attribution_id = Some(current);
                draft.persisted = info.clone();
                if !dirty {
                    draft.edited = info.clone();
                    draft.purl_text = info.purl().unwrap_or_default();
                }
            }
            Some(_) => {}
            None if dirty => {
                tracing::debug!(id = %current, "edited record removed; draft kept as a new record");
                draft.attribution_id = None;
                draft.persisted = PackageInfo::default();
            }
            None => {
                tracing::debug!(id = %current, "edited record removed; draft closed");
                self.draft = None;
            }
        }
    }

    pub fn clear(&mut self) {
        self.draft = None;
        self.pending = None;
    }

    fn draft_mut(&mut self) -> CoreResult<&mut Draft> {
        self.draft
            .as_mut()
            .ok_or_else(|| CoreError::InvalidInput("no attribution is being edited".to_string()))
    }

    pub fn edit(&mut self, change: impl FnOnce(&mut PackageInfo)) -> CoreResult<()> {
        let draft = self.draft_mut()?;
        change(&mut draft.edited);
        Ok(())
    }

    /// Parses `text` into the package fields. Unparseable text is kept as
    /// typed and the package fields stay as they were.
    pub fn set_purl_text(&mut self, text: &str) -> CoreResult<Option<Notice>> {
        let draft = self.draft_mut()?;
        draft.purl_text = text.to_string();
        if text.trim().is_empty() {
            return Ok(None);
        }
        match parse_purl(text) {
            Ok(parsed) => {
                parsed.apply_to(&mut draft.edited);
                draft.purl_text = parsed.to_purl_string();
                Ok(None)
            }
            Err(err) => {
                tracing::debug!(%err, "purl text kept unparsed");
                Ok(Some(Notice::warning(err.to_string())))
            }
        }
    }

    /// Sets the license name, filling the text from presets when it is empty.
    pub fn set_license_name(
        &mut self,
        name: &str,
        presets: &FrequentLicenses,
    ) -> CoreResult<Option<Notice>> {
        let draft = self.draft_mut()?;
        let trimmed = name.trim();
        draft.edited.license_name = (!trimmed.is_empty()).then(|| trimmed.to_string());
        if trimmed.is_empty() {
            return Ok(None);
        }
        presets.fill_license_text(&mut draft.edited);
        Ok(validate_license_expression(trimmed)
            .err()
            .map(|err| Notice::warning(err.to_string())))
    }

    pub fn request_navigation(&mut self, action: NavigationAction) -> NavigationDecision {
        if self.is_dirty() {
            tracing::debug!(?action, "navigation suspended by unsaved changes");
            self.pending = Some(action);
            NavigationDecision::Suspended
        } else {
            self.pending = None;
            NavigationDecision::Proceed(action)
        }
    }

    /// Applies, or drops, the current draft and hands back the navigation
    /// that was waiting on it. A failed save keeps both the draft and the
    /// pending navigation.
    pub fn resolve(
        &mut self,
        resolution: Resolution,
        tree: &ResourceTree,
        store: &mut AttributionStore,
        default_confidence: Confidence,
    ) -> CoreResult<DraftOutcome> {
        let scope = match resolution {
            Resolution::Discard => {
                if let Some(draft) = self.draft.as_mut() {
                    draft.edited = draft.persisted.clone();
                    draft.purl_text = draft.persisted.purl().unwrap_or_default();
                }
                return Ok(DraftOutcome {
                    resume: self.pending.take(),
                    attribution_id: self.draft.as_ref().and_then(|d| d.attribution_id.clone()),
                    report: None,
                });
            }
            Resolution::Save => MutationScope::Local,
            Resolution::SaveGlobally => MutationScope::Global,
        };

        let draft = self.draft_mut()?;
        let mut info = draft.edited.clone();
        info.pre_selected = false;
        info.attribution_confidence = Some(info.confidence_or(default_confidence));

        let (holder, report) = match draft.attribution_id.as_ref() {
            Some(id) => store.update(tree, &draft.resource, id, info.clone(), scope)?,
            None => store.create(tree, &draft.resource, info.clone())?,
        };
        draft.attribution_id = Some(holder.clone());
        draft.purl_text = info.purl().unwrap_or_default();
        draft.persisted = info.clone();
        draft.edited = info;
        Ok(DraftOutcome {
            resume: self.pending.take(),
            attribution_id: Some(holder),
            report: Some(report),
        })
    }
}

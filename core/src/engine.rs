use crate::config::EngineConfig;
use crate::draft::{DraftOutcome, DraftTracker, NavigationAction, NavigationDecision, Notice, Resolution};
use crate::error::{CoreError, CoreResult};
use crate::export::{self, ExportKind};
use crate::filters::{AttributionFilter, FilterOption, FilterState};
use crate::journal::event::JournalEvent;
use crate::journal::log::MutationJournal;
use crate::model::attribution::{AttributionId, PackageInfo, Universe};
use crate::model::resource::ResourceTree;
use crate::mutate::{MutationReport, MutationScope};
use crate::progress::{self, LicenseCounts, ProgressBucket, ProgressStatistics};
use crate::resolve::{self, AggregateCache, Resolved};
use crate::signals::{self, MergedSignal};
use crate::snapshot::{LoadSnapshot, ProjectMetadata, ProjectPersistence, SavePayload};
use crate::sources::{BaseUrls, FrequentLicenses, SourceRegistry};
use crate::store::integrity::IntegritySummary;
use crate::store::AttributionStore;
use crate::worker::{compute_view, Debouncer, RecomputeWorker, ViewResult, ViewSnapshot};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

/// One loaded project: the store handle, its derived-view caches and the
/// edit session around it. Independent instances share nothing.
pub struct AttributionEngine {
    config: EngineConfig,
    metadata: ProjectMetadata,
    tree: Arc<ResourceTree>,
    store: AttributionStore,
    cache: AggregateCache,
    filters: FilterState,
    drafts: DraftTracker,
    sources: SourceRegistry,
    base_urls: BaseUrls,
    licenses: FrequentLicenses,
    journal: Option<MutationJournal>,
    worker: Option<RecomputeWorker>,
    search: Debouncer<String>,
    generation: u64,
    latest_view: Option<ViewResult>,
}

impl AttributionEngine {
    pub fn load(snapshot: &LoadSnapshot, config: EngineConfig) -> CoreResult<Self> {
        let (tree, store) = snapshot.build()?;
        let journal = config
            .journal_path
            .as_ref()
            .and_then(|path| match MutationJournal::open_or_create(path) {
                Ok(j) => Some(j),
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "journal unavailable");
                    None
                }
            });
        let worker = if config.worker_enabled {
            match RecomputeWorker::spawn() {
                Ok(w) => Some(w),
                Err(err) => {
                    tracing::warn!(%err, "recompute worker unavailable, computing in-line");
                    None
                }
            }
        } else {
            None
        };
        let mut engine = Self {
            search: Debouncer::new(Duration::from_millis(config.search_debounce_ms)),
            config,
            metadata: snapshot.metadata.clone(),
            tree: Arc::new(tree),
            store,
            cache: AggregateCache::default(),
            filters: FilterState::default(),
            drafts: DraftTracker::default(),
            sources: SourceRegistry::new(snapshot.external_attribution_sources.clone()),
            base_urls: BaseUrls::new(snapshot.base_urls_for_sources.clone()),
            licenses: FrequentLicenses::new(snapshot.frequent_licenses.clone()),
            journal,
            worker,
            generation: 0,
            latest_view: None,
        };
        let details = json!({
            "store_version": engine.store.version(),
            "resources": engine.tree.len(),
            "manual_count": engine.store.manual().len(),
            "external_count": engine.store.external().len(),
        });
        engine.record("PROJECT_LOADED", details);
        Ok(engine)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn metadata(&self) -> &ProjectMetadata {
        &self.metadata
    }

    pub fn tree(&self) -> &ResourceTree {
        &self.tree
    }

    pub fn store(&self) -> &AttributionStore {
        &self.store
    }

    pub fn version(&self) -> u64 {
        self.store.version()
    }

    pub fn sources(&self) -> &SourceRegistry {
        &self.sources
    }

    pub fn frequent_licenses(&self) -> &FrequentLicenses {
        &self.licenses
    }

    pub fn has_journal(&self) -> bool {
        self.journal.is_some()
    }

    // Journal failures never fail the operation that produced the event.
    fn record(&mut self, event_type: &str, details: serde_json::Value) {
        let Some(journal) = self.journal.as_mut() else {
            return;
        };
        let appended = JournalEvent::new(
            event_type,
            &self.metadata.project_id,
            &self.config.project_actor,
            details,
        )
        .and_then(|event| journal.append(event));
        if let Err(err) = appended {
            tracing::warn!(%event_type, %err, "journal append failed");
        }
    }

    fn committed(&mut self, report: MutationReport) -> MutationReport {
        if report.changed {
            self.drafts.sync(&self.store, &report);
            match serde_json::to_value(&report) {
                Ok(details) => self.record(report.operation, details),
                Err(err) => tracing::warn!(%err, "mutation report not serializable"),
            }
        }
        report
    }

    // ---- queries ----

    pub fn effective_attributions(&self, universe: Universe, path: &str) -> CoreResult<Resolved> {
        resolve::effective_attributions(&self.tree, &self.store, universe, path)
    }

    pub fn folder_aggregate(
        &mut self,
        universe: Universe,
        path: &str,
    ) -> CoreResult<BTreeSet<AttributionId>> {
        resolve::folder_aggregate(&self.tree, &self.store, &mut self.cache, universe, path)
    }

    pub fn unrelated(
        &mut self,
        universe: Universe,
        path: &str,
    ) -> CoreResult<BTreeSet<AttributionId>> {
        resolve::unrelated(&self.tree, &self.store, &mut self.cache, universe, path)
    }

    pub fn signals_on(&self, path: &str, include_hidden: bool) -> CoreResult<Vec<MergedSignal>> {
        signals::signals_on(&self.tree, &self.store, &self.sources, path, include_hidden)
    }

    pub fn signals_in_folder(
        &mut self,
        path: &str,
        include_hidden: bool,
    ) -> CoreResult<Vec<MergedSignal>> {
        signals::signals_in_folder(
            &self.tree,
            &self.store,
            &mut self.cache,
            &self.sources,
            path,
            include_hidden,
        )
    }

    pub fn bucket_of(&self, path: &str) -> CoreResult<ProgressBucket> {
        progress::bucket_of(&self.tree, &self.store, path)
    }

    pub fn progress_statistics(&self) -> ProgressStatistics {
        progress::progress_statistics(&self.tree, &self.store)
    }

    pub fn next_unconfirmed(&self, current: &str) -> CoreResult<Option<String>> {
        progress::next_unconfirmed(&self.tree, &self.store, current)
    }

    pub fn license_statistics(&self) -> BTreeMap<String, LicenseCounts> {
        progress::license_statistics(&self.store, &self.sources)
    }

    /// Link to the resource in the scanned sources, if its prefix has one.
    pub fn source_url(&self, path: &str) -> CoreResult<Option<Url>> {
        self.tree.require(path)?;
        Ok(self.base_urls.url_for(path))
    }

    pub fn integrity_summary(&self) -> IntegritySummary {
        self.store.integrity_summary(&self.tree)
    }

    pub fn export(&self, kind: ExportKind) -> CoreResult<String> {
        export::render(&self.store, kind)
    }

    // ---- filters ----

    pub fn filters(&self) -> &FilterState {
        &self.filters
    }

    /// Filter options with live counts over the manual attributions.
    pub fn filter_options(&mut self) -> Vec<FilterOption> {
        self.filters
            .refresh(self.store.version(), self.store.manual().entities());
        self.filters.options()
    }

    pub fn filtered_manual_ids(&mut self) -> Vec<AttributionId> {
        self.filters
            .refresh(self.store.version(), self.store.manual().entities());
        self.filters.apply(self.store.manual().entities())
    }

    pub fn toggle_filter(&mut self, filter: AttributionFilter) {
        self.filters.toggle(filter);
    }

    /// Search changes settle for `search_debounce_ms` before they apply;
    /// see [`Self::tick`].
    pub fn set_search(&mut self, text: &str, now: Instant) {
        self.search.push(text.to_string(), now);
    }

    /// Applies a settled search change. Returns whether one was applied.
    pub fn tick(&mut self, now: Instant) -> bool {
        match self.search.ready(now) {
            Some(text) => {
                self.filters.set_search(&text);
                true
            }
            None => false,
        }
    }

    // ---- mutations ----

    pub fn link(&mut self, path: &str, id: &AttributionId) -> CoreResult<MutationReport> {
        let report = self.store.link(&self.tree, path, id)?;
        Ok(self.committed(report))
    }

    pub fn unlink(&mut self, path: &str, id: &AttributionId) -> CoreResult<MutationReport> {
        let report = self.store.unlink(&self.tree, path, id)?;
        Ok(self.committed(report))
    }

    pub fn override_parent(&mut self, path: &str) -> CoreResult<MutationReport> {
        let report = self.store.override_parent(&self.tree, path)?;
        Ok(self.committed(report))
    }

    pub fn create(
        &mut self,
        path: &str,
        info: PackageInfo,
    ) -> CoreResult<(AttributionId, MutationReport)> {
        let (id, report) = self.store.create(&self.tree, path, info)?;
        Ok((id, self.committed(report)))
    }

    pub fn delete(
        &mut self,
        path: &str,
        id: &AttributionId,
        scope: MutationScope,
    ) -> CoreResult<MutationReport> {
        let report = self.store.delete(&self.tree, path, id, scope)?;
        Ok(self.committed(report))
    }

    pub fn delete_selected(
        &mut self,
        path: &str,
        ids: &BTreeSet<AttributionId>,
        scope: MutationScope,
    ) -> CoreResult<MutationReport> {
        let report = self.store.delete_selected(&self.tree, path, ids, scope)?;
        Ok(self.committed(report))
    }

    pub fn confirm(
        &mut self,
        path: &str,
        id: &AttributionId,
        scope: MutationScope,
    ) -> CoreResult<MutationReport> {
        let report = self.store.confirm(&self.tree, path, id, scope)?;
        Ok(self.committed(report))
    }

    pub fn confirm_selected(
        &mut self,
        path: &str,
        ids: &BTreeSet<AttributionId>,
        scope: MutationScope,
    ) -> CoreResult<MutationReport> {
        let report = self.store.confirm_selected(&self.tree, path, ids, scope)?;
        Ok(self.committed(report))
    }

    pub fn update(
        &mut self,
        path: &str,
        id: &AttributionId,
        info: PackageInfo,
        scope: MutationScope,
    ) -> CoreResult<(AttributionId, MutationReport)> {
        let (holder, report) = self.store.update(&self.tree, path, id, info, scope)?;
        Ok((holder, self.committed(report)))
    }

    pub fn replace(
        &mut self,
        marked: &AttributionId,
        target: &AttributionId,
    ) -> CoreResult<MutationReport> {
        let report = self.store.replace(marked, target)?;
        Ok(self.committed(report))
    }

    pub fn hide(&mut self, id: &AttributionId) -> CoreResult<MutationReport> {
        let report = self.store.hide(id)?;
        Ok(self.committed(report))
    }

    pub fn unhide(&mut self, id: &AttributionId) -> CoreResult<MutationReport> {
        let report = self.store.unhide(id)?;
        Ok(self.committed(report))
    }

    pub fn hide_selected(&mut self, ids: &BTreeSet<AttributionId>) -> CoreResult<MutationReport> {
        let report = self.store.hide_selected(ids)?;
        Ok(self.committed(report))
    }

    pub fn unhide_selected(
        &mut self,
        ids: &BTreeSet<AttributionId>,
    ) -> CoreResult<MutationReport> {
        let report = self.store.unhide_selected(ids)?;
        Ok(self.committed(report))
    }

    pub fn promote(
        &mut self,
        signal_id: &AttributionId,
        path: &str,
    ) -> CoreResult<(AttributionId, MutationReport)> {
        let (id, report) =
            self.store
                .promote(&self.tree, signal_id, path, self.config.default_confidence)?;
        Ok((id, self.committed(report)))
    }

    // ---- editing ----

    pub fn drafts(&self) -> &DraftTracker {
        &self.drafts
    }

    /// Opens `id` (or a blank record when `None`) for editing on `path`.
    /// Unsaved changes to the current draft suspend the switch until they
    /// are resolved.
    pub fn begin_edit(
        &mut self,
        path: &str,
        id: Option<&AttributionId>,
    ) -> CoreResult<NavigationDecision> {
        self.tree.require(path)?;
        let persisted = match id {
            Some(id) => match self.store.require(id)? {
                (Universe::Manual, info) => info.clone(),
                (Universe::External, _) => return Err(CoreError::ImmutableSignal(id.to_string())),
            },
            None => PackageInfo::default(),
        };
        Ok(self.drafts.begin(path, id.cloned(), persisted))
    }

    pub fn edit_draft(&mut self, change: impl FnOnce(&mut PackageInfo)) -> CoreResult<()> {
        self.drafts.edit(change)
    }

    pub fn set_draft_purl(&mut self, text: &str) -> CoreResult<Option<Notice>> {
        self.drafts.set_purl_text(text)
    }

    pub fn set_draft_license(&mut self, name: &str) -> CoreResult<Option<Notice>> {
        self.drafts.set_license_name(name, &self.licenses)
    }

    pub fn request_navigation(&mut self, action: NavigationAction) -> NavigationDecision {
        self.drafts.request_navigation(action)
    }

    pub fn resolve_draft(&mut self, resolution: Resolution) -> CoreResult<DraftOutcome> {
        let mut outcome = self.drafts.resolve(
            resolution,
            &self.tree,
            &mut self.store,
            self.config.default_confidence,
        )?;
        outcome.report = outcome.report.map(|r| self.committed(r));
        Ok(outcome)
    }

    // ---- persistence ----

    /// Hands the save payload to the collaborator. A failure leaves the
    /// in-memory state as it is so the save can be retried.
    pub fn save(&mut self, persistence: &mut dyn ProjectPersistence) -> CoreResult<SavePayload> {
        let payload = self.store.save_payload();
        match persistence.save(&payload) {
            Ok(()) => {
                tracing::info!(
                    version = self.store.version(),
                    manual = payload.manual_attributions.len(),
                    "project saved"
                );
                let details = json!({
                    "store_version": self.store.version(),
                    "manual_count": payload.manual_attributions.len(),
                    "link_entries": payload.resources_to_attributions.len(),
                    "hidden_count": payload.resolved_external_attributions.len(),
                });
                self.record("PROJECT_SAVED", details);
                Ok(payload)
            }
            Err(message) => {
                tracing::warn!(%message, "project save failed");
                let details = json!({"store_version": self.store.version(), "error": message});
                self.record("PROJECT_SAVE_FAILED", details);
                Err(CoreError::Persistence(message))
            }
        }
    }

    // ---- derived views ----

    fn view_snapshot(&mut self) -> ViewSnapshot {
        self.generation += 1;
        ViewSnapshot {
            generation: self.generation,
            tree: Arc::clone(&self.tree),
            store: self.store.clone(),
            filters: self.filters.clone(),
        }
    }

    /// Queues a recompute of the filtered list and statistics for the
    /// current state. Returns the generation it will carry.
    pub fn request_recompute(&mut self) -> u64 {
        let snapshot = self.view_snapshot();
        let generation = snapshot.generation;
        let sent = match self.worker.as_mut() {
            Some(worker) => worker.submit(snapshot.clone()),
            None => false,
        };
        if !sent {
            let result = compute_view(&snapshot);
            self.accept(result);
        }
        generation
    }

    fn accept(&mut self, result: ViewResult) {
        for f in &result.deselected {
            self.filters.deselect(*f);
        }
        self.latest_view = Some(result);
    }

    /// Takes in finished results and returns the newest view. Results of
    /// superseded requests are dropped.
    pub fn poll_views(&mut self) -> Option<&ViewResult> {
        let mut fresh = Vec::new();
        if let Some(worker) = self.worker.as_ref() {
            while let Some(result) = worker.poll() {
                if let Ok(view) = result {
                    fresh.push(view);
                }
            }
        }
        for view in fresh {
            self.accept(view);
        }
        self.latest_view.as_ref()
    }

    /// Like [`Self::poll_views`] but waits up to `timeout` for the latest
    /// request to finish.
    pub fn wait_for_view(&mut self, timeout: Duration) -> Option<&ViewResult> {
        let latest = self
            .worker
            .as_ref()
            .and_then(|worker| worker.wait_latest(timeout));
        if let Some(view) = latest {
            self.accept(view);
        }
        self.latest_view
            .as_ref()
            .filter(|view| view.generation == self.generation)
    }
}

use attribution_core::config::EngineConfig;
use attribution_core::draft::{NavigationAction, NavigationDecision, Resolution};
use attribution_core::error::CoreError;
use attribution_core::export::ExportKind;
use attribution_core::filters::{AttributionFilter, FilterState};
use attribution_core::journal::log::verify_chain;
use attribution_core::model::attribution::{AttributionId, Confidence, Universe};
use attribution_core::engine::AttributionEngine;
use attribution_core::mutate::MutationScope;
use attribution_core::snapshot::{LoadSnapshot, ProjectPersistence, SavePayload};
use attribution_core::worker::{RecomputeWorker, ViewSnapshot};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn fixture() -> LoadSnapshot {
    serde_json::from_value(json!({
        "metadata": {"projectId": "demo", "projectTitle": "Demo"},
        "resources": {
            "root": {
                "README": 1,
                "docs": {"guide": 1},
                "src": {"f1": 1, "f2": 1, "lib": {"g": 1}},
                "vendor": {"v1": 1}
            }
        },
        "manualAttributions": {
            "attributions": {
                "A": {"packageName": "react", "packageVersion": "18", "licenseName": "MIT", "preSelected": true},
                "B": {"packageName": "vue", "packageVersion": "3", "licenseName": "MIT", "followUp": true}
            },
            "resourcesToAttributions": {
                "/root/src/": ["A"],
                "/root/src/f2": ["B"],
                "/root/README": ["B"]
            }
        },
        "externalAttributions": {
            "attributions": {
                "S1": {"packageName": "lodash", "packageVersion": "4", "licenseName": "MIT",
                       "comment": "from package.json", "criticality": "high",
                       "source": {"name": "SC", "documentConfidence": 50}},
                "S2": {"packageName": "lodash", "packageVersion": "4", "licenseName": "MIT",
                       "comment": "from lockfile", "criticality": "high",
                       "source": {"name": "SC", "documentConfidence": 50}},
                "S3": {"packageName": "left-pad", "licenseName": "WTFPL",
                       "source": {"name": "HC", "documentConfidence": 90}},
                "S4": {"packageName": "openssl", "licenseName": "Apache-2.0", "criticality": "high",
                       "source": {"name": "HC", "documentConfidence": 90}}
            },
            "resourcesToAttributions": {
                "/root/src/f1": ["S1"],
                "/root/src/lib/g": ["S2"],
                "/root/vendor/v1": ["S3"],
                "/root/docs/": ["S4"]
            }
        },
        "attributionBreakpoints": ["/root/vendor/"],
        "externalAttributionSources": {
            "SC": {"name": "ScanCode", "priority": 1},
            "HC": {"name": "HHC", "priority": 2}
        },
        "baseUrlsForSources": {"/root/": "https://example.com/demo/{path}"},
        "frequentLicenses": {
            "nameOrder": [{"shortName": "MIT", "fullName": "MIT License"}],
            "texts": {"MIT": "Permission is hereby granted"}
        }
    }))
    .unwrap()
}

fn id(s: &str) -> AttributionId {
    AttributionId::from(s)
}

fn inline_config() -> EngineConfig {
    EngineConfig {
        worker_enabled: false,
        ..EngineConfig::default()
    }
}

#[derive(Default)]
struct MemoryPersistence {
    saved: Vec<SavePayload>,
    fail_with: Option<String>,
}

impl ProjectPersistence for MemoryPersistence {
    fn save(&mut self, payload: &SavePayload) -> Result<(), String> {
        if let Some(message) = &self.fail_with {
            return Err(message.clone());
        }
        self.saved.push(payload.clone());
        Ok(())
    }
}

#[test]
fn dirty_draft_holds_navigation_until_saved() {
    let mut engine = AttributionEngine::load(&fixture(), inline_config()).unwrap();
    engine.begin_edit("/root/src/f2", Some(&id("B"))).unwrap();
    engine
        .edit_draft(|info| info.package_version = Some("3.4".to_string()))
        .unwrap();

    let next = NavigationAction::SelectResource("/root/README".to_string());
    assert_eq!(engine.request_navigation(next.clone()), NavigationDecision::Suspended);

    let outcome = engine.resolve_draft(Resolution::Save).unwrap();
    assert_eq!(outcome.resume, Some(next));
    let saved = outcome.attribution_id.unwrap();
    assert_ne!(saved, id("B"));
    let info = engine.store().get(&saved).unwrap();
    assert_eq!(info.package_version.as_deref(), Some("3.4"));
    assert_eq!(info.attribution_confidence, Some(Confidence::High));
    assert_eq!(
        engine.store().get(&id("B")).unwrap().package_version.as_deref(),
        Some("3")
    );
    assert!(!engine.drafts().is_dirty());
}

#[test]
fn save_globally_edits_the_shared_record() {
    let mut engine = AttributionEngine::load(&fixture(), inline_config()).unwrap();
    engine.begin_edit("/root/README", Some(&id("B"))).unwrap();
    assert!(engine.set_draft_license("MIT").unwrap().is_none());
    let outcome = engine.resolve_draft(Resolution::SaveGlobally).unwrap();
    assert_eq!(outcome.attribution_id, Some(id("B")));
    let b = engine.store().get(&id("B")).unwrap();
    assert_eq!(b.license_name.as_deref(), Some("MIT"));
    assert_eq!(b.license_text.as_deref(), Some("Permission is hereby granted"));
    assert_eq!(engine.store().manual().links().paths_of(&id("B")).count(), 2);
}

#[test]
fn discard_restores_the_persisted_record() {
    let mut engine = AttributionEngine::load(&fixture(), inline_config()).unwrap();
    engine.begin_edit("/root/src/", Some(&id("A"))).unwrap();
    engine
        .edit_draft(|info| info.package_name = Some("preact".to_string()))
        .unwrap();
    let v = engine.version();
    let action = NavigationAction::SwitchView("report".to_string());
    assert_eq!(engine.request_navigation(action.clone()), NavigationDecision::Suspended);
    let outcome = engine.resolve_draft(Resolution::Discard).unwrap();
    assert_eq!(outcome.resume, Some(action));
    assert!(outcome.report.is_none());
    assert_eq!(engine.version(), v);
    assert!(!engine.drafts().is_dirty());
}

#[test]
fn failed_save_keeps_in_memory_state() {
    let mut engine = AttributionEngine::load(&fixture(), inline_config()).unwrap();
    let (created, _) = engine
        .create("/root/docs/guide", Default::default())
        .unwrap();
    let mut failing = MemoryPersistence {
        fail_with: Some("disk full".to_string()),
        ..MemoryPersistence::default()
    };
    let v = engine.version();
    assert!(matches!(
        engine.save(&mut failing),
        Err(CoreError::Persistence(_))
    ));
    assert_eq!(engine.version(), v);
    assert!(engine.store().manual().entity(&created).is_some());

    let mut ok = MemoryPersistence::default();
    let payload = engine.save(&mut ok).unwrap();
    assert!(payload.manual_attributions.contains_key(&created));
    assert_eq!(ok.saved.len(), 1);
}

#[test]
fn journal_chains_every_committed_mutation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("journal").join("mutations.ndjson");
    let config = EngineConfig {
        journal_path: Some(path.clone()),
        ..inline_config()
    };
    let mut engine = AttributionEngine::load(&fixture(), config).unwrap();
    assert!(engine.has_journal());
    engine
        .confirm("/root/src/", &id("A"), MutationScope::Global)
        .unwrap();
    engine.hide(&id("S1")).unwrap();
    // Rejected and no-op mutations are not journaled.
    assert!(engine.link("/root/vendor/", &id("B")).is_err());
    engine.link("/root/src/f2", &id("B")).unwrap();
    engine.save(&mut MemoryPersistence::default()).unwrap();

    assert_eq!(verify_chain(&path).unwrap(), 4);
    let text = std::fs::read_to_string(&path).unwrap();
    let types: Vec<String> = text
        .lines()
        .map(|l| {
            let v: serde_json::Value = serde_json::from_str(l).unwrap();
            v["event_type"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(
        types,
        vec![
            "PROJECT_LOADED",
            "ATTRIBUTION_CONFIRMED",
            "SIGNALS_HIDDEN",
            "PROJECT_SAVED"
        ]
    );

    // Reopening continues the chain.
    let mut reopened = AttributionEngine::load(
        &fixture(),
        EngineConfig {
            journal_path: Some(path.clone()),
            ..inline_config()
        },
    )
    .unwrap();
    reopened.override_parent("/root/src/lib/").unwrap();
    assert_eq!(verify_chain(&path).unwrap(), 6);
}

#[test]
fn tampered_journal_fails_verification() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mutations.ndjson");
    let config = EngineConfig {
        journal_path: Some(path.clone()),
        ..inline_config()
    };
    let mut engine = AttributionEngine::load(&fixture(), config).unwrap();
    engine.hide(&id("S3")).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    std::fs::write(&path, text.replace("S3", "S4")).unwrap();
    assert!(verify_chain(&path).is_err());
}

#[test]
fn inline_recompute_applies_filters_and_deselects_empty_ones() {
    let mut engine = AttributionEngine::load(&fixture(), inline_config()).unwrap();
    engine.toggle_filter(AttributionFilter::NeedsFollowUp);
    engine.toggle_filter(AttributionFilter::PreviouslyPreferred);
    let generation = engine.request_recompute();
    let view = engine.poll_views().unwrap().clone();
    assert_eq!(view.generation, generation);
    assert_eq!(view.deselected, vec![AttributionFilter::PreviouslyPreferred]);
    assert_eq!(view.filtered_manual_ids, vec![id("B")]);
    assert_eq!(view.progress.total_files, 6);
    assert!(!engine
        .filters()
        .selected()
        .contains(&AttributionFilter::PreviouslyPreferred));
}

#[test]
fn search_waits_for_the_debounce_delay() {
    let mut engine = AttributionEngine::load(&fixture(), inline_config()).unwrap();
    let start = Instant::now();
    engine.set_search("VUE", start);
    assert!(!engine.tick(start + Duration::from_millis(50)));
    assert_eq!(engine.filtered_manual_ids().len(), 2);
    assert!(engine.tick(start + Duration::from_millis(250)));
    assert_eq!(engine.filtered_manual_ids(), vec![id("B")]);
}

#[test]
fn worker_discards_results_of_superseded_snapshots() {
    let (tree, store) = fixture().build().unwrap();
    let tree = Arc::new(tree);
    let mut worker = RecomputeWorker::spawn().unwrap();
    let snapshot = |generation| ViewSnapshot {
        generation,
        tree: Arc::clone(&tree),
        store: store.clone(),
        filters: FilterState::default(),
    };
    assert!(worker.submit(snapshot(1)));
    assert!(worker.submit(snapshot(2)));

    let deadline = Instant::now() + Duration::from_secs(10);
    let fresh = loop {
        assert!(Instant::now() < deadline, "no result from worker");
        match worker.wait(Duration::from_secs(1)) {
            Some(Ok(view)) => break view,
            Some(Err(stale)) => {
                assert_eq!(stale.generation, 1);
                assert_eq!(stale.latest, 2);
            }
            None => {}
        }
    };
    assert_eq!(fresh.generation, 2);
    assert_eq!(fresh.store_version, store.version());
}

#[test]
fn worker_path_through_the_engine() {
    let mut engine = AttributionEngine::load(&fixture(), EngineConfig::default()).unwrap();
    engine.request_recompute();
    engine
        .confirm("/root/src/", &id("A"), MutationScope::Global)
        .unwrap();
    let latest = engine.request_recompute();
    let view = engine.wait_for_view(Duration::from_secs(10)).unwrap();
    assert_eq!(view.generation, latest);
    assert_eq!(view.progress.confirmed, 4);
}

#[test]
fn engine_queries_cover_both_universes() {
    let mut engine = AttributionEngine::load(&fixture(), inline_config()).unwrap();
    let f1 = engine
        .effective_attributions(Universe::Manual, "/root/src/f1")
        .unwrap();
    assert_eq!(f1.ids, vec![id("A")]);
    assert_eq!(
        engine
            .folder_aggregate(Universe::External, "/root/src/")
            .unwrap()
            .len(),
        2
    );
    assert_eq!(engine.signals_in_folder("/root/src/", false).unwrap().len(), 1);
    assert_eq!(
        engine.source_url("/root/src/f1").unwrap().unwrap().as_str(),
        "https://example.com/demo/src/f1"
    );
    assert_eq!(engine.integrity_summary().overall, "PASS");
    let (promoted, _) = engine.promote(&id("S4"), "/root/docs/").unwrap();
    assert_eq!(
        engine.store().get(&promoted).unwrap().attribution_confidence,
        Some(Confidence::High)
    );
}

#[test]
fn exports_list_manual_records() {
    let engine = AttributionEngine::load(&fixture(), inline_config()).unwrap();
    let follow_up = engine.export(ExportKind::FollowUp).unwrap();
    let lines: Vec<&str> = follow_up.lines().collect();
    assert_eq!(lines[0], "Index,Name,Version,License Name,Copyright,URL,Resources");
    assert!(lines[1].starts_with("1,vue,3,MIT,,,"));
    assert_eq!(follow_up.matches("react").count(), 0);

    let compact = engine.export(ExportKind::CompactBom).unwrap();
    assert_eq!(compact.lines().count(), 3);
    assert!(compact.lines().nth(1).unwrap().starts_with("1,react,18,MIT"));

    let detailed = engine.export(ExportKind::DetailedBom).unwrap();
    assert!(detailed.contains("/root/src/"));
}

#[test]
fn invalid_license_expression_is_kept_with_a_notice() {
    let mut engine = AttributionEngine::load(&fixture(), inline_config()).unwrap();
    engine.begin_edit("/root/README", Some(&id("B"))).unwrap();
    let notice = engine.set_draft_license("MIT OR (Apache-2.0").unwrap();
    assert!(notice.is_some());
    assert_eq!(
        engine.drafts().current().unwrap().edited.license_name.as_deref(),
        Some("MIT OR (Apache-2.0")
    );
}

#[test]
fn selecting_another_record_waits_for_unsaved_edits() {
    let mut engine = AttributionEngine::load(&fixture(), inline_config()).unwrap();
    engine.begin_edit("/root/src/f2", Some(&id("B"))).unwrap();
    engine
        .edit_draft(|info| info.copyright = Some("(c) Evan".to_string()))
        .unwrap();

    let decision = engine.begin_edit("/root/docs/guide", None).unwrap();
    assert_eq!(decision, NavigationDecision::Suspended);
    let draft = engine.drafts().current().unwrap();
    assert_eq!(draft.resource, "/root/src/f2");
    assert!(engine.drafts().is_dirty());

    let outcome = engine.resolve_draft(Resolution::Discard).unwrap();
    assert_eq!(
        outcome.resume,
        Some(NavigationAction::SelectResource("/root/docs/guide".to_string()))
    );
    assert_eq!(
        engine.begin_edit("/root/docs/guide", None).unwrap(),
        NavigationDecision::Proceed(NavigationAction::SelectResource("/root/docs/guide".to_string()))
    );
}

#[test]
fn saving_a_record_nobody_else_uses_keeps_its_id() {
    let mut engine = AttributionEngine::load(&fixture(), inline_config()).unwrap();
    let (created, _) = engine
        .create("/root/docs/guide", Default::default())
        .unwrap();
    engine.begin_edit("/root/docs/guide", Some(&created)).unwrap();
    engine
        .edit_draft(|info| info.package_name = Some("zlib".to_string()))
        .unwrap();
    let outcome = engine.resolve_draft(Resolution::Save).unwrap();
    assert_eq!(outcome.attribution_id, Some(created.clone()));
    let report = outcome.report.unwrap();
    assert!(report.created.is_empty());
    assert!(report.deleted.is_empty());
    assert_eq!(report.updated, vec![created.clone()]);
    assert_eq!(
        engine.store().get(&created).unwrap().package_name.as_deref(),
        Some("zlib")
    );
}

#[test]
fn draft_follows_changes_made_elsewhere() {
    let mut engine = AttributionEngine::load(&fixture(), inline_config()).unwrap();

    // A clean draft picks up a global confirm of its record.
    engine.begin_edit("/root/src/", Some(&id("A"))).unwrap();
    engine
        .confirm("/root/src/", &id("A"), MutationScope::Global)
        .unwrap();
    let draft = engine.drafts().current().unwrap();
    assert!(!draft.persisted.pre_selected);
    assert!(!engine.drafts().is_dirty());

    // A dirty draft whose record is deleted becomes a new record.
    engine.resolve_draft(Resolution::Discard).unwrap();
    engine.begin_edit("/root/README", Some(&id("B"))).unwrap();
    engine
        .edit_draft(|info| info.package_version = Some("3.5".to_string()))
        .unwrap();
    engine
        .delete("/root/README", &id("B"), MutationScope::Global)
        .unwrap();
    let draft = engine.drafts().current().unwrap();
    assert_eq!(draft.attribution_id, None);
    assert!(engine.drafts().is_dirty());

    let outcome = engine.resolve_draft(Resolution::Save).unwrap();
    let saved = outcome.attribution_id.unwrap();
    assert_ne!(saved, id("B"));
    assert_eq!(
        engine.store().manual().links().ids_at("/root/README").unwrap(),
        &[saved]
    );
}

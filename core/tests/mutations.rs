use attribution_core::error::CoreError;
use attribution_core::model::attribution::{AttributionId, Confidence, PackageInfo, Universe};
use attribution_core::mutate::MutationScope;
use attribution_core::resolve::effective_attributions;
use attribution_core::snapshot::LoadSnapshot;
use serde_json::json;
use std::collections::BTreeSet;

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

fn pre_selected(name: &str) -> PackageInfo {
    PackageInfo {
        package_name: Some(name.to_string()),
        pre_selected: true,
        ..PackageInfo::default()
    }
}

#[test]
fn writes_to_breakpoints_are_rejected_without_mutation() {
    let (tree, mut store) = fixture().build().unwrap();
    let v = store.version();
    assert!(matches!(
        store.link(&tree, "/root/vendor/", &id("A")),
        Err(CoreError::BreakpointViolation { .. })
    ));
    assert!(matches!(
        store.confirm(&tree, "/root/vendor/", &id("A"), MutationScope::Global),
        Err(CoreError::BreakpointViolation { .. })
    ));
    assert!(matches!(
        store.create(&tree, "/root/vendor/", PackageInfo::default()),
        Err(CoreError::BreakpointViolation { .. })
    ));
    assert_eq!(store.version(), v);
    assert_eq!(store.manual().len(), 2);
}

#[test]
fn local_update_forks_and_leaves_other_resources_alone() {
    let (tree, mut store) = fixture().build().unwrap();
    let mut edited = store.get(&id("B")).unwrap().clone();
    edited.package_version = Some("4".to_string());
    let (fork, report) = store
        .update(&tree, "/root/src/f2", &id("B"), edited, MutationScope::Local)
        .unwrap();
    assert_ne!(fork, id("B"));
    assert_eq!(report.created, vec![fork.clone()]);
    assert_eq!(store.manual().links().ids_at("/root/src/f2").unwrap(), &[fork.clone()]);
    assert_eq!(store.manual().links().ids_at("/root/README").unwrap(), &[id("B")]);
    assert_eq!(store.get(&id("B")).unwrap().package_version.as_deref(), Some("3"));
    assert_eq!(store.get(&fork).unwrap().package_version.as_deref(), Some("4"));
}

#[test]
fn global_update_edits_in_place() {
    let (tree, mut store) = fixture().build().unwrap();
    let mut edited = store.get(&id("B")).unwrap().clone();
    edited.copyright = Some("(c) Evan".to_string());
    let (holder, report) = store
        .update(&tree, "/root/src/f2", &id("B"), edited, MutationScope::Global)
        .unwrap();
    assert_eq!(holder, id("B"));
    assert_eq!(report.updated, vec![id("B")]);
    assert!(report.created.is_empty());
    assert_eq!(store.manual().links().paths_of(&id("B")).count(), 2);
}

#[test]
fn local_confirm_of_sole_owner_replaces_the_record() {
    let (tree, mut store) = fixture().build().unwrap();
    let report = store
        .confirm(&tree, "/root/src/", &id("A"), MutationScope::Local)
        .unwrap();
    assert_eq!(report.deleted, vec![id("A")]);
    let fork = report.created[0].clone();
    assert!(!store.get(&fork).unwrap().pre_selected);
    assert!(store.get(&id("A")).is_none());
    let f1 = effective_attributions(&tree, &store, Universe::Manual, "/root/src/f1").unwrap();
    assert_eq!(f1.ids, vec![fork]);
}

#[test]
fn local_operations_need_an_own_link() {
    let (tree, mut store) = fixture().build().unwrap();
    assert!(matches!(
        store.unlink(&tree, "/root/src/f1", &id("A")),
        Err(CoreError::NotLinked { .. })
    ));
    assert!(matches!(
        store.delete(&tree, "/root/src/f1", &id("A"), MutationScope::Local),
        Err(CoreError::NotLinked { .. })
    ));
}

#[test]
fn signals_cannot_be_edited_through_manual_operations() {
    let (tree, mut store) = fixture().build().unwrap();
    assert!(matches!(
        store.link(&tree, "/root/src/f1", &id("S1")),
        Err(CoreError::ImmutableSignal(_))
    ));
    assert!(matches!(
        store.delete(&tree, "/root/src/f1", &id("S1"), MutationScope::Global),
        Err(CoreError::ImmutableSignal(_))
    ));
    assert!(matches!(
        store.link(&tree, "/root/src/f1", &id("missing")),
        Err(CoreError::UnknownAttribution(_))
    ));
}

#[test]
fn global_delete_removes_every_link() {
    let (tree, mut store) = fixture().build().unwrap();
    let report = store
        .delete(&tree, "/root/README", &id("B"), MutationScope::Global)
        .unwrap();
    assert_eq!(report.deleted, vec![id("B")]);
    assert_eq!(report.unlinked.len(), 2);
    assert!(store.get(&id("B")).is_none());
    assert_eq!(store.manual().links().paths_of(&id("B")).count(), 0);
    // The emptied entry is gone, so f2 inherits again.
    let f2 = effective_attributions(&tree, &store, Universe::Manual, "/root/src/f2").unwrap();
    assert_eq!(f2.ids, vec![id("A")]);
    assert!(f2.is_inherited());
}

#[test]
fn replace_moves_links_onto_target() {
    let (tree, mut store) = fixture().build().unwrap();
    let (x, _) = store
        .create(&tree, "/root/src/f1", pre_selected("x"))
        .unwrap();
    store.link(&tree, "/root/src/f2", &x).unwrap();
    let (y, _) = store
        .create(&tree, "/root/src/f2", pre_selected("y"))
        .unwrap();
    store.link(&tree, "/root/docs/guide", &y).unwrap();

    let v = store.version();
    let report = store.replace(&x, &y).unwrap();
    assert_eq!(store.version(), v + 1);
    assert_eq!(report.deleted, vec![x.clone()]);
    assert_eq!(store.manual().links().ids_at("/root/src/f1").unwrap(), &[y.clone()]);
    let f2 = store.manual().links().ids_at("/root/src/f2").unwrap();
    assert!(f2.contains(&y) && !f2.contains(&x));
    assert_eq!(store.manual().links().ids_at("/root/docs/guide").unwrap(), &[y.clone()]);
    assert!(store.get(&x).is_none());

    // Replacing something that no longer exists is a no-op.
    let again = store.replace(&x, &y).unwrap();
    assert!(!again.changed);
    assert_eq!(store.version(), v + 1);
}

#[test]
fn bulk_operations_bump_the_version_once() {
    let (tree, mut store) = fixture().build().unwrap();
    let (c, _) = store.create(&tree, "/root/src/lib/g", pre_selected("c")).unwrap();
    let (d, _) = store.create(&tree, "/root/src/lib/g", pre_selected("d")).unwrap();
    let v = store.version();
    let report = store
        .confirm_selected(
            &tree,
            "/root/src/lib/g",
            &BTreeSet::from([c.clone(), d.clone()]),
            MutationScope::Global,
        )
        .unwrap();
    assert_eq!(report.version, v + 1);
    assert_eq!(store.version(), v + 1);
    assert!(!store.get(&c).unwrap().pre_selected);
    assert!(!store.get(&d).unwrap().pre_selected);
}

#[test]
fn bulk_operations_are_all_or_nothing() {
    let (tree, mut store) = fixture().build().unwrap();
    let v = store.version();
    let err = store.delete_selected(
        &tree,
        "/root/src/f2",
        &BTreeSet::from([id("A"), id("B")]),
        MutationScope::Local,
    );
    assert!(matches!(err, Err(CoreError::NotLinked { .. })));
    assert_eq!(store.version(), v);
    assert_eq!(store.manual().links().ids_at("/root/src/f2").unwrap(), &[id("B")]);
}

#[test]
fn promote_merges_the_signal_group() {
    let (tree, mut store) = fixture().build().unwrap();
    let (m, report) = store
        .promote(&tree, &id("S2"), "/root/src/f1", Confidence::High)
        .unwrap();
    assert_eq!(report.operation, "SIGNAL_PROMOTED");
    let info = store.manual().entity(&m).unwrap();
    assert_eq!(info.package_name.as_deref(), Some("lodash"));
    assert_eq!(info.attribution_confidence, Some(Confidence::High));
    assert!(!info.pre_selected);
    assert_eq!(
        info.comments,
        vec!["from package.json".to_string(), "from lockfile".to_string()]
    );
    assert_eq!(info.origin_ids, vec!["S1".to_string(), "S2".to_string()]);
    assert!(store.external().entity(&id("S1")).is_some());
    assert!(store.external().entity(&id("S2")).is_some());
}

#[test]
fn no_orphans_after_a_mixed_sequence() {
    let (tree, mut store) = fixture().build().unwrap();
    let (c, _) = store.create(&tree, "/root/docs/guide", pre_selected("c")).unwrap();
    store.link(&tree, "/root/src/f1", &c).unwrap();
    store.unlink(&tree, "/root/docs/guide", &c).unwrap();
    store
        .confirm(&tree, "/root/src/f1", &c, MutationScope::Local)
        .unwrap();
    store
        .delete(&tree, "/root/src/f2", &id("B"), MutationScope::Local)
        .unwrap();
    store.promote(&tree, &id("S4"), "/root/docs/", Confidence::Medium).unwrap();
    store.hide(&id("S3")).unwrap();

    assert!(store.get(&c).is_none());
    assert!(store.verify_integrity(&tree).is_empty());
    for id in store.manual().ids() {
        assert!(store.manual().links().link_count(id) > 0);
    }
}

#[test]
fn local_update_of_a_sole_owner_keeps_its_id() {
    let (tree, mut store) = fixture().build().unwrap();
    let (created, _) = store
        .create(&tree, "/root/docs/guide", pre_selected("zlib"))
        .unwrap();
    let mut edited = store.get(&created).unwrap().clone();
    edited.package_version = Some("1.3".to_string());
    let (holder, report) = store
        .update(&tree, "/root/docs/guide", &created, edited, MutationScope::Local)
        .unwrap();
    assert_eq!(holder, created);
    assert_eq!(report.updated, vec![created.clone()]);
    assert!(report.created.is_empty());
    assert!(report.deleted.is_empty());
    assert_eq!(store.get(&created).unwrap().package_version.as_deref(), Some("1.3"));
    assert_eq!(store.manual().links().ids_at("/root/docs/guide").unwrap(), &[created]);
}

#[test]
fn local_confirm_of_a_shared_record_leaves_the_other_resource_alone() {
    let snapshot: LoadSnapshot = serde_json::from_value(json!({
        "resources": {"p1": 1, "p2": 1},
        "manualAttributions": {
            "attributions": {"A": {"packageName": "react", "preSelected": true}},
            "resourcesToAttributions": {"/p1": ["A"], "/p2": ["A"]}
        }
    }))
    .unwrap();
    let (tree, mut store) = snapshot.build().unwrap();
    let report = store
        .confirm(&tree, "/p1", &id("A"), MutationScope::Local)
        .unwrap();
    assert_eq!(report.created.len(), 1);
    assert!(report.deleted.is_empty());
    let fork = report.created[0].clone();

    let p1 = effective_attributions(&tree, &store, Universe::Manual, "/p1").unwrap();
    assert_eq!(p1.ids, vec![fork.clone()]);
    assert!(!store.get(&fork).unwrap().pre_selected);

    let p2 = effective_attributions(&tree, &store, Universe::Manual, "/p2").unwrap();
    assert_eq!(p2.ids, vec![id("A")]);
    assert!(store.get(&id("A")).unwrap().pre_selected);
    assert!(store.verify_integrity(&tree).is_empty());
}

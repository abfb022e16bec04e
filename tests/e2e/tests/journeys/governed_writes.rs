//! Journey: governed writes
//!
//! Bulk tagging with dry-run preview and apply, permission-denied hard
//! deletes, backup restore, and the audit trail behind all of it.

use imprint_core::{
    EngineError, QueryFilter, RecordPatch, Status, UpdateOptions, WriteOp, WriteRequest,
};
use imprint_e2e_tests::harness::TestEngine;
use imprint_e2e_tests::mocks::observation;

fn python_corpus() -> Vec<imprint_core::RawRecord> {
    vec![
        observation("py-1", "Python list comprehensions", "Notes on python syntax.", &["python"]),
        observation("py-2", "Python decorators explained", "More python study notes.", &["python"]),
        observation("rs-1", "Rust lifetimes", "Notes about rust.", &["rust"]),
    ]
}

fn bulk_tag_op() -> WriteOp {
    WriteOp::BulkTag {
        filter: QueryFilter {
            user_id: "user-1".into(),
            tags: Some(vec!["python".into()]),
            ..Default::default()
        },
        tags: vec!["programming-language".into()],
    }
}

#[tokio::test]
async fn bulk_tag_dry_run_previews_without_mutation() {
    let harness = TestEngine::new();
    harness.grant_write_full("user-1");
    harness
        .submit("notes_app", "user-1", python_corpus())
        .await
        .expect("seed");
    let audit_before = harness
        .engine
        .authorizer()
        .audit()
        .count_for_user("user-1")
        .expect("count");

    let outcome = harness
        .engine
        .write(WriteRequest {
            user_id: "user-1".into(),
            op: bulk_tag_op(),
            intent_description: "tag python records".into(),
            dry_run: true,
            batch_size: None,
            deadline_ms: None,
            context: harness.context(),
        })
        .await
        .expect("dry run");

    assert!(outcome.dry_run);
    assert_eq!(outcome.matched_count, 2);
    assert_eq!(outcome.affected_count, 0);
    assert!(!outcome.sample.is_empty());
    assert!(outcome.backup_id.is_none());

    // Store unchanged
    for id in ["py-1", "py-2"] {
        let record = harness
            .engine
            .store()
            .get(id, "user-1")
            .expect("get")
            .expect("record");
        assert_eq!(record.tags, vec!["python".to_string()]);
    }

    // Exactly one new audit entry, outcome previewed
    let history = harness.engine.write_history("user-1", 50).expect("history");
    assert_eq!(
        history.len() as u64,
        audit_before + 1,
        "one entry per authorization decision"
    );
    assert_eq!(history[0].outcome, "previewed");
}

#[tokio::test]
async fn bulk_tag_apply_unions_tags_and_keeps_a_backup() {
    let harness = TestEngine::new();
    harness.grant_write_full("user-1");
    harness
        .submit("notes_app", "user-1", python_corpus())
        .await
        .expect("seed");

    let outcome = harness
        .engine
        .write(WriteRequest {
            user_id: "user-1".into(),
            op: bulk_tag_op(),
            intent_description: "tag python records".into(),
            dry_run: false,
            batch_size: None,
            deadline_ms: None,
            context: harness.context(),
        })
        .await
        .expect("apply");

    assert_eq!(outcome.status, Status::Success);
    assert_eq!(outcome.affected_count, 2);
    for id in ["py-1", "py-2"] {
        let record = harness
            .engine
            .store()
            .get(id, "user-1")
            .expect("get")
            .expect("record");
        // Union, lowercased, deduplicated
        assert_eq!(
            record.tags,
            vec!["programming-language".to_string(), "python".to_string()]
        );
        assert!(record.updated_at > record.created_at);
    }
    // The unmatched record is untouched
    let rust = harness
        .engine
        .store()
        .get("rs-1", "user-1")
        .expect("get")
        .expect("record");
    assert_eq!(rust.tags, vec!["rust".to_string()]);

    // Backup snapshot retrievable inside the retention window
    let backup_id = outcome.backup_id.expect("backup id");
    let snapshot = harness
        .engine
        .backups()
        .get(&backup_id)
        .expect("get")
        .expect("snapshot");
    assert_eq!(snapshot.records.len(), 2);
    assert!(snapshot
        .records
        .iter()
        .all(|r| r.tags == vec!["python".to_string()]));
}

#[tokio::test]
async fn hard_delete_denied_for_write_limited_operator() {
    let harness = TestEngine::new();
    // Default profile is write_limited
    harness
        .submit("notes_app", "user-1", python_corpus())
        .await
        .expect("seed");

    let err = harness
        .engine
        .delete(
            "user-1",
            vec!["py-1".into()],
            false,
            harness.context(),
        )
        .await
        .unwrap_err();

    match err {
        EngineError::PermissionDenied { flags, .. } => {
            assert!(flags.contains(&"hard_delete".to_string()));
        }
        other => panic!("expected PermissionDenied, got {other:?}"),
    }

    // Audited, and nothing was removed
    let history = harness.engine.write_history("user-1", 10).expect("history");
    assert_eq!(history[0].outcome, "denied");
    assert!(harness
        .engine
        .store()
        .get("py-1", "user-1")
        .expect("get")
        .is_some());
}

#[tokio::test]
async fn hard_delete_allowed_for_verified_admin() {
    let harness = TestEngine::new();
    harness.grant_admin("user-1", true);
    harness
        .submit("notes_app", "user-1", python_corpus())
        .await
        .expect("seed");

    // Admin without 2FA verification is still refused
    let err = harness
        .engine
        .delete("user-1", vec!["py-1".into()], false, harness.context())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::PermissionDenied { .. }));

    // Verified session succeeds and the record is gone from every tier
    let outcome = harness
        .engine
        .delete("user-1", vec!["py-1".into()], false, harness.verified_context())
        .await
        .expect("hard delete");
    assert_eq!(outcome.affected_count, 1);
    assert!(outcome.backup_id.is_some());
    assert!(harness
        .engine
        .store()
        .get_any("py-1", "user-1")
        .expect("get")
        .is_none());
}

#[tokio::test]
async fn soft_delete_hides_from_search_but_not_audit_trail() {
    let harness = TestEngine::new();
    harness.grant_write_full("user-1");
    harness
        .submit("notes_app", "user-1", python_corpus())
        .await
        .expect("seed");

    let outcome = harness
        .engine
        .delete("user-1", vec!["py-1".into()], true, harness.context())
        .await
        .expect("soft delete");
    assert_eq!(outcome.status, Status::Success);

    assert!(harness
        .engine
        .store()
        .get("py-1", "user-1")
        .expect("get")
        .is_none());
    let retained = harness
        .engine
        .store()
        .get_any("py-1", "user-1")
        .expect("get")
        .expect("retained for audit");
    assert!(retained.deleted);
}

#[tokio::test]
async fn restore_returns_records_to_their_pre_mutation_state() {
    let harness = TestEngine::new();
    harness.grant_write_full("user-1");
    harness
        .submit("notes_app", "user-1", python_corpus())
        .await
        .expect("seed");

    let outcome = harness
        .engine
        .write(WriteRequest {
            user_id: "user-1".into(),
            op: WriteOp::Update {
                id: "py-1".into(),
                patch: RecordPatch {
                    note: Some("clobbered".into()),
                    ..Default::default()
                },
                options: UpdateOptions::default(),
            },
            intent_description: "edit a note".into(),
            dry_run: false,
            batch_size: None,
            deadline_ms: None,
            context: harness.context(),
        })
        .await
        .expect("update");

    let backup_id = outcome.backup_id.expect("backup");
    let restored = harness
        .engine
        .restore_backup("user-1", &backup_id)
        .await
        .expect("restore");
    assert_eq!(restored, 1);

    let record = harness
        .engine
        .store()
        .get("py-1", "user-1")
        .expect("get")
        .expect("record");
    assert_eq!(record.note, "Notes on python syntax.");
}

#[tokio::test]
async fn bulk_over_hard_cap_rejected_without_backup() {
    let harness = TestEngine::with_config(imprint_core::EngineConfig {
        batch_size_hard_cap: 1,
        ..Default::default()
    });
    harness.grant_write_full("user-1");
    harness
        .submit("notes_app", "user-1", python_corpus())
        .await
        .expect("seed");

    let err = harness
        .engine
        .write(WriteRequest {
            user_id: "user-1".into(),
            op: bulk_tag_op(),
            intent_description: "too big".into(),
            dry_run: false,
            batch_size: None,
            deadline_ms: None,
            context: harness.context(),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::BatchTooLarge { got: 2, limit: 1 }));
    // No backup was created and nothing changed
    assert!(harness
        .engine
        .backups()
        .recent_for_user("user-1", 10)
        .expect("recent")
        .is_empty());
    let record = harness
        .engine
        .store()
        .get("py-1", "user-1")
        .expect("get")
        .expect("record");
    assert_eq!(record.tags, vec!["python".to_string()]);
}

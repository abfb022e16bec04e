//! Record invariants after real pipeline runs
//!
//! Tier placement, influence bounds, tag normalization, id uniqueness,
//! and migration stability, exercised through the engine rather than in
//! isolation.

use chrono::{Duration, Utc};
use imprint_core::{influence_weight, tier_for, QueryFilter, Tier, TierPolicy};
use imprint_e2e_tests::harness::TestEngine;
use imprint_e2e_tests::mocks::observation;

#[tokio::test]
async fn influence_and_tier_match_their_definitions() {
    let harness = TestEngine::new();
    harness
        .submit(
            "browser_extension",
            "user-1",
            vec![observation(
                "r-1",
                "Some highlight text for scoring",
                "A note that is long enough to score against the quality factors properly.",
                &["tag-a", "tag-b"],
            )],
        )
        .await
        .expect("submit");

    let record = harness
        .engine
        .store()
        .get("r-1", "user-1")
        .expect("get")
        .expect("record");

    // I5: influence is exactly the clamp formula over quality and attention
    let expected = influence_weight(record.quality, record.attention);
    assert!((record.influence - expected).abs() < 1e-9);
    assert!((0.05..=1.0).contains(&record.influence));

    // I6: tier is the pure function of influence and age
    let age = record.age_days(Utc::now());
    assert_eq!(record.tier, tier_for(record.influence, age, &TierPolicy::default()));
}

#[tokio::test]
async fn tags_are_normalized_on_ingest() {
    let harness = TestEngine::new();
    let mut raw = observation("r-1", "h", "n", &[]);
    raw.tags = Some(vec![
        " Python ".into(),
        "PYTHON".into(),
        "python".into(),
        "".into(),
        "Data-Science".into(),
    ]);
    harness
        .submit("app", "user-1", vec![raw])
        .await
        .expect("submit");

    let record = harness
        .engine
        .store()
        .get("r-1", "user-1")
        .expect("get")
        .expect("record");
    assert_eq!(
        record.tags,
        vec!["data-science".to_string(), "python".to_string()]
    );
}

#[tokio::test]
async fn duplicate_id_across_users_is_rejected() {
    let harness = TestEngine::new();
    harness
        .submit("app", "user-1", vec![observation("shared-id", "h", "n", &[])])
        .await
        .expect("submit");

    let result = harness
        .submit("app", "user-2", vec![observation("shared-id", "h", "n", &[])])
        .await
        .expect("submit");
    assert_eq!(result.processed_count, 0);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].message.contains("another user"));
}

#[tokio::test]
async fn reingest_after_soft_delete_is_rejected_by_default() {
    let harness = TestEngine::new();
    harness.grant_write_full("user-1");
    let note = observation("r-1", "h", "some note", &[]);
    harness
        .submit("app", "user-1", vec![note.clone()])
        .await
        .expect("submit");
    harness
        .engine
        .delete("user-1", vec!["r-1".into()], true, harness.context())
        .await
        .expect("soft delete");

    let result = harness.submit("app", "user-1", vec![note]).await.expect("submit");
    assert_eq!(result.processed_count, 0);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].message.contains("soft-deleted"));
}

#[tokio::test]
async fn migration_is_a_noop_right_after_writes() {
    let harness = TestEngine::new();
    harness
        .submit(
            "app",
            "user-1",
            (0..5)
                .map(|i| observation(&format!("r-{i}"), "highlight", "note text", &["t"]))
                .collect(),
        )
        .await
        .expect("submit");

    let report = harness.engine.run_maintenance().expect("maintenance");
    assert_eq!(report.examined, 5);
    assert_eq!(report.moved, 0);
}

#[tokio::test]
async fn aged_records_migrate_and_stay_retrievable() {
    let harness = TestEngine::new();
    let mut old = observation("old-1", "An old observation", "From a while back.", &[]);
    old.timestamp = Some((Utc::now() - Duration::days(60)).to_rfc3339());
    harness.submit("app", "user-1", vec![old]).await.expect("submit");

    // Low quality/attention and 60 days old: the migration pass sends it
    // to cold (ingest routed it by the same function, so this is a no-op
    // unless scores put it elsewhere)
    harness.engine.run_maintenance().expect("maintenance");
    let row = harness
        .engine
        .store()
        .index_row("old-1")
        .expect("row")
        .expect("present");
    let record = harness
        .engine
        .store()
        .get("old-1", "user-1")
        .expect("get")
        .expect("still retrievable");
    assert_eq!(record.id, "old-1");
    assert_eq!(row.tier, record.tier);

    // Filters still see it
    let ids = harness
        .engine
        .store()
        .query_by_filter(&QueryFilter {
            user_id: "user-1".into(),
            ..Default::default()
        })
        .expect("query");
    assert!(ids.contains(&"old-1".to_string()));
}

#[tokio::test]
async fn soft_deleted_records_hidden_from_every_read_path() {
    let harness = TestEngine::new();
    harness.grant_write_full("user-1");
    harness
        .submit(
            "app",
            "user-1",
            vec![observation("r-1", "findable highlight", "findable note", &["findme"])],
        )
        .await
        .expect("submit");
    harness
        .engine
        .delete("user-1", vec!["r-1".into()], true, harness.context())
        .await
        .expect("delete");

    assert!(harness.engine.store().get("r-1", "user-1").expect("get").is_none());
    let ids = harness
        .engine
        .store()
        .query_by_filter(&QueryFilter {
            user_id: "user-1".into(),
            ..Default::default()
        })
        .expect("query");
    assert!(ids.is_empty());

    let response = harness
        .engine
        .search(imprint_core::SearchRequest {
            user_id: "user-1".into(),
            query_text: Some("findable".into()),
            limit: 10,
            min_relevance_score: Some(0.0),
            ..Default::default()
        })
        .await
        .expect("search");
    assert!(response.results.is_empty());

    // Tier is still what the record's scores dictate (I6 on the row)
    let row = harness
        .engine
        .store()
        .index_row("r-1")
        .expect("row")
        .expect("retained");
    assert!(row.deleted);
}

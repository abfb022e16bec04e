//! Journey: a single learning note flows end to end
//!
//! Submit one observation, verify storage tier, quality and attention
//! floors, the derived core interest, and the rendered context view.

use imprint_core::{ComponentKind, ContextRequest, Status, Tier};
use imprint_e2e_tests::harness::TestEngine;
use imprint_e2e_tests::mocks::{learning_note, observation};

#[tokio::test]
async fn single_learning_note_builds_a_profile() {
    let harness = TestEngine::new();
    let result = harness
        .submit("browser_extension", "user-1", vec![learning_note("note-1")])
        .await
        .expect("submit");

    assert_eq!(result.status, Status::Success);
    assert_eq!(result.processed_count, 1);
    assert!(result.errors.is_empty());
    assert!(!result.degraded);

    // Fresh record lands in the hot tier with healthy scores
    let record = harness
        .engine
        .store()
        .get("note-1", "user-1")
        .expect("get")
        .expect("stored");
    assert_eq!(record.tier, Tier::Hot);
    assert!(record.quality >= 0.5, "quality was {}", record.quality);
    assert!(record.attention >= 0.0999, "attention was {}", record.attention);
    assert!(record.embedding.is_some());
    assert!(!record.enhanced_tags.is_empty());

    // The learning keywords derived exactly one core-interest component
    let context = harness
        .engine
        .get_context(ContextRequest {
            user_id: "user-1".into(),
            current_request: None,
            include_details: true,
        })
        .await
        .expect("context");

    let details = context.details.expect("details");
    assert_eq!(details.len(), 1);
    assert_eq!(details[0].kind, ComponentKind::CoreInterest);
    assert_eq!(context.view.core_interests.len(), 1);
    assert!(context.view.core_interests[0].to_lowercase().contains("learning"));
    assert_eq!(context.view.active_components_count, 1);
}

#[tokio::test]
async fn reingesting_identical_record_is_idempotent() {
    let harness = TestEngine::new();
    let note = learning_note("note-1");
    harness
        .submit("browser_extension", "user-1", vec![note.clone()])
        .await
        .expect("first submit");
    let second = harness
        .submit("browser_extension", "user-1", vec![note])
        .await
        .expect("second submit");

    assert_eq!(second.status, Status::Success);

    // Still a single stored record
    let ids = harness
        .engine
        .store()
        .query_by_filter(&imprint_core::QueryFilter {
            user_id: "user-1".into(),
            ..Default::default()
        })
        .expect("query");
    assert_eq!(ids, vec!["note-1".to_string()]);
}

#[tokio::test]
async fn batch_reports_per_item_validation_errors() {
    let harness = TestEngine::new();
    let mut bad = observation("bad-1", "h", "n", &[]);
    bad.access = Some("classified".into());
    let result = harness
        .submit(
            "browser_extension",
            "user-1",
            vec![learning_note("good-1"), bad],
        )
        .await
        .expect("submit");

    assert_eq!(result.status, Status::Partial);
    assert_eq!(result.processed_count, 1);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].index, 1);
    assert!(result.errors[0].message.contains("access"));

    // The good record still made it in
    assert!(harness
        .engine
        .store()
        .get("good-1", "user-1")
        .expect("get")
        .is_some());
}

#[tokio::test]
async fn oversized_batch_rejected() {
    let harness = TestEngine::new();
    let records: Vec<_> = (0..101)
        .map(|i| observation(&format!("r{i}"), "h", "n", &[]))
        .collect();
    let err = harness
        .submit("browser_extension", "user-1", records)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        imprint_core::EngineError::BatchTooLarge { got: 101, limit: 100 }
    ));
}

#[tokio::test]
async fn profile_context_follows_the_current_request() {
    let harness = TestEngine::new();
    harness
        .submit(
            "browser_extension",
            "user-1",
            vec![
                observation(
                    "ml-1",
                    "Learning about machine learning validation",
                    "I want to understand cross validation for machine learning models.",
                    &["ml"],
                ),
                observation(
                    "cook-1",
                    "Learning sourdough baking",
                    "I want to understand hydration ratios for sourdough bread baking.",
                    &["baking"],
                ),
            ],
        )
        .await
        .expect("submit");

    let context = harness
        .engine
        .get_context(ContextRequest {
            user_id: "user-1".into(),
            current_request: Some("how do I validate machine learning models?".into()),
            include_details: false,
        })
        .await
        .expect("context");

    assert!(!context.view.relevant_context.is_empty());
    assert!(
        context.view.relevant_context[0].to_lowercase().contains("ml")
            || context.view.relevant_context[0].to_lowercase().contains("machine"),
        "most relevant was: {}",
        context.view.relevant_context[0]
    );
}

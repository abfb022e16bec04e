//! Profile weight and audit invariants through the engine

use imprint_core::{ContextRequest, QueryFilter, WriteOp, WriteRequest};
use imprint_e2e_tests::harness::TestEngine;
use imprint_e2e_tests::mocks::{learning_note, observation};

async fn component_weights(harness: &TestEngine, user_id: &str) -> Vec<f64> {
    harness
        .engine
        .get_context(ContextRequest {
            user_id: user_id.into(),
            current_request: None,
            include_details: true,
        })
        .await
        .expect("context")
        .details
        .expect("details")
        .iter()
        .map(|c| c.normalized_weight)
        .collect()
}

#[tokio::test]
async fn normalized_weights_sum_to_one() {
    let harness = TestEngine::new();
    harness
        .submit(
            "browser_extension",
            "user-1",
            vec![
                learning_note("n-1"),
                observation(
                    "w-1",
                    "Sprint planning for the billing project",
                    "Work task: prepare the meeting agenda before the deadline.",
                    &["work"],
                ),
                observation(
                    "g-1",
                    "Learning watercolor techniques",
                    "I want to learn wet-on-wet blending for landscape painting.",
                    &["art"],
                ),
            ],
        )
        .await
        .expect("submit");

    let weights = component_weights(&harness, "user-1").await;
    assert!(!weights.is_empty());
    let total: f64 = weights.iter().sum();
    assert!((total - 1.0).abs() < 1e-9, "weights summed to {total}");
}

#[tokio::test]
async fn weights_stay_normalized_across_batches() {
    let harness = TestEngine::new();
    for i in 0..4 {
        harness
            .submit(
                "browser_extension",
                "user-1",
                vec![observation(
                    &format!("n-{i}"),
                    &format!("Learning topic number {i}"),
                    &format!("I want to understand subject area {i} in depth."),
                    &[&format!("topic{i}")],
                )],
            )
            .await
            .expect("submit");

        let weights = component_weights(&harness, "user-1").await;
        let total: f64 = weights.iter().sum();
        assert!((total - 1.0).abs() < 1e-9, "after batch {i}: {total}");
    }
}

#[tokio::test]
async fn empty_profile_has_zero_weight() {
    let harness = TestEngine::new();
    let weights = component_weights(&harness, "nobody").await;
    assert!(weights.is_empty());
}

#[tokio::test]
async fn strengthening_saturates_confidence() {
    let harness = TestEngine::new();
    // The same note content five times under different ids: identical
    // embeddings, so every intent after the first strengthens
    for i in 0..5 {
        harness
            .submit("browser_extension", "user-1", vec![{
                let mut note = learning_note(&format!("n-{i}"));
                note.address = Some("https://example.com/ml-course".into());
                note
            }])
            .await
            .expect("submit");
    }

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

    // One dominant core interest rather than five duplicates
    let interests: Vec<_> = details
        .iter()
        .filter(|c| c.kind == imprint_core::ComponentKind::CoreInterest)
        .collect();
    assert_eq!(interests.len(), 1, "got {} interests", interests.len());
    assert!(interests[0].confidence >= 0.99);
    assert!(interests[0].evidence_count >= 5);
}

#[tokio::test]
async fn one_audit_entry_per_authorization_decision() {
    let harness = TestEngine::new();
    harness.grant_write_full("user-1");
    harness
        .submit(
            "notes_app",
            "user-1",
            vec![observation("r-1", "h", "note", &["x"])],
        )
        .await
        .expect("seed");

    let ops: Vec<(WriteOp, bool)> = vec![
        (
            WriteOp::BulkTag {
                filter: QueryFilter {
                    user_id: "user-1".into(),
                    tags: Some(vec!["x".into()]),
                    ..Default::default()
                },
                tags: vec!["y".into()],
            },
            true,
        ),
        (
            WriteOp::Update {
                id: "r-1".into(),
                patch: imprint_core::RecordPatch {
                    note: Some("edited".into()),
                    ..Default::default()
                },
                options: Default::default(),
            },
            false,
        ),
        (
            WriteOp::Delete {
                ids: vec!["r-1".into()],
                soft: true,
            },
            false,
        ),
    ];
    let decisions = ops.len();

    for (op, dry_run) in ops {
        harness
            .engine
            .write(WriteRequest {
                user_id: "user-1".into(),
                op,
                intent_description: String::new(),
                dry_run,
                batch_size: None,
                deadline_ms: None,
                context: harness.context(),
            })
            .await
            .expect("write");
    }

    let total = harness
        .engine
        .authorizer()
        .audit()
        .count_for_user("user-1")
        .expect("count");
    assert_eq!(total as usize, decisions);
}

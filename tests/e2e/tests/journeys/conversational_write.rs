//! Journey: conversational writes
//!
//! The structured intent from the external parser maps onto governed
//! operations; risky ones park behind a confirmation session.

use imprint_core::{
    ConversationalWriteRequest, QueryFilter, WriteIntent, WriteIntentType, WriteOpKind,
};
use imprint_e2e_tests::harness::TestEngine;
use imprint_e2e_tests::mocks::observation;

fn tag_intent() -> WriteIntent {
    WriteIntent {
        intent_type: WriteIntentType::BulkTag,
        operation_type: WriteOpKind::BulkTag,
        target_filter: Some(QueryFilter {
            tags: Some(vec!["python".into()]),
            ..Default::default()
        }),
        operation_data: serde_json::json!({ "tags": ["programming-language"] }),
        confidence: 0.85,
        description: "Add the tag programming-language to all python records".into(),
    }
}

async fn seed(harness: &TestEngine) {
    harness.grant_write_full("user-1");
    harness
        .submit(
            "notes_app",
            "user-1",
            vec![
                observation("py-1", "Python notes", "Generator syntax.", &["python"]),
                observation("py-2", "More python", "Iterator protocol.", &["python"]),
            ],
        )
        .await
        .expect("seed");
}

#[tokio::test]
async fn confirmation_round_trip_applies_the_operation() {
    let harness = TestEngine::new();
    seed(&harness).await;

    // Propose with a dry-run preview
    let response = harness
        .engine
        .conversational_write(ConversationalWriteRequest {
            user_id: "user-1".into(),
            intent: tag_intent(),
            dry_run: true,
            auto_confirm: false,
            context: harness.context(),
        })
        .await
        .expect("propose");

    assert!(response.needs_confirmation);
    let session_id = response.session_id.clone().expect("session");
    let preview = response.preview.expect("preview");
    assert!(preview.dry_run);
    assert_eq!(preview.matched_count, 2);

    // Nothing changed yet
    let record = harness
        .engine
        .store()
        .get("py-1", "user-1")
        .expect("get")
        .expect("record");
    assert_eq!(record.tags, vec!["python".to_string()]);

    // Confirm: the parked operation runs
    let outcome = harness
        .engine
        .confirm_write(&session_id, true, harness.context())
        .await
        .expect("confirm")
        .expect("executed");
    assert_eq!(outcome.affected_count, 2);

    let record = harness
        .engine
        .store()
        .get("py-1", "user-1")
        .expect("get")
        .expect("record");
    assert!(record.tags.contains(&"programming-language".to_string()));
}

#[tokio::test]
async fn declined_confirmation_changes_nothing() {
    let harness = TestEngine::new();
    seed(&harness).await;

    let response = harness
        .engine
        .conversational_write(ConversationalWriteRequest {
            user_id: "user-1".into(),
            intent: tag_intent(),
            dry_run: false,
            auto_confirm: false,
            context: harness.context(),
        })
        .await
        .expect("propose");
    let session_id = response.session_id.expect("session");

    let outcome = harness
        .engine
        .confirm_write(&session_id, false, harness.context())
        .await
        .expect("decline");
    assert!(outcome.is_none());

    let record = harness
        .engine
        .store()
        .get("py-1", "user-1")
        .expect("get")
        .expect("record");
    assert_eq!(record.tags, vec!["python".to_string()]);
}

#[tokio::test]
async fn auto_confirm_skips_the_session() {
    let harness = TestEngine::new();
    seed(&harness).await;

    let response = harness
        .engine
        .conversational_write(ConversationalWriteRequest {
            user_id: "user-1".into(),
            intent: tag_intent(),
            dry_run: false,
            auto_confirm: true,
            context: harness.context(),
        })
        .await
        .expect("auto");

    assert!(!response.needs_confirmation);
    assert!(response.session_id.is_none());
    let outcome = response.preview.expect("outcome");
    assert_eq!(outcome.affected_count, 2);
}

#[tokio::test]
async fn low_confidence_intent_is_bounced() {
    let harness = TestEngine::new();
    seed(&harness).await;

    let mut intent = tag_intent();
    intent.confidence = 0.1;
    let err = harness
        .engine
        .conversational_write(ConversationalWriteRequest {
            user_id: "user-1".into(),
            intent,
            dry_run: false,
            auto_confirm: true,
            context: harness.context(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, imprint_core::EngineError::Validation(_)));
}

//! Journey: repeated address revisits surface a current goal
//!
//! Four visits to the same address across ten days; the fourth submission
//! crosses the revisit threshold and working memory gains a goal.

use imprint_core::{ComponentKind, ContextRequest, MemoryLayer};
use imprint_e2e_tests::harness::TestEngine;
use imprint_e2e_tests::mocks::revisit_series;

#[tokio::test]
async fn fourth_visit_creates_a_current_goal() {
    let harness = TestEngine::new();
    let visits = revisit_series(4, "https://docs.example.com/runtime-internals", 10);

    // Submit one visit at a time so each scores against stored history
    for visit in visits {
        let result = harness
            .submit("browser_extension", "user-1", vec![visit])
            .await
            .expect("submit");
        assert_eq!(result.processed_count, 1);
    }

    // The fourth visit counted four at the address and emitted a goal
    let record = harness
        .engine
        .store()
        .get("visit-3", "user-1")
        .expect("get")
        .expect("stored");
    let metrics = record.attention_metrics.expect("metrics");
    assert_eq!(metrics.address_revisit, 4);

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

    let goal = details
        .iter()
        .find(|c| c.kind == ComponentKind::CurrentGoal)
        .expect("working memory gained a goal component");
    assert!(goal.confidence >= 0.4, "confidence was {}", goal.confidence);
    assert_eq!(ComponentKind::CurrentGoal.layer(), MemoryLayer::Working);
    assert!(goal.description.contains("runtime-internals"));
}

#[tokio::test]
async fn three_visits_do_not_create_a_goal() {
    let harness = TestEngine::new();
    for visit in revisit_series(3, "https://docs.example.com/runtime-internals", 6) {
        harness
            .submit("browser_extension", "user-1", vec![visit])
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
    assert!(
        !details.iter().any(|c| c.kind == ComponentKind::CurrentGoal),
        "goal appeared too early"
    );
}

#[tokio::test]
async fn repeated_visits_raise_attention() {
    let harness = TestEngine::new();
    for visit in revisit_series(6, "https://docs.example.com/runtime-internals", 12) {
        harness
            .submit("browser_extension", "user-1", vec![visit])
            .await
            .expect("submit");
    }

    let first = harness
        .engine
        .store()
        .get("visit-0", "user-1")
        .expect("get")
        .expect("stored");
    let last = harness
        .engine
        .store()
        .get("visit-5", "user-1")
        .expect("get")
        .expect("stored");
    assert!(
        last.attention > first.attention,
        "attention should grow with revisits: {} vs {}",
        last.attention,
        first.attention
    );
    assert!(last.influence > first.influence);
}

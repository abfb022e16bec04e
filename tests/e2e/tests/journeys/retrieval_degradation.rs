//! Journey: retrieval with and without the vector index
//!
//! With the vector index disabled, a text query still returns results
//! ranked by the fusion formula, and the response is flagged degraded.

use imprint_core::{EngineConfig, SearchRequest};
use imprint_e2e_tests::harness::TestEngine;
use imprint_e2e_tests::mocks::observation;

fn corpus() -> Vec<imprint_core::RawRecord> {
    vec![
        observation(
            "v-1",
            "Model validation strategies",
            "Holdout and cross validation both estimate generalization error.",
            &["ml", "validation"],
        ),
        observation(
            "v-2",
            "Why validation matters",
            "Validation is the key safeguard against overfitting because it is honest.",
            &["ml", "validation"],
        ),
        observation(
            "g-1",
            "Planting a spring garden",
            "Tomatoes need warm soil and regular watering.",
            &["garden"],
        ),
    ]
}

#[tokio::test]
async fn search_with_full_stack() {
    let harness = TestEngine::new();
    harness
        .submit("browser_extension", "user-1", corpus())
        .await
        .expect("seed");

    let response = harness
        .engine
        .search(SearchRequest {
            user_id: "user-1".into(),
            query_text: Some("validation".into()),
            limit: 10,
            min_relevance_score: Some(0.0),
            ..Default::default()
        })
        .await
        .expect("search");

    assert!(!response.degraded);
    assert!(!response.results.is_empty());
    for window in response.results.windows(2) {
        assert!(window[0].relevance >= window[1].relevance);
    }
}

#[tokio::test]
async fn text_search_survives_vector_index_outage() {
    let harness = TestEngine::with_config(EngineConfig {
        enable_vector_index: false,
        ..Default::default()
    });
    harness
        .submit("browser_extension", "user-1", corpus())
        .await
        .expect("seed");

    let response = harness
        .engine
        .search(SearchRequest {
            user_id: "user-1".into(),
            query_text: Some("validation".into()),
            limit: 10,
            min_relevance_score: Some(0.0),
            ..Default::default()
        })
        .await
        .expect("search");

    // Degraded, but text + influence + recency strategies still answer
    assert!(response.degraded);
    assert!(!response.results.is_empty());
    assert!(response
        .strategies_used
        .contains(&"full_text".to_string()));
    assert!(!response.strategies_used.contains(&"semantic".to_string()));
    let ids: Vec<&str> = response.results.iter().map(|r| r.id.as_str()).collect();
    assert!(ids.contains(&"v-1") || ids.contains(&"v-2"));
}

#[tokio::test]
async fn min_relevance_floor_is_enforced() {
    let harness = TestEngine::new();
    harness
        .submit("browser_extension", "user-1", corpus())
        .await
        .expect("seed");

    let response = harness
        .engine
        .search(SearchRequest {
            user_id: "user-1".into(),
            query_text: Some("validation".into()),
            limit: 10,
            min_relevance_score: Some(0.99),
            ..Default::default()
        })
        .await
        .expect("search");
    assert!(response.results.is_empty());
}

#[tokio::test]
async fn question_retrieval_uses_vector_and_text_only() {
    let harness = TestEngine::new();
    harness
        .submit("browser_extension", "user-1", corpus())
        .await
        .expect("seed");

    let response = harness
        .engine
        .query_relevant_for_question("user-1", "how should I validate a model?", 5, Some(0.0))
        .await
        .expect("query");

    assert!(!response.results.is_empty());
    assert!(!response
        .strategies_used
        .contains(&"high_influence".to_string()));
    let ids: Vec<&str> = response.results.iter().map(|r| r.id.as_str()).collect();
    assert!(!ids.contains(&"g-1"), "gardening is not about validation");
}

#[tokio::test]
async fn personalized_enhancement_combines_profile_and_retrieval() {
    let harness = TestEngine::new();
    harness
        .submit(
            "browser_extension",
            "user-1",
            vec![observation(
                "learn-1",
                "Learning about model validation",
                "I want to understand how to validate machine learning models properly, \
                 because honest validation is the key to trustworthy results.",
                &["ml", "validation"],
            )],
        )
        .await
        .expect("seed");

    let enhancement = harness
        .engine
        .personalized_enhancement("user-1", "what is cross validation?", 5)
        .await
        .expect("enhancement");

    assert!(enhancement
        .personalized_prompt
        .contains("what is cross validation?"));
    assert!(enhancement.personalized_prompt.contains("Core interests:"));
    assert!(!enhancement.knowledge_components.is_empty());
    assert!(enhancement.psp_summary.contains("profile components"));
}

#[tokio::test]
async fn zero_deadline_returns_degraded_partial() {
    let harness = TestEngine::new();
    harness
        .submit("browser_extension", "user-1", corpus())
        .await
        .expect("seed");

    let response = harness
        .engine
        .search(SearchRequest {
            user_id: "user-1".into(),
            query_text: Some("validation".into()),
            limit: 10,
            min_relevance_score: Some(0.0),
            deadline_ms: Some(0),
            ..Default::default()
        })
        .await
        .expect("search");
    assert!(response.degraded);
}

//! Consultation scenarios across a three-expert panel.

use super::support::*;
use crate::error::EnsembleError;
use crate::expert::ExpertProfile;
use crate::service::Consilium;
use crate::types::{EnsembleMode, Query};
use consilium_core::Domain;
use consilium_llm::ScriptedClient;
use std::time::Duration;

const BOND_ANSWER: &str = "A chemical bond joins atoms by sharing electrons";
const HELIUM_ANSWER: &str = "Helium is a noble gas";

/// Chemistry and biology answer from their own snippets; general falls
/// through to the default reply.
fn divergent_client() -> ScriptedClient {
    ScriptedClient::new()
        .with_rule("sharing electrons", BOND_ANSWER, 0.8)
        .with_rule("junction proteins", "Cells stick together through junction proteins", 0.9)
        .with_default_confidence(0.7)
}

/// Chemistry and biology agree; general disagrees with the highest confidence.
fn two_against_one_client() -> ScriptedClient {
    ScriptedClient::new()
        .with_rule("sharing electrons", HELIUM_ANSWER, 0.7)
        .with_rule("junction proteins", HELIUM_ANSWER, 0.6)
        .with_default_confidence(0.9)
}

fn seed_chemistry_scores(service: &Consilium) {
    service.submit_feedback(CHEMISTRY, "chemistry", 0.9).unwrap();
    service.submit_feedback(BIOLOGY, "chemistry", 0.3).unwrap();
    service.submit_feedback(GENERAL, "chemistry", 0.1).unwrap();
}

#[tokio::test]
async fn test_specialized_expert_wins_weighted_consensus() {
    let service = panel(divergent_client()).await;
    seed_chemistry_scores(&service);

    let outcome = service
        .consult(BOND_QUESTION, Some("chemistry"), Some(EnsembleMode::Weighted))
        .await
        .unwrap();
    let response = outcome.as_ensemble().unwrap();

    assert_eq!(response.consensus_expert_id, CHEMISTRY);
    assert_eq!(response.consensus_answer, BOND_ANSWER);
    assert_eq!(response.strategy, EnsembleMode::Weighted);
    assert_eq!(response.per_expert_responses.len(), 3);
    assert!(!response.degraded_consensus);
    assert!(response.timed_out_experts.is_empty());

    let expected = (0.9 * 0.8 + 0.3 * 0.9 + 0.1 * 0.7) / (0.9 + 0.3 + 0.1);
    assert!((response.consensus_confidence - expected).abs() < 1e-4);
    assert!(response.consensus_confidence >= 0.7 && response.consensus_confidence <= 0.9);
    assert!((0.0..=1.0).contains(&response.agreement_score));

    let chemistry = response
        .per_expert_responses
        .iter()
        .find(|r| r.expert_id == CHEMISTRY)
        .unwrap();
    assert_eq!(chemistry.supporting_snippet_ids.len(), 1);
    assert!(!chemistry.retrieval_degraded);
}

#[tokio::test]
async fn test_consultation_feeds_specialization() {
    let service = panel(divergent_client()).await;
    seed_chemistry_scores(&service);

    service
        .consult(BOND_QUESTION, Some("chemistry"), None)
        .await
        .unwrap();
    service.flush_feedback().await;

    // alpha = 1, no reference answer: the score becomes the answer confidence.
    let record = service
        .tracker()
        .record(CHEMISTRY, &Domain::new("chemistry"))
        .unwrap();
    assert_eq!(record.queries_answered, 2);
    assert!((record.specialization_score - 0.8).abs() < 1e-6);
    assert_eq!(record.timeouts, 0);
}

#[tokio::test]
async fn test_reference_answer_drives_quality() {
    let service = panel(divergent_client()).await;
    let query = Query::new(BOND_QUESTION)
        .with_domain("chemistry")
        .with_reference_answer(BOND_ANSWER);

    service.consult_query(query).await.unwrap();
    service.flush_feedback().await;

    let chemistry = Domain::new("chemistry");
    let tracker = service.tracker();
    assert!((tracker.score(CHEMISTRY, &chemistry) - 1.0).abs() < 1e-6);
    assert!(tracker.score(BIOLOGY, &chemistry) < 0.5);
    assert_eq!(tracker.ranking(&chemistry)[0].0, CHEMISTRY);
}

#[tokio::test]
async fn test_single_mode_uses_most_specialized_expert() {
    let service = panel(divergent_client()).await;
    service.submit_feedback(BIOLOGY, "chemistry", 0.95).unwrap();

    let outcome = service
        .consult(BOND_QUESTION, Some("chemistry"), Some(EnsembleMode::Single))
        .await
        .unwrap();
    let response = outcome.as_single().unwrap();
    assert_eq!(response.expert_id, BIOLOGY);
    assert_eq!(outcome.answer_text(), "Cells stick together through junction proteins");
}

#[tokio::test]
async fn test_majority_is_deterministic() {
    let service = panel(two_against_one_client()).await;

    let mut consensus = Vec::new();
    for _ in 0..2 {
        let outcome = service
            .consult(BOND_QUESTION, Some("chemistry"), Some(EnsembleMode::Majority))
            .await
            .unwrap();
        let response = outcome.as_ensemble().unwrap().clone();
        assert!(!response.degraded_consensus);
        assert!((response.agreement_score - 2.0 / 3.0).abs() < 1e-6);
        consensus.push((response.consensus_answer, response.consensus_expert_id));
    }

    assert_eq!(consensus[0], consensus[1]);
    assert_eq!(consensus[0], (HELIUM_ANSWER.to_string(), CHEMISTRY.to_string()));
}

#[tokio::test]
async fn test_majority_without_quorum_degrades_to_weighted() {
    let service = panel(divergent_client()).await;
    seed_chemistry_scores(&service);

    let outcome = service
        .consult(BOND_QUESTION, Some("chemistry"), Some(EnsembleMode::Majority))
        .await
        .unwrap();
    let response = outcome.as_ensemble().unwrap();
    assert!(response.degraded_consensus);
    assert_eq!(response.consensus_expert_id, CHEMISTRY);
}

#[tokio::test]
async fn test_unanimous_succeeds_only_with_one_cluster() {
    let agreeing = panel(
        ScriptedClient::new().with_rule("chemical bond", HELIUM_ANSWER, 0.8),
    )
    .await;
    let outcome = agreeing
        .consult(BOND_QUESTION, Some("chemistry"), Some(EnsembleMode::Unanimous))
        .await
        .unwrap();
    let response = outcome.as_ensemble().unwrap();
    assert_eq!(response.consensus_answer, HELIUM_ANSWER);
    assert_eq!(response.agreement_score, 1.0);

    let split = panel(two_against_one_client()).await;
    let err = split
        .consult(BOND_QUESTION, Some("chemistry"), Some(EnsembleMode::Unanimous))
        .await
        .unwrap_err();
    match err {
        EnsembleError::ConsensusFailed(failure) => {
            assert_eq!(failure.clusters, 2);
            assert_eq!(failure.responses.len(), 3);
        }
        other => panic!("expected ConsensusFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_detached_index_lowers_confidence() {
    let service = service(ScriptedClient::new().with_rule("chemical bond", BOND_ANSWER, 0.8));
    service
        .register_expert(ExpertProfile::new(CHEMISTRY, "chemistry", "scripted"))
        .unwrap();
    service
        .ingest("chemistry", CHEMISTRY_SNIPPET, serde_json::json!({}))
        .await
        .unwrap();

    let chemistry = Domain::new("chemistry");
    let healthy = service
        .consult(BOND_QUESTION, Some("chemistry"), Some(EnsembleMode::Single))
        .await
        .unwrap();

    let index = service.retriever().store().detach(&chemistry).unwrap();
    let degraded = service
        .consult(BOND_QUESTION, Some("chemistry"), Some(EnsembleMode::Single))
        .await
        .unwrap();

    let degraded_response = degraded.as_single().unwrap();
    assert!(degraded_response.retrieval_degraded);
    assert!(degraded_response.supporting_snippet_ids.is_empty());
    assert!(degraded.confidence() < healthy.confidence());
    assert!((degraded.confidence() - 0.8 * 0.6).abs() < 1e-6);

    service.retriever().store().attach(&chemistry, index).unwrap();
    let restored = service
        .consult(BOND_QUESTION, Some("chemistry"), Some(EnsembleMode::Single))
        .await
        .unwrap();
    assert!(!restored.as_single().unwrap().retrieval_degraded);
    assert_eq!(restored.confidence(), healthy.confidence());
}

#[tokio::test]
async fn test_retrieval_outage_with_failing_backend_is_reported() {
    let service = service(ScriptedClient::new().failing("backend down"));
    service
        .register_expert(ExpertProfile::new(CHEMISTRY, "chemistry", "scripted"))
        .unwrap();
    service
        .retriever()
        .store()
        .detach(&Domain::new("chemistry"))
        .unwrap();

    let err = service
        .consult(BOND_QUESTION, Some("chemistry"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, EnsembleError::RetrievalUnavailable(_)));
}

#[tokio::test]
async fn test_slow_experts_are_reported_as_timeouts() {
    let service = panel(divergent_client().with_delay(Duration::from_millis(500)))
        .await
        .with_expert_timeout(Duration::from_millis(20));

    let err = service
        .consult(BOND_QUESTION, Some("chemistry"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, EnsembleError::NoExpertAvailable(_)));

    service.flush_feedback().await;
    let record = service
        .tracker()
        .record(CHEMISTRY, &Domain::new("chemistry"))
        .unwrap();
    assert_eq!(record.timeouts, 1);
    assert_eq!(record.queries_answered, 0);
    assert_eq!(record.specialization_score, 0.5);
    assert!(record.reliability < 1.0);
}

#[tokio::test]
async fn test_irrelevant_or_unknown_domains() {
    let service = panel(divergent_client()).await;

    let err = service
        .consult(BOND_QUESTION, Some("astronomy"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, EnsembleError::UnknownDomain(_)));

    // Only the biology expert is relevant to biology.
    let outcome = service
        .consult("How do cells attach?", Some("biology"), Some(EnsembleMode::Weighted))
        .await
        .unwrap();
    let response = outcome.as_ensemble().unwrap();
    assert_eq!(response.per_expert_responses.len(), 1);
    assert_eq!(response.consensus_expert_id, BIOLOGY);
}

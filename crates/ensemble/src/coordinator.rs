//! Ensemble coordination: candidate selection, concurrent dispatch and
//! consensus.

use crate::consensus::{self, Reduction};
use crate::error::{ConsensusFailure, EnsembleError};
use crate::expert::Expert;
use crate::feedback::{FeedbackEvent, FeedbackSender};
use crate::similarity::AnswerSimilarity;
use crate::specialization::SpecializationTracker;
use crate::types::{ConsultOutcome, EnsembleMode, EnsembleResponse, ExpertId, ExpertResponse, Query};
use consilium_core::{ConsiliumConfig, Domain};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::instrument;

/// Tunables of the coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// Minimum relevance (exclusive) for an expert to receive a hinted query
    pub relevance_threshold: f32,

    /// Minimum answer similarity for two answers to share a cluster
    pub similarity_threshold: f32,

    pub expert_timeout: Duration,

    /// Snippets retrieved per expert
    pub top_k: usize,
}

impl CoordinatorSettings {
    pub fn from_config(config: &ConsiliumConfig) -> Self {
        Self {
            relevance_threshold: config.ensemble.relevance_threshold,
            similarity_threshold: config.ensemble.similarity_threshold,
            expert_timeout: Duration::from_secs(config.ensemble.expert_timeout_secs),
            top_k: config.retrieval.top_k,
        }
    }
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            relevance_threshold: 0.3,
            similarity_threshold: 0.85,
            expert_timeout: Duration::from_secs(10),
            top_k: 4,
        }
    }
}

/// Outcome of dispatching a query to a set of experts.
#[derive(Debug, Default)]
struct Dispatch {
    responses: Vec<ExpertResponse>,
    timed_out: Vec<(ExpertId, Domain)>,
    failed: Vec<ExpertId>,
    /// Every failure so far coincided with a retrieval outage
    failures_from_retrieval: bool,
}

#[derive(Debug)]
enum ReduceFailure {
    /// Unanimity failed across this many clusters
    Split(usize),
    Empty,
}

/// Routes queries to experts and reduces their answers.
#[derive(Debug)]
pub struct EnsembleCoordinator {
    settings: CoordinatorSettings,
    tracker: Arc<SpecializationTracker>,
    similarity: Arc<dyn AnswerSimilarity>,
    feedback: FeedbackSender,
}

impl EnsembleCoordinator {
    pub fn new(
        settings: CoordinatorSettings,
        tracker: Arc<SpecializationTracker>,
        similarity: Arc<dyn AnswerSimilarity>,
        feedback: FeedbackSender,
    ) -> Self {
        Self {
            settings,
            tracker,
            similarity,
            feedback,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.settings.expert_timeout = timeout;
        self
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    /// Experts eligible for `query`, sorted by id.
    ///
    /// With a domain hint, only experts whose relevance to it exceeds the
    /// threshold; otherwise every expert.
    pub fn candidates(&self, query: &Query, experts: &[Arc<dyn Expert>]) -> Vec<Arc<dyn Expert>> {
        let mut candidates: Vec<Arc<dyn Expert>> = match &query.domain_hint {
            Some(hint) => experts
                .iter()
                .filter(|e| e.relevance(hint) > self.settings.relevance_threshold)
                .cloned()
                .collect(),
            None => experts.to_vec(),
        };
        candidates.sort_by(|a, b| a.id().cmp(b.id()));
        candidates
    }

    /// Candidates ordered best first: highest specialization score for the
    /// query domain, then highest relevance, then smallest id.
    pub fn rank_single(&self, query: &Query, candidates: &[Arc<dyn Expert>]) -> Vec<Arc<dyn Expert>> {
        let mut ranked = candidates.to_vec();
        ranked.sort_by(|a, b| {
            let domain_a = query.domain_hint.as_ref().unwrap_or(a.domain());
            let domain_b = query.domain_hint.as_ref().unwrap_or(b.domain());
            self.tracker
                .score(b.id(), domain_b)
                .total_cmp(&self.tracker.score(a.id(), domain_a))
                .then_with(|| b.relevance(domain_b).total_cmp(&a.relevance(domain_a)))
                .then_with(|| a.id().cmp(b.id()))
        });
        ranked
    }

    /// Best-suited candidate, as ranked by [`rank_single`](Self::rank_single).
    pub fn select_single(&self, query: &Query, candidates: &[Arc<dyn Expert>]) -> Option<Arc<dyn Expert>> {
        self.rank_single(query, candidates).into_iter().next()
    }

    /// Answer `query` with the given experts under the query's ensemble mode.
    #[instrument(skip_all, fields(mode = %query.ensemble_mode, hint = ?query.domain_hint))]
    pub async fn consult(
        &self,
        query: &Query,
        experts: &[Arc<dyn Expert>],
    ) -> Result<ConsultOutcome, EnsembleError> {
        let candidates = self.candidates(query, experts);
        if candidates.is_empty() {
            return Err(EnsembleError::NoExpertAvailable(match &query.domain_hint {
                Some(hint) => format!("no expert is relevant to domain '{}'", hint),
                None => "no experts are registered".to_string(),
            }));
        }

        let mode = query.ensemble_mode;
        if mode == EnsembleMode::Single {
            return self.consult_single(query, &candidates).await;
        }

        tracing::info!("Consulting {} expert(s) in {} mode", candidates.len(), mode);
        let dispatch = self.dispatch(query, candidates).await;

        if dispatch.responses.is_empty() {
            self.emit_feedback(query, &dispatch);
            return Err(no_survivors(&dispatch));
        }

        // Weights are fixed before this query's own feedback is queued.
        let weights: Vec<f32> = dispatch
            .responses
            .iter()
            .map(|r| {
                let domain = query.domain_hint.as_ref().unwrap_or(&r.domain);
                self.tracker.score(&r.expert_id, domain)
            })
            .collect();

        let reduced = self.reduce(mode, &dispatch.responses, &weights).await;
        self.emit_feedback(query, &dispatch);

        match reduced {
            Ok((reduction, degraded_consensus)) => Ok(ConsultOutcome::Ensemble(assemble(
                dispatch,
                reduction,
                mode,
                degraded_consensus,
            ))),
            Err(ReduceFailure::Split(clusters)) => {
                Err(EnsembleError::ConsensusFailed(Box::new(ConsensusFailure {
                    responses: dispatch.responses,
                    clusters,
                })))
            }
            Err(ReduceFailure::Empty) => Err(EnsembleError::NoExpertAvailable(
                "no responses to reduce".to_string(),
            )),
        }
    }

    /// Try candidates best first until one answers. Experts that time out
    /// or fail are reported and the next one is asked.
    async fn consult_single(
        &self,
        query: &Query,
        candidates: &[Arc<dyn Expert>],
    ) -> Result<ConsultOutcome, EnsembleError> {
        let mut missed = Dispatch {
            failures_from_retrieval: true,
            ..Default::default()
        };

        for expert in self.rank_single(query, candidates) {
            tracing::info!("Consulting '{}' in single mode", expert.id());
            let mut attempt = self.dispatch(query, vec![expert]).await;
            self.emit_feedback(query, &attempt);

            if let Some(response) = attempt.responses.pop() {
                return Ok(ConsultOutcome::Single(response));
            }
            missed.failures_from_retrieval &= attempt.failures_from_retrieval;
            missed.timed_out.append(&mut attempt.timed_out);
            missed.failed.append(&mut attempt.failed);
        }

        Err(no_survivors(&missed))
    }

    /// Reduce answered responses under `mode`. The flag marks a degraded
    /// fallback consensus.
    async fn reduce(
        &self,
        mode: EnsembleMode,
        responses: &[ExpertResponse],
        weights: &[f32],
    ) -> Result<(Reduction, bool), ReduceFailure> {
        let threshold = self.settings.similarity_threshold;
        let similarity = self.similarity.as_ref();

        match mode {
            EnsembleMode::Majority => {
                match consensus::majority(responses, weights, similarity, threshold).await {
                    Ok(reduction) => Ok((reduction, false)),
                    Err(no_majority) => {
                        tracing::warn!(
                            "No majority ({} of {} agree), falling back to weighted consensus",
                            no_majority.largest_cluster,
                            no_majority.responders
                        );
                        consensus::weighted(responses, weights)
                            .map(|r| (r, true))
                            .ok_or(ReduceFailure::Empty)
                    }
                }
            }
            EnsembleMode::Unanimous => {
                match consensus::unanimous(responses, weights, similarity, threshold).await {
                    Ok(reduction) => Ok((reduction, false)),
                    Err(clusters) => {
                        tracing::warn!(
                            "Unanimous consensus failed: {} answers in {} clusters",
                            responses.len(),
                            clusters
                        );
                        Err(ReduceFailure::Split(clusters))
                    }
                }
            }
            _ => consensus::weighted(responses, weights)
                .map(|r| (r, false))
                .ok_or(ReduceFailure::Empty),
        }
    }

    async fn dispatch(&self, query: &Query, experts: Vec<Arc<dyn Expert>>) -> Dispatch {
        let mut join_set = JoinSet::new();
        let mut pending: BTreeSet<ExpertId> = BTreeSet::new();

        for expert in experts {
            let query = query.clone();
            let timeout = self.settings.expert_timeout;
            let k = self.settings.top_k;
            pending.insert(expert.id().to_string());

            join_set.spawn(async move {
                let id = expert.id().to_string();
                let domain = expert.domain().clone();
                let result = tokio::time::timeout(timeout, expert.respond(&query, k)).await;
                (id, domain, result)
            });
        }

        let mut dispatch = Dispatch {
            failures_from_retrieval: true,
            ..Default::default()
        };

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((id, _, Ok(Ok(response)))) => {
                    tracing::debug!(
                        "Expert '{}' answered in {:?} (confidence {:.3})",
                        id,
                        response.latency,
                        response.confidence
                    );
                    pending.remove(&id);
                    dispatch.responses.push(response);
                }
                Ok((id, _, Ok(Err(e)))) => {
                    tracing::warn!("Expert '{}' failed: {}", id, e);
                    if !e.is_retrieval_unavailable() {
                        dispatch.failures_from_retrieval = false;
                    }
                    pending.remove(&id);
                    dispatch.failed.push(id);
                }
                Ok((id, domain, Err(_))) => {
                    tracing::warn!(
                        "Expert '{}' timed out after {:?}",
                        id,
                        self.settings.expert_timeout
                    );
                    pending.remove(&id);
                    dispatch.timed_out.push((id, domain));
                }
                Err(e) => {
                    tracing::warn!("Expert task failed: {}", e);
                    dispatch.failures_from_retrieval = false;
                }
            }
        }

        // Tasks that panicked never reported their id.
        dispatch.failed.extend(pending);

        dispatch.responses.sort_by(|a, b| a.expert_id.cmp(&b.expert_id));
        dispatch.timed_out.sort();
        dispatch.failed.sort();
        dispatch
    }

    fn emit_feedback(&self, query: &Query, dispatch: &Dispatch) {
        let reference = query.reference_answer().map(str::to_string);

        for response in &dispatch.responses {
            self.feedback.send(FeedbackEvent::Observation {
                expert_id: response.expert_id.clone(),
                domain: query
                    .domain_hint
                    .clone()
                    .unwrap_or_else(|| response.domain.clone()),
                answer_text: response.answer_text.clone(),
                confidence: response.confidence,
                reference: reference.clone(),
            });
        }

        for (expert_id, domain) in &dispatch.timed_out {
            self.feedback.send(FeedbackEvent::Timeout {
                expert_id: expert_id.clone(),
                domain: query.domain_hint.clone().unwrap_or_else(|| domain.clone()),
            });
        }
    }
}

fn no_survivors(dispatch: &Dispatch) -> EnsembleError {
    let timed_out: Vec<&str> = dispatch.timed_out.iter().map(|(id, _)| id.as_str()).collect();

    if timed_out.is_empty() && !dispatch.failed.is_empty() && dispatch.failures_from_retrieval {
        EnsembleError::RetrievalUnavailable(format!(
            "every expert failed during a retrieval outage: {}",
            dispatch.failed.join(", ")
        ))
    } else {
        EnsembleError::NoExpertAvailable(format!(
            "no expert answered (failed: [{}], timed out: [{}])",
            dispatch.failed.join(", "),
            timed_out.join(", ")
        ))
    }
}

fn assemble(
    dispatch: Dispatch,
    reduction: Reduction,
    strategy: EnsembleMode,
    degraded_consensus: bool,
) -> EnsembleResponse {
    let consensus = &dispatch.responses[reduction.consensus_index];

    tracing::info!(
        "Consensus from '{}': confidence {:.3}, agreement {:.3}{}",
        consensus.expert_id,
        reduction.consensus_confidence,
        reduction.agreement,
        if degraded_consensus { " (degraded)" } else { "" }
    );

    EnsembleResponse {
        consensus_answer: consensus.answer_text.clone(),
        consensus_confidence: reduction.consensus_confidence,
        agreement_score: reduction.agreement,
        consensus_expert_id: consensus.expert_id.clone(),
        strategy,
        degraded_consensus,
        timed_out_experts: dispatch.timed_out.into_iter().map(|(id, _)| id).collect(),
        failed_experts: dispatch.failed,
        per_expert_responses: dispatch.responses,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::FeedbackLoop;
    use crate::similarity::LexicalSimilarity;
    use async_trait::async_trait;
    use consilium_core::config::SpecializationConfig;
    use consilium_core::{AppError, AppResult};
    use consilium_knowledge::KnowledgeSnippet;

    /// Expert with a canned answer, for exercising the coordinator alone.
    struct FixedExpert {
        id: String,
        domain: Domain,
        answer: Result<(String, f32), AppError>,
        delay: Duration,
    }

    impl FixedExpert {
        fn new(id: &str, domain: &str, answer: &str, confidence: f32) -> Self {
            Self {
                id: id.to_string(),
                domain: Domain::new(domain),
                answer: Ok((answer.to_string(), confidence)),
                delay: Duration::ZERO,
            }
        }

        fn failing(id: &str, domain: &str, error: AppError) -> Self {
            Self {
                answer: Err(error),
                ..Self::new(id, domain, "", 0.0)
            }
        }

        fn slow(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn arc(self) -> Arc<dyn Expert> {
            Arc::new(self)
        }
    }

    #[async_trait]
    impl Expert for FixedExpert {
        fn id(&self) -> &str {
            &self.id
        }

        fn domain(&self) -> &Domain {
            &self.domain
        }

        fn relevance(&self, domain: &Domain) -> f32 {
            if *domain == self.domain {
                1.0
            } else {
                0.0
            }
        }

        async fn answer(&self, _query: &Query, _snippets: &[KnowledgeSnippet]) -> AppResult<ExpertResponse> {
            tokio::time::sleep(self.delay).await;
            match &self.answer {
                Ok((text, confidence)) => Ok(ExpertResponse {
                    expert_id: self.id.clone(),
                    domain: self.domain.clone(),
                    answer_text: text.clone(),
                    confidence: *confidence,
                    supporting_snippet_ids: Vec::new(),
                    latency: self.delay,
                    retrieval_degraded: false,
                }),
                Err(AppError::RetrievalUnavailable(m)) => Err(AppError::RetrievalUnavailable(m.clone())),
                Err(e) => Err(AppError::Other(e.to_string())),
            }
        }

        async fn respond(&self, query: &Query, _k: usize) -> AppResult<ExpertResponse> {
            self.answer(query, &[]).await
        }
    }

    fn coordinator() -> (Arc<SpecializationTracker>, FeedbackLoop, EnsembleCoordinator) {
        coordinator_with(SpecializationConfig::default())
    }

    fn coordinator_with(
        config: SpecializationConfig,
    ) -> (Arc<SpecializationTracker>, FeedbackLoop, EnsembleCoordinator) {
        let tracker = Arc::new(SpecializationTracker::new(config));
        let similarity: Arc<dyn AnswerSimilarity> = Arc::new(LexicalSimilarity);
        let feedback = FeedbackLoop::spawn(Arc::clone(&tracker), Arc::clone(&similarity));
        let coordinator = EnsembleCoordinator::new(
            CoordinatorSettings::default(),
            Arc::clone(&tracker),
            similarity,
            feedback.sender(),
        )
        .with_timeout(Duration::from_millis(200));
        (tracker, feedback, coordinator)
    }

    #[tokio::test]
    async fn test_no_candidates() {
        let (_, _, coordinator) = coordinator();
        let experts = vec![FixedExpert::new("bio", "biology", "cells", 0.9).arc()];

        let query = Query::new("What is pH?").with_domain("chemistry");
        let err = coordinator.consult(&query, &experts).await.unwrap_err();
        assert!(matches!(err, EnsembleError::NoExpertAvailable(_)));

        let err = coordinator.consult(&Query::new("anything"), &[]).await.unwrap_err();
        assert!(matches!(err, EnsembleError::NoExpertAvailable(_)));
    }

    #[tokio::test]
    async fn test_single_picks_best_specialist() {
        let (tracker, _, coordinator) = coordinator();
        let chemistry = Domain::new("chemistry");
        tracker.record_feedback("b-chem", &chemistry, 1.0);

        let experts = vec![
            FixedExpert::new("a-chem", "chemistry", "from a", 0.9).arc(),
            FixedExpert::new("b-chem", "chemistry", "from b", 0.4).arc(),
        ];
        let query = Query::new("q")
            .with_domain("chemistry")
            .with_mode(EnsembleMode::Single);

        let outcome = coordinator.consult(&query, &experts).await.unwrap();
        let response = outcome.as_single().unwrap();
        assert_eq!(response.expert_id, "b-chem");
    }

    #[tokio::test]
    async fn test_single_falls_back_when_best_times_out() {
        let (tracker, feedback, coordinator) = coordinator();
        let chemistry = Domain::new("chemistry");
        tracker.record_feedback("best", &chemistry, 1.0);
        tracker.record_feedback("broken", &chemistry, 0.9);

        let experts = vec![
            FixedExpert::new("best", "chemistry", "late", 0.9)
                .slow(Duration::from_secs(2))
                .arc(),
            FixedExpert::failing("broken", "chemistry", AppError::Llm("down".to_string())).arc(),
            FixedExpert::new("backup", "chemistry", "on time", 0.7).arc(),
        ];
        let query = Query::new("q")
            .with_domain("chemistry")
            .with_mode(EnsembleMode::Single);

        let ranked: Vec<String> = coordinator
            .rank_single(&query, &experts)
            .iter()
            .map(|e| e.id().to_string())
            .collect();
        assert_eq!(ranked, vec!["best", "broken", "backup"]);

        let outcome = coordinator.consult(&query, &experts).await.unwrap();
        assert_eq!(outcome.as_single().unwrap().expert_id, "backup");

        feedback.flush().await;
        assert_eq!(tracker.record("best", &chemistry).unwrap().timeouts, 1);
    }

    #[tokio::test]
    async fn test_single_fails_only_when_every_candidate_misses() {
        let (_, _, coordinator) = coordinator();
        let experts = vec![
            FixedExpert::new("slow", "chemistry", "late", 0.9)
                .slow(Duration::from_secs(2))
                .arc(),
            FixedExpert::failing("broken", "chemistry", AppError::Llm("down".to_string())).arc(),
        ];
        let query = Query::new("q").with_mode(EnsembleMode::Single);

        match coordinator.consult(&query, &experts).await {
            Err(EnsembleError::NoExpertAvailable(message)) => {
                assert!(message.contains("slow"));
                assert!(message.contains("broken"));
            }
            other => panic!("expected NoExpertAvailable, got {:?}", other),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_weights_ignore_the_query_own_feedback() {
        let chemistry = Domain::new("chemistry");
        let config = SpecializationConfig {
            alpha: 1.0,
            ..Default::default()
        };

        for _ in 0..200 {
            let (tracker, feedback, coordinator) = coordinator_with(config.clone());
            tracker.record_feedback("b", &chemistry, 0.9);
            let experts = vec![
                FixedExpert::new("a", "chemistry", "alpha", 1.0).arc(),
                FixedExpert::new("b", "chemistry", "beta", 0.6).arc(),
            ];
            let query = Query::new("q").with_domain("chemistry");

            let outcome = coordinator.consult(&query, &experts).await.unwrap();
            let ensemble = outcome.as_ensemble().unwrap();
            // a: 0.5 x 1.0 against b: 0.9 x 0.6
            assert_eq!(ensemble.consensus_expert_id, "b");
            let expected = (0.5 * 1.0 + 0.9 * 0.6) / (0.5 + 0.9);
            assert!((ensemble.consensus_confidence - expected).abs() < 1e-5);

            feedback.flush().await;
            assert_eq!(tracker.score("a", &chemistry), 1.0);
        }
    }

    #[tokio::test]
    async fn test_single_ties_go_to_smallest_id() {
        let (_, _, coordinator) = coordinator();
        let experts = vec![
            FixedExpert::new("z", "chemistry", "from z", 0.9).arc(),
            FixedExpert::new("m", "chemistry", "from m", 0.9).arc(),
        ];
        let query = Query::new("q").with_mode(EnsembleMode::Single);

        let outcome = coordinator.consult(&query, &experts).await.unwrap();
        assert_eq!(outcome.as_single().unwrap().expert_id, "m");
    }

    #[tokio::test]
    async fn test_weighted_ensemble_sorted_and_bounded() {
        let (_, _, coordinator) = coordinator();
        let experts = vec![
            FixedExpert::new("c", "chemistry", "three", 0.2).arc(),
            FixedExpert::new("a", "chemistry", "one", 0.9).arc(),
            FixedExpert::new("b", "chemistry", "two", 0.5).arc(),
        ];

        let outcome = coordinator.consult(&Query::new("q"), &experts).await.unwrap();
        let ensemble = outcome.as_ensemble().unwrap();

        let ids: Vec<&str> = ensemble
            .per_expert_responses
            .iter()
            .map(|r| r.expert_id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(ensemble.consensus_expert_id, "a");
        assert!(ensemble.consensus_confidence >= 0.2 && ensemble.consensus_confidence <= 0.9);
        assert_eq!(ensemble.strategy, EnsembleMode::Weighted);
    }

    #[tokio::test]
    async fn test_majority_fallback_is_degraded() {
        let (_, _, coordinator) = coordinator();
        let experts = vec![
            FixedExpert::new("a", "chemistry", "alpha", 0.6).arc(),
            FixedExpert::new("b", "chemistry", "beta", 0.7).arc(),
            FixedExpert::new("c", "chemistry", "gamma", 0.8).arc(),
        ];
        let query = Query::new("q").with_mode(EnsembleMode::Majority);

        let outcome = coordinator.consult(&query, &experts).await.unwrap();
        let ensemble = outcome.as_ensemble().unwrap();
        assert!(ensemble.degraded_consensus);
        assert_eq!(ensemble.consensus_expert_id, "c");
    }

    #[tokio::test]
    async fn test_unanimous_failure_carries_responses() {
        let (_, _, coordinator) = coordinator();
        let experts = vec![
            FixedExpert::new("a", "chemistry", "water is h2o", 0.6).arc(),
            FixedExpert::new("b", "chemistry", "salt is nacl", 0.7).arc(),
        ];
        let query = Query::new("q").with_mode(EnsembleMode::Unanimous);

        match coordinator.consult(&query, &experts).await {
            Err(EnsembleError::ConsensusFailed(failure)) => {
                assert_eq!(failure.responses.len(), 2);
                assert_eq!(failure.clusters, 2);
            }
            other => panic!("expected consensus failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeouts_and_failures_are_reported() {
        let (tracker, feedback, coordinator) = coordinator();
        let experts = vec![
            FixedExpert::new("fast", "chemistry", "answer", 0.8).arc(),
            FixedExpert::new("slow", "chemistry", "late", 0.9)
                .slow(Duration::from_secs(5))
                .arc(),
            FixedExpert::failing("broken", "chemistry", AppError::Llm("down".to_string())).arc(),
        ];

        let outcome = coordinator.consult(&Query::new("q"), &experts).await.unwrap();
        let ensemble = outcome.as_ensemble().unwrap();
        assert_eq!(ensemble.per_expert_responses.len(), 1);
        assert_eq!(ensemble.timed_out_experts, vec!["slow".to_string()]);
        assert_eq!(ensemble.failed_experts, vec!["broken".to_string()]);

        feedback.flush().await;
        let slow = tracker.record("slow", &Domain::new("chemistry")).unwrap();
        assert_eq!(slow.timeouts, 1);
        assert_eq!(slow.queries_answered, 0);
    }

    #[tokio::test]
    async fn test_all_failures_from_retrieval_outage() {
        let (_, _, coordinator) = coordinator();
        let outage = || AppError::RetrievalUnavailable("index offline".to_string());
        let experts = vec![
            FixedExpert::failing("a", "chemistry", outage()).arc(),
            FixedExpert::failing("b", "chemistry", outage()).arc(),
        ];
        let err = coordinator.consult(&Query::new("q"), &experts).await.unwrap_err();
        assert!(matches!(err, EnsembleError::RetrievalUnavailable(_)));

        let mixed = vec![
            FixedExpert::failing("a", "chemistry", outage()).arc(),
            FixedExpert::failing("b", "chemistry", AppError::Llm("down".to_string())).arc(),
        ];
        let err = coordinator.consult(&Query::new("q"), &mixed).await.unwrap_err();
        assert!(matches!(err, EnsembleError::NoExpertAvailable(_)));
    }

    #[tokio::test]
    async fn test_feedback_is_recorded_per_hint_domain() {
        let (tracker, feedback, coordinator) = coordinator();
        let experts = vec![FixedExpert::new("chem", "chemistry", "answer", 1.0).arc()];

        coordinator
            .consult(&Query::new("q").with_domain("chemistry"), &experts)
            .await
            .unwrap();
        feedback.flush().await;

        let record = tracker.record("chem", &Domain::new("chemistry")).unwrap();
        assert_eq!(record.queries_answered, 1);
        assert!((record.specialization_score - 0.6).abs() < 1e-6);
    }
}

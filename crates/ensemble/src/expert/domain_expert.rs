//! The concrete expert: a domain profile bound to shared capabilities.

use super::confidence::{split_confidence_trailer, NEUTRAL_CONFIDENCE};
use super::state::{clamp_unit, ExpertState};
use super::Expert;
use crate::error::FineTuneError;
use crate::finetune::FineTuningResult;
use crate::types::{ExpertId, ExpertResponse, Query, REFERENCE_ANSWER_KEY};
use async_trait::async_trait;
use consilium_core::{AppError, AppResult, Domain};
use consilium_knowledge::{KnowledgeSnippet, Retriever};
use consilium_llm::{LlmClient, LlmRequest};
use consilium_prompt::{build_prompt, default_definition, ContextSnippet, PromptDefinition, PromptInputs};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;
use tracing::instrument;

/// Confidence multiplier when retrieval is unavailable.
pub const DEFAULT_DEGRADED_PENALTY: f32 = 0.6;

/// Static description of an expert.
#[derive(Debug, Clone)]
pub struct ExpertProfile {
    pub id: ExpertId,

    /// Primary domain; also the corpus the expert retrieves from
    pub domain: Domain,

    /// Relevance weights for other domains, each in `[0, 1]`
    pub secondary: BTreeMap<Domain, f32>,

    /// Model requested from the answer-generation backend
    pub model: String,

    pub prompt: PromptDefinition,

    pub max_tokens: Option<u32>,
}

impl ExpertProfile {
    /// Profile using the built-in prompt for `domain`.
    pub fn new(id: impl Into<String>, domain: impl Into<Domain>, model: impl Into<String>) -> Self {
        let domain = domain.into();
        Self {
            id: id.into(),
            prompt: default_definition(domain.as_str()),
            domain,
            secondary: BTreeMap::new(),
            model: model.into(),
            max_tokens: None,
        }
    }

    /// Declare relevance to another domain. Weights are clamped to `[0, 1]`.
    pub fn with_secondary(mut self, domain: impl Into<Domain>, weight: f32) -> Self {
        let domain = domain.into();
        if domain != self.domain {
            self.secondary.insert(domain, clamp_unit(weight));
        }
        self
    }

    pub fn with_prompt(mut self, prompt: PromptDefinition) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn relevance(&self, domain: &Domain) -> f32 {
        if *domain == self.domain {
            1.0
        } else {
            self.secondary.get(domain).copied().unwrap_or(0.0)
        }
    }
}

/// A response together with the confidence the backend reported before
/// calibration.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub response: ExpertResponse,
    pub raw_confidence: f32,
}

/// The single expert implementation.
///
/// Answers always read the last committed `ExpertState` snapshot, so a
/// fine-tuning run in progress never blocks or alters them.
pub struct DomainExpert {
    profile: ExpertProfile,
    llm: Arc<dyn LlmClient>,
    retriever: Retriever,
    degraded_penalty: f32,
    state: RwLock<Arc<ExpertState>>,
    training: tokio::sync::Mutex<()>,
    history: Mutex<Vec<FineTuningResult>>,
}

impl std::fmt::Debug for DomainExpert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainExpert")
            .field("id", &self.profile.id)
            .field("domain", &self.profile.domain)
            .field("llm", &self.llm.provider_name())
            .field("version", &self.state().version)
            .finish()
    }
}

impl DomainExpert {
    pub fn new(profile: ExpertProfile, llm: Arc<dyn LlmClient>, retriever: Retriever) -> Self {
        Self {
            profile,
            llm,
            retriever,
            degraded_penalty: DEFAULT_DEGRADED_PENALTY,
            state: RwLock::new(Arc::new(ExpertState::default())),
            training: tokio::sync::Mutex::new(()),
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn with_state(self, state: ExpertState) -> Self {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(state);
        self
    }

    pub fn with_degraded_penalty(mut self, penalty: f32) -> Self {
        self.degraded_penalty = clamp_unit(penalty);
        self
    }

    pub fn profile(&self) -> &ExpertProfile {
        &self.profile
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Current committed state.
    pub fn state(&self) -> Arc<ExpertState> {
        Arc::clone(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Whether a fine-tuning run currently holds this expert.
    pub fn is_training(&self) -> bool {
        self.training.try_lock().is_err()
    }

    /// Claim the training guard, failing fast if a run already holds it.
    pub(crate) fn try_begin_training(
        &self,
    ) -> Result<tokio::sync::MutexGuard<'_, ()>, FineTuneError> {
        self.training
            .try_lock()
            .map_err(|_| FineTuneError::TrainingInProgress(self.profile.id.clone()))
    }

    /// Swap in a trained state. Returns the new version.
    pub(crate) fn commit_state(&self, mut state: ExpertState) -> u64 {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.version = guard.version + 1;
        let version = state.version;
        *guard = Arc::new(state);
        version
    }

    pub(crate) fn record_training(&self, result: FineTuningResult) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(result);
    }

    /// Every fine-tuning run on this expert, oldest first.
    pub fn training_history(&self) -> Vec<FineTuningResult> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Retrieve and answer as `state` would, without touching the committed
    /// state. Used for answering and for scoring candidate states.
    #[instrument(skip_all, fields(expert = %self.profile.id, version = state.version))]
    pub async fn evaluate(&self, query: &Query, k: usize, state: &ExpertState) -> AppResult<Evaluation> {
        let start = Instant::now();

        let (snippets, degraded) = match self
            .retriever
            .retrieve(&query.text, &self.profile.domain, k)
            .await
        {
            Ok(snippets) => (snippets, false),
            Err(e) => {
                tracing::warn!(
                    "Retrieval for expert '{}' unavailable, answering without context: {}",
                    self.profile.id,
                    e
                );
                (Vec::new(), true)
            }
        };

        match self.generate(query, &snippets, state, degraded).await {
            Ok(mut evaluation) => {
                evaluation.response.latency = start.elapsed();
                Ok(evaluation)
            }
            Err(e) if degraded => Err(AppError::RetrievalUnavailable(format!(
                "expert '{}' answered without context and failed: {}",
                self.profile.id, e
            ))),
            Err(e) => Err(e),
        }
    }

    async fn generate(
        &self,
        query: &Query,
        snippets: &[KnowledgeSnippet],
        state: &ExpertState,
        degraded: bool,
    ) -> AppResult<Evaluation> {
        let start = Instant::now();

        let inputs = PromptInputs {
            question: query.text.clone(),
            domain: self.profile.domain.to_string(),
            snippets: snippets
                .iter()
                .map(|s| ContextSnippet {
                    id: s.id.clone(),
                    text: s.text.clone(),
                })
                .collect(),
            exemplars: state.exemplars.clone(),
            contrasts: state.contrasts.clone(),
            extra: query
                .context
                .iter()
                .filter(|(key, _)| key.as_str() != REFERENCE_ANSWER_KEY)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };

        let built = build_prompt(&self.profile.prompt, &inputs)?;

        let mut request =
            LlmRequest::new(built.user, self.profile.model.clone()).with_temperature(state.temperature);
        if let Some(system) = built.system {
            request = request.with_system(system);
        }
        if let Some(max_tokens) = self.profile.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }

        let response = self.llm.complete(&request).await?;

        let (answer_text, trailer) = split_confidence_trailer(&response.content);
        let raw_confidence = response
            .confidence
            .or(trailer)
            .map(clamp_unit)
            .unwrap_or(NEUTRAL_CONFIDENCE);

        let mut confidence = state.calibration.apply(raw_confidence);
        if degraded {
            confidence = clamp_unit(confidence * self.degraded_penalty);
        }

        tracing::debug!(
            "Expert '{}' answered: raw confidence {:.3}, calibrated {:.3}, {} snippets{}",
            self.profile.id,
            raw_confidence,
            confidence,
            built.metadata.snippet_ids.len(),
            if degraded { " (degraded)" } else { "" }
        );

        Ok(Evaluation {
            response: ExpertResponse {
                expert_id: self.profile.id.clone(),
                domain: self.profile.domain.clone(),
                answer_text,
                confidence,
                supporting_snippet_ids: built.metadata.snippet_ids,
                latency: start.elapsed(),
                retrieval_degraded: degraded,
            },
            raw_confidence,
        })
    }
}

#[async_trait]
impl Expert for DomainExpert {
    fn id(&self) -> &str {
        &self.profile.id
    }

    fn domain(&self) -> &Domain {
        &self.profile.domain
    }

    fn relevance(&self, domain: &Domain) -> f32 {
        self.profile.relevance(domain)
    }

    async fn answer(
        &self,
        query: &Query,
        snippets: &[KnowledgeSnippet],
    ) -> AppResult<ExpertResponse> {
        let state = self.state();
        Ok(self.generate(query, snippets, &state, false).await?.response)
    }

    async fn respond(&self, query: &Query, k: usize) -> AppResult<ExpertResponse> {
        let state = self.state();
        Ok(self.evaluate(query, k, &state).await?.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expert::state::Calibration;
    use consilium_core::config::DistanceMetric;
    use consilium_knowledge::{KnowledgeStore, TrigramProvider};
    use consilium_llm::ScriptedClient;

    fn retriever() -> Retriever {
        let store = Arc::new(KnowledgeStore::new(
            vec![Domain::new("chemistry"), Domain::new("biology")],
            128,
            DistanceMetric::Cosine,
        ));
        Retriever::new(Arc::new(TrigramProvider::new(128)), store)
    }

    fn expert(llm: ScriptedClient) -> DomainExpert {
        let profile = ExpertProfile::new("chem", "chemistry", "scripted")
            .with_secondary("biology", 0.4)
            .with_secondary("physics", 3.0);
        DomainExpert::new(profile, Arc::new(llm), retriever())
    }

    #[test]
    fn test_relevance() {
        let expert = expert(ScriptedClient::new());
        assert_eq!(expert.relevance(&Domain::new("chemistry")), 1.0);
        assert_eq!(expert.relevance(&Domain::new("biology")), 0.4);
        assert_eq!(expert.relevance(&Domain::new("physics")), 1.0);
        assert_eq!(expert.relevance(&Domain::new("history")), 0.0);
    }

    #[tokio::test]
    async fn test_respond_uses_retrieved_context() {
        let retriever = retriever();
        let id = retriever
            .ingest(
                &Domain::new("chemistry"),
                "Noble gases have full valence shells.",
                serde_json::json!({}),
            )
            .await
            .unwrap();

        let llm = ScriptedClient::new().with_rule("full valence shells", "They are inert.", 0.9);
        let expert = DomainExpert::new(
            ExpertProfile::new("chem", "chemistry", "scripted"),
            Arc::new(llm),
            retriever,
        );

        let response = expert
            .respond(&Query::new("Why are noble gases inert?"), 2)
            .await
            .unwrap();
        assert_eq!(response.answer_text, "They are inert.");
        assert_eq!(response.supporting_snippet_ids, vec![id]);
        assert!((response.confidence - 0.9).abs() < 1e-6);
        assert!(!response.retrieval_degraded);
    }

    #[tokio::test]
    async fn test_confidence_from_trailer_and_neutral_default() {
        let llm = ScriptedClient::new()
            .with_plain_rule("what is ph?", "pH measures acidity.\nConfidence: 0.7")
            .with_plain_rule("bond", "A bond links atoms.");
        let expert = expert(llm);

        let with_trailer = expert.answer(&Query::new("What is pH?"), &[]).await.unwrap();
        assert_eq!(with_trailer.answer_text, "pH measures acidity.");
        assert!((with_trailer.confidence - 0.7).abs() < 1e-6);

        let neutral = expert.answer(&Query::new("What is a bond?"), &[]).await.unwrap();
        assert!((neutral.confidence - NEUTRAL_CONFIDENCE).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_calibration_applied() {
        let mut state = ExpertState::default();
        state.calibration = Calibration {
            scale: 0.5,
            bias: 0.1,
        };
        let expert =
            expert(ScriptedClient::new().with_rule("salt", "NaCl.", 0.8)).with_state(state);

        let response = expert.answer(&Query::new("What is table salt?"), &[]).await.unwrap();
        assert!((response.confidence - 0.5).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_degraded_retrieval_lowers_confidence() {
        let llm = ScriptedClient::new().with_rule("acid", "A proton donor.", 0.9);
        let expert = expert(llm);

        let healthy = expert.respond(&Query::new("What is an acid?"), 3).await.unwrap();
        expert
            .retriever()
            .store()
            .detach(&Domain::new("chemistry"))
            .unwrap();
        let degraded = expert.respond(&Query::new("What is an acid?"), 3).await.unwrap();

        assert!(degraded.retrieval_degraded);
        assert!(degraded.supporting_snippet_ids.is_empty());
        assert!((degraded.confidence - healthy.confidence * DEFAULT_DEGRADED_PENALTY).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_failure_during_outage_is_retrieval_unavailable() {
        let expert = expert(ScriptedClient::new().failing("backend down"));
        expert
            .retriever()
            .store()
            .detach(&Domain::new("chemistry"))
            .unwrap();

        let err = expert.respond(&Query::new("anything"), 3).await.unwrap_err();
        assert!(err.is_retrieval_unavailable());
    }

    #[tokio::test]
    async fn test_reference_answer_not_in_prompt() {
        let llm = ScriptedClient::new()
            .with_rule("secret reference", "leaked", 0.9)
            .with_rule("lab", "context seen", 0.8);
        let expert = expert(llm);

        let query = Query::new("What is a catalyst?")
            .with_reference_answer("secret reference")
            .with_context("setting", "lab");
        let response = expert.answer(&query, &[]).await.unwrap();
        assert_eq!(response.answer_text, "context seen");
    }

    #[test]
    fn test_commit_bumps_version_and_guard_is_exclusive() {
        let expert = expert(ScriptedClient::new());
        let mut next = (*expert.state()).clone();
        next.set_temperature(0.9);

        assert_eq!(expert.commit_state(next), 1);
        assert_eq!(expert.state().version, 1);
        assert_eq!(expert.state().temperature, 0.9);

        let guard = expert.try_begin_training().unwrap();
        assert!(expert.is_training());
        assert!(matches!(
            expert.try_begin_training(),
            Err(FineTuneError::TrainingInProgress(_))
        ));
        drop(guard);
        assert!(!expert.is_training());
    }
}

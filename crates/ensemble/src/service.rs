//! The `Consilium` facade: query, feedback, fine-tuning and ingestion.

use crate::coordinator::{CoordinatorSettings, EnsembleCoordinator};
use crate::error::{EnsembleError, FineTuneError};
use crate::expert::{DomainExpert, ExpertProfile, ExpertState};
use crate::feedback::FeedbackLoop;
use crate::finetune::{FineTuningPipeline, FineTuningResult, StrategyKind, TrainingDataset};
use crate::registry::ExpertRegistry;
use crate::similarity::create_similarity;
use crate::specialization::{SpecializationRecord, SpecializationTracker};
use crate::types::{ConsultOutcome, EnsembleMode, FeedbackAck, Query};
use consilium_core::{AppError, AppResult, ConsiliumConfig, Domain};
use consilium_knowledge::{IngestStats, Retriever, SnippetId};
use consilium_llm::LlmClient;
use consilium_prompt::{list_prompts, load_or_default};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// An ensemble of domain experts over shared retrieval and generation.
///
/// Construction spawns the feedback task, so it must happen inside a Tokio
/// runtime.
pub struct Consilium {
    config: ConsiliumConfig,
    llm: Arc<dyn LlmClient>,
    model: String,
    retriever: Retriever,
    registry: ExpertRegistry,
    tracker: Arc<SpecializationTracker>,
    coordinator: EnsembleCoordinator,
    feedback: FeedbackLoop,
    pipeline: FineTuningPipeline,
    default_mode: EnsembleMode,
}

impl std::fmt::Debug for Consilium {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consilium")
            .field("model", &self.model)
            .field("domains", &self.config.domains)
            .field("experts", &self.registry.len())
            .field("default_mode", &self.default_mode)
            .finish()
    }
}

impl Consilium {
    /// Wire the components around the given capabilities. No experts are
    /// registered.
    pub fn new(
        config: ConsiliumConfig,
        llm: Arc<dyn LlmClient>,
        model: impl Into<String>,
        retriever: Retriever,
    ) -> AppResult<Self> {
        config.validate()?;

        let tracker = Arc::new(SpecializationTracker::new(config.specialization.clone()));
        let similarity = create_similarity(&config.ensemble.similarity, retriever.embedder());
        let feedback = FeedbackLoop::spawn(Arc::clone(&tracker), Arc::clone(&similarity));
        let coordinator = EnsembleCoordinator::new(
            CoordinatorSettings::from_config(&config),
            Arc::clone(&tracker),
            Arc::clone(&similarity),
            feedback.sender(),
        );
        let pipeline = FineTuningPipeline::new(
            config.fine_tuning.clone(),
            similarity,
            config.retrieval.top_k,
        );
        let default_mode = EnsembleMode::parse(&config.ensemble.default_mode).unwrap_or_default();

        tracing::info!(
            "Consilium ready: {} domains, default mode {}",
            config.domains.len(),
            default_mode
        );

        Ok(Self {
            config,
            llm,
            model: model.into(),
            retriever,
            registry: ExpertRegistry::new(),
            tracker,
            coordinator,
            feedback,
            pipeline,
            default_mode,
        })
    }

    /// Build providers from configuration and register one expert per
    /// configured domain, named `<domain>-expert`.
    pub fn from_config(config: ConsiliumConfig) -> AppResult<Self> {
        let (llm, model) = consilium_llm::factory::create_from_config(&config.llm)?;
        let retriever = Retriever::from_config(&config)?;
        let service = Self::new(config, llm, model, retriever)?;
        service.register_default_experts()?;
        Ok(service)
    }

    /// Register `<domain>-expert` for every configured domain, using the
    /// prompt file for the domain when one exists.
    pub fn register_default_experts(&self) -> AppResult<()> {
        let prompts_dir = self.config.prompts_path();
        for prompt_id in list_prompts(&prompts_dir)? {
            let matched = prompt_id
                .strip_prefix("expert.")
                .is_some_and(|domain| self.config.has_domain(&Domain::from(domain)));
            if !matched {
                tracing::warn!("Ignoring prompt '{}': no configured domain matches", prompt_id);
            }
        }

        for domain in &self.config.domains {
            let prompt = load_or_default(&prompts_dir, domain.as_str())?;
            let profile = ExpertProfile::new(format!("{}-expert", domain), domain.clone(), self.model.clone())
                .with_prompt(prompt);
            self.register_expert(profile)?;
        }
        Ok(())
    }

    /// Per-expert timeout for consultations.
    pub fn with_expert_timeout(mut self, timeout: Duration) -> Self {
        self.coordinator = self.coordinator.with_timeout(timeout);
        self
    }

    pub fn config(&self) -> &ConsiliumConfig {
        &self.config
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn tracker(&self) -> &Arc<SpecializationTracker> {
        &self.tracker
    }

    /// Add an expert bound to the shared generation backend and retriever.
    pub fn register_expert(&self, profile: ExpertProfile) -> AppResult<Arc<DomainExpert>> {
        if !self.config.has_domain(&profile.domain) {
            return Err(AppError::Config(format!(
                "Expert '{}' declares unknown domain '{}'",
                profile.id, profile.domain
            )));
        }

        let expert = Arc::new(
            DomainExpert::new(profile, Arc::clone(&self.llm), self.retriever.clone())
                .with_degraded_penalty(self.config.retrieval.degraded_penalty)
                .with_state(ExpertState::new(self.config.fine_tuning.max_exemplars)),
        );
        self.registry.register(Arc::clone(&expert))?;
        Ok(expert)
    }

    /// Registered experts, sorted by id.
    pub fn experts(&self) -> Vec<Arc<DomainExpert>> {
        self.registry.all()
    }

    pub fn expert(&self, id: &str) -> Option<Arc<DomainExpert>> {
        self.registry.get(id)
    }

    /// Ask the ensemble. `mode` defaults to the configured mode.
    pub async fn consult(
        &self,
        text: &str,
        domain_hint: Option<&str>,
        mode: Option<EnsembleMode>,
    ) -> Result<ConsultOutcome, EnsembleError> {
        let mut query = Query::new(text).with_mode(mode.unwrap_or(self.default_mode));
        if let Some(hint) = domain_hint {
            query = query.with_domain(hint);
        }
        self.consult_query(query).await
    }

    /// Ask the ensemble with a fully specified query.
    pub async fn consult_query(&self, query: Query) -> Result<ConsultOutcome, EnsembleError> {
        if let Some(hint) = &query.domain_hint {
            self.check_domain(hint)?;
        }
        self.coordinator.consult(&query, &self.registry.as_dyn()).await
    }

    /// Record an externally judged answer quality.
    pub fn submit_feedback(
        &self,
        expert_id: &str,
        domain: &str,
        observed_quality: f32,
    ) -> Result<FeedbackAck, EnsembleError> {
        if self.registry.get(expert_id).is_none() {
            return Err(EnsembleError::UnknownExpert(expert_id.to_string()));
        }
        let domain = Domain::from(domain);
        self.check_domain(&domain)?;

        let record = self.tracker.record_feedback(expert_id, &domain, observed_quality);
        Ok(FeedbackAck {
            expert_id: record.expert_id,
            domain: record.domain,
            specialization_score: record.specialization_score,
            queries_answered: record.queries_answered,
        })
    }

    /// Fine-tune one expert. `validation_split` overrides the dataset's own.
    pub async fn run_fine_tuning(
        &self,
        expert_id: &str,
        dataset: TrainingDataset,
        strategy: StrategyKind,
        epochs: usize,
        validation_split: Option<f32>,
    ) -> Result<FineTuningResult, FineTuneError> {
        let expert = self
            .registry
            .get(expert_id)
            .ok_or_else(|| FineTuneError::UnknownExpert(expert_id.to_string()))?;

        let dataset = match validation_split {
            Some(split) => dataset.with_validation_split(split),
            None => dataset,
        };
        self.pipeline.run(&expert, &dataset, strategy, epochs).await
    }

    /// Embed and store a snippet in `domain`'s corpus.
    pub async fn ingest(
        &self,
        domain: &str,
        text: &str,
        metadata: serde_json::Value,
    ) -> Result<SnippetId, EnsembleError> {
        let domain = Domain::from(domain);
        self.check_domain(&domain)?;
        Ok(self.retriever.ingest(&domain, text, metadata).await?)
    }

    /// Ingest every text document under `path` into `domain`'s corpus.
    pub async fn ingest_path(&self, domain: &str, path: &Path) -> Result<IngestStats, EnsembleError> {
        let domain = Domain::from(domain);
        self.check_domain(&domain)?;
        Ok(self.retriever.ingest_path(&domain, path).await?)
    }

    /// Every tracked (expert, domain) record.
    pub fn specialization_report(&self) -> Vec<SpecializationRecord> {
        self.tracker.records()
    }

    pub fn training_history(&self, expert_id: &str) -> Result<Vec<FineTuningResult>, EnsembleError> {
        self.registry
            .get(expert_id)
            .map(|e| e.training_history())
            .ok_or_else(|| EnsembleError::UnknownExpert(expert_id.to_string()))
    }

    /// Wait until queued specialization feedback is applied.
    pub async fn flush_feedback(&self) {
        self.feedback.flush().await;
    }

    /// Apply queued feedback and stop the feedback task.
    pub async fn shutdown(&self) {
        self.feedback.shutdown().await;
        tracing::info!("Consilium shut down");
    }

    fn check_domain(&self, domain: &Domain) -> Result<(), EnsembleError> {
        if self.config.has_domain(domain) {
            Ok(())
        } else {
            Err(EnsembleError::UnknownDomain(domain.to_string()))
        }
    }
}

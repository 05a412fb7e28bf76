//! Offline fine-tuning of experts.
//!
//! A run moves through `Init → Split → Train → Validate → Commit | Reject`.
//! Training works on a clone of the committed state; the clone replaces it
//! only if its validation score does not regress beyond the tolerance.
//! Answering continues from the committed snapshot throughout.

pub mod dataset;
pub mod evaluator;
pub mod strategies;

pub use dataset::{TrainingDataset, TrainingExample};
pub use strategies::{StrategyKind, TrainingContext, TrainingStrategy};

use crate::error::FineTuneError;
use crate::expert::{DomainExpert, Expert};
use crate::similarity::AnswerSimilarity;
use crate::types::ExpertId;
use chrono::{DateTime, Utc};
use consilium_core::config::FineTuningConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::instrument;

/// Stages of a fine-tuning run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStage {
    Init,
    Split,
    Train,
    Validate,
    Commit,
    Reject,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Split => "split",
            Self::Train => "train",
            Self::Validate => "validate",
            Self::Commit => "commit",
            Self::Reject => "reject",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// 1-based
    pub epoch: usize,
    pub loss: f32,
    /// Fraction of training examples answered correctly
    pub accuracy: f32,
}

/// Outcome of one run, accepted or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FineTuningResult {
    #[serde(rename = "runId")]
    pub run_id: String,

    #[serde(rename = "expertId")]
    pub expert_id: ExpertId,

    pub strategy: StrategyKind,

    #[serde(rename = "epochsRun")]
    pub epochs_run: usize,

    #[serde(rename = "perEpochMetrics")]
    pub per_epoch_metrics: Vec<EpochMetrics>,

    /// Validation score of the committed state before the run
    #[serde(rename = "preScore")]
    pub pre_score: f32,

    /// Validation score of the trained candidate
    #[serde(rename = "postScore")]
    pub post_score: f32,

    pub accepted: bool,

    #[serde(rename = "startedAt")]
    pub started_at: DateTime<Utc>,

    #[serde(rename = "finishedAt")]
    pub finished_at: DateTime<Utc>,

    /// Expert state version after the run
    #[serde(rename = "stateVersion")]
    pub state_version: u64,
}

/// Runs fine-tuning jobs against experts.
#[derive(Debug, Clone)]
pub struct FineTuningPipeline {
    config: FineTuningConfig,
    similarity: Arc<dyn AnswerSimilarity>,
    top_k: usize,
}

impl FineTuningPipeline {
    pub fn new(config: FineTuningConfig, similarity: Arc<dyn AnswerSimilarity>, top_k: usize) -> Self {
        Self {
            config,
            similarity,
            top_k,
        }
    }

    pub fn config(&self) -> &FineTuningConfig {
        &self.config
    }

    /// Train `expert` on `dataset` for `epochs` epochs with `kind`.
    ///
    /// Fails fast with `TrainingInProgress` if another run holds the expert,
    /// and with `InvalidDataset` before touching anything if the inputs are
    /// unusable. A rejected candidate is reported with `accepted = false`.
    #[instrument(skip_all, fields(expert = %expert.id(), strategy = %kind, epochs = epochs))]
    pub async fn run(
        &self,
        expert: &DomainExpert,
        dataset: &TrainingDataset,
        kind: StrategyKind,
        epochs: usize,
    ) -> Result<FineTuningResult, FineTuneError> {
        let _guard = expert.try_begin_training()?;
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();

        enter(PipelineStage::Init);
        if epochs == 0 {
            return Err(FineTuneError::InvalidDataset(
                "at least one epoch is required".to_string(),
            ));
        }
        dataset.validate()?;

        enter(PipelineStage::Split);
        let (train, validation) = dataset.split(self.config.shuffle_seed);
        tracing::info!(
            "Split {} examples: {} train, {} validation",
            dataset.len(),
            train.len(),
            validation.len()
        );

        let base = expert.state();
        let pre_score = evaluator::score_state(
            expert,
            &base,
            &validation,
            self.similarity.as_ref(),
            self.top_k,
        )
        .await?;

        enter(PipelineStage::Train);
        let mut strategy = kind.create();
        let mut candidate = (*base).clone();
        let mut per_epoch_metrics = Vec::with_capacity(epochs);

        for epoch in 1..=epochs {
            let ctx = TrainingContext {
                expert,
                similarity: self.similarity.as_ref(),
                learning_rate: self.config.learning_rate,
                accuracy_threshold: self.config.accuracy_threshold,
                top_k: self.top_k,
                epoch,
            };
            let (next, metrics) = strategy.train_epoch(&candidate, &train, &ctx).await?;
            tracing::info!(
                "Epoch {}/{}: loss {:.4}, accuracy {:.3}",
                epoch,
                epochs,
                metrics.loss,
                metrics.accuracy
            );
            candidate = next;
            per_epoch_metrics.push(metrics);
        }

        enter(PipelineStage::Validate);
        let post_score = evaluator::score_state(
            expert,
            &candidate,
            &validation,
            self.similarity.as_ref(),
            self.top_k,
        )
        .await?;

        let accepted = post_score >= pre_score - self.config.tolerance;
        let state_version = if accepted {
            enter(PipelineStage::Commit);
            expert.commit_state(candidate)
        } else {
            enter(PipelineStage::Reject);
            base.version
        };

        tracing::info!(
            "Fine-tuning {}: validation {:.3} -> {:.3}, state version {}",
            if accepted { "accepted" } else { "rejected" },
            pre_score,
            post_score,
            state_version
        );

        let result = FineTuningResult {
            run_id,
            expert_id: expert.id().to_string(),
            strategy: kind,
            epochs_run: epochs,
            per_epoch_metrics,
            pre_score,
            post_score,
            accepted,
            started_at,
            finished_at: Utc::now(),
            state_version,
        };
        expert.record_training(result.clone());
        Ok(result)
    }
}

fn enter(stage: PipelineStage) {
    tracing::info!("Fine-tuning stage: {}", stage);
}

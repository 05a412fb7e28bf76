//! Training strategies.
//!
//! A strategy turns one pass over the training partition into a new
//! candidate `ExpertState`. Strategies never touch the committed state; the
//! pipeline decides whether the candidate is kept.

mod behavioral_cloning;
mod contrastive;
mod meta_learning;
mod reinforcement;
mod supervised;

pub use behavioral_cloning::BehavioralCloning;
pub use contrastive::Contrastive;
pub use meta_learning::MetaLearning;
pub use reinforcement::Reinforcement;
pub use supervised::Supervised;

use super::dataset::TrainingExample;
use super::evaluator::{self, ExampleScore};
use super::EpochMetrics;
use crate::error::FineTuneError;
use crate::expert::{DomainExpert, ExpertState};
use crate::similarity::AnswerSimilarity;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Available training strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Supervised,
    BehavioralCloning,
    Reinforcement,
    Contrastive,
    MetaLearning,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Supervised => "supervised",
            Self::BehavioralCloning => "behavioral_cloning",
            Self::Reinforcement => "reinforcement",
            Self::Contrastive => "contrastive",
            Self::MetaLearning => "meta_learning",
        }
    }

    /// Parse a strategy name. Accepts `-` or `_` as separator.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "supervised" => Some(Self::Supervised),
            "behavioral_cloning" => Some(Self::BehavioralCloning),
            "reinforcement" => Some(Self::Reinforcement),
            "contrastive" => Some(Self::Contrastive),
            "meta_learning" => Some(Self::MetaLearning),
            _ => None,
        }
    }

    /// Fresh strategy instance for one run.
    pub fn create(&self) -> Box<dyn TrainingStrategy> {
        match self {
            Self::Supervised => Box::new(Supervised),
            Self::BehavioralCloning => Box::new(BehavioralCloning),
            Self::Reinforcement => Box::new(Reinforcement::default()),
            Self::Contrastive => Box::new(Contrastive::default()),
            Self::MetaLearning => Box::new(MetaLearning::default()),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a strategy may consult during an epoch.
pub struct TrainingContext<'a> {
    pub expert: &'a DomainExpert,
    pub similarity: &'a dyn AnswerSimilarity,
    pub learning_rate: f32,

    /// Similarity at or above which an answer counts as correct
    pub accuracy_threshold: f32,

    pub top_k: usize,

    /// 1-based
    pub epoch: usize,
}

impl TrainingContext<'_> {
    pub async fn evaluate_all(
        &self,
        state: &ExpertState,
        examples: &[TrainingExample],
    ) -> Result<Vec<ExampleScore>, FineTuneError> {
        Ok(evaluator::evaluate_all(self.expert, state, examples, self.similarity, self.top_k).await?)
    }

    pub fn metrics(&self, loss: f32, scores: &[ExampleScore]) -> EpochMetrics {
        EpochMetrics {
            epoch: self.epoch,
            loss,
            accuracy: evaluator::accuracy(scores, self.accuracy_threshold),
        }
    }
}

#[async_trait]
pub trait TrainingStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// One pass over `train`, producing the next candidate state.
    async fn train_epoch(
        &mut self,
        state: &ExpertState,
        train: &[TrainingExample],
        ctx: &TrainingContext<'_>,
    ) -> Result<(ExpertState, EpochMetrics), FineTuneError>;
}

/// One squared-error calibration step plus exemplar admission of the
/// worst-answered examples. Returns the next state and the mean squared
/// calibration error.
pub(crate) fn supervised_step(
    state: &ExpertState,
    train: &[TrainingExample],
    scores: &[ExampleScore],
    ctx: &TrainingContext<'_>,
) -> (ExpertState, f32) {
    let mut next = state.clone();
    if scores.is_empty() {
        return (next, 0.0);
    }

    let n = scores.len() as f32;
    let (mut loss, mut grad_scale, mut grad_bias) = (0.0f32, 0.0f32, 0.0f32);
    for score in scores {
        let error = state.calibration.apply(score.raw_confidence) - score.similarity;
        loss += error * error;
        grad_scale += 2.0 * error * score.raw_confidence;
        grad_bias += 2.0 * error;
    }

    next.set_calibration(
        state.calibration.scale - ctx.learning_rate * grad_scale / n,
        state.calibration.bias - ctx.learning_rate * grad_bias / n,
    );

    // Worst last, so the hardest examples survive eviction.
    let mut misses: Vec<usize> = (0..scores.len())
        .filter(|&i| scores[i].similarity < ctx.accuracy_threshold)
        .collect();
    misses.sort_by(|&a, &b| scores[b].similarity.total_cmp(&scores[a].similarity));
    for i in misses {
        next.admit_exemplar(exemplar(&train[i].input, &train[i].expected_output));
    }

    (next, loss / n)
}

pub(crate) fn exemplar(input: &str, output: &str) -> consilium_prompt::Exemplar {
    consilium_prompt::Exemplar {
        input: input.to_string(),
        output: output.to_string(),
    }
}

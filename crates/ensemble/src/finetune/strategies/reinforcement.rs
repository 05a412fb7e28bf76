use super::{exemplar, StrategyKind, TrainingContext, TrainingStrategy};
use crate::error::FineTuneError;
use crate::expert::ExpertState;
use crate::finetune::dataset::TrainingExample;
use crate::finetune::EpochMetrics;
use async_trait::async_trait;

const INITIAL_BASELINE: f32 = 0.5;
const BASELINE_DECAY: f32 = 0.9;

/// REINFORCE-style tuning against a running reward baseline.
///
/// Reward per example is `similarity × quality_score`. Positive mean
/// advantage lowers temperature (exploit), negative raises it. Calibration
/// bias moves toward the observed reward. High-reward answers are kept as
/// exemplars.
#[derive(Debug, Clone, Copy)]
pub struct Reinforcement {
    baseline: f32,
}

impl Reinforcement {
    pub fn baseline(&self) -> f32 {
        self.baseline
    }
}

impl Default for Reinforcement {
    fn default() -> Self {
        Self {
            baseline: INITIAL_BASELINE,
        }
    }
}

#[async_trait]
impl TrainingStrategy for Reinforcement {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Reinforcement
    }

    async fn train_epoch(
        &mut self,
        state: &ExpertState,
        train: &[TrainingExample],
        ctx: &TrainingContext<'_>,
    ) -> Result<(ExpertState, EpochMetrics), FineTuneError> {
        let scores = ctx.evaluate_all(state, train).await?;
        let mut next = state.clone();
        if scores.is_empty() {
            return Ok((next, ctx.metrics(0.0, &scores)));
        }

        let n = scores.len() as f32;
        let rewards: Vec<f32> = train
            .iter()
            .zip(&scores)
            .map(|(example, score)| score.similarity * example.quality_score)
            .collect();
        let mean_reward = rewards.iter().sum::<f32>() / n;
        let mean_advantage = mean_reward - self.baseline;
        let mean_confidence = scores.iter().map(|s| s.confidence).sum::<f32>() / n;

        next.set_temperature(state.temperature - ctx.learning_rate * mean_advantage);
        next.set_calibration(
            state.calibration.scale,
            state.calibration.bias + ctx.learning_rate * (mean_reward - mean_confidence),
        );

        let mut rewarded: Vec<usize> = (0..rewards.len())
            .filter(|&i| rewards[i] >= ctx.accuracy_threshold && rewards[i] > self.baseline)
            .collect();
        rewarded.sort_by(|&a, &b| rewards[a].total_cmp(&rewards[b]));
        for i in rewarded {
            next.admit_exemplar(exemplar(&train[i].input, &scores[i].answer));
        }

        tracing::debug!(
            "Reinforcement epoch {}: mean reward {:.3}, baseline {:.3}",
            ctx.epoch,
            mean_reward,
            self.baseline
        );
        self.baseline = BASELINE_DECAY * self.baseline + (1.0 - BASELINE_DECAY) * mean_reward;

        Ok((next, ctx.metrics(1.0 - mean_reward, &scores)))
    }
}

use super::{exemplar, StrategyKind, TrainingContext, TrainingStrategy};
use crate::error::FineTuneError;
use crate::expert::ExpertState;
use crate::finetune::dataset::TrainingExample;
use crate::finetune::EpochMetrics;
use async_trait::async_trait;

/// Metadata key holding a demonstration trace.
pub const DEMONSTRATION_KEY: &str = "demonstration";

/// Imitate demonstrated answers.
///
/// The reference trace is `metadata.demonstration`, or the expected output
/// when absent. Loss is the quality-weighted deviation of the expert's
/// answer from the trace. Unmatched demonstrations become exemplars, the
/// highest quality admitted last, and temperature drops in proportion to the
/// deviation.
#[derive(Debug, Default, Clone, Copy)]
pub struct BehavioralCloning;

#[async_trait]
impl TrainingStrategy for BehavioralCloning {
    fn kind(&self) -> StrategyKind {
        StrategyKind::BehavioralCloning
    }

    async fn train_epoch(
        &mut self,
        state: &ExpertState,
        train: &[TrainingExample],
        ctx: &TrainingContext<'_>,
    ) -> Result<(ExpertState, EpochMetrics), FineTuneError> {
        let scores = ctx.evaluate_all(state, train).await?;

        let mut deviations = Vec::with_capacity(train.len());
        let (mut weighted, mut total_quality) = (0.0f32, 0.0f32);
        for (example, score) in train.iter().zip(&scores) {
            let trace = example
                .metadata_str(DEMONSTRATION_KEY)
                .unwrap_or(&example.expected_output);
            let deviation = 1.0 - ctx.similarity.similarity(&score.answer, trace).await;

            weighted += example.quality_score * deviation;
            total_quality += example.quality_score;
            deviations.push(deviation);
        }

        let loss = if total_quality > 0.0 {
            weighted / total_quality
        } else {
            0.0
        };

        let mut next = state.clone();
        next.set_temperature(state.temperature * (1.0 - ctx.learning_rate * loss));

        let mut unmatched: Vec<usize> = (0..train.len())
            .filter(|&i| train[i].quality_score > 0.0)
            .filter(|&i| 1.0 - deviations[i] < ctx.accuracy_threshold)
            .collect();
        unmatched.sort_by(|&a, &b| train[a].quality_score.total_cmp(&train[b].quality_score));
        for i in unmatched {
            let trace = train[i]
                .metadata_str(DEMONSTRATION_KEY)
                .unwrap_or(&train[i].expected_output);
            next.admit_exemplar(exemplar(&train[i].input, trace));
        }

        Ok((next, ctx.metrics(loss, &scores)))
    }
}

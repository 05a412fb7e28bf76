use super::{supervised_step, StrategyKind, TrainingContext, TrainingStrategy};
use crate::error::FineTuneError;
use crate::expert::ExpertState;
use crate::finetune::dataset::TrainingExample;
use crate::finetune::EpochMetrics;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Metadata key grouping examples into tasks.
pub const TOPIC_KEY: &str = "topic";

const DEFAULT_TOPIC: &str = "general";
const DEFAULT_OUTER_STEP: f32 = 0.5;

/// Reptile-style meta-learning over topics.
///
/// Examples are grouped by `metadata.topic`. Each group is split into a
/// support half, used for one inner supervised step, and a query half,
/// used to score the adapted state. The outer step moves calibration and
/// temperature part of the way toward the mean adapted state and takes the
/// union of the exemplars the topics learned.
#[derive(Debug, Clone, Copy)]
pub struct MetaLearning {
    pub outer_step: f32,
}

impl Default for MetaLearning {
    fn default() -> Self {
        Self {
            outer_step: DEFAULT_OUTER_STEP,
        }
    }
}

fn group_by_topic(train: &[TrainingExample]) -> BTreeMap<&str, Vec<TrainingExample>> {
    let mut groups: BTreeMap<&str, Vec<TrainingExample>> = BTreeMap::new();
    for example in train {
        let topic = example.metadata_str(TOPIC_KEY).unwrap_or(DEFAULT_TOPIC);
        groups.entry(topic).or_default().push(example.clone());
    }
    groups
}

#[async_trait]
impl TrainingStrategy for MetaLearning {
    fn kind(&self) -> StrategyKind {
        StrategyKind::MetaLearning
    }

    async fn train_epoch(
        &mut self,
        state: &ExpertState,
        train: &[TrainingExample],
        ctx: &TrainingContext<'_>,
    ) -> Result<(ExpertState, EpochMetrics), FineTuneError> {
        let groups = group_by_topic(train);

        let mut adapted_states = Vec::with_capacity(groups.len());
        let mut query_scores = Vec::new();
        let mut query_loss = 0.0f32;

        for (topic, examples) in &groups {
            let (support, query) = if examples.len() < 2 {
                (examples.as_slice(), examples.as_slice())
            } else {
                examples.split_at(examples.len().div_ceil(2))
            };

            let support_scores = ctx.evaluate_all(state, support).await?;
            let (adapted, _) = supervised_step(state, support, &support_scores, ctx);

            let scores = ctx.evaluate_all(&adapted, query).await?;
            let loss: f32 = scores.iter().map(|s| 1.0 - s.similarity).sum::<f32>()
                / scores.len().max(1) as f32;
            tracing::debug!("Topic '{}': query loss {:.3}", topic, loss);

            query_loss += loss;
            query_scores.extend(scores);
            adapted_states.push(adapted);
        }

        let mut next = state.clone();
        if adapted_states.is_empty() {
            return Ok((next, ctx.metrics(0.0, &query_scores)));
        }

        let k = adapted_states.len() as f32;
        let mean_scale = adapted_states.iter().map(|s| s.calibration.scale).sum::<f32>() / k;
        let mean_bias = adapted_states.iter().map(|s| s.calibration.bias).sum::<f32>() / k;
        let mean_temperature = adapted_states.iter().map(|s| s.temperature).sum::<f32>() / k;

        let step = self.outer_step;
        next.set_calibration(
            state.calibration.scale + step * (mean_scale - state.calibration.scale),
            state.calibration.bias + step * (mean_bias - state.calibration.bias),
        );
        next.set_temperature(state.temperature + step * (mean_temperature - state.temperature));

        for adapted in &adapted_states {
            for exemplar in &adapted.exemplars {
                if !state.exemplars.contains(exemplar) {
                    next.admit_exemplar(exemplar.clone());
                }
            }
        }

        Ok((next, ctx.metrics(query_loss / k, &query_scores)))
    }
}

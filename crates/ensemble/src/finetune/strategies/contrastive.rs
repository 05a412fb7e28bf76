use super::{exemplar, StrategyKind, TrainingContext, TrainingStrategy};
use crate::error::FineTuneError;
use crate::expert::ExpertState;
use crate::finetune::dataset::TrainingExample;
use crate::finetune::EpochMetrics;
use async_trait::async_trait;
use consilium_knowledge::cosine_similarity;
use consilium_prompt::ContrastPair;

/// Metadata key holding an answer to steer away from.
pub const NEGATIVE_KEY: &str = "negative";

const DEFAULT_MARGIN: f32 = 0.2;

/// Pull answers toward the expected output and away from a known-bad one.
///
/// In embedding space, the answer should be closer to the positive than to
/// the negative by at least `margin`. Each violation becomes a prefer/avoid
/// contrast and an exemplar. Examples without a negative only count toward
/// accuracy.
#[derive(Debug, Clone, Copy)]
pub struct Contrastive {
    pub margin: f32,
}

impl Default for Contrastive {
    fn default() -> Self {
        Self {
            margin: DEFAULT_MARGIN,
        }
    }
}

#[async_trait]
impl TrainingStrategy for Contrastive {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Contrastive
    }

    async fn train_epoch(
        &mut self,
        state: &ExpertState,
        train: &[TrainingExample],
        ctx: &TrainingContext<'_>,
    ) -> Result<(ExpertState, EpochMetrics), FineTuneError> {
        let scores = ctx.evaluate_all(state, train).await?;
        let embedder = ctx.expert.retriever().embedder();
        let mut next = state.clone();

        let (mut total_loss, mut pairs) = (0.0f32, 0usize);
        for (example, score) in train.iter().zip(&scores) {
            let Some(negative) = example.metadata_str(NEGATIVE_KEY) else {
                continue;
            };

            let texts = [
                score.answer.clone(),
                example.expected_output.clone(),
                negative.to_string(),
            ];
            let vectors = embedder.embed_batch(&texts).await?;
            let [answer, positive, negative_vec] = vectors.as_slice() else {
                return Err(FineTuneError::App(consilium_core::AppError::Embedding(format!(
                    "expected 3 embeddings, got {}",
                    vectors.len()
                ))));
            };

            let gap = cosine_similarity(answer, positive) - cosine_similarity(answer, negative_vec);
            let hinge = (self.margin - gap).max(0.0);
            total_loss += hinge;
            pairs += 1;

            if hinge > 0.0 {
                next.admit_contrast(ContrastPair {
                    prefer: example.expected_output.clone(),
                    avoid: negative.to_string(),
                });
                next.admit_exemplar(exemplar(&example.input, &example.expected_output));
            }
        }

        let loss = if pairs > 0 {
            total_loss / pairs as f32
        } else {
            0.0
        };
        Ok((next, ctx.metrics(loss, &scores)))
    }
}

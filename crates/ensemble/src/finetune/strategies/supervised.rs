use super::{supervised_step, StrategyKind, TrainingContext, TrainingStrategy};
use crate::error::FineTuneError;
use crate::expert::ExpertState;
use crate::finetune::dataset::TrainingExample;
use crate::finetune::EpochMetrics;
use async_trait::async_trait;

/// Fit confidence calibration to observed answer quality and keep the
/// examples the expert gets wrong as few-shot exemplars.
#[derive(Debug, Default, Clone, Copy)]
pub struct Supervised;

#[async_trait]
impl TrainingStrategy for Supervised {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Supervised
    }

    async fn train_epoch(
        &mut self,
        state: &ExpertState,
        train: &[TrainingExample],
        ctx: &TrainingContext<'_>,
    ) -> Result<(ExpertState, EpochMetrics), FineTuneError> {
        let scores = ctx.evaluate_all(state, train).await?;
        let (next, loss) = supervised_step(state, train, &scores, ctx);
        Ok((next, ctx.metrics(loss, &scores)))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{context, expert};
    use super::*;
    use consilium_llm::ScriptedClient;

    #[tokio::test]
    async fn test_epoch_learns_missed_examples() {
        let expert = expert(
            ScriptedClient::new()
                .with_rule("noble gas", "Helium", 0.9)
                .with_rule("catalyst", "A fast thing", 0.9),
        );
        let ctx = context(&expert);
        let train = vec![
            TrainingExample::new("Name a noble gas", "Helium"),
            TrainingExample::new("What is a catalyst?", "A substance that speeds up a reaction"),
        ];

        let state = ExpertState::default();
        let (next, metrics) = Supervised.train_epoch(&state, &train, &ctx).await.unwrap();

        assert_eq!(metrics.epoch, 1);
        assert_eq!(metrics.accuracy, 0.5);
        assert_eq!(next.exemplars.len(), 1);
        assert_eq!(next.exemplars[0].input, "What is a catalyst?");
        assert_eq!(state.exemplars.len(), 0);
    }
}

//! Scoring an expert state against labelled examples.

use super::dataset::TrainingExample;
use crate::expert::{DomainExpert, Expert, ExpertState};
use crate::similarity::AnswerSimilarity;
use crate::types::Query;
use consilium_core::AppResult;
use futures::future::try_join_all;

/// How one state answered one example.
#[derive(Debug, Clone, PartialEq)]
pub struct ExampleScore {
    pub answer: String,

    /// Confidence before calibration
    pub raw_confidence: f32,

    /// Reported confidence
    pub confidence: f32,

    /// Similarity of the answer to the expected output
    pub similarity: f32,
}

/// Answer `example` as `state` would and compare to the expected output.
pub async fn evaluate_example(
    expert: &DomainExpert,
    state: &ExpertState,
    example: &TrainingExample,
    similarity: &dyn AnswerSimilarity,
    top_k: usize,
) -> AppResult<ExampleScore> {
    let query = Query::new(example.input.clone()).with_domain(expert.domain().clone());
    let evaluation = expert.evaluate(&query, top_k, state).await?;

    let score = similarity
        .similarity(&evaluation.response.answer_text, &example.expected_output)
        .await;

    Ok(ExampleScore {
        answer: evaluation.response.answer_text,
        raw_confidence: evaluation.raw_confidence,
        confidence: evaluation.response.confidence,
        similarity: score,
    })
}

/// Evaluate every example concurrently, preserving order.
pub async fn evaluate_all(
    expert: &DomainExpert,
    state: &ExpertState,
    examples: &[TrainingExample],
    similarity: &dyn AnswerSimilarity,
    top_k: usize,
) -> AppResult<Vec<ExampleScore>> {
    try_join_all(
        examples
            .iter()
            .map(|example| evaluate_example(expert, state, example, similarity, top_k)),
    )
    .await
}

/// Mean answer similarity over `examples`; 0 for an empty slice.
pub async fn score_state(
    expert: &DomainExpert,
    state: &ExpertState,
    examples: &[TrainingExample],
    similarity: &dyn AnswerSimilarity,
    top_k: usize,
) -> AppResult<f32> {
    let scores = evaluate_all(expert, state, examples, similarity, top_k).await?;
    Ok(mean_similarity(&scores))
}

pub fn mean_similarity(scores: &[ExampleScore]) -> f32 {
    if scores.is_empty() {
        return 0.0;
    }
    scores.iter().map(|s| s.similarity).sum::<f32>() / scores.len() as f32
}

/// Fraction of scores at or above `threshold`.
pub fn accuracy(scores: &[ExampleScore], threshold: f32) -> f32 {
    if scores.is_empty() {
        return 0.0;
    }
    scores.iter().filter(|s| s.similarity >= threshold).count() as f32 / scores.len() as f32
}

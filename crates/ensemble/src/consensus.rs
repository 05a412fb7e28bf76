//! Consensus reducers over expert responses.
//!
//! All reducers are deterministic for a fixed input order. Callers pass
//! responses sorted by expert id and a parallel slice of weights (each
//! expert's specialization score for the query domain).

use crate::expert::state::clamp_unit;
use crate::similarity::AnswerSimilarity;
use crate::types::ExpertResponse;
use std::cmp::Ordering;

/// Outcome of a successful reduction.
#[derive(Debug, Clone, PartialEq)]
pub struct Reduction {
    /// Index into the response slice of the consensus answer
    pub consensus_index: usize,
    pub consensus_confidence: f32,
    pub agreement: f32,
}

/// A group of mutually similar answers.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    /// Indices into the response slice
    pub members: Vec<usize>,

    /// Highest-confidence member; other answers were compared against it
    pub representative: usize,

    pub confidence_sum: f32,
}

/// Majority mode found no cluster holding half the responders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoMajority {
    pub largest_cluster: usize,
    pub responders: usize,
}

/// `Σ w·c / Σ w` over `members`, or the plain mean when the weights sum to 0.
pub fn weighted_confidence(responses: &[ExpertResponse], weights: &[f32], members: &[usize]) -> f32 {
    if members.is_empty() {
        return 0.0;
    }

    let (mut weighted, mut total_weight) = (0.0f32, 0.0f32);
    for &i in members {
        let w = weights.get(i).copied().unwrap_or(0.0).max(0.0);
        weighted += w * responses[i].confidence;
        total_weight += w;
    }

    if total_weight > f32::EPSILON {
        clamp_unit(weighted / total_weight)
    } else {
        let sum: f32 = members.iter().map(|&i| responses[i].confidence).sum();
        clamp_unit(sum / members.len() as f32)
    }
}

/// `1 − var(c) / 0.25`, clamped. 0.25 is the largest variance of values in `[0, 1]`.
pub fn confidence_agreement(responses: &[ExpertResponse]) -> f32 {
    if responses.is_empty() {
        return 0.0;
    }
    let n = responses.len() as f32;
    let mean = responses.iter().map(|r| r.confidence).sum::<f32>() / n;
    let variance = responses
        .iter()
        .map(|r| (r.confidence - mean).powi(2))
        .sum::<f32>()
        / n;
    clamp_unit(1.0 - variance / 0.25)
}

/// Pick the answer with the largest `confidence × weight`.
///
/// Ties go to the lower latency, then the lexicographically smaller id.
/// Returns `None` for an empty slice.
pub fn weighted(responses: &[ExpertResponse], weights: &[f32]) -> Option<Reduction> {
    let all: Vec<usize> = (0..responses.len()).collect();

    let best = all.iter().copied().max_by(|&a, &b| {
        let score = |i: usize| responses[i].confidence * weights.get(i).copied().unwrap_or(0.0);
        score(a)
            .total_cmp(&score(b))
            .then_with(|| responses[b].latency.cmp(&responses[a].latency))
            .then_with(|| responses[b].expert_id.cmp(&responses[a].expert_id))
    })?;

    Some(Reduction {
        consensus_index: best,
        consensus_confidence: weighted_confidence(responses, weights, &all),
        agreement: confidence_agreement(responses),
    })
}

/// Leader clustering by answer similarity.
///
/// Responses are visited by descending confidence (ties by id); each joins
/// the first cluster whose representative it is similar enough to, or starts
/// a new one.
pub async fn cluster_responses(
    responses: &[ExpertResponse],
    similarity: &dyn AnswerSimilarity,
    threshold: f32,
) -> Vec<Cluster> {
    let mut order: Vec<usize> = (0..responses.len()).collect();
    order.sort_by(|&a, &b| by_confidence_desc(&responses[a], &responses[b]));

    let mut clusters: Vec<Cluster> = Vec::new();
    for i in order {
        let mut joined = false;
        for cluster in clusters.iter_mut() {
            let leader = &responses[cluster.representative].answer_text;
            if similarity.similarity(&responses[i].answer_text, leader).await >= threshold {
                cluster.members.push(i);
                cluster.confidence_sum += responses[i].confidence;
                joined = true;
                break;
            }
        }

        if !joined {
            clusters.push(Cluster {
                members: vec![i],
                representative: i,
                confidence_sum: responses[i].confidence,
            });
        }
    }

    clusters
}

/// The largest cluster wins if it holds at least half the responders.
///
/// Ties between clusters go to the larger confidence sum, then the smaller
/// representative id.
pub async fn majority(
    responses: &[ExpertResponse],
    weights: &[f32],
    similarity: &dyn AnswerSimilarity,
    threshold: f32,
) -> Result<Reduction, NoMajority> {
    let responders = responses.len();
    let clusters = cluster_responses(responses, similarity, threshold).await;

    let winner = clusters.iter().max_by(|a, b| {
        a.members
            .len()
            .cmp(&b.members.len())
            .then_with(|| a.confidence_sum.total_cmp(&b.confidence_sum))
            .then_with(|| {
                responses[b.representative]
                    .expert_id
                    .cmp(&responses[a.representative].expert_id)
            })
    });

    let Some(winner) = winner else {
        return Err(NoMajority {
            largest_cluster: 0,
            responders,
        });
    };

    let size = winner.members.len();
    if (size as f32) < responders as f32 / 2.0 {
        return Err(NoMajority {
            largest_cluster: size,
            responders,
        });
    }

    Ok(Reduction {
        consensus_index: winner.representative,
        consensus_confidence: weighted_confidence(responses, weights, &winner.members),
        agreement: size as f32 / responders as f32,
    })
}

/// Succeeds only when every answer falls into one cluster.
///
/// On failure returns the number of clusters found.
pub async fn unanimous(
    responses: &[ExpertResponse],
    weights: &[f32],
    similarity: &dyn AnswerSimilarity,
    threshold: f32,
) -> Result<Reduction, usize> {
    let clusters = cluster_responses(responses, similarity, threshold).await;
    if clusters.len() != 1 {
        return Err(clusters.len());
    }

    let all: Vec<usize> = (0..responses.len()).collect();
    Ok(Reduction {
        consensus_index: clusters[0].representative,
        consensus_confidence: weighted_confidence(responses, weights, &all),
        agreement: 1.0,
    })
}

fn by_confidence_desc(a: &ExpertResponse, b: &ExpertResponse) -> Ordering {
    b.confidence
        .total_cmp(&a.confidence)
        .then_with(|| a.expert_id.cmp(&b.expert_id))
}

//! Request-level error types for consultation and fine-tuning.

use crate::types::ExpertResponse;
use consilium_core::AppError;
use serde::Serialize;
use thiserror::Error;

/// Responses that could not be reconciled under the requested mode.
#[derive(Debug, Clone, Serialize)]
pub struct ConsensusFailure {
    /// Every response that took part, sorted by expert id
    pub responses: Vec<ExpertResponse>,

    /// Number of answer clusters found
    pub clusters: usize,
}

/// Errors returned by `consult` and the other service operations.
#[derive(Error, Debug)]
pub enum EnsembleError {
    /// No candidate expert, or every candidate failed or timed out
    #[error("No expert available: {0}")]
    NoExpertAvailable(String),

    /// Unanimous mode found more than one answer cluster
    #[error(
        "Consensus failed: {} responses formed {} clusters",
        .0.responses.len(),
        .0.clusters
    )]
    ConsensusFailed(Box<ConsensusFailure>),

    /// Every candidate failed while its retrieval was unavailable
    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    #[error("Unknown expert: {0}")]
    UnknownExpert(String),

    #[error("Unknown domain: {0}")]
    UnknownDomain(String),

    #[error(transparent)]
    App(#[from] AppError),
}

/// Errors returned by a fine-tuning run.
///
/// A run whose candidate state is rejected is not an error; it returns a
/// result with `accepted = false`.
#[derive(Error, Debug)]
pub enum FineTuneError {
    /// Empty dataset, bad split, zero epochs, or malformed examples
    #[error("Invalid dataset: {0}")]
    InvalidDataset(String),

    /// Another run holds the expert's training guard
    #[error("Training already in progress for expert '{0}'")]
    TrainingInProgress(String),

    #[error("Unknown expert: {0}")]
    UnknownExpert(String),

    #[error(transparent)]
    App(#[from] AppError),
}

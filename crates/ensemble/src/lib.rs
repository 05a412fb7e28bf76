//! Expert ensemble for Consilium.
//!
//! Domain experts answer from their own knowledge store, the coordinator
//! fans a query out and reduces the answers to a consensus, the tracker
//! learns which expert to trust for which domain, and the fine-tuning
//! pipeline adapts an expert's state from labeled examples.

pub mod consensus;
pub mod coordinator;
pub mod error;
pub mod expert;
pub mod feedback;
pub mod finetune;
pub mod registry;
pub mod service;
pub mod similarity;
pub mod specialization;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use coordinator::{CoordinatorSettings, EnsembleCoordinator};
pub use error::{ConsensusFailure, EnsembleError, FineTuneError};
pub use expert::{DomainExpert, Expert, ExpertProfile, ExpertState};
pub use finetune::{
    EpochMetrics, FineTuningPipeline, FineTuningResult, PipelineStage, StrategyKind,
    TrainingDataset, TrainingExample,
};
pub use registry::ExpertRegistry;
pub use service::Consilium;
pub use similarity::{create_similarity, AnswerSimilarity, EmbeddingSimilarity, LexicalSimilarity};
pub use specialization::{SpecializationRecord, SpecializationTracker, Trend};
pub use types::{
    ConsultOutcome, EnsembleMode, EnsembleResponse, ExpertId, ExpertResponse, FeedbackAck, Query,
};

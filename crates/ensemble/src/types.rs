//! Query and response types of the ensemble.

use consilium_core::Domain;
use consilium_knowledge::SnippetId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Identifier of a registered expert.
pub type ExpertId = String;

/// Context key whose value is treated as the ground-truth answer when
/// estimating answer quality for specialization feedback.
pub const REFERENCE_ANSWER_KEY: &str = "reference_answer";

/// How expert answers are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnsembleMode {
    /// Dispatch only the best-suited expert
    Single,
    /// Confidence times specialization weight decides
    #[default]
    Weighted,
    /// Largest cluster of similar answers decides
    Majority,
    /// All answers must agree
    Unanimous,
}

impl EnsembleMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Weighted => "weighted",
            Self::Majority => "majority",
            Self::Unanimous => "unanimous",
        }
    }

    /// Parse a mode name (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "single" => Some(Self::Single),
            "weighted" => Some(Self::Weighted),
            "majority" => Some(Self::Majority),
            "unanimous" => Some(Self::Unanimous),
            _ => None,
        }
    }
}

impl fmt::Display for EnsembleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A question posed to the ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,

    /// Domain the caller believes the question belongs to
    #[serde(rename = "domainHint", default, skip_serializing_if = "Option::is_none")]
    pub domain_hint: Option<Domain>,

    /// Caller-supplied key-value context, injected into prompts
    #[serde(default)]
    pub context: BTreeMap<String, String>,

    #[serde(rename = "ensembleMode", default)]
    pub ensemble_mode: EnsembleMode,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            domain_hint: None,
            context: BTreeMap::new(),
            ensemble_mode: EnsembleMode::default(),
        }
    }

    pub fn with_domain(mut self, domain: impl Into<Domain>) -> Self {
        self.domain_hint = Some(domain.into());
        self
    }

    pub fn with_mode(mut self, mode: EnsembleMode) -> Self {
        self.ensemble_mode = mode;
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Attach a ground-truth answer used only for feedback.
    pub fn with_reference_answer(self, answer: impl Into<String>) -> Self {
        self.with_context(REFERENCE_ANSWER_KEY, answer)
    }

    pub fn reference_answer(&self) -> Option<&str> {
        self.context.get(REFERENCE_ANSWER_KEY).map(String::as_str)
    }
}

/// One expert's answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertResponse {
    #[serde(rename = "expertId")]
    pub expert_id: ExpertId,

    /// The expert's primary domain
    pub domain: Domain,

    #[serde(rename = "answerText")]
    pub answer_text: String,

    /// Calibrated confidence in `[0, 1]`
    pub confidence: f32,

    #[serde(rename = "supportingSnippetIds")]
    pub supporting_snippet_ids: Vec<SnippetId>,

    /// Wall time spent retrieving and answering
    pub latency: Duration,

    /// True when retrieval was unavailable and the answer has no context
    #[serde(rename = "retrievalDegraded", default)]
    pub retrieval_degraded: bool,
}

/// The combined answer of several experts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleResponse {
    #[serde(rename = "consensusAnswer")]
    pub consensus_answer: String,

    #[serde(rename = "consensusConfidence")]
    pub consensus_confidence: f32,

    #[serde(rename = "agreementScore")]
    pub agreement_score: f32,

    /// Never empty; sorted by expert id
    #[serde(rename = "perExpertResponses")]
    pub per_expert_responses: Vec<ExpertResponse>,

    /// Expert whose answer became the consensus
    #[serde(rename = "consensusExpertId")]
    pub consensus_expert_id: ExpertId,

    /// Mode that produced this response
    pub strategy: EnsembleMode,

    /// Majority mode fell back to weighted for lack of a majority
    #[serde(rename = "degradedConsensus", default)]
    pub degraded_consensus: bool,

    #[serde(rename = "timedOutExperts", default)]
    pub timed_out_experts: Vec<ExpertId>,

    #[serde(rename = "failedExperts", default)]
    pub failed_experts: Vec<ExpertId>,
}

/// Result of a consultation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ConsultOutcome {
    Single(ExpertResponse),
    Ensemble(EnsembleResponse),
}

impl ConsultOutcome {
    pub fn answer_text(&self) -> &str {
        match self {
            Self::Single(r) => &r.answer_text,
            Self::Ensemble(r) => &r.consensus_answer,
        }
    }

    pub fn confidence(&self) -> f32 {
        match self {
            Self::Single(r) => r.confidence,
            Self::Ensemble(r) => r.consensus_confidence,
        }
    }

    pub fn as_ensemble(&self) -> Option<&EnsembleResponse> {
        match self {
            Self::Ensemble(r) => Some(r),
            Self::Single(_) => None,
        }
    }

    pub fn as_single(&self) -> Option<&ExpertResponse> {
        match self {
            Self::Single(r) => Some(r),
            Self::Ensemble(_) => None,
        }
    }
}

/// Acknowledgement of explicit feedback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackAck {
    #[serde(rename = "expertId")]
    pub expert_id: ExpertId,

    pub domain: Domain,

    /// Score after the update
    #[serde(rename = "specializationScore")]
    pub specialization_score: f32,

    #[serde(rename = "queriesAnswered")]
    pub queries_answered: u64,
}

//! Domain experts.
//!
//! Experts share one answering contract and differ only in their domain
//! profile: knowledge store, prompt template and tuned state. The
//! coordinator sees them through the `Expert` trait and never branches on
//! domain.

pub mod confidence;
pub mod domain_expert;
pub mod state;

pub use domain_expert::{DomainExpert, Evaluation, ExpertProfile};
pub use state::{Calibration, ExpertState};

use crate::types::{ExpertResponse, Query};
use async_trait::async_trait;
use consilium_core::{AppResult, Domain};
use consilium_knowledge::KnowledgeSnippet;

/// An answering unit bound to one primary domain.
#[async_trait]
pub trait Expert: Send + Sync {
    fn id(&self) -> &str;

    /// Primary domain
    fn domain(&self) -> &Domain;

    /// 1.0 for the primary domain, the declared weight for a secondary
    /// domain, 0.0 otherwise.
    fn relevance(&self, domain: &Domain) -> f32;

    /// Answer `query` using the given context snippets.
    async fn answer(
        &self,
        query: &Query,
        snippets: &[KnowledgeSnippet],
    ) -> AppResult<ExpertResponse>;

    /// Retrieve up to `k` snippets from the expert's own corpus, then answer.
    ///
    /// Retrieval failures degrade the answer instead of failing it.
    async fn respond(&self, query: &Query, k: usize) -> AppResult<ExpertResponse>;
}

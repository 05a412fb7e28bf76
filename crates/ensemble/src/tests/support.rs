//! Shared fixtures for the scenario tests.

use crate::expert::ExpertProfile;
use crate::service::Consilium;
use consilium_core::{ConsiliumConfig, Domain};
use consilium_knowledge::Retriever;
use consilium_llm::ScriptedClient;
use std::sync::Arc;

pub const CHEMISTRY: &str = "chemistry-expert";
pub const BIOLOGY: &str = "biology-expert";
pub const GENERAL: &str = "general-expert";

pub const BOND_QUESTION: &str = "What is a chemical bond?";
pub const CHEMISTRY_SNIPPET: &str = "Atoms form covalent bonds by sharing electrons.";
pub const BIOLOGY_SNIPPET: &str = "Cells attach to each other through junction proteins.";

/// Three domains, 64-dimensional trigram embeddings and `alpha = 1` so a
/// single feedback sets a score exactly.
pub fn config() -> ConsiliumConfig {
    let mut config = ConsiliumConfig::default();
    config.domains = vec![
        Domain::new("chemistry"),
        Domain::new("biology"),
        Domain::general(),
    ];
    config.embedding.dimensions = 64;
    config.specialization.alpha = 1.0;
    config
}

/// A service over `llm` with no experts registered.
pub fn service(llm: ScriptedClient) -> Consilium {
    let config = config();
    let retriever = Retriever::from_config(&config).unwrap();
    Consilium::new(config, Arc::new(llm), "scripted", retriever).unwrap()
}

/// Chemistry, biology and general experts, all relevant to chemistry, with
/// one snippet in each of the chemistry and biology corpora.
pub async fn panel(llm: ScriptedClient) -> Consilium {
    let service = service(llm);
    service
        .register_expert(ExpertProfile::new(CHEMISTRY, "chemistry", "scripted"))
        .unwrap();
    service
        .register_expert(
            ExpertProfile::new(BIOLOGY, "biology", "scripted").with_secondary("chemistry", 0.5),
        )
        .unwrap();
    service
        .register_expert(
            ExpertProfile::new(GENERAL, "general", "scripted").with_secondary("chemistry", 0.4),
        )
        .unwrap();

    service
        .ingest("chemistry", CHEMISTRY_SNIPPET, serde_json::json!({}))
        .await
        .unwrap();
    service
        .ingest("biology", BIOLOGY_SNIPPET, serde_json::json!({}))
        .await
        .unwrap();
    service
}

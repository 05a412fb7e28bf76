//! Registered experts, keyed by id.

use crate::expert::{DomainExpert, Expert};
use crate::types::ExpertId;
use consilium_core::{AppError, AppResult};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Default)]
pub struct ExpertRegistry {
    experts: RwLock<BTreeMap<ExpertId, Arc<DomainExpert>>>,
}

impl ExpertRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an expert. Ids are unique.
    pub fn register(&self, expert: Arc<DomainExpert>) -> AppResult<()> {
        let mut experts = self.experts.write().unwrap_or_else(PoisonError::into_inner);
        let id = expert.id().to_string();
        if experts.contains_key(&id) {
            return Err(AppError::Config(format!("Expert '{}' is already registered", id)));
        }

        tracing::info!("Registered expert '{}' for domain '{}'", id, expert.domain());
        experts.insert(id, expert);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Arc<DomainExpert>> {
        self.experts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Every expert, sorted by id.
    pub fn all(&self) -> Vec<Arc<DomainExpert>> {
        self.experts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Every expert behind the `Expert` trait, sorted by id.
    pub fn as_dyn(&self) -> Vec<Arc<dyn Expert>> {
        self.all()
            .into_iter()
            .map(|e| e as Arc<dyn Expert>)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.experts.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expert::ExpertProfile;
    use consilium_core::config::DistanceMetric;
    use consilium_core::Domain;
    use consilium_knowledge::{KnowledgeStore, Retriever, TrigramProvider};
    use consilium_llm::ScriptedClient;

    fn expert(id: &str, domain: &str) -> Arc<DomainExpert> {
        let store = Arc::new(KnowledgeStore::new(
            vec![Domain::new(domain)],
            16,
            DistanceMetric::Cosine,
        ));
        let retriever = Retriever::new(Arc::new(TrigramProvider::new(16)), store);
        Arc::new(DomainExpert::new(
            ExpertProfile::new(id, domain, "scripted"),
            Arc::new(ScriptedClient::new()),
            retriever,
        ))
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = ExpertRegistry::new();
        registry.register(expert("physics-expert", "physics")).unwrap();
        registry.register(expert("chem-expert", "chemistry")).unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.get("chem-expert").is_some());
        assert!(registry.get("missing").is_none());

        let ids: Vec<String> = registry.as_dyn().iter().map(|e| e.id().to_string()).collect();
        assert_eq!(ids, vec!["chem-expert", "physics-expert"]);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let registry = ExpertRegistry::new();
        registry.register(expert("chem-expert", "chemistry")).unwrap();
        let err = registry.register(expert("chem-expert", "chemistry")).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}

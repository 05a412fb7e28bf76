//! Per-domain knowledge store.
//!
//! One vector index per configured domain. Indices can be detached to take a
//! domain offline; retrieval against a detached domain reports
//! `RetrievalUnavailable` so experts degrade instead of failing.

use crate::flat_index::FlatIndex;
use crate::types::{DomainStats, KnowledgeSnippet, SearchHit};
use crate::vector_index::VectorIndex;
use consilium_core::config::DistanceMetric;
use consilium_core::{AppError, AppResult, Domain};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

type Slot = RwLock<Option<Box<dyn VectorIndex>>>;

/// Knowledge store holding one index per domain.
///
/// The domain set is closed at construction. Readers of one domain never
/// contend with writers of another.
#[derive(Debug)]
pub struct KnowledgeStore {
    dimensions: usize,
    metric: DistanceMetric,
    slots: BTreeMap<Domain, Slot>,
}

impl KnowledgeStore {
    /// Create a store with an empty `FlatIndex` for every domain.
    pub fn new(
        domains: impl IntoIterator<Item = Domain>,
        dimensions: usize,
        metric: DistanceMetric,
    ) -> Self {
        let slots = domains
            .into_iter()
            .map(|domain| {
                let index: Box<dyn VectorIndex> = Box::new(FlatIndex::new(dimensions, metric));
                (domain, RwLock::new(Some(index)))
            })
            .collect::<BTreeMap<_, _>>();

        tracing::debug!(
            "Created knowledge store: {} domains, {} dimensions, {} metric",
            slots.len(),
            dimensions,
            metric.as_str()
        );

        Self {
            dimensions,
            metric,
            slots,
        }
    }

    /// Configured domains, sorted.
    pub fn domains(&self) -> Vec<Domain> {
        self.slots.keys().cloned().collect()
    }

    pub fn has_domain(&self, domain: &Domain) -> bool {
        self.slots.contains_key(domain)
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Insert or replace a snippet in its domain's index.
    pub fn insert(&self, snippet: KnowledgeSnippet) -> AppResult<()> {
        let domain = snippet.domain.clone();
        let mut guard = self.write_slot(&domain)?;
        let index = online_mut(&mut guard, &domain)?;
        index.insert(snippet)
    }

    /// Nearest snippet ids for `query_vector` in `domain`.
    pub fn search(&self, domain: &Domain, query_vector: &[f32], k: usize) -> AppResult<Vec<SearchHit>> {
        let guard = self.read_slot(domain)?;
        online(&guard, domain)?.search(query_vector, k)
    }

    /// Nearest snippets with their distances, resolved under one read lock.
    ///
    /// Hits farther than `max_distance` are dropped.
    pub fn search_snippets(
        &self,
        domain: &Domain,
        query_vector: &[f32],
        k: usize,
        max_distance: Option<f32>,
    ) -> AppResult<Vec<(KnowledgeSnippet, f32)>> {
        let guard = self.read_slot(domain)?;
        let index = online(&guard, domain)?;

        let hits = index.search(query_vector, k)?;
        Ok(hits
            .into_iter()
            .filter(|hit| max_distance.map_or(true, |max| hit.distance <= max))
            .filter_map(|hit| {
                index
                    .get(&hit.snippet_id)
                    .map(|snippet| (snippet.clone(), hit.distance))
            })
            .collect())
    }

    pub fn get(&self, domain: &Domain, id: &str) -> AppResult<Option<KnowledgeSnippet>> {
        let guard = self.read_slot(domain)?;
        Ok(online(&guard, domain)?.get(id).cloned())
    }

    /// Remove a snippet from `domain`, returning it if present.
    pub fn remove(&self, domain: &Domain, id: &str) -> AppResult<Option<KnowledgeSnippet>> {
        let mut guard = self.write_slot(domain)?;
        Ok(online_mut(&mut guard, domain)?.remove(id))
    }

    /// Number of snippets in `domain`.
    pub fn len(&self, domain: &Domain) -> AppResult<usize> {
        let guard = self.read_slot(domain)?;
        Ok(online(&guard, domain)?.len())
    }

    /// Take a domain's index offline, handing it to the caller.
    pub fn detach(&self, domain: &Domain) -> AppResult<Box<dyn VectorIndex>> {
        let mut guard = self.write_slot(domain)?;
        let index = guard.take().ok_or_else(|| {
            AppError::Knowledge(format!("Index for domain '{}' is already detached", domain))
        })?;

        tracing::warn!("Detached index for domain '{}' ({} snippets)", domain, index.len());
        Ok(index)
    }

    /// Bring an index online for `domain`, returning the one it replaces.
    pub fn attach(
        &self,
        domain: &Domain,
        index: Box<dyn VectorIndex>,
    ) -> AppResult<Option<Box<dyn VectorIndex>>> {
        if index.dimensions() != self.dimensions {
            return Err(AppError::Knowledge(format!(
                "Cannot attach index with {} dimensions to a store of {} dimensions",
                index.dimensions(),
                self.dimensions
            )));
        }

        let mut guard = self.write_slot(domain)?;
        tracing::info!("Attached index for domain '{}' ({} snippets)", domain, index.len());
        Ok(guard.replace(index))
    }

    /// Snapshot of every domain's size and availability.
    pub fn stats(&self) -> Vec<DomainStats> {
        self.slots
            .iter()
            .map(|(domain, slot)| {
                let guard = slot.read().unwrap_or_else(PoisonError::into_inner);
                DomainStats {
                    domain: domain.clone(),
                    snippets_count: guard.as_ref().map_or(0, |index| index.len()),
                    online: guard.is_some(),
                }
            })
            .collect()
    }

    fn slot(&self, domain: &Domain) -> AppResult<&Slot> {
        self.slots
            .get(domain)
            .ok_or_else(|| AppError::Knowledge(format!("Unknown domain: '{}'", domain)))
    }

    fn read_slot(&self, domain: &Domain) -> AppResult<RwLockReadGuard<'_, Option<Box<dyn VectorIndex>>>> {
        Ok(self
            .slot(domain)?
            .read()
            .unwrap_or_else(PoisonError::into_inner))
    }

    fn write_slot(
        &self,
        domain: &Domain,
    ) -> AppResult<RwLockWriteGuard<'_, Option<Box<dyn VectorIndex>>>> {
        Ok(self
            .slot(domain)?
            .write()
            .unwrap_or_else(PoisonError::into_inner))
    }
}

fn online<'a>(
    slot: &'a Option<Box<dyn VectorIndex>>,
    domain: &Domain,
) -> AppResult<&'a dyn VectorIndex> {
    slot.as_deref().ok_or_else(|| detached(domain))
}

fn online_mut<'a>(
    slot: &'a mut Option<Box<dyn VectorIndex>>,
    domain: &Domain,
) -> AppResult<&'a mut Box<dyn VectorIndex>> {
    slot.as_mut().ok_or_else(|| detached(domain))
}

fn detached(domain: &Domain) -> AppError {
    AppError::RetrievalUnavailable(format!("Index for domain '{}' is detached", domain))
}

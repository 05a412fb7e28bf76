//! Character-trigram embeddings for offline use.

use crate::embeddings::{normalize, EmbeddingProvider};
use consilium_core::AppResult;
use std::collections::BTreeMap;

const STOP_WORDS: &[&str] = &[
    "the", "is", "at", "which", "on", "a", "an", "as", "are", "was", "were", "for", "to", "of",
    "in", "and", "or", "but", "with", "by", "from", "this", "that", "be", "have", "has", "had",
    "it", "its", "their", "they", "them", "what", "how", "why", "does", "do",
];

/// Hashes words and their character trigrams into buckets.
///
/// Deterministic and offline. Texts sharing vocabulary land close together.
#[derive(Debug)]
pub struct TrigramProvider {
    dimensions: usize,
    normalize: bool,
}

fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word)
}

/// Lowercased content words longer than two characters, with counts.
/// Ordered so float accumulation is stable.
fn term_counts(lower: &str) -> BTreeMap<&str, u32> {
    let mut counts = BTreeMap::new();
    for word in lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2 && !is_stop_word(w))
    {
        *counts.entry(word).or_insert(0) += 1;
    }
    counts
}

fn trigram_hash(trigram: &[char]) -> u64 {
    trigram
        .iter()
        .fold(0u64, |acc, c| acc.wrapping_mul(37).wrapping_add(*c as u64))
}

fn word_hash(word: &str) -> u64 {
    word.bytes()
        .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64))
}

impl TrigramProvider {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            normalize: true,
        }
    }

    /// Unit-length output unless disabled.
    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    fn bucket(&self, hash: u64) -> usize {
        (hash as usize) % self.dimensions
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimensions];
        if self.dimensions == 0 {
            return vector;
        }

        let lower = text.to_lowercase();
        for (word, count) in term_counts(&lower) {
            let chars: Vec<char> = word.chars().collect();
            for trigram in chars.windows(3) {
                vector[self.bucket(trigram_hash(trigram))] += (count as f32).sqrt();
            }
            vector[self.bucket(word_hash(word))] += count as f32;
        }

        if self.normalize {
            normalize(&mut vector);
        }
        vector
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for TrigramProvider {
    fn provider_name(&self) -> &str {
        "trigram"
    }

    fn model_name(&self) -> &str {
        "trigram-v1"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

//! Context retrieval for question generation.
//!
//! Candidates come from the session's own vector partition and are ranked
//! by a blend of cosine similarity and a hyperbolic recency decay, then
//! packed greedily into a token budget.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use specforge_vectors::{SessionFilter, VectorMatch};
use tracing::debug;

use super::interactions::InteractionStore;
use crate::config::InvestigationConfig;
use crate::error::Result;

/// Words-to-tokens ratio used for context budgeting.
pub const TOKENS_PER_WORD: f64 = 1.3;

/// Ranking and budget knobs.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub max_tokens: usize,
    pub half_life_hours: f64,
    pub similarity_weight: f64,
    pub recency_weight: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self::from(&InvestigationConfig::default())
    }
}

impl From<&InvestigationConfig> for RetrievalConfig {
    fn from(config: &InvestigationConfig) -> Self {
        Self {
            top_k: config.context_top_k,
            max_tokens: config.context_max_tokens,
            half_life_hours: config.recency_half_life_hours.max(f64::EPSILON),
            similarity_weight: config.similarity_weight,
            recency_weight: config.recency_weight,
        }
    }
}

/// A candidate after scoring.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub text: String,
    pub similarity: f64,
    pub recency: f64,
    pub score: f64,
}

/// `1 / (1 + age / half_life)`: 1.0 for a fresh chunk, 0.5 at one half-life.
pub fn recency_weight(age_hours: f64, half_life_hours: f64) -> f64 {
    1.0 / (1.0 + age_hours.max(0.0) / half_life_hours)
}

/// Hours elapsed between `timestamp` and `now`.
pub fn age_hours(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - timestamp).num_milliseconds() as f64 / 3_600_000.0
}

/// Rough token count: whitespace words times 1.3, rounded.
pub fn estimate_tokens(text: &str) -> usize {
    (text.split_whitespace().count() as f64 * TOKENS_PER_WORD).round() as usize
}

/// Score and sort candidates, best first. Ties keep index order.
pub fn rank(matches: Vec<VectorMatch>, now: DateTime<Utc>, config: &RetrievalConfig) -> Vec<ScoredChunk> {
    let mut scored: Vec<ScoredChunk> = matches
        .into_iter()
        .map(|m| {
            let similarity = m.similarity() as f64;
            let recency = recency_weight(age_hours(m.metadata.timestamp, now), config.half_life_hours);
            ScoredChunk {
                score: config.similarity_weight * similarity + config.recency_weight * recency,
                text: m.text,
                similarity,
                recency,
            }
        })
        .collect();

    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored
}

/// Take chunks in order until the next one would overflow `max_tokens`.
pub fn select_within_budget(chunks: Vec<ScoredChunk>, max_tokens: usize) -> Vec<String> {
    let mut total = 0;
    let mut selected = Vec::new();

    for chunk in chunks {
        let tokens = estimate_tokens(&chunk.text);
        if total + tokens > max_tokens {
            break;
        }
        total += tokens;
        selected.push(chunk.text);
    }

    selected
}

/// Drop exact duplicate texts, keeping the first occurrence.
pub fn dedup_texts(texts: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    texts
        .into_iter()
        .filter(|text| seen.insert(hex::encode(Sha256::digest(text.as_bytes()))))
        .collect()
}

/// Retrieves session-scoped context for the question selector.
#[derive(Clone)]
pub struct ContextRetriever {
    store: InteractionStore,
    config: RetrievalConfig,
}

impl ContextRetriever {
    pub fn new(store: InteractionStore, config: RetrievalConfig) -> Self {
        Self { store, config }
    }

    /// Context for `query` using the configured `top_k` and token budget.
    pub async fn retrieve(&self, query: &str, session_id: &str) -> Result<Vec<String>> {
        self.retrieve_with(query, session_id, self.config.top_k, self.config.max_tokens)
            .await
    }

    pub async fn retrieve_with(
        &self,
        query: &str,
        session_id: &str,
        top_k: usize,
        max_tokens: usize,
    ) -> Result<Vec<String>> {
        let filter = SessionFilter::new(session_id);
        let vector = self.store.embed(query).await?;
        let matches = self.store.index().query(&vector, top_k, &filter).await?;
        let candidates = matches.len();

        let ranked = rank(matches, Utc::now(), &self.config);
        let selected = dedup_texts(select_within_budget(ranked, max_tokens));

        debug!(
            session_id = %session_id,
            candidates,
            selected = selected.len(),
            "Retrieved context"
        );

        Ok(selected)
    }
}

//! Multi-query retrieval.
//!
//! Compound questions are split into up to `max_subqueries` sub-queries; each
//! is searched separately and the pooled hits are deduplicated by chunk
//! identity, keeping the best score, before the final top-`k` cut.

use anyhow::Result;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::debug;

use docrag_core::config::{HandbookConfig, RetrievalConfig};
use docrag_core::error::Error;
use docrag_core::traits::VectorStore;
use docrag_core::types::{ChunkKey, RetrievalResult};

use crate::evidence::format_evidence;

/// Questions longer than this (in characters) are also split on commas.
const COMMA_SPLIT_MIN_CHARS: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrieverOptions {
    pub min_candidates: usize,
    pub max_subqueries: usize,
    pub evidence_chars: usize,
}

impl Default for RetrieverOptions {
    fn default() -> Self {
        Self::from(&RetrievalConfig::default())
    }
}

impl From<&RetrievalConfig> for RetrieverOptions {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            min_candidates: config.min_candidates,
            max_subqueries: config.max_subqueries,
            evidence_chars: config.evidence_chars,
        }
    }
}

impl RetrieverOptions {
    /// Same decomposition and fan-out, with the handbook's evidence budget.
    pub fn for_handbook(retrieval: &RetrievalConfig, handbook: &HandbookConfig) -> Self {
        Self { evidence_chars: handbook.evidence_chars, ..Self::from(retrieval) }
    }
}

/// Non-empty merged hits and the evidence block rendered from them.
#[derive(Debug, Clone, PartialEq)]
pub struct Retrieval {
    pub results: Vec<RetrievalResult>,
    pub evidence: String,
}

#[derive(Debug, Clone, Default)]
pub struct MultiQueryRetriever {
    options: RetrieverOptions,
}

impl MultiQueryRetriever {
    pub fn new(options: RetrieverOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> RetrieverOptions {
        self.options
    }

    /// `None` when no sub-query found anything; callers must not prompt a
    /// model in that case. `k` must be positive.
    pub fn retrieve(&self, question: &str, store: &dyn VectorStore, k: usize) -> Result<Option<Retrieval>> {
        if k == 0 {
            return Err(Error::InvalidConfig("top_k must be > 0".into()).into());
        }
        let subqueries = decompose_query(question, self.options.max_subqueries);
        let per_query = self.options.min_candidates.max(k);
        let mut batches = Vec::with_capacity(subqueries.len());
        for subquery in &subqueries {
            let hits = store.search(subquery, per_query)?;
            debug!(subquery = subquery.as_str(), hits = hits.len(), "sub-query searched");
            batches.push(hits);
        }

        let results = merge_results(batches, k);
        if results.is_empty() {
            debug!(question, "no evidence retrieved");
            return Ok(None);
        }
        let evidence = format_evidence(&results, self.options.evidence_chars);
        Ok(Some(Retrieval { results, evidence }))
    }
}

/// Sub-queries in first-seen order: the whole question, then its parts split
/// on the word "and", on `?`/`;`, and (long questions only) on commas.
///
/// Candidates are whitespace-normalized and trimmed of dangling separators.
/// Duplicates are detected case-insensitively, ignoring trailing punctuation,
/// so `"What is X?"` and `"what is x"` count once.
pub fn decompose_query(question: &str, max_subqueries: usize) -> Vec<String> {
    let normalized = question.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut candidates = vec![normalized.clone()];

    let words: Vec<&str> = normalized.split(' ').collect();
    let groups: Vec<String> = words
        .split(|w| w.eq_ignore_ascii_case("and"))
        .map(|group| group.join(" "))
        .collect();
    if groups.len() > 1 {
        candidates.extend(groups);
    }

    candidates.extend(normalized.split(['?', ';']).map(str::to_string));

    if normalized.chars().count() > COMMA_SPLIT_MIN_CHARS {
        candidates.extend(normalized.split(',').map(str::to_string));
    }

    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for candidate in candidates {
        let display = clean_candidate(&candidate);
        let key = dedup_key(&display);
        if key.is_empty() || !seen.insert(key) {
            continue;
        }
        out.push(display);
        if out.len() >= max_subqueries.max(1) {
            break;
        }
    }
    out
}

fn clean_candidate(candidate: &str) -> String {
    const DANGLING: &[char] = &[',', ';', ':'];
    candidate
        .trim()
        .trim_matches(DANGLING)
        .trim()
        .to_string()
}

fn dedup_key(candidate: &str) -> String {
    candidate
        .trim_end_matches(&['?', '.', '!', ',', ';', ':'][..])
        .trim()
        .to_lowercase()
}

/// Pools hit lists, keeps one entry per chunk with its highest score, and
/// returns the best `k` in descending score order. Ties keep first-seen order.
pub fn merge_results<I>(batches: I, k: usize) -> Vec<RetrievalResult>
where
    I: IntoIterator<Item = Vec<RetrievalResult>>,
{
    let mut merged: Vec<RetrievalResult> = Vec::new();
    let mut by_key: HashMap<ChunkKey, usize> = HashMap::new();
    for hit in batches.into_iter().flatten() {
        match by_key.entry(hit.chunk.key()) {
            Entry::Occupied(slot) => {
                let existing = &mut merged[*slot.get()];
                if hit.score > existing.score {
                    *existing = hit;
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(merged.len());
                merged.push(hit);
            }
        }
    }
    merged.sort_by(|a, b| b.score.total_cmp(&a.score));
    merged.truncate(k);
    merged
}

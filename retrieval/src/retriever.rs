//! Exact similarity retrieval over stored chunk records.
//!
//! Candidates are scanned in storage order. Each one is decoded, checked
//! for dimension compatibility with the query and collected until the
//! candidate cap is reached; the collected set is then scored in a single
//! batched cosine pass and ranked.

use std::borrow::Cow;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use docrag_embeddings::cosine_similarity_batch;

use crate::error::Result;
use crate::record::{ChunkRecord, SearchHit};

/// Bound on how many compatible candidates are scored for one query:
/// `min(k * multiplier, ceiling)`.
///
/// Scanning stops once the bound is reached, so with a large corpus the
/// result is the best of the first candidates found, not a guaranteed
/// global top-k.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateCap {
    /// Candidates scored per requested result.
    pub multiplier: usize,

    /// Hard upper bound.
    pub ceiling: usize,
}

impl Default for CandidateCap {
    fn default() -> Self {
        Self {
            multiplier: 5,
            ceiling: 100,
        }
    }
}

impl CandidateCap {
    /// Cap for a query asking for `k` results.
    pub fn for_k(&self, k: usize) -> usize {
        k.saturating_mul(self.multiplier).min(self.ceiling).max(1)
    }
}

/// Counters describing one retrieval pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalStats {
    /// Candidates looked at before the scan stopped.
    pub scanned: usize,

    /// Candidates whose vector matched the query dimension.
    pub compatible: usize,

    /// Candidates skipped for a dimension mismatch.
    pub dimension_mismatches: usize,

    /// Candidates skipped because their vector could not be decoded.
    pub malformed: usize,
}

/// Result of one retrieval pass.
#[derive(Debug, Clone, PartialEq)]
pub enum RetrievalOutcome {
    /// Top hits by descending score.
    Ranked {
        hits: Vec<SearchHit>,
        stats: RetrievalStats,
    },
    /// Nothing was compatible and at least one candidate had the wrong
    /// dimension.
    DimensionMismatch { stats: RetrievalStats },
    /// Nothing usable at all.
    NotFound { stats: RetrievalStats },
}

impl RetrievalOutcome {
    /// Counters of the pass.
    pub fn stats(&self) -> &RetrievalStats {
        match self {
            Self::Ranked { stats, .. }
            | Self::DimensionMismatch { stats }
            | Self::NotFound { stats } => stats,
        }
    }
}

/// Brute-force cosine retriever.
#[derive(Debug, Clone, Default)]
pub struct SimilarityRetriever {
    cap: CandidateCap,
}

impl SimilarityRetriever {
    /// Create a retriever with the default cap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the candidate cap.
    pub fn with_cap(mut self, cap: CandidateCap) -> Self {
        self.cap = cap;
        self
    }

    /// The candidate cap in use.
    pub fn cap(&self) -> CandidateCap {
        self.cap
    }

    /// Rank `candidates` against `query` and keep the best `k`.
    pub fn retrieve(
        &self,
        query: &[f32],
        candidates: &[ChunkRecord],
        k: usize,
    ) -> Result<RetrievalOutcome> {
        let cap = self.cap.for_k(k);
        let mut stats = RetrievalStats::default();
        let mut selected: Vec<(&ChunkRecord, Cow<'_, [f32]>)> = Vec::new();

        for record in candidates {
            if selected.len() >= cap {
                debug!(cap, "candidate cap reached");
                break;
            }
            stats.scanned += 1;

            let vector = match record.embedding.decode() {
                Ok(vector) => vector,
                Err(err) => {
                    warn!(id = record.id, chunk_id = record.chunk_id, error = %err, "skipping candidate");
                    stats.malformed += 1;
                    continue;
                }
            };
            if vector.len() != query.len() {
                stats.dimension_mismatches += 1;
                continue;
            }
            selected.push((record, vector));
        }
        stats.compatible = selected.len();

        if selected.is_empty() {
            if stats.dimension_mismatches > 0 {
                warn!(
                    skipped = stats.dimension_mismatches,
                    query_dim = query.len(),
                    "all candidates skipped for dimension mismatch"
                );
                return Ok(RetrievalOutcome::DimensionMismatch { stats });
            }
            return Ok(RetrievalOutcome::NotFound { stats });
        }

        let views: Vec<&[f32]> = selected.iter().map(|(_, v)| v.as_ref()).collect();
        let scores = cosine_similarity_batch(query, &views)?;

        let mut order: Vec<usize> = (0..selected.len()).collect();
        // Stable: equal scores keep candidate order.
        order.sort_by_key(|&i| std::cmp::Reverse(OrderedFloat(scores[i])));

        let hits = order
            .into_iter()
            .take(k)
            .map(|i| SearchHit::from_record(selected[i].0, round_score(scores[i])))
            .collect();

        debug!(
            scanned = stats.scanned,
            compatible = stats.compatible,
            mismatched = stats.dimension_mismatches,
            malformed = stats.malformed,
            "ranked candidates"
        );
        Ok(RetrievalOutcome::Ranked { hits, stats })
    }
}

/// Round to 4 decimal places.
fn round_score(score: f32) -> f32 {
    (score * 10_000.0).round() / 10_000.0
}

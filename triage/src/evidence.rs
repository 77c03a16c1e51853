//! Evidence types shared by retrieval, gating, and decision stages.
//!
//! `EvidenceChunk` is what dense retrieval returns; `RankedEvidence` adds
//! the reranker's relevance score. Ranked sequences are always sorted
//! descending by relevance, ties broken by original retrieval rank.

use serde::{Deserialize, Serialize};

/// Metadata carried by every indexed policy chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Human-readable source (document title or file).
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub url: String,
    /// Lowercase-normalized airline tag; empty for airline-agnostic chunks.
    #[serde(default)]
    pub airline: String,
    /// Who authored the policy: AIRLINE, REGULATOR, INTERNAL_META.
    #[serde(default)]
    pub authority: String,
    /// Policy section/domain label.
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub chunk_index: usize,
    /// Internal/meta chunks that may inform retrieval but never be cited.
    #[serde(default)]
    pub do_not_cite: bool,
}

impl ChunkMetadata {
    /// Airline-agnostic chunks apply to every carrier: untagged chunks and
    /// regulator policy.
    pub fn is_airline_agnostic(&self) -> bool {
        self.airline.is_empty() || self.authority == "REGULATOR"
    }
}

/// A candidate policy passage from the document index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceChunk {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Embedding similarity from dense retrieval (recall stage).
    pub embedding_score: f32,
}

/// An evidence chunk with the reranker's relevance estimate attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEvidence {
    pub chunk: EvidenceChunk,
    /// Pairwise (query, chunk) relevance; higher is more relevant.
    /// Independent of `embedding_score`.
    pub relevance_score: f32,
}

/// Attach relevance scores to retrieved chunks and sort descending.
///
/// `scores` is positionally aligned with `chunks`; a missing score counts
/// as 0.0. The sort is stable, so equal scores keep retrieval order, and
/// re-sorting an already ranked sequence is a no-op.
pub fn rank_evidence(chunks: Vec<EvidenceChunk>, scores: &[f32]) -> Vec<RankedEvidence> {
    let mut ranked: Vec<RankedEvidence> = chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| RankedEvidence {
            chunk,
            relevance_score: scores.get(i).copied().unwrap_or(0.0),
        })
        .collect();
    sort_by_relevance(&mut ranked);
    ranked
}

/// Stable descending sort by relevance score.
pub fn sort_by_relevance(ranked: &mut [RankedEvidence]) {
    ranked.sort_by(|a, b| {
        b.relevance_score
            .partial_cmp(&a.relevance_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Top reranked score, or the minimum possible value when empty.
pub fn top_score(ranked: &[RankedEvidence]) -> f32 {
    ranked
        .first()
        .map(|r| r.relevance_score)
        .unwrap_or(f32::NEG_INFINITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn chunk(id: &str, score: f32) -> EvidenceChunk {
        EvidenceChunk {
            id: id.to_string(),
            text: format!("policy text for {id}"),
            metadata: ChunkMetadata {
                source: "delta_refunds.txt".to_string(),
                airline: "delta airlines".to_string(),
                authority: "AIRLINE".to_string(),
                ..Default::default()
            },
            embedding_score: score,
        }
    }

    #[test]
    fn test_rank_sorts_descending() {
        let chunks = vec![chunk("a", 0.9), chunk("b", 0.8), chunk("c", 0.7)];
        let ranked = rank_evidence(chunks, &[0.1, 0.8, 0.4]);
        let ids: Vec<&str> = ranked.iter().map(|r| r.chunk.id.as_str()).collect();
        assert_eq!(ids, ["b", "c", "a"]);
    }

    #[test]
    fn test_ties_keep_retrieval_order() {
        let chunks = vec![chunk("first", 0.9), chunk("second", 0.8), chunk("third", 0.7)];
        let ranked = rank_evidence(chunks, &[0.5, 0.5, 0.5]);
        let ids: Vec<&str> = ranked.iter().map(|r| r.chunk.id.as_str()).collect();
        assert_eq!(ids, ["first", "second", "third"]);
    }

    #[test]
    fn test_resort_is_idempotent() {
        let chunks = vec![chunk("a", 0.9), chunk("b", 0.8), chunk("c", 0.7)];
        let mut ranked = rank_evidence(chunks, &[0.2, 0.9, 0.5]);
        let before = ranked.clone();
        sort_by_relevance(&mut ranked);
        assert_eq!(ranked, before);
    }

    #[test]
    fn test_reordered_input_same_final_order() {
        let scores = [("a", 0.2f32), ("b", 0.9), ("c", 0.5)];
        let forward = rank_evidence(
            scores.iter().map(|(id, _)| chunk(id, 0.0)).collect(),
            &scores.iter().map(|(_, s)| *s).collect::<Vec<_>>(),
        );
        let reversed = rank_evidence(
            scores.iter().rev().map(|(id, _)| chunk(id, 0.0)).collect(),
            &scores.iter().rev().map(|(_, s)| *s).collect::<Vec<_>>(),
        );
        let forward_ids: Vec<&str> = forward.iter().map(|r| r.chunk.id.as_str()).collect();
        let reversed_ids: Vec<&str> = reversed.iter().map(|r| r.chunk.id.as_str()).collect();
        assert_eq!(forward_ids, reversed_ids);
    }

    #[test]
    fn test_missing_scores_default_to_zero() {
        let chunks = vec![chunk("a", 0.9), chunk("b", 0.8)];
        let ranked = rank_evidence(chunks, &[0.7]);
        assert_eq!(ranked[1].relevance_score, 0.0);
    }

    #[test]
    fn test_top_score_empty_is_minimum() {
        assert_eq!(top_score(&[]), f32::NEG_INFINITY);
    }

    #[test]
    fn test_airline_agnostic_metadata() {
        let mut meta = ChunkMetadata::default();
        assert!(meta.is_airline_agnostic());
        meta.airline = "delta airlines".to_string();
        assert!(!meta.is_airline_agnostic());
        meta.authority = "REGULATOR".to_string();
        assert!(meta.is_airline_agnostic());
    }
}

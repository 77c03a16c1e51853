//! Two-stage evidence retrieval: dense vector search, then cross-encoder
//! reranking.
//!
//! The retriever owns the collaborator handles (embedder, index, reranker),
//! all injected as trait objects so tests can substitute deterministic
//! stubs. Models are loaded by their serving processes once; this module
//! only issues concurrent-safe inference calls.

pub mod embedder;
pub mod index;
pub mod reranker;

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use triage::{rank_evidence, top_score, EvidenceChunk, RankedEvidence};

pub use embedder::{EmbedKind, Embedder, HttpEmbedder};
pub use index::{DocumentIndex, HttpDocumentIndex, IndexedChunk, MemoryIndex};
pub use reranker::{HttpReranker, Reranker};

/// Failures from the retrieval collaborators. The pipeline folds these into
/// escalation verdicts; they never surface as unstructured errors.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("embedding request failed: {0}")]
    Embedding(String),
    #[error("document index error: {0}")]
    Index(String),
    #[error("reranker request failed: {0}")]
    Rerank(String),
    #[error("malformed collaborator response: {0}")]
    Malformed(String),
}

/// Result of a full search, including which airline filter survived the
/// fallback retry.
#[derive(Debug)]
pub struct SearchOutcome {
    pub ranked: Vec<RankedEvidence>,
    pub filter_used: Option<String>,
}

/// Two-stage retriever with airline-filter fallback.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn DocumentIndex>,
    reranker: Arc<dyn Reranker>,
    top_k: usize,
    /// Below this reranked top score, a filtered search is retried without
    /// the filter and the better result kept.
    filter_retry_threshold: f32,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn DocumentIndex>,
        reranker: Arc<dyn Reranker>,
        top_k: usize,
        filter_retry_threshold: f32,
    ) -> Self {
        Self {
            embedder,
            index,
            reranker,
            top_k,
            filter_retry_threshold,
        }
    }

    /// One embedding call and one rerank call so the first user query does
    /// not pay the collaborators' cold-start cost. Failures are logged and
    /// ignored; warmup never blocks startup.
    pub async fn warmup(&self) {
        if let Err(e) = self
            .embedder
            .embed(&["warmup".to_string()], EmbedKind::Query)
            .await
        {
            warn!(error = %e, "embedder warmup failed");
        }
        if let Err(e) = self.reranker.score("warmup", &["warmup".to_string()]).await {
            warn!(error = %e, "reranker warmup failed");
        }
    }

    /// Stage 1: dense retrieval.
    pub async fn retrieve(
        &self,
        query: &str,
        airline_filter: Option<&str>,
    ) -> Result<Vec<EvidenceChunk>, RetrievalError> {
        let embeddings = self
            .embedder
            .embed(&[query.to_string()], EmbedKind::Query)
            .await?;
        let Some(query_embedding) = embeddings.first() else {
            return Err(RetrievalError::Malformed(
                "embedder returned no vectors".to_string(),
            ));
        };
        self.index
            .query(query_embedding, airline_filter, self.top_k)
            .await
    }

    /// Stage 2: rerank retrieved candidates. Same cardinality, re-sorted
    /// descending by relevance.
    pub async fn rerank(
        &self,
        query: &str,
        candidates: Vec<EvidenceChunk>,
    ) -> Result<Vec<RankedEvidence>, RetrievalError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let documents: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
        let scores = self.reranker.score(query, &documents).await?;
        Ok(rank_evidence(candidates, &scores))
    }

    async fn search_once(
        &self,
        query: &str,
        airline_filter: Option<&str>,
    ) -> Result<Vec<RankedEvidence>, RetrievalError> {
        let candidates = self.retrieve(query, airline_filter).await?;
        self.rerank(query, candidates).await
    }

    /// Combined pipeline with the airline-filter fallback: if the filtered
    /// top score is weak, retry once unfiltered and keep the better result.
    /// This prevents wrong-filter false negatives on airlines the corpus
    /// does not cover.
    pub async fn search(
        &self,
        query: &str,
        airline_filter: Option<&str>,
    ) -> Result<SearchOutcome, RetrievalError> {
        let filter = airline_filter.map(|a| a.trim().to_lowercase());
        let ranked = self.search_once(query, filter.as_deref()).await?;
        let score = top_score(&ranked);

        if let Some(used) = filter {
            if score < self.filter_retry_threshold {
                debug!(score, filter = %used, "filtered search weak — retrying unfiltered");
                let unfiltered = self.search_once(query, None).await?;
                if top_score(&unfiltered) > score {
                    return Ok(SearchOutcome {
                        ranked: unfiltered,
                        filter_used: None,
                    });
                }
            }
            return Ok(SearchOutcome {
                ranked,
                filter_used: Some(used),
            });
        }

        Ok(SearchOutcome {
            ranked,
            filter_used: None,
        })
    }
}

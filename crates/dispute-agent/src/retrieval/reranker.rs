//! Reranking model collaborator.
//!
//! Dense retrieval optimizes recall; this pairwise (query, chunk) scoring
//! pass restores precision before the confidence gate reads the top score.

use async_trait::async_trait;
use serde::Deserialize;

use crate::retrieval::RetrievalError;

/// Characters of each candidate passed to the cross-encoder.
const RERANK_CONTEXT_CHARS: usize = 500;

/// Relevance scoring interface. Returns one score per document, positionally
/// aligned with the input.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, RetrievalError>;
}

/// TEI-style `/rerank` client.
pub struct HttpReranker {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct RerankItem {
    index: usize,
    score: f32,
}

impl HttpReranker {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, RetrievalError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = documents
            .iter()
            .map(|d| d.chars().take(RERANK_CONTEXT_CHARS).collect())
            .collect();

        let resp = self
            .client
            .post(format!("{}/rerank", self.base_url))
            .json(&serde_json::json!({
                "query": query,
                "texts": texts,
                "raw_scores": false,
            }))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| RetrievalError::Rerank(e.to_string()))?;

        let items: Vec<RerankItem> = resp
            .json()
            .await
            .map_err(|e| RetrievalError::Malformed(e.to_string()))?;

        // The endpoint returns items sorted by score; restore input order.
        let mut scores = vec![0.0f32; documents.len()];
        for item in items {
            match scores.get_mut(item.index) {
                Some(slot) => *slot = item.score,
                None => {
                    return Err(RetrievalError::Malformed(format!(
                        "rerank index {} out of range for {} documents",
                        item.index,
                        documents.len()
                    )))
                }
            }
        }
        Ok(scores)
    }
}

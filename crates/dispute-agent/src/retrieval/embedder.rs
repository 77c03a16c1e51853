//! Embedding model collaborator.
//!
//! Queries and passages are normalized into the same representation space:
//! both go through the same model, distinguished only by the e5-style
//! `query:` / `passage:` prefixes the model was trained with.

use async_trait::async_trait;
use serde::Deserialize;

use crate::retrieval::RetrievalError;

/// Which side of the retrieval pair a text is embedded as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedKind {
    Query,
    Passage,
}

impl EmbedKind {
    fn prefix(self) -> &'static str {
        match self {
            Self::Query => "query: ",
            Self::Passage => "passage: ",
        }
    }
}

/// Embedding model interface. Implementations must be safe for concurrent
/// calls; the process holds one instance for its lifetime.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String], kind: EmbedKind)
        -> Result<Vec<Vec<f32>>, RetrievalError>;
}

/// OpenAI-compatible `/embeddings` client.
pub struct HttpEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    pub fn new(client: reqwest::Client, base_url: &str, model: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(
        &self,
        texts: &[String],
        kind: EmbedKind,
    ) -> Result<Vec<Vec<f32>>, RetrievalError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let input: Vec<String> = texts
            .iter()
            .map(|t| format!("{}{}", kind.prefix(), t))
            .collect();

        let resp = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&serde_json::json!({
                "model": self.model,
                "input": input,
            }))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| RetrievalError::Embedding(e.to_string()))?;

        let body: EmbeddingsResponse = resp
            .json()
            .await
            .map_err(|e| RetrievalError::Malformed(e.to_string()))?;

        if body.data.len() != texts.len() {
            return Err(RetrievalError::Malformed(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                body.data.len()
            )));
        }

        // The API may return items out of order; restore input order.
        let mut items = body.data;
        items.sort_by_key(|item| item.index);
        Ok(items.into_iter().map(|item| item.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embed_kind_prefixes() {
        assert_eq!(EmbedKind::Query.prefix(), "query: ");
        assert_eq!(EmbedKind::Passage.prefix(), "passage: ");
    }

    #[test]
    fn test_response_parsing_restores_order() {
        let raw = r#"{"data":[
            {"index":1,"embedding":[0.2]},
            {"index":0,"embedding":[0.1]}
        ]}"#;
        let mut body: EmbeddingsResponse = serde_json::from_str(raw).unwrap();
        body.data.sort_by_key(|item| item.index);
        assert_eq!(body.data[0].embedding, vec![0.1]);
        assert_eq!(body.data[1].embedding, vec![0.2]);
    }
}

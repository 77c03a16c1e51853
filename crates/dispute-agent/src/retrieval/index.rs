//! Document index collaborator — dense vector search with metadata filters.
//!
//! Two implementations: a Chroma-style HTTP client for a remote index, and
//! an in-process index that snapshots to JSON, used for local setups and
//! tests. Both restrict airline-filtered queries to chunks tagged with that
//! airline plus airline-agnostic chunks (untagged or regulator policy).

use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use triage::{ChunkMetadata, EvidenceChunk};

use crate::retrieval::RetrievalError;

/// A chunk as stored in the index: evidence fields plus its embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub embedding: Vec<f32>,
}

/// Vector index interface. Writes happen only during ingestion; queries are
/// safe to run concurrently.
#[async_trait]
pub trait DocumentIndex: Send + Sync {
    /// Top-k chunks by similarity to `embedding`, optionally restricted to
    /// one airline (plus airline-agnostic chunks).
    async fn query(
        &self,
        embedding: &[f32],
        airline_filter: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<EvidenceChunk>, RetrievalError>;

    /// Add or replace chunks (ingestion only).
    async fn upsert(&self, chunks: Vec<IndexedChunk>) -> Result<(), RetrievalError>;

    async fn count(&self) -> Result<usize, RetrievalError>;
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na * nb)
}

fn airline_matches(meta: &ChunkMetadata, filter: Option<&str>) -> bool {
    match filter {
        Some(airline) => meta.is_airline_agnostic() || meta.airline == airline,
        None => true,
    }
}

/// In-process index with JSON snapshot persistence.
#[derive(Default)]
pub struct MemoryIndex {
    chunks: RwLock<Vec<IndexedChunk>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a snapshot; a missing file yields an empty index (the pipeline
    /// degrades to low confidence, it does not crash).
    pub fn load(path: &Path) -> Result<Self, RetrievalError> {
        if !path.exists() {
            info!(path = %path.display(), "no index snapshot — starting empty");
            return Ok(Self::new());
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| RetrievalError::Index(format!("read snapshot: {e}")))?;
        let chunks: Vec<IndexedChunk> = serde_json::from_str(&raw)
            .map_err(|e| RetrievalError::Index(format!("parse snapshot: {e}")))?;
        info!(path = %path.display(), chunks = chunks.len(), "loaded index snapshot");
        Ok(Self {
            chunks: RwLock::new(chunks),
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), RetrievalError> {
        let chunks = self
            .chunks
            .read()
            .map_err(|_| RetrievalError::Index("snapshot lock poisoned".into()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| RetrievalError::Index(format!("create snapshot dir: {e}")))?;
        }
        let json = serde_json::to_string(&*chunks)
            .map_err(|e| RetrievalError::Index(format!("serialize snapshot: {e}")))?;
        std::fs::write(path, json)
            .map_err(|e| RetrievalError::Index(format!("write snapshot: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl DocumentIndex for MemoryIndex {
    async fn query(
        &self,
        embedding: &[f32],
        airline_filter: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<EvidenceChunk>, RetrievalError> {
        let chunks = self
            .chunks
            .read()
            .map_err(|_| RetrievalError::Index("index lock poisoned".into()))?;

        let mut scored: Vec<EvidenceChunk> = chunks
            .iter()
            .filter(|c| airline_matches(&c.metadata, airline_filter))
            .map(|c| EvidenceChunk {
                id: c.id.clone(),
                text: c.text.clone(),
                metadata: c.metadata.clone(),
                embedding_score: cosine(embedding, &c.embedding),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.embedding_score
                .partial_cmp(&a.embedding_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn upsert(&self, new: Vec<IndexedChunk>) -> Result<(), RetrievalError> {
        let mut chunks = self
            .chunks
            .write()
            .map_err(|_| RetrievalError::Index("index lock poisoned".into()))?;
        for chunk in new {
            if let Some(existing) = chunks.iter_mut().find(|c| c.id == chunk.id) {
                *existing = chunk;
            } else {
                chunks.push(chunk);
            }
        }
        Ok(())
    }

    async fn count(&self) -> Result<usize, RetrievalError> {
        Ok(self
            .chunks
            .read()
            .map_err(|_| RetrievalError::Index("index lock poisoned".into()))?
            .len())
    }
}

/// Chroma-style HTTP index client.
pub struct HttpDocumentIndex {
    client: reqwest::Client,
    base_url: String,
    collection: String,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    ids: Vec<Vec<String>>,
    documents: Vec<Vec<String>>,
    metadatas: Vec<Vec<ChunkMetadata>>,
    distances: Vec<Vec<f32>>,
}

impl HttpDocumentIndex {
    pub fn new(client: reqwest::Client, base_url: &str, collection: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            collection: collection.to_string(),
        }
    }

    fn collection_url(&self, action: &str) -> String {
        format!(
            "{}/api/v1/collections/{}/{action}",
            self.base_url, self.collection
        )
    }

    fn where_clause(airline_filter: Option<&str>) -> Option<serde_json::Value> {
        airline_filter.map(|airline| {
            serde_json::json!({
                "$or": [
                    { "airline": { "$eq": airline } },
                    { "airline": { "$eq": "" } },
                    { "authority": { "$eq": "REGULATOR" } },
                ]
            })
        })
    }
}

#[async_trait]
impl DocumentIndex for HttpDocumentIndex {
    async fn query(
        &self,
        embedding: &[f32],
        airline_filter: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<EvidenceChunk>, RetrievalError> {
        let mut body = serde_json::json!({
            "query_embeddings": [embedding],
            "n_results": top_k,
            "include": ["documents", "metadatas", "distances"],
        });
        if let Some(filter) = Self::where_clause(airline_filter) {
            body["where"] = filter;
        }

        let resp = self
            .client
            .post(self.collection_url("query"))
            .json(&body)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| RetrievalError::Index(e.to_string()))?;

        let parsed: QueryResponse = resp
            .json()
            .await
            .map_err(|e| RetrievalError::Malformed(e.to_string()))?;

        let (Some(ids), Some(docs), Some(metas), Some(distances)) = (
            parsed.ids.into_iter().next(),
            parsed.documents.into_iter().next(),
            parsed.metadatas.into_iter().next(),
            parsed.distances.into_iter().next(),
        ) else {
            return Ok(Vec::new());
        };

        Ok(ids
            .into_iter()
            .zip(docs)
            .zip(metas.into_iter().zip(distances))
            .map(|((id, text), (metadata, distance))| EvidenceChunk {
                id,
                text,
                metadata,
                // cosine distance → similarity
                embedding_score: 1.0 - distance,
            })
            .collect())
    }

    async fn upsert(&self, chunks: Vec<IndexedChunk>) -> Result<(), RetrievalError> {
        if chunks.is_empty() {
            return Ok(());
        }
        let body = serde_json::json!({
            "ids": chunks.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(),
            "documents": chunks.iter().map(|c| c.text.as_str()).collect::<Vec<_>>(),
            "embeddings": chunks.iter().map(|c| c.embedding.as_slice()).collect::<Vec<_>>(),
            "metadatas": chunks.iter().map(|c| &c.metadata).collect::<Vec<_>>(),
        });

        self.client
            .post(self.collection_url("upsert"))
            .json(&body)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| RetrievalError::Index(e.to_string()))?;
        Ok(())
    }

    async fn count(&self) -> Result<usize, RetrievalError> {
        let resp = self
            .client
            .get(self.collection_url("count"))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| RetrievalError::Index(e.to_string()))?;
        resp.json()
            .await
            .map_err(|e| RetrievalError::Malformed(e.to_string()))
    }
}

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// A model-serving endpoint (base URL + model name).
#[derive(Debug, Clone, Deserialize)]
pub struct Endpoint {
    pub url: String,
    pub model: String,
}

/// Document index backing store selection.
#[derive(Debug, Clone)]
pub enum IndexBackend {
    /// Remote vector index over HTTP.
    Http { url: String, collection: String },
    /// In-process index snapshotted to a JSON file.
    Snapshot { path: PathBuf },
}

/// Top-level collaborator configuration for the agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Embedding model endpoint (OpenAI-compatible /embeddings).
    pub embedding: Endpoint,
    /// Cross-encoder reranker endpoint (TEI-style /rerank).
    pub reranker: Endpoint,
    /// Generation backend (Ollama-style /api/generate).
    pub generation: Endpoint,
    pub index: IndexBackend,
    /// Request-level bound on the generation call specifically — the
    /// highest-latency, least-deterministic stage.
    pub generation_timeout: Duration,
    /// Generation token cap.
    pub num_predict: u32,
    pub temperature: f32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            embedding: Endpoint {
                url: std::env::var("EMBEDDING_URL")
                    .unwrap_or_else(|_| "http://localhost:8090/v1".into()),
                model: std::env::var("EMBEDDING_MODEL")
                    .unwrap_or_else(|_| "intfloat/e5-base-v2".into()),
            },
            reranker: Endpoint {
                url: std::env::var("RERANKER_URL")
                    .unwrap_or_else(|_| "http://localhost:8091".into()),
                model: std::env::var("RERANKER_MODEL")
                    .unwrap_or_else(|_| "BAAI/bge-reranker-base".into()),
            },
            generation: Endpoint {
                url: std::env::var("OLLAMA_BASE_URL")
                    .unwrap_or_else(|_| "http://localhost:11434".into()),
                model: std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.1:8b".into()),
            },
            index: Self::index_from_env(),
            generation_timeout: Duration::from_secs(
                std::env::var("GENERATION_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(120),
            ),
            num_predict: 350,
            temperature: 0.4,
        }
    }
}

impl AgentConfig {
    fn index_from_env() -> IndexBackend {
        match std::env::var("INDEX_URL") {
            Ok(url) => IndexBackend::Http {
                url,
                collection: std::env::var("INDEX_COLLECTION")
                    .unwrap_or_else(|_| "policies".into()),
            },
            Err(_) => IndexBackend::Snapshot {
                path: std::env::var("INDEX_SNAPSHOT")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("vector_store/index.json")),
            },
        }
    }
}

/// Check if an inference endpoint is reachable (GET /models or /).
pub async fn check_endpoint(url: &str) -> bool {
    let probe = format!("{}/models", url.trim_end_matches('/'));
    match reqwest::Client::new()
        .get(&probe)
        .timeout(Duration::from_secs(5))
        .send()
        .await
    {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}

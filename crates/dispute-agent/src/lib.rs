//! Airline dispute assistant — collaborator orchestration.
//!
//! This crate wires the deterministic `triage` core to its external
//! collaborators: the embedding model, the document index, the reranking
//! model, and the language generation backend, each behind an injectable
//! trait. It also provides policy-document ingestion and the CLI binary.
//!
//! The deterministic stages (slot extraction, validation, gating, rule
//! evaluation) live in the `triage` crate; nothing in this crate decides
//! eligibility.

pub mod config;
pub mod generation;
pub mod ingestion;
pub mod pipeline;
pub mod retrieval;

pub use config::{AgentConfig, Endpoint, IndexBackend};
pub use generation::{GenerationBackend, GenerationError, GenerationRequest, OllamaGenerator};
pub use ingestion::{ingest_policies, ChunkOptions, IngestError, IngestReport};
pub use pipeline::{ChatRequest, ChatTurn, DisputePipeline, PipelineOutput, Role};
pub use retrieval::{
    DocumentIndex, EmbedKind, Embedder, HttpDocumentIndex, HttpEmbedder, HttpReranker,
    IndexedChunk, MemoryIndex, Reranker, RetrievalError, Retriever, SearchOutcome,
};

//! Deterministic core of the airline-dispute assistant.
//!
//! This crate holds every stage of the pipeline that must be a pure
//! function of its inputs — no LLM calls, no I/O, no randomness:
//!
//! - slot extraction and validation over free-text dispute input
//! - retrieval-query enrichment from known slots
//! - the confidence gate over reranked evidence
//! - the policy decision engine (rule table as data)
//! - the response payload types and their mode invariants
//!
//! Retrieval, reranking, and generation live in the `dispute-agent` crate
//! behind collaborator traits; this crate only defines the evidence types
//! they exchange.

pub mod config;
pub mod decision;
pub mod evidence;
pub mod gate;
pub mod response;
pub mod slots;

// Re-export the slot model
pub use slots::extractor::SlotExtractor;
pub use slots::query::build_retrieval_query;
pub use slots::validator::{RequiredSlotTable, SlotValidator, MAX_CLARIFYING_QUESTIONS};
pub use slots::{BaggageStatus, DisputeSlots, DisputeType, FareClass, SlotId, TriState};

// Re-export evidence types
pub use evidence::{rank_evidence, top_score, ChunkMetadata, EvidenceChunk, RankedEvidence};

// Re-export the confidence gate
pub use gate::{ConfidenceBand, ConfidenceGate, ConfidenceVerdict, GateBranch, GateThresholds};

// Re-export the decision engine
pub use decision::{
    DecisionEngine, DecisionResult, Eligibility, PolicyRule, RuleEvaluation, RuleTable, SlotPattern,
};

// Re-export response types
pub use response::{
    Citation, DebugTrace, EscalationReason, EscalationSummary, EvidenceDigest, ResponseMode,
    ResponsePayload,
};

// Re-export configuration
pub use config::{TriageConfig, TriageError};

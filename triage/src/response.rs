//! Response payload — the terminal artifact of one pipeline run.
//!
//! Constructors keep the mode invariants: citations are non-empty if and
//! only if the mode is `answer`; clarify responses carry at most two
//! questions and no citations; escalations carry a structured summary.

use serde::{Deserialize, Serialize};

use crate::decision::DecisionResult;
use crate::evidence::RankedEvidence;
use crate::gate::ConfidenceBand;
use crate::slots::validator::MAX_CLARIFYING_QUESTIONS;
use crate::slots::{DisputeSlots, DisputeType, SlotId};

/// Terminal mode of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    Answer,
    Clarify,
    Escalate,
}

impl std::fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Answer => write!(f, "answer"),
            Self::Clarify => write!(f, "clarify"),
            Self::Escalate => write!(f, "escalate"),
        }
    }
}

/// A citation into the evidence used to ground an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub chunk_id: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub airline: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub authority: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub domain: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    pub relevance_score: f32,
    /// Leading excerpt of the cited passage.
    pub snippet: String,
}

const SNIPPET_CHARS: usize = 600;

impl Citation {
    pub fn from_ranked(ranked: &RankedEvidence) -> Self {
        let meta = &ranked.chunk.metadata;
        let snippet: String = ranked.chunk.text.chars().take(SNIPPET_CHARS).collect();
        Self {
            chunk_id: ranked.chunk.id.clone(),
            source: meta.source.clone(),
            airline: meta.airline.clone(),
            authority: meta.authority.clone(),
            domain: meta.domain.clone(),
            url: meta.url.clone(),
            relevance_score: ranked.relevance_score,
            snippet,
        }
    }
}

/// Why a request was escalated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EscalationReason {
    /// Reranked top score below the clarify threshold.
    LowConfidence { top_score: f32 },
    /// Retrieval returned no candidates at all.
    EmptyRetrieval,
    /// No deterministic rule covers this slot combination.
    NoRuleMatched { dispute_type: DisputeType },
    /// Legal/complex disputes are outside policy scope.
    OutOfPolicyScope,
    /// A retrieval collaborator (embedder, index, reranker) failed.
    RetrievalFailed { detail: String },
    /// The generation backend returned an error.
    GenerationFailed { detail: String },
    /// The generation backend exceeded the request timeout.
    GenerationTimeout { timeout_secs: u64 },
}

impl std::fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LowConfidence { top_score } => {
                write!(f, "evidence confidence too low (top score {top_score:.3})")
            }
            Self::EmptyRetrieval => write!(f, "retrieval returned no evidence"),
            Self::NoRuleMatched { dispute_type } => {
                write!(f, "no policy rule matched for {dispute_type} dispute")
            }
            Self::OutOfPolicyScope => write!(f, "legal/complex dispute outside policy scope"),
            Self::RetrievalFailed { detail } => write!(f, "retrieval failed: {detail}"),
            Self::GenerationFailed { detail } => write!(f, "generation failed: {detail}"),
            Self::GenerationTimeout { timeout_secs } => {
                write!(f, "generation timed out after {timeout_secs}s")
            }
        }
    }
}

/// Compact view of one evidence item for escalation summaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceDigest {
    pub chunk_id: String,
    pub source: String,
    pub relevance_score: f32,
}

impl EvidenceDigest {
    pub fn from_ranked(ranked: &RankedEvidence) -> Self {
        Self {
            chunk_id: ranked.chunk.id.clone(),
            source: ranked.chunk.metadata.source.clone(),
            relevance_score: ranked.relevance_score,
        }
    }
}

/// Structured slot/evidence summary attached to every escalation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationSummary {
    pub reason: EscalationReason,
    pub slots: DisputeSlots,
    /// Digest of whatever evidence was ranked before escalating.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<EvidenceDigest>,
}

/// Per-request debug trace carried on every payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebugTrace {
    pub slots: Option<DisputeSlots>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_slots: Vec<SlotId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Airline filter actually used by retrieval (after fallback).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub airline_filter: Option<String>,
    /// Reranked top score; absent when retrieval never ran or was empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_score: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_band: Option<ConfidenceBand>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<DecisionResult>,
    /// Whether the generation backend produced the answer text.
    #[serde(default)]
    pub used_generator: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator_error: Option<String>,
}

/// The terminal artifact of one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsePayload {
    pub mode: ResponseMode,
    /// Generated answer prose; only present for `answer`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    /// Targeted clarifying questions; only present for `clarify`, at most
    /// [`MAX_CLARIFYING_QUESTIONS`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub questions: Vec<String>,
    /// Non-empty iff `mode == answer`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,
    /// Present iff `mode == escalate`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<EscalationSummary>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next_actions: Vec<String>,
    pub debug: DebugTrace,
}

impl ResponsePayload {
    /// An answer response. Callers must supply at least one citation.
    pub fn answer(
        text: String,
        citations: Vec<Citation>,
        next_actions: Vec<String>,
        debug: DebugTrace,
    ) -> Self {
        debug_assert!(!citations.is_empty(), "answer responses must cite evidence");
        Self {
            mode: ResponseMode::Answer,
            answer: Some(text),
            questions: Vec::new(),
            citations,
            summary: None,
            next_actions,
            debug,
        }
    }

    /// A clarify response; questions beyond the cap are dropped.
    pub fn clarify(mut questions: Vec<String>, debug: DebugTrace) -> Self {
        questions.truncate(MAX_CLARIFYING_QUESTIONS);
        Self {
            mode: ResponseMode::Clarify,
            answer: None,
            questions,
            citations: Vec::new(),
            summary: None,
            next_actions: Vec::new(),
            debug,
        }
    }

    /// An escalate response with its structured summary.
    pub fn escalate(summary: EscalationSummary, debug: DebugTrace) -> Self {
        Self {
            mode: ResponseMode::Escalate,
            answer: None,
            questions: Vec::new(),
            citations: Vec::new(),
            summary: Some(summary),
            next_actions: Vec::new(),
            debug,
        }
    }

    /// Structural invariants checked by tests: citations non-empty iff
    /// answer, question cap, summary present iff escalate.
    pub fn invariants_hold(&self) -> bool {
        let citations_ok = match self.mode {
            ResponseMode::Answer => !self.citations.is_empty(),
            _ => self.citations.is_empty(),
        };
        let questions_ok = self.questions.len() <= MAX_CLARIFYING_QUESTIONS
            && (self.mode == ResponseMode::Clarify || self.questions.is_empty());
        let summary_ok = (self.mode == ResponseMode::Escalate) == self.summary.is_some();
        citations_ok && questions_ok && summary_ok
    }
}

//! Confidence gate — three-way threshold split on the reranked top score.
//!
//! The gate is the pipeline's primary correctness control: it runs on every
//! request that reaches retrieval, reads only the reranked relevance score
//! (never the raw embedding similarity), and chooses whether the request
//! may proceed to the decision engine, needs clarification, or escalates.

use serde::{Deserialize, Serialize};

use crate::evidence::{top_score, RankedEvidence};

/// Which pipeline branch the gate selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateBranch {
    /// Evidence is strong enough to answer.
    Proceed,
    /// Evidence exists but is weak — ask for more detail.
    Clarify,
    /// Evidence too weak to trust any generated claim.
    Escalate,
}

impl std::fmt::Display for GateBranch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Proceed => write!(f, "proceed"),
            Self::Clarify => write!(f, "clarify"),
            Self::Escalate => write!(f, "escalate"),
        }
    }
}

/// Coarse confidence band derived from the same thresholds, carried in the
/// debug trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBand {
    High,
    Medium,
    Low,
}

/// Gate thresholds. Invariant: `answer > clarify`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GateThresholds {
    /// Top score at or above this proceeds to the decision engine.
    pub answer: f32,
    /// Top score at or above this (but below `answer`) asks to clarify;
    /// anything lower escalates.
    pub clarify: f32,
}

impl Default for GateThresholds {
    fn default() -> Self {
        Self {
            answer: 0.40,
            clarify: 0.20,
        }
    }
}

/// Verdict produced for one request. Never persisted; recomputed per request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceVerdict {
    /// Reranked top score; `-inf` when retrieval came back empty.
    pub top_score: f32,
    pub branch: GateBranch,
    pub band: ConfidenceBand,
}

/// Thresholds the reranked top score into a pipeline branch.
#[derive(Debug, Clone, Default)]
pub struct ConfidenceGate {
    thresholds: GateThresholds,
}

impl ConfidenceGate {
    pub fn new(thresholds: GateThresholds) -> Self {
        Self { thresholds }
    }

    /// Assess a reranked evidence sequence.
    ///
    /// An empty sequence yields the minimum score and therefore always
    /// escalates.
    pub fn assess(&self, ranked: &[RankedEvidence]) -> ConfidenceVerdict {
        let score = top_score(ranked);
        let branch = if score >= self.thresholds.answer {
            GateBranch::Proceed
        } else if score >= self.thresholds.clarify {
            GateBranch::Clarify
        } else {
            GateBranch::Escalate
        };
        let band = match branch {
            GateBranch::Proceed => ConfidenceBand::High,
            GateBranch::Clarify => ConfidenceBand::Medium,
            GateBranch::Escalate => ConfidenceBand::Low,
        };

        tracing::debug!(top_score = score, branch = %branch, "confidence gate");

        ConfidenceVerdict {
            top_score: score,
            branch,
            band,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::{ChunkMetadata, EvidenceChunk};

    fn ranked(score: f32) -> Vec<RankedEvidence> {
        vec![RankedEvidence {
            chunk: EvidenceChunk {
                id: "c1".to_string(),
                text: "some policy".to_string(),
                metadata: ChunkMetadata::default(),
                embedding_score: 0.99,
            },
            relevance_score: score,
        }]
    }

    #[test]
    fn test_empty_evidence_escalates() {
        let verdict = ConfidenceGate::default().assess(&[]);
        assert_eq!(verdict.branch, GateBranch::Escalate);
        assert_eq!(verdict.top_score, f32::NEG_INFINITY);
    }

    #[test]
    fn test_low_score_escalates() {
        // 0.07 with clarify=0.2, answer=0.4
        let verdict = ConfidenceGate::default().assess(&ranked(0.07));
        assert_eq!(verdict.branch, GateBranch::Escalate);
        assert_eq!(verdict.band, ConfidenceBand::Low);
    }

    #[test]
    fn test_mid_score_clarifies() {
        let verdict = ConfidenceGate::default().assess(&ranked(0.30));
        assert_eq!(verdict.branch, GateBranch::Clarify);
        assert_eq!(verdict.band, ConfidenceBand::Medium);
    }

    #[test]
    fn test_high_score_proceeds() {
        // 0.41 >= answer threshold 0.40
        let verdict = ConfidenceGate::default().assess(&ranked(0.41));
        assert_eq!(verdict.branch, GateBranch::Proceed);
        assert_eq!(verdict.band, ConfidenceBand::High);
    }

    #[test]
    fn test_threshold_boundaries_are_inclusive() {
        let gate = ConfidenceGate::default();
        assert_eq!(gate.assess(&ranked(0.40)).branch, GateBranch::Proceed);
        assert_eq!(gate.assess(&ranked(0.20)).branch, GateBranch::Clarify);
        assert_eq!(
            gate.assess(&ranked(0.19999)).branch,
            GateBranch::Escalate
        );
    }

    #[test]
    fn test_gate_reads_rerank_score_not_embedding_score() {
        // embedding_score is high but relevance is poor — must escalate
        let verdict = ConfidenceGate::default().assess(&ranked(0.05));
        assert_eq!(verdict.branch, GateBranch::Escalate);
    }

    #[test]
    fn test_custom_thresholds() {
        let gate = ConfidenceGate::new(GateThresholds {
            answer: 0.8,
            clarify: 0.5,
        });
        assert_eq!(gate.assess(&ranked(0.7)).branch, GateBranch::Clarify);
        assert_eq!(gate.assess(&ranked(0.85)).branch, GateBranch::Proceed);
    }
}

//! Rule evaluation — slots in, decision out.
//!
//! Evidence is passed in solely so the result can reference supporting
//! chunk ids; the rule choice never reads chunk text. Unmapped slot
//! combinations resolve to an explicit no-rule-matched outcome that the
//! composer turns into an escalation, never a silent default.

use serde::{Deserialize, Serialize};

use crate::decision::rules::{Eligibility, RuleTable};
use crate::evidence::RankedEvidence;
use crate::slots::{DisputeSlots, DisputeType};

/// How many evidence chunks a decision cites at most.
const DEFAULT_CITE_LIMIT: usize = 4;

/// The outcome of evaluating the rule table for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionResult {
    /// Id of the matched rule.
    pub rule_id: String,
    pub eligibility: Eligibility,
    /// Situation analysis for the generation backend.
    pub guidance: String,
    /// Next actions surfaced to the passenger.
    pub next_steps: Vec<String>,
    /// Follow-up signals that warrant escalation.
    pub escalate_if: Vec<String>,
    /// Ids into the request's ranked evidence supporting the decision.
    pub rationale_refs: Vec<String>,
}

/// Evaluation result: either a decision or an explicit coverage gap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RuleEvaluation {
    Decided(DecisionResult),
    NoRuleMatched { dispute_type: DisputeType },
}

/// Evaluates the rule table against extracted slots.
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    table: RuleTable,
    cite_limit: usize,
}

impl DecisionEngine {
    pub fn new(table: RuleTable) -> Self {
        Self {
            table,
            cite_limit: DEFAULT_CITE_LIMIT,
        }
    }

    pub fn with_cite_limit(mut self, limit: usize) -> Self {
        self.cite_limit = limit;
        self
    }

    /// Evaluate the table for the given slots.
    ///
    /// Rule choice depends only on `slots`; `evidence` contributes nothing
    /// but the chunk ids used as rationale references (do-not-cite chunks
    /// are skipped).
    pub fn evaluate(&self, slots: &DisputeSlots, evidence: &[RankedEvidence]) -> RuleEvaluation {
        let Some(rule) = self.table.find(slots) else {
            tracing::warn!(
                dispute_type = %slots.dispute_type,
                "no policy rule matched — forcing escalation"
            );
            return RuleEvaluation::NoRuleMatched {
                dispute_type: slots.dispute_type,
            };
        };

        let rationale_refs: Vec<String> = evidence
            .iter()
            .filter(|r| !r.chunk.metadata.do_not_cite)
            .take(self.cite_limit)
            .map(|r| r.chunk.id.clone())
            .collect();

        tracing::debug!(rule = %rule.id, eligibility = %rule.eligibility, "rule matched");

        RuleEvaluation::Decided(DecisionResult {
            rule_id: rule.id.clone(),
            eligibility: rule.eligibility,
            guidance: rule.guidance.clone(),
            next_steps: rule.next_steps.clone(),
            escalate_if: rule.escalate_if.clone(),
            rationale_refs,
        })
    }
}

impl Default for DecisionEngine {
    fn default() -> Self {
        Self::new(RuleTable::builtin())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::{ChunkMetadata, EvidenceChunk};
    use crate::slots::TriState;

    fn ranked(id: &str, score: f32, do_not_cite: bool) -> RankedEvidence {
        RankedEvidence {
            chunk: EvidenceChunk {
                id: id.to_string(),
                text: format!("text {id}"),
                metadata: ChunkMetadata {
                    do_not_cite,
                    ..Default::default()
                },
                embedding_score: 0.5,
            },
            relevance_score: score,
        }
    }

    fn cancelled_slots() -> DisputeSlots {
        let mut slots = DisputeSlots::unknown(DisputeType::Refund);
        slots.airline = Some("Delta Airlines".to_string());
        slots.airline_cancelled = TriState::Yes;
        slots
    }

    #[test]
    fn test_engine_is_pure_over_evidence_content() {
        let engine = DecisionEngine::default();
        let slots = cancelled_slots();

        let a = engine.evaluate(&slots, &[ranked("c1", 0.9, false)]);
        let mut other = ranked("c1", 0.9, false);
        other.chunk.text = "completely different policy text".to_string();
        let b = engine.evaluate(&slots, &[other]);

        assert_eq!(a, b);
    }

    #[test]
    fn test_identical_slots_identical_decision() {
        let engine = DecisionEngine::default();
        let slots = cancelled_slots();
        assert_eq!(engine.evaluate(&slots, &[]), engine.evaluate(&slots.clone(), &[]));
    }

    #[test]
    fn test_rationale_refs_come_from_evidence_ids() {
        let engine = DecisionEngine::default();
        let evidence = vec![
            ranked("top", 0.9, false),
            ranked("meta", 0.8, true),
            ranked("second", 0.7, false),
        ];
        let RuleEvaluation::Decided(result) = engine.evaluate(&cancelled_slots(), &evidence)
        else {
            panic!("expected a decision");
        };
        assert_eq!(result.rationale_refs, vec!["top", "second"]);
    }

    #[test]
    fn test_cite_limit_caps_refs() {
        let engine = DecisionEngine::default().with_cite_limit(1);
        let evidence = vec![ranked("a", 0.9, false), ranked("b", 0.8, false)];
        let RuleEvaluation::Decided(result) = engine.evaluate(&cancelled_slots(), &evidence)
        else {
            panic!("expected a decision");
        };
        assert_eq!(result.rationale_refs, vec!["a"]);
    }

    #[test]
    fn test_unmapped_combination_is_explicit() {
        let engine = DecisionEngine::default();
        let slots = DisputeSlots::unknown(DisputeType::Legal);
        assert_eq!(
            engine.evaluate(&slots, &[ranked("c1", 0.95, false)]),
            RuleEvaluation::NoRuleMatched {
                dispute_type: DisputeType::Legal
            }
        );
    }
}

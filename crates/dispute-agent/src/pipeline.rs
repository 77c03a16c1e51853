//! The dispute pipeline — one stateless run per request.
//!
//! Stage order, evaluated as ordered guards:
//!
//! 1. missing required slots → CLARIFY (retrieval skipped)
//! 2. legal/complex dispute → ESCALATE (out of policy scope)
//! 3. retrieve + rerank → confidence gate → ESCALATE / CLARIFY on weak
//!    evidence
//! 4. decision engine → ESCALATE on no-rule-matched, otherwise ANSWER with
//!    citations and generated prose
//!
//! Collaborator failures never escape: every exit path returns a
//! well-formed `ResponsePayload`, with generation errors and timeouts
//! degraded to escalations carrying a typed reason.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use triage::{
    build_retrieval_query, top_score, Citation, ConfidenceGate, DebugTrace, DecisionEngine,
    DecisionResult, DisputeSlots, DisputeType, EscalationReason, EscalationSummary,
    EvidenceDigest, GateBranch, RankedEvidence, ResponsePayload, RuleEvaluation, SlotExtractor,
    SlotValidator, TriageConfig,
};

use crate::generation::{GenerationBackend, GenerationRequest, TokenStream};
use crate::retrieval::Retriever;

/// Evidence chunks included in the generation prompt.
const PROMPT_EVIDENCE_LIMIT: usize = 4;
/// Characters of each evidence snippet in the prompt.
const PROMPT_SNIPPET_CHARS: usize = 120;
/// Conversation turns included in the prompt transcript.
const PROMPT_TRANSCRIPT_TURNS: usize = 6;
/// Character cap on the slot-extraction context window.
const CONTEXT_MAX_CHARS: usize = 8000;

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One prior turn of the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

/// An inbound request: the current message plus optional history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            history: Vec::new(),
        }
    }
}

/// Output of a streaming run: terminal payloads come back whole, answer
/// payloads come back with the prose arriving on a token stream.
pub enum PipelineOutput {
    /// Clarify/escalate, or a non-streaming answer.
    Full(ResponsePayload),
    /// Answer head (mode/citations/debug already final) plus the token
    /// stream producing the prose.
    Streaming {
        head: ResponsePayload,
        tokens: TokenStream,
        cancel: CancellationToken,
    },
}

/// What the deterministic stages concluded before generation.
enum TriageOutcome {
    Terminal(Box<ResponsePayload>),
    ReadyToAnswer {
        decision: DecisionResult,
        ranked: Vec<RankedEvidence>,
        prompt: String,
        citations: Vec<Citation>,
        debug: DebugTrace,
    },
}

/// The full pipeline. One instance per process; every `handle` call is an
/// independent, stateless execution.
pub struct DisputePipeline {
    extractor: SlotExtractor,
    validator: SlotValidator,
    gate: ConfidenceGate,
    engine: DecisionEngine,
    retriever: Retriever,
    generator: Arc<dyn GenerationBackend>,
    generation_timeout: Duration,
    num_predict: u32,
    temperature: f32,
}

impl DisputePipeline {
    pub fn new(
        config: &TriageConfig,
        retriever: Retriever,
        generator: Arc<dyn GenerationBackend>,
        generation_timeout: Duration,
        num_predict: u32,
        temperature: f32,
    ) -> Self {
        Self {
            extractor: SlotExtractor::new(),
            validator: SlotValidator::new(config.required_slots.clone()),
            gate: ConfidenceGate::new(config.thresholds),
            engine: DecisionEngine::new(config.rules.clone()),
            retriever,
            generator,
            generation_timeout,
            num_predict,
            temperature,
        }
    }

    /// Warm the retrieval collaborators so the first request does not pay
    /// their cold-start cost.
    pub async fn warmup(&self) {
        self.retriever.warmup().await;
    }

    /// Handle a request to completion, generating the answer prose inline.
    #[instrument(skip_all, fields(msg_chars = request.message.len()))]
    pub async fn handle(&self, request: &ChatRequest) -> ResponsePayload {
        match self.triage(request).await {
            TriageOutcome::Terminal(payload) => *payload,
            TriageOutcome::ReadyToAnswer {
                decision,
                ranked,
                prompt,
                citations,
                mut debug,
            } => {
                let gen_request = GenerationRequest {
                    prompt,
                    num_predict: self.num_predict,
                    temperature: self.temperature,
                };
                match tokio::time::timeout(
                    self.generation_timeout,
                    self.generator.generate(&gen_request),
                )
                .await
                {
                    Ok(Ok(text)) => {
                        debug.used_generator = true;
                        info!(rule = %decision.rule_id, "answer generated");
                        ResponsePayload::answer(
                            text,
                            citations,
                            decision.next_steps.clone(),
                            debug,
                        )
                    }
                    Ok(Err(e)) => {
                        warn!(error = %e, "generation failed — degrading to escalation");
                        debug.generator_error = Some(e.to_string());
                        let slots = debug.slots.clone().unwrap_or_else(|| {
                            DisputeSlots::unknown(DisputeType::Unknown)
                        });
                        ResponsePayload::escalate(
                            summary(
                                EscalationReason::GenerationFailed {
                                    detail: e.to_string(),
                                },
                                slots,
                                &ranked,
                            ),
                            debug,
                        )
                    }
                    Err(_) => {
                        let secs = self.generation_timeout.as_secs();
                        warn!(timeout_secs = secs, "generation timed out — degrading to escalation");
                        debug.generator_error = Some(format!("timed out after {secs}s"));
                        let slots = debug.slots.clone().unwrap_or_else(|| {
                            DisputeSlots::unknown(DisputeType::Unknown)
                        });
                        ResponsePayload::escalate(
                            summary(
                                EscalationReason::GenerationTimeout { timeout_secs: secs },
                                slots,
                                &ranked,
                            ),
                            debug,
                        )
                    }
                }
            }
        }
    }

    /// Handle a request, streaming the answer prose when one is produced.
    /// The decision is final before the stream starts; consumers may cancel
    /// it without affecting the payload head.
    pub async fn handle_stream(&self, request: &ChatRequest) -> PipelineOutput {
        match self.triage(request).await {
            TriageOutcome::Terminal(payload) => PipelineOutput::Full(*payload),
            TriageOutcome::ReadyToAnswer {
                decision,
                ranked,
                prompt,
                citations,
                mut debug,
            } => {
                let gen_request = GenerationRequest {
                    prompt,
                    num_predict: self.num_predict,
                    temperature: self.temperature,
                };
                let cancel = CancellationToken::new();
                match self
                    .generator
                    .generate_stream(&gen_request, cancel.clone())
                    .await
                {
                    Ok(tokens) => {
                        debug.used_generator = true;
                        let mut head = ResponsePayload::answer(
                            String::new(),
                            citations,
                            decision.next_steps.clone(),
                            debug,
                        );
                        // Prose arrives on the stream.
                        head.answer = None;
                        PipelineOutput::Streaming {
                            head,
                            tokens,
                            cancel,
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "stream start failed — degrading to escalation");
                        debug.generator_error = Some(e.to_string());
                        let slots = debug.slots.clone().unwrap_or_else(|| {
                            DisputeSlots::unknown(DisputeType::Unknown)
                        });
                        PipelineOutput::Full(ResponsePayload::escalate(
                            summary(
                                EscalationReason::GenerationFailed {
                                    detail: e.to_string(),
                                },
                                slots,
                                &ranked,
                            ),
                            debug,
                        ))
                    }
                }
            }
        }
    }

    /// All deterministic stages up to (but not including) generation.
    async fn triage(&self, request: &ChatRequest) -> TriageOutcome {
        let context = relevant_context(request, &self.extractor);
        let slots = self.extractor.extract(&context);

        let mut debug = DebugTrace {
            slots: Some(slots.clone()),
            ..Default::default()
        };

        // 1. Missing required slots → clarify, retrieval skipped.
        let missing = self.validator.missing(&slots);
        if !missing.is_empty() {
            debug.missing_slots = missing.clone();
            let questions = self.validator.questions(&slots, &missing);
            info!(missing = missing.len(), "clarifying — required slots missing");
            return TriageOutcome::Terminal(Box::new(ResponsePayload::clarify(questions, debug)));
        }

        // 2. Legal/complex disputes are out of policy scope; no rule may
        // decide them and evidence cannot change that, so escalate before
        // retrieval.
        if slots.dispute_type == DisputeType::Legal {
            info!("escalating — legal dispute out of policy scope");
            return TriageOutcome::Terminal(Box::new(ResponsePayload::escalate(
                summary(EscalationReason::OutOfPolicyScope, slots, &[]),
                debug,
            )));
        }

        // 3. Retrieve + rerank, then gate on the reranked top score.
        let query = build_retrieval_query(&request.message, &slots);
        debug.query = Some(query.clone());

        let outcome = match self.retriever.search(&query, slots.airline.as_deref()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "retrieval failed — degrading to escalation");
                return TriageOutcome::Terminal(Box::new(ResponsePayload::escalate(
                    summary(
                        EscalationReason::RetrievalFailed {
                            detail: e.to_string(),
                        },
                        slots,
                        &[],
                    ),
                    debug,
                )));
            }
        };
        let ranked = outcome.ranked;
        debug.airline_filter = outcome.filter_used;

        let verdict = self.gate.assess(&ranked);
        debug.top_score = ranked.first().map(|_| verdict.top_score);
        debug.confidence_band = Some(verdict.band);

        match verdict.branch {
            GateBranch::Escalate => {
                let reason = if ranked.is_empty() {
                    EscalationReason::EmptyRetrieval
                } else {
                    EscalationReason::LowConfidence {
                        top_score: verdict.top_score,
                    }
                };
                info!(reason = %reason, "escalating — confidence gate");
                return TriageOutcome::Terminal(Box::new(ResponsePayload::escalate(
                    summary(reason, slots, &ranked),
                    debug,
                )));
            }
            GateBranch::Clarify => {
                info!(top_score = verdict.top_score, "clarifying — weak evidence");
                return TriageOutcome::Terminal(Box::new(ResponsePayload::clarify(
                    vec![
                        "I couldn't find a strong policy match. Can you share more detail \
                         about what happened (who cancelled, when, and what the airline \
                         told you)?"
                            .to_string(),
                    ],
                    debug,
                )));
            }
            GateBranch::Proceed => {}
        }

        // 4. Deterministic decision; evidence contributes citations only.
        let decision = match self.engine.evaluate(&slots, &ranked) {
            RuleEvaluation::Decided(decision) => decision,
            RuleEvaluation::NoRuleMatched { dispute_type } => {
                return TriageOutcome::Terminal(Box::new(ResponsePayload::escalate(
                    summary(
                        EscalationReason::NoRuleMatched { dispute_type },
                        slots,
                        &ranked,
                    ),
                    debug,
                )));
            }
        };
        debug.decision = Some(decision.clone());

        let citations: Vec<Citation> = decision
            .rationale_refs
            .iter()
            .filter_map(|id| ranked.iter().find(|r| &r.chunk.id == id))
            .map(Citation::from_ranked)
            .collect();

        // A decision with nothing citable cannot produce a grounded answer.
        if citations.is_empty() {
            warn!(rule = %decision.rule_id, "no citable evidence — escalating");
            return TriageOutcome::Terminal(Box::new(ResponsePayload::escalate(
                summary(
                    EscalationReason::LowConfidence {
                        top_score: top_score(&ranked),
                    },
                    slots,
                    &ranked,
                ),
                debug,
            )));
        }

        let prompt = build_prompt(&request.message, &slots, &decision, &ranked, &request.history);

        TriageOutcome::ReadyToAnswer {
            decision,
            ranked,
            prompt,
            citations,
            debug,
        }
    }
}

fn summary(
    reason: EscalationReason,
    slots: DisputeSlots,
    ranked: &[RankedEvidence],
) -> EscalationSummary {
    EscalationSummary {
        reason,
        slots,
        evidence: ranked.iter().map(EvidenceDigest::from_ranked).collect(),
    }
}

/// Assemble the slot-extraction context from recent user turns plus the
/// current message. A topic change truncates the usable history so a new
/// dispute does not inherit stale slots.
fn relevant_context(request: &ChatRequest, extractor: &SlotExtractor) -> String {
    let user_history: Vec<&str> = request
        .history
        .iter()
        .filter(|t| t.role == Role::User && !t.content.is_empty())
        .map(|t| t.content.as_str())
        .collect();

    let usable: &[&str] = if is_new_issue(&request.message, &user_history, extractor) {
        let keep = user_history.len().min(2);
        &user_history[user_history.len() - keep..]
    } else {
        &user_history
    };

    let mut full = usable.to_vec();
    full.push(&request.message);
    let joined = full.join(" ");

    if joined.chars().count() > CONTEXT_MAX_CHARS {
        let tail: String = joined
            .chars()
            .skip(joined.chars().count() - CONTEXT_MAX_CHARS)
            .collect();
        format!("...{tail}")
    } else {
        joined
    }
}

const NEW_ISSUE_MARKERS: &[&str] = &[
    "new issue",
    "new problem",
    "different problem",
    "different issue",
    "change topic",
    "another question",
    "separate issue",
    "unrelated",
    "by the way",
    "also i have",
    "now about",
];

fn is_new_issue(message: &str, user_history: &[&str], extractor: &SlotExtractor) -> bool {
    if user_history.is_empty() {
        return true;
    }
    let msg = message.trim().to_lowercase();
    if NEW_ISSUE_MARKERS.iter().any(|m| msg.contains(m)) {
        return true;
    }
    // Switching airlines mid-conversation signals a new dispute.
    if let Some(current) = extractor.detect_airline(message) {
        if let Some(previous) = extractor.detect_airline(&user_history.join(" ")) {
            if !current.eq_ignore_ascii_case(&previous) {
                return true;
            }
        }
    }
    false
}

/// One-line slot summary for the prompt, unknown fields omitted.
fn slot_summary(slots: &DisputeSlots) -> String {
    let mut parts = vec![format!("case={}", slots.dispute_type)];
    if let Some(airline) = slots.airline.as_deref() {
        parts.push(format!("airline={airline}"));
    }
    if !slots.airline_cancelled.is_unknown() {
        parts.push(format!("airline_cancelled={}", slots.airline_cancelled));
    }
    if !slots.weather_related.is_unknown() {
        parts.push(format!("weather_related={}", slots.weather_related));
    }
    if slots.fare_class != triage::FareClass::Unknown {
        parts.push(format!("fare_class={}", slots.fare_class));
    }
    if slots.baggage_status != triage::BaggageStatus::Unknown {
        parts.push(format!("baggage_status={}", slots.baggage_status));
    }
    parts.join(", ")
}

/// Build the grounding prompt for the generation backend: slots, decision,
/// and evidence. The generator may not introduce policy claims absent from
/// this context.
fn build_prompt(
    user_msg: &str,
    slots: &DisputeSlots,
    decision: &DecisionResult,
    ranked: &[RankedEvidence],
    history: &[ChatTurn],
) -> String {
    let mut evidence_lines = Vec::new();
    for (i, r) in ranked.iter().take(PROMPT_EVIDENCE_LIMIT).enumerate() {
        let meta = &r.chunk.metadata;
        let snippet: String = r.chunk.text.trim().chars().take(PROMPT_SNIPPET_CHARS).collect();
        evidence_lines.push(format!(
            "[{}] {} {}:\n{}",
            i + 1,
            meta.airline,
            meta.domain,
            snippet
        ));
    }

    let transcript: Vec<String> = history
        .iter()
        .rev()
        .take(PROMPT_TRANSCRIPT_TURNS)
        .rev()
        .map(|t| {
            let role = match t.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            format!("{role}: {}", t.content)
        })
        .collect();

    format!(
        "You are an expert airline dispute assistant. Interpret policies and \
         explain what they mean for this passenger.\n\n\
         CURRENT QUESTION: \"{user_msg}\"\n\n\
         CONVERSATION:\n{transcript}\n\n\
         KNOWN CASE DETAILS: {details}\n\n\
         SITUATION ANALYSIS:\n{situation}\n\n\
         POLICY EVIDENCE:\n{evidence}\n\n\
         INSTRUCTIONS:\n\
         - Give 2-3 concrete next steps and why\n\
         - Cite evidence like [1][2]\n\
         - Be conversational (4-6 sentences)\n\
         - Only make policy claims supported by the evidence above\n\
         - Don't ask for info already known\n\n\
         Answer:",
        transcript = transcript.join("\n"),
        details = slot_summary(slots),
        situation = decision.guidance,
        evidence = evidence_lines.join("\n"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use triage::{ChunkMetadata, Eligibility, EvidenceChunk};

    fn extractor() -> SlotExtractor {
        SlotExtractor::new()
    }

    fn user(content: &str) -> ChatTurn {
        ChatTurn {
            role: Role::User,
            content: content.to_string(),
        }
    }

    #[test]
    fn test_new_issue_on_topic_marker() {
        let ex = extractor();
        assert!(is_new_issue(
            "by the way, my bag is lost",
            &["delta cancelled my flight"],
            &ex
        ));
    }

    #[test]
    fn test_new_issue_on_airline_switch() {
        let ex = extractor();
        assert!(is_new_issue(
            "now united lost my bag",
            &["delta cancelled my flight"],
            &ex
        ));
        assert!(!is_new_issue(
            "delta still hasn't refunded me",
            &["delta cancelled my flight"],
            &ex
        ));
    }

    #[test]
    fn test_relevant_context_keeps_history_on_same_issue() {
        let request = ChatRequest {
            message: "it was basic economy".to_string(),
            history: vec![user("delta cancelled my flight"), user("i want a refund")],
        };
        let context = relevant_context(&request, &extractor());
        assert!(context.contains("delta cancelled my flight"));
        assert!(context.ends_with("it was basic economy"));
    }

    #[test]
    fn test_prompt_contains_grounding_context() {
        let decision = DecisionResult {
            rule_id: "involuntary_cancellation".to_string(),
            eligibility: Eligibility::Eligible,
            guidance: "Airline-initiated cancellation.".to_string(),
            next_steps: vec![],
            escalate_if: vec![],
            rationale_refs: vec!["c1".to_string()],
        };
        let ranked = vec![RankedEvidence {
            chunk: EvidenceChunk {
                id: "c1".to_string(),
                text: "Refunds are owed when the carrier cancels.".to_string(),
                metadata: ChunkMetadata {
                    airline: "delta airlines".to_string(),
                    domain: "REFUNDS".to_string(),
                    ..Default::default()
                },
                embedding_score: 0.9,
            },
            relevance_score: 0.8,
        }];
        let mut slots = DisputeSlots::unknown(DisputeType::Refund);
        slots.airline = Some("Delta Airlines".to_string());
        let prompt = build_prompt("can I get a refund?", &slots, &decision, &ranked, &[]);
        assert!(prompt.contains("can I get a refund?"));
        assert!(prompt.contains("airline=Delta Airlines"));
        assert!(prompt.contains("Airline-initiated cancellation."));
        assert!(prompt.contains("[1] delta airlines REFUNDS"));
    }

    #[test]
    fn test_prompt_limits_evidence_and_snippets() {
        let decision = DecisionResult {
            rule_id: "r".to_string(),
            eligibility: Eligibility::Eligible,
            guidance: String::new(),
            next_steps: vec![],
            escalate_if: vec![],
            rationale_refs: vec![],
        };
        let ranked: Vec<RankedEvidence> = (0..6)
            .map(|i| RankedEvidence {
                chunk: EvidenceChunk {
                    id: format!("c{i}"),
                    text: "y".repeat(500),
                    metadata: ChunkMetadata::default(),
                    embedding_score: 0.0,
                },
                relevance_score: 0.5,
            })
            .collect();
        let prompt = build_prompt(
            "q",
            &DisputeSlots::unknown(DisputeType::Refund),
            &decision,
            &ranked,
            &[],
        );
        assert!(prompt.contains("[4]"));
        assert!(!prompt.contains("[5]"));
    }
}

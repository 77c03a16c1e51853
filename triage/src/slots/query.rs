//! Retrieval-query enrichment from known slots.
//!
//! The raw user message is expanded with case- and slot-conditional policy
//! vocabulary so dense retrieval lands on the right policy sections.

use crate::slots::{DisputeSlots, DisputeType, TriState};

/// Build the enriched retrieval query for a request.
pub fn build_retrieval_query(user_msg: &str, slots: &DisputeSlots) -> String {
    let mut parts: Vec<&str> = vec![user_msg];

    match slots.dispute_type {
        DisputeType::Refund | DisputeType::Unknown => {
            parts.extend(["refund", "cancellation", "refund policy"]);
            if let Some(airline) = slots.airline.as_deref() {
                parts.push(airline);
            }
            match slots.airline_cancelled {
                TriState::Yes => {
                    parts.extend(["airline cancelled", "involuntary cancellation", "cash refund"])
                }
                TriState::No => {
                    parts.extend(["voluntary cancellation", "travel credit", "non-refundable"])
                }
                TriState::Unknown => {}
            }
            if slots.schedule_change == TriState::Yes {
                parts.extend(["significant schedule change", "delay", "reroute"]);
            }
            if slots.weather_related == TriState::Yes {
                parts.extend(["weather", "travel waiver"]);
            }
        }
        DisputeType::Baggage => {
            parts.extend(["baggage", "lost", "delayed", "damaged", "compensation", "claim"]);
            if let Some(airline) = slots.airline.as_deref() {
                parts.push(airline);
            }
        }
        DisputeType::Legal => {
            parts.extend(["complaint", "consumer rights", "dot"]);
        }
    }

    parts
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

//! Missing-slot detection against a per-dispute-type required-slot table.
//!
//! The table is data, not code: it deserializes from config so operators can
//! change which slots block retrieval without touching the pipeline. The
//! validator reports missing slots in table (priority) order; callers
//! surface at most [`MAX_CLARIFYING_QUESTIONS`] of them per response.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::slots::{DisputeSlots, DisputeType, SlotId};

/// Upper bound on clarifying questions surfaced in a single response.
pub const MAX_CLARIFYING_QUESTIONS: usize = 2;

/// Required slots per dispute type, in priority order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequiredSlotTable {
    required: BTreeMap<DisputeType, Vec<SlotId>>,
}

impl RequiredSlotTable {
    /// Built-in defaults: cancellation disputes need the airline and who
    /// cancelled; baggage disputes need the airline and the bag status;
    /// legal disputes block on nothing (they escalate regardless).
    pub fn builtin() -> Self {
        let mut required = BTreeMap::new();
        required.insert(
            DisputeType::Refund,
            vec![SlotId::Airline, SlotId::AirlineCancelled],
        );
        required.insert(
            DisputeType::Baggage,
            vec![SlotId::Airline, SlotId::BaggageStatus],
        );
        required.insert(DisputeType::Legal, vec![]);
        required.insert(DisputeType::Unknown, vec![SlotId::Airline]);
        Self { required }
    }

    /// Required slots for a dispute type. An unconfigured type falls back
    /// to the airline-first check used for unknown disputes.
    pub fn for_type(&self, dispute_type: DisputeType) -> &[SlotId] {
        self.required
            .get(&dispute_type)
            .or_else(|| self.required.get(&DisputeType::Unknown))
            .map(Vec::as_slice)
            .unwrap_or(&[SlotId::Airline])
    }
}

impl Default for RequiredSlotTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Determines which required slots are still missing for a request.
#[derive(Debug, Clone, Default)]
pub struct SlotValidator {
    table: RequiredSlotTable,
}

impl SlotValidator {
    pub fn new(table: RequiredSlotTable) -> Self {
        Self { table }
    }

    /// Missing required slots in priority order. Empty when retrieval can
    /// proceed. The caller truncates to [`MAX_CLARIFYING_QUESTIONS`].
    pub fn missing(&self, slots: &DisputeSlots) -> Vec<SlotId> {
        self.table
            .for_type(slots.dispute_type)
            .iter()
            .copied()
            .filter(|slot| slots.is_missing(*slot))
            .collect()
    }

    /// The clarifying question to ask for a missing slot.
    pub fn question_for(&self, slot: SlotId, dispute_type: DisputeType) -> String {
        match slot {
            SlotId::Airline => "Which airline is this for?".to_string(),
            SlotId::AirlineCancelled => {
                "Did the airline cancel or significantly change your flight, \
                 or are you looking to cancel it yourself?"
                    .to_string()
            }
            SlotId::BaggageStatus => "Is your baggage delayed, lost, or damaged?".to_string(),
            SlotId::FareClass => {
                "Was your ticket refundable, non-refundable, or Basic Economy?".to_string()
            }
            SlotId::TravelDate => match dispute_type {
                DisputeType::Baggage => "When did you land?".to_string(),
                _ => "What was the travel date?".to_string(),
            },
        }
    }

    /// Questions for the highest-priority missing slots, capped at
    /// [`MAX_CLARIFYING_QUESTIONS`].
    pub fn questions(&self, slots: &DisputeSlots, missing: &[SlotId]) -> Vec<String> {
        missing
            .iter()
            .take(MAX_CLARIFYING_QUESTIONS)
            .map(|slot| self.question_for(*slot, slots.dispute_type))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slots::{BaggageStatus, TriState};

    #[test]
    fn test_refund_missing_airline_first() {
        let validator = SlotValidator::default();
        let slots = DisputeSlots::unknown(DisputeType::Refund);
        let missing = validator.missing(&slots);
        assert_eq!(missing, vec![SlotId::Airline, SlotId::AirlineCancelled]);
    }

    #[test]
    fn test_refund_complete_slots_pass() {
        let validator = SlotValidator::default();
        let mut slots = DisputeSlots::unknown(DisputeType::Refund);
        slots.airline = Some("Delta Airlines".to_string());
        slots.airline_cancelled = TriState::Yes;
        assert!(validator.missing(&slots).is_empty());
    }

    #[test]
    fn test_baggage_requires_status() {
        let validator = SlotValidator::default();
        let mut slots = DisputeSlots::unknown(DisputeType::Baggage);
        slots.airline = Some("United Airlines".to_string());
        assert_eq!(validator.missing(&slots), vec![SlotId::BaggageStatus]);

        slots.baggage_status = BaggageStatus::Delayed;
        assert!(validator.missing(&slots).is_empty());
    }

    #[test]
    fn test_unknown_type_checks_airline_first() {
        let validator = SlotValidator::default();
        let slots = DisputeSlots::unknown(DisputeType::Unknown);
        assert_eq!(validator.missing(&slots), vec![SlotId::Airline]);
    }

    #[test]
    fn test_legal_requires_nothing() {
        let validator = SlotValidator::default();
        let slots = DisputeSlots::unknown(DisputeType::Legal);
        assert!(validator.missing(&slots).is_empty());
    }

    #[test]
    fn test_questions_capped_at_two() {
        let validator = SlotValidator::new(RequiredSlotTable {
            required: [(
                DisputeType::Refund,
                vec![
                    SlotId::Airline,
                    SlotId::AirlineCancelled,
                    SlotId::FareClass,
                    SlotId::TravelDate,
                ],
            )]
            .into_iter()
            .collect(),
        });
        let slots = DisputeSlots::unknown(DisputeType::Refund);
        let missing = validator.missing(&slots);
        assert_eq!(missing.len(), 4);

        let questions = validator.questions(&slots, &missing);
        assert_eq!(questions.len(), MAX_CLARIFYING_QUESTIONS);
        assert!(questions[0].contains("Which airline"));
    }

    #[test]
    fn test_table_deserializes_from_toml() {
        let table: RequiredSlotTable = toml::from_str(
            r#"
            refund = ["airline"]
            baggage = ["airline", "baggage_status"]
            "#,
        )
        .unwrap();
        assert_eq!(table.for_type(DisputeType::Refund), &[SlotId::Airline]);
        // Types absent from the override fall back to airline-first
        assert_eq!(table.for_type(DisputeType::Legal), &[SlotId::Airline]);
    }
}

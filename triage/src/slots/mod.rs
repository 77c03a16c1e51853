//! Dispute slot model — structured attributes extracted from free text.
//!
//! A `DisputeSlots` value is produced once per request by the extractor and
//! never mutated afterwards; downstream stages only read it. Every field has
//! an explicit unknown state so missing-information checks are uniform.

pub mod extractor;
pub mod query;
pub mod validator;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Category of dispute the request is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeType {
    /// Refund / cancellation / schedule-change disputes.
    Refund,
    /// Lost, delayed, or damaged baggage.
    Baggage,
    /// Lawsuit / fraud / regulator-complaint language — out of policy scope.
    Legal,
    /// Could not be classified from the input.
    Unknown,
}

impl std::fmt::Display for DisputeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Refund => write!(f, "refund"),
            Self::Baggage => write!(f, "baggage"),
            Self::Legal => write!(f, "legal"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Yes/no slot with an explicit unknown state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TriState {
    Yes,
    No,
    #[default]
    Unknown,
}

impl TriState {
    pub fn is_unknown(self) -> bool {
        self == Self::Unknown
    }
}

impl std::fmt::Display for TriState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Yes => write!(f, "yes"),
            Self::No => write!(f, "no"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Status of a baggage dispute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BaggageStatus {
    Lost,
    Delayed,
    Damaged,
    #[default]
    Unknown,
}

impl std::fmt::Display for BaggageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lost => write!(f, "lost"),
            Self::Delayed => write!(f, "delayed"),
            Self::Damaged => write!(f, "damaged"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Fare class of the ticket, as far as the text reveals it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FareClass {
    Refundable,
    NonRefundable,
    BasicEconomy,
    #[default]
    Unknown,
}

impl std::fmt::Display for FareClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Refundable => write!(f, "refundable"),
            Self::NonRefundable => write!(f, "non_refundable"),
            Self::BasicEconomy => write!(f, "basic_economy"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Identifier for a single slot, used by the validator's required-slot table
/// and in clarify responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotId {
    Airline,
    AirlineCancelled,
    BaggageStatus,
    FareClass,
    TravelDate,
}

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Airline => write!(f, "airline"),
            Self::AirlineCancelled => write!(f, "airline_cancelled"),
            Self::BaggageStatus => write!(f, "baggage_status"),
            Self::FareClass => write!(f, "fare_class"),
            Self::TravelDate => write!(f, "travel_date"),
        }
    }
}

/// Structured dispute attributes for one request.
///
/// Produced by [`extractor::SlotExtractor::extract`]; immutable per request.
/// Fields that the text did not resolve carry their unknown state rather
/// than being omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisputeSlots {
    pub dispute_type: DisputeType,
    /// Canonical airline name, `None` when not detected.
    pub airline: Option<String>,
    /// Whether the airline (vs the passenger) cancelled the flight.
    pub airline_cancelled: TriState,
    /// Significant airline-initiated schedule change.
    pub schedule_change: TriState,
    /// Disruption caused by weather.
    pub weather_related: TriState,
    /// A travel waiver / advisory is active.
    pub travel_waiver_active: TriState,
    pub fare_class: FareClass,
    /// The airline refused a refund the passenger believes they are owed.
    pub refund_denied: TriState,
    /// The airline offers only credit/voucher instead of cash.
    pub cash_refund_refused: TriState,
    pub baggage_status: BaggageStatus,
    /// A baggage claim / PIR has been filed.
    pub baggage_report_filed: TriState,
    pub travel_date: Option<NaiveDate>,
}

impl DisputeSlots {
    /// All-unknown slots for the given dispute type.
    pub fn unknown(dispute_type: DisputeType) -> Self {
        Self {
            dispute_type,
            airline: None,
            airline_cancelled: TriState::Unknown,
            schedule_change: TriState::Unknown,
            weather_related: TriState::Unknown,
            travel_waiver_active: TriState::Unknown,
            fare_class: FareClass::Unknown,
            refund_denied: TriState::Unknown,
            cash_refund_refused: TriState::Unknown,
            baggage_status: BaggageStatus::Unknown,
            baggage_report_filed: TriState::Unknown,
            travel_date: None,
        }
    }

    /// Whether the named slot is still unresolved.
    pub fn is_missing(&self, slot: SlotId) -> bool {
        match slot {
            SlotId::Airline => self.airline.is_none(),
            SlotId::AirlineCancelled => self.airline_cancelled.is_unknown(),
            SlotId::BaggageStatus => self.baggage_status == BaggageStatus::Unknown,
            SlotId::FareClass => self.fare_class == FareClass::Unknown,
            SlotId::TravelDate => self.travel_date.is_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_slots_are_all_missing() {
        let slots = DisputeSlots::unknown(DisputeType::Refund);
        for slot in [
            SlotId::Airline,
            SlotId::AirlineCancelled,
            SlotId::BaggageStatus,
            SlotId::FareClass,
            SlotId::TravelDate,
        ] {
            assert!(slots.is_missing(slot), "{slot} should be missing");
        }
    }

    #[test]
    fn test_slot_serde_snake_case() {
        assert_eq!(
            serde_json::to_string(&DisputeType::Refund).unwrap(),
            "\"refund\""
        );
        assert_eq!(
            serde_json::to_string(&FareClass::BasicEconomy).unwrap(),
            "\"basic_economy\""
        );
        assert_eq!(serde_json::to_string(&TriState::Unknown).unwrap(), "\"unknown\"");
        assert_eq!(
            serde_json::to_string(&SlotId::AirlineCancelled).unwrap(),
            "\"airline_cancelled\""
        );
    }

    #[test]
    fn test_dispute_slots_roundtrip() {
        let mut slots = DisputeSlots::unknown(DisputeType::Baggage);
        slots.airline = Some("Delta Airlines".to_string());
        slots.baggage_status = BaggageStatus::Lost;

        let json = serde_json::to_string(&slots).unwrap();
        let parsed: DisputeSlots = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, slots);
    }
}

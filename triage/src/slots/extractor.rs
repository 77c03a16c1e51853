//! Slot extraction — keyword/pattern matching over normalized input text.
//!
//! Extraction is total and deterministic: the same text always yields the
//! same slots, empty or malformed input yields all-unknown slots, and no
//! external service is consulted.

use chrono::NaiveDate;
use regex::Regex;

use crate::slots::{BaggageStatus, DisputeSlots, DisputeType, FareClass, TriState};

/// Airline keyword → canonical name. Two-letter IATA codes are matched on
/// word boundaries so "aa" does not fire inside ordinary words.
const AIRLINE_KEYWORDS: &[(&str, &str)] = &[
    ("american", "American Airlines"),
    ("aa", "American Airlines"),
    ("delta", "Delta Airlines"),
    ("dl", "Delta Airlines"),
    ("united", "United Airlines"),
    ("ua", "United Airlines"),
    ("southwest", "Southwest Airlines"),
    ("jetblue", "JetBlue Airways"),
];

// Bare "bag"/"bags" is matched on word boundaries separately.
const BAGGAGE_MARKERS: &[&str] = &[
    "baggage",
    "luggage",
    "suitcase",
    "checked bag",
    "lost bag",
    "delayed bag",
    "damaged bag",
];

const REFUND_MARKERS: &[&str] = &[
    "refund",
    "cancel",
    "canceled",
    "cancelled",
    "rebook",
    "schedule change",
    "credit",
    "voucher",
];

fn norm(text: &str) -> String {
    text.trim().to_lowercase()
}

fn has_any(text: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| text.contains(p))
}

/// Deterministic keyword extractor for dispute slots.
///
/// Regexes are compiled once at construction; the extractor is cheap to
/// share across requests.
pub struct SlotExtractor {
    airline_codes: Vec<(Regex, &'static str)>,
    legal_re: Regex,
    bag_word_re: Regex,
    date_re: Regex,
}

impl SlotExtractor {
    pub fn new() -> Self {
        let airline_codes = AIRLINE_KEYWORDS
            .iter()
            .filter(|(k, _)| k.len() <= 2)
            .map(|(k, v)| {
                // Patterns are static lowercase alphanumerics; compilation
                // cannot fail.
                (Regex::new(&format!(r"\b{k}\b")).unwrap(), *v)
            })
            .collect();

        Self {
            airline_codes,
            legal_re: Regex::new(
                r"\b(sue|suing|sued|lawsuit|lawyer|attorney|fraud|legal action|small claims)\b",
            )
            .unwrap(),
            bag_word_re: Regex::new(r"\b(bag|bags)\b").unwrap(),
            date_re: Regex::new(r"\b(\d{4}-\d{2}-\d{2})\b").unwrap(),
        }
    }

    /// Detect the canonical airline name, if any.
    pub fn detect_airline(&self, text: &str) -> Option<String> {
        let t = norm(text);
        for (keyword, canonical) in AIRLINE_KEYWORDS {
            if keyword.len() <= 2 {
                continue;
            }
            if t.contains(keyword) {
                return Some((*canonical).to_string());
            }
        }
        for (re, canonical) in &self.airline_codes {
            if re.is_match(&t) {
                return Some((*canonical).to_string());
            }
        }
        None
    }

    /// Classify the dispute type. Legal/complex language wins over the
    /// policy categories; anything unrecognized stays `Unknown`.
    pub fn detect_dispute_type(&self, text: &str) -> DisputeType {
        let t = norm(text);
        if self.legal_re.is_match(&t) {
            return DisputeType::Legal;
        }
        if has_any(&t, BAGGAGE_MARKERS) || self.bag_word_re.is_match(&t) {
            return DisputeType::Baggage;
        }
        if has_any(&t, REFUND_MARKERS) {
            return DisputeType::Refund;
        }
        DisputeType::Unknown
    }

    /// Extract all slots from the request context.
    ///
    /// Never fails: unresolvable fields stay in their unknown state.
    pub fn extract(&self, text: &str) -> DisputeSlots {
        let t = norm(text);
        let dispute_type = self.detect_dispute_type(&t);
        let mut slots = DisputeSlots::unknown(dispute_type);
        slots.airline = self.detect_airline(&t);
        slots.travel_date = self.detect_date(&t);

        match dispute_type {
            DisputeType::Refund => self.fill_refund_slots(&t, &mut slots),
            DisputeType::Baggage => self.fill_baggage_slots(&t, &mut slots),
            DisputeType::Legal | DisputeType::Unknown => {}
        }

        slots
    }

    fn detect_date(&self, text: &str) -> Option<NaiveDate> {
        let m = self.date_re.captures(text)?;
        NaiveDate::parse_from_str(&m[1], "%Y-%m-%d").ok()
    }

    fn fill_refund_slots(&self, t: &str, slots: &mut DisputeSlots) {
        // Airline cancelled?
        let yes_cancel = [
            // Passive voice
            "my flight was cancelled",
            "my flight was canceled",
            "flight was cancelled",
            "flight was canceled",
            "flight got cancelled",
            "flight got canceled",
            // Active voice with the airline as subject
            "cancelled my flight",
            "canceled my flight",
            "cancelled the flight",
            "canceled the flight",
            // Generic
            "airline cancelled",
            "airline canceled",
            "they cancelled",
            "they canceled",
            "cancelled by",
            "canceled by",
            "carrier cancelled",
            "carrier canceled",
            // Refusing a refund implies an airline-initiated event
            "refusing to refund",
            "refused my refund",
            "denying my refund",
            "won't refund",
            "will not refund",
        ];
        let no_cancel = [
            "i cancelled",
            "i canceled",
            "i want to cancel",
            "i plan to cancel",
            "i'm cancelling",
            "i am cancelling",
            "i need to cancel",
        ];
        if has_any(t, &yes_cancel) {
            slots.airline_cancelled = TriState::Yes;
        } else if has_any(t, &no_cancel) {
            slots.airline_cancelled = TriState::No;
        }

        // Significant schedule change?
        let yes_sched = [
            "schedule change",
            "changed my flight time",
            "changed my flight",
            "time changed",
            "moved my flight",
            "rescheduled",
            "rerouted",
            "changed the itinerary",
            "connection changed",
        ];
        let no_sched = ["no schedule change", "no change in schedule", "schedule unchanged"];
        if has_any(t, &no_sched) {
            slots.schedule_change = TriState::No;
        } else if has_any(t, &yes_sched) {
            slots.schedule_change = TriState::Yes;
        }

        // Weather-related?
        let yes_weather = [
            "snow",
            "snowstorm",
            "storm",
            "hurricane",
            "cyclone",
            "typhoon",
            "thunderstorm",
            "blizzard",
            "ice",
            "icy",
            "fog",
            "heavy rain",
            "weather",
        ];
        let no_weather = ["not weather", "not due to weather", "weather is fine"];
        if has_any(t, &no_weather) {
            slots.weather_related = TriState::No;
        } else if has_any(t, &yes_weather) {
            slots.weather_related = TriState::Yes;
        }

        // Travel waiver active?
        let yes_waiver = [
            "travel waiver",
            "waiver",
            "travel advisory",
            "travel alert",
            "weather waiver",
        ];
        let no_waiver = ["no waiver", "waiver not", "no travel waiver"];
        if has_any(t, &no_waiver) {
            slots.travel_waiver_active = TriState::No;
        } else if has_any(t, &yes_waiver) {
            slots.travel_waiver_active = TriState::Yes;
        }

        // Fare class
        let refundable = ["refundable ticket", "fully refundable", "refundable fare"];
        let basic = ["basic economy"];
        let nonrefundable = ["nonrefundable", "non-refundable", "no refund fare"];
        if has_any(t, &refundable) {
            slots.fare_class = FareClass::Refundable;
        } else if has_any(t, &basic) {
            slots.fare_class = FareClass::BasicEconomy;
        } else if has_any(t, &nonrefundable) {
            slots.fare_class = FareClass::NonRefundable;
        }

        // Escalation signals
        let denied = [
            "denied my refund",
            "refund denied",
            "refused refund",
            "refusing refund",
            "won't refund",
            "will not refund",
            "not giving me a refund",
        ];
        if has_any(t, &denied) {
            slots.refund_denied = TriState::Yes;
        }

        let credit_only = [
            "only offering credit",
            "only credit",
            "only voucher",
            "only travel credit",
            "refusing cash refund",
            "won't give cash",
            "will not give cash",
            "no cash refund",
            "cash refund refused",
        ];
        if has_any(t, &credit_only) {
            slots.cash_refund_refused = TriState::Yes;
        }
    }

    fn fill_baggage_slots(&self, t: &str, slots: &mut DisputeSlots) {
        let lost = [
            "baggage lost",
            "bag lost",
            "never arrived",
            "missing bag",
            "lost luggage",
            "lost my bag",
        ];
        let damaged = [
            "baggage damaged",
            "bag damaged",
            "broken suitcase",
            "damaged luggage",
            "wheel broke",
            "handle broke",
            "torn",
        ];
        let delayed = [
            "baggage delayed",
            "bag delayed",
            "didn't arrive",
            "not arrived",
            "still not here",
            "missed bag",
        ];
        if has_any(t, &lost) {
            slots.baggage_status = BaggageStatus::Lost;
        } else if has_any(t, &damaged) {
            slots.baggage_status = BaggageStatus::Damaged;
        } else if has_any(t, &delayed) {
            slots.baggage_status = BaggageStatus::Delayed;
        }

        let yes_report = [
            "filed a report",
            "filed report",
            "filed a claim",
            "submitted a claim",
            "reported it",
            "pir",
            "property irregularity report",
        ];
        let no_report = [
            "haven't reported",
            "have not reported",
            "didn't report",
            "not reported yet",
        ];
        if has_any(t, &yes_report) {
            slots.baggage_report_filed = TriState::Yes;
        } else if has_any(t, &no_report) {
            slots.baggage_report_filed = TriState::No;
        }
    }
}

impl Default for SlotExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> SlotExtractor {
        SlotExtractor::new()
    }

    #[test]
    fn test_empty_input_yields_all_unknown() {
        let slots = extractor().extract("");
        assert_eq!(slots, DisputeSlots::unknown(DisputeType::Unknown));
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let ex = extractor();
        let text = "Delta cancelled my flight due to a snowstorm. I booked Basic Economy.";
        assert_eq!(ex.extract(text), ex.extract(text));
    }

    #[test]
    fn test_airline_names_and_codes() {
        let ex = extractor();
        assert_eq!(
            ex.detect_airline("my united flight"),
            Some("United Airlines".to_string())
        );
        assert_eq!(
            ex.detect_airline("I flew AA yesterday"),
            Some("American Airlines".to_string())
        );
        // Short codes only match whole words
        assert_eq!(ex.detect_airline("an aardvark problem"), None);
        assert_eq!(ex.detect_airline("some other carrier"), None);
    }

    #[test]
    fn test_snowstorm_cancellation_scenario() {
        let slots = extractor().extract(
            "Delta cancelled my flight due to a snowstorm. I booked Basic Economy. \
             Can I get a full refund?",
        );
        assert_eq!(slots.dispute_type, DisputeType::Refund);
        assert_eq!(slots.airline.as_deref(), Some("Delta Airlines"));
        assert_eq!(slots.airline_cancelled, TriState::Yes);
        assert_eq!(slots.weather_related, TriState::Yes);
        assert_eq!(slots.fare_class, FareClass::BasicEconomy);
    }

    #[test]
    fn test_voluntary_cancellation() {
        let slots = extractor().extract("I want to cancel my United flight and get a refund");
        assert_eq!(slots.dispute_type, DisputeType::Refund);
        assert_eq!(slots.airline_cancelled, TriState::No);
    }

    #[test]
    fn test_cancelled_without_airline() {
        let slots = extractor().extract("My flight was cancelled. I want a refund.");
        assert_eq!(slots.dispute_type, DisputeType::Refund);
        assert_eq!(slots.airline, None);
        assert_eq!(slots.airline_cancelled, TriState::Yes);
    }

    #[test]
    fn test_legal_language_classifies_as_legal() {
        let ex = extractor();
        let slots = ex.extract("This is fraud. I will sue and file a DOT complaint.");
        assert_eq!(slots.dispute_type, DisputeType::Legal);
        // "issue" must not trip the word-bounded "sue" pattern
        assert_eq!(
            ex.detect_dispute_type("I have an issue with my refund"),
            DisputeType::Refund
        );
    }

    #[test]
    fn test_baggage_status_detection() {
        let ex = extractor();
        let slots = ex.extract("United lost my bag, never arrived at the carousel");
        assert_eq!(slots.dispute_type, DisputeType::Baggage);
        assert_eq!(slots.baggage_status, BaggageStatus::Lost);

        let slots = ex.extract("my suitcase wheel broke on a delta flight, I filed a claim");
        assert_eq!(slots.baggage_status, BaggageStatus::Damaged);
        assert_eq!(slots.baggage_report_filed, TriState::Yes);
    }

    #[test]
    fn test_negative_phrases_override_keywords() {
        let slots = extractor().extract(
            "my flight was cancelled but it was not due to weather, and there is no waiver",
        );
        assert_eq!(slots.weather_related, TriState::No);
        assert_eq!(slots.travel_waiver_active, TriState::No);
    }

    #[test]
    fn test_refund_denied_signals() {
        let slots = extractor()
            .extract("Delta is refusing to refund me. Refund denied, they are only offering credit.");
        assert_eq!(slots.refund_denied, TriState::Yes);
        assert_eq!(slots.cash_refund_refused, TriState::Yes);
        // A refusal implies the disruption was airline-initiated
        assert_eq!(slots.airline_cancelled, TriState::Yes);
    }

    #[test]
    fn test_date_extraction() {
        let ex = extractor();
        let slots = ex.extract("united cancelled my flight on 2026-03-14, I want a refund");
        assert_eq!(slots.travel_date, NaiveDate::from_ymd_opt(2026, 3, 14));
        // Nonsense dates are ignored, not an error
        let slots = ex.extract("refund for my flight on 2026-99-99");
        assert_eq!(slots.travel_date, None);
    }
}

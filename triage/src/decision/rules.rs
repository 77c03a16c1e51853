//! The policy rule table.
//!
//! Each rule pairs a slot pattern with the outcome to recommend. Patterns
//! only constrain the fields they set; unset fields match anything. The
//! built-in table mirrors US refund/baggage practice; deployments override
//! it wholesale via TOML without code changes.

use serde::{Deserialize, Serialize};

use crate::slots::{BaggageStatus, DisputeSlots, DisputeType, FareClass, TriState};

/// Whether the passenger is entitled to the remedy the rule describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Eligibility {
    Eligible,
    NotEligible,
    /// Depends on facts outside the slots (fare rules, waiver terms,
    /// claim thresholds).
    Conditional,
}

impl std::fmt::Display for Eligibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Eligible => write!(f, "eligible"),
            Self::NotEligible => write!(f, "not_eligible"),
            Self::Conditional => write!(f, "conditional"),
        }
    }
}

/// Slot constraints for one rule. `None` fields are wildcards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlotPattern {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub airline_cancelled: Option<TriState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_change: Option<TriState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather_related: Option<TriState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fare_class: Option<FareClass>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refund_denied: Option<TriState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cash_refund_refused: Option<TriState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baggage_status: Option<BaggageStatus>,
}

impl SlotPattern {
    pub fn matches(&self, slots: &DisputeSlots) -> bool {
        fn ok<T: PartialEq>(constraint: &Option<T>, value: &T) -> bool {
            constraint.as_ref().map(|c| c == value).unwrap_or(true)
        }
        ok(&self.airline_cancelled, &slots.airline_cancelled)
            && ok(&self.schedule_change, &slots.schedule_change)
            && ok(&self.weather_related, &slots.weather_related)
            && ok(&self.fare_class, &slots.fare_class)
            && ok(&self.refund_denied, &slots.refund_denied)
            && ok(&self.cash_refund_refused, &slots.cash_refund_refused)
            && ok(&self.baggage_status, &slots.baggage_status)
    }
}

/// One entry in the rule table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Stable identifier used in decision traces and logs.
    pub id: String,
    pub dispute_type: DisputeType,
    #[serde(default)]
    pub when: SlotPattern,
    pub eligibility: Eligibility,
    /// Situation analysis handed to the generation backend as grounding.
    pub guidance: String,
    /// Concrete next steps for the passenger, surfaced in the response.
    #[serde(default)]
    pub next_steps: Vec<String>,
    /// Signals that should prompt escalation in follow-up turns.
    #[serde(default)]
    pub escalate_if: Vec<String>,
}

/// Ordered rule table; evaluation is first match wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleTable {
    rules: Vec<PolicyRule>,
}

impl RuleTable {
    pub fn new(rules: Vec<PolicyRule>) -> Self {
        Self { rules }
    }

    /// Parse a rule table from a TOML document with a `[[rules]]` array.
    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        #[derive(Deserialize)]
        struct Doc {
            rules: Vec<PolicyRule>,
        }
        let doc: Doc = toml::from_str(raw)?;
        Ok(Self { rules: doc.rules })
    }

    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    /// First rule whose dispute type and slot pattern match.
    pub fn find(&self, slots: &DisputeSlots) -> Option<&PolicyRule> {
        self.rules
            .iter()
            .find(|rule| rule.dispute_type == slots.dispute_type && rule.when.matches(slots))
    }

    /// The built-in rule table.
    pub fn builtin() -> Self {
        fn rule(
            id: &str,
            dispute_type: DisputeType,
            when: SlotPattern,
            eligibility: Eligibility,
            guidance: &str,
            next_steps: &[&str],
            escalate_if: &[&str],
        ) -> PolicyRule {
            PolicyRule {
                id: id.to_string(),
                dispute_type,
                when,
                eligibility,
                guidance: guidance.to_string(),
                next_steps: next_steps.iter().map(|s| s.to_string()).collect(),
                escalate_if: escalate_if.iter().map(|s| s.to_string()).collect(),
            }
        }

        let rules = vec![
            // ── Refund: active denial signals come first ─────────────────
            rule(
                "refund_denied",
                DisputeType::Refund,
                SlotPattern {
                    refund_denied: Some(TriState::Yes),
                    ..Default::default()
                },
                Eligibility::Eligible,
                "The passenger reports being denied a refund they are entitled to. \
                 Provide escalation guidance.",
                &[
                    "Document the denial in writing (email or chat transcript)",
                    "Request supervisor escalation citing cancellation refund rights",
                    "File a DOT complaint with proof of cancellation and payment",
                ],
                &[],
            ),
            rule(
                "cash_refund_refused",
                DisputeType::Refund,
                SlotPattern {
                    cash_refund_refused: Some(TriState::Yes),
                    ..Default::default()
                },
                Eligibility::Eligible,
                "The airline is offering only credit or vouchers. For an \
                 airline-initiated cancellation the passenger may insist on a \
                 cash refund to the original form of payment.",
                &[
                    "Decline the voucher and request a cash/card refund explicitly",
                    "Reference the cancellation notice when asking",
                    "File a DOT complaint if the airline will not convert the credit",
                ],
                &[],
            ),
            // Weather rides the waiver pathway, not the airline-fault one
            rule(
                "weather_waiver",
                DisputeType::Refund,
                SlotPattern {
                    weather_related: Some(TriState::Yes),
                    ..Default::default()
                },
                Eligibility::Conditional,
                "Weather disruption. Waiver logic applies rather than an \
                 airline-fault refund: rebooking under an active travel waiver \
                 is usually free, and a cash refund is owed only if the airline \
                 itself cancelled and the passenger declines rebooking.",
                &[
                    "Check whether a travel waiver is active for the route",
                    "Rebook fee-free under the waiver if one exists",
                    "If the airline cancelled and you decline rebooking, request a refund",
                ],
                &["Airline refuses both rebooking and refund after its own cancellation"],
            ),
            rule(
                "involuntary_cancellation",
                DisputeType::Refund,
                SlotPattern {
                    airline_cancelled: Some(TriState::Yes),
                    ..Default::default()
                },
                Eligibility::Eligible,
                "Airline-initiated cancellation. The passenger is likely \
                 entitled to a full cash refund; emphasize requesting an \
                 explicit refund, not credit or a voucher.",
                &[
                    "Request a cash/card refund explicitly",
                    "You do not have to accept a voucher or credit",
                    "Keep the booking confirmation and cancellation notice",
                ],
                &[
                    "Airline denies the refund despite a confirmed cancellation",
                    "Airline only offers credit/voucher and refuses cash",
                ],
            ),
            rule(
                "significant_schedule_change",
                DisputeType::Refund,
                SlotPattern {
                    schedule_change: Some(TriState::Yes),
                    ..Default::default()
                },
                Eligibility::Eligible,
                "Significant airline-initiated schedule change. Treated like a \
                 cancellation: refund or free rebooking at the passenger's choice.",
                &[
                    "Compare the new itinerary against the original times",
                    "Request a refund if the new schedule does not work",
                ],
                &["Airline claims the change is too small to qualify"],
            ),
            rule(
                "voluntary_refundable",
                DisputeType::Refund,
                SlotPattern {
                    airline_cancelled: Some(TriState::No),
                    fare_class: Some(FareClass::Refundable),
                    ..Default::default()
                },
                Eligibility::Eligible,
                "Passenger-initiated cancellation on a refundable fare: cash \
                 refund per the fare rules.",
                &[
                    "Cancel through the original booking channel",
                    "Request the refund to the original form of payment",
                ],
                &["Refundable fare purchased but refund denied"],
            ),
            rule(
                "voluntary_basic_economy",
                DisputeType::Refund,
                SlotPattern {
                    airline_cancelled: Some(TriState::No),
                    fare_class: Some(FareClass::BasicEconomy),
                    ..Default::default()
                },
                Eligibility::NotEligible,
                "Passenger-initiated cancellation on Basic Economy: generally \
                 no refund and often no credit, outside the 24-hour booking window.",
                &[
                    "Check whether the booking is within the 24-hour cancellation window",
                    "Ask about same-day change options as a fallback",
                ],
                &[],
            ),
            rule(
                "voluntary_nonrefundable",
                DisputeType::Refund,
                SlotPattern {
                    airline_cancelled: Some(TriState::No),
                    fare_class: Some(FareClass::NonRefundable),
                    ..Default::default()
                },
                Eligibility::NotEligible,
                "Passenger-initiated cancellation on a non-refundable fare: \
                 usually travel credit minus fees rather than a cash refund. \
                 The 24-hour rule may still apply to recent bookings.",
                &[
                    "Check the fare rules on the ticket confirmation",
                    "Cancel within 24 hours of booking for a full refund, if recent",
                    "Otherwise expect travel credit minus any fees",
                ],
                &[],
            ),
            rule(
                "voluntary_unknown_fare",
                DisputeType::Refund,
                SlotPattern {
                    airline_cancelled: Some(TriState::No),
                    ..Default::default()
                },
                Eligibility::Conditional,
                "Passenger-initiated cancellation with unknown fare type. The \
                 refund depends on the fare rules; refundable fares get cash, \
                 non-refundable ones typically become credit.",
                &[
                    "Check the ticket confirmation for refundable vs non-refundable",
                    "The 24-hour cancellation rule applies to recent bookings",
                ],
                &[],
            ),
            rule(
                "refund_unclassified",
                DisputeType::Refund,
                SlotPattern::default(),
                Eligibility::Conditional,
                "Cancellation context unclear. Give general refund guidance: \
                 airline cancellation means a likely full refund, voluntary \
                 cancellation depends on the fare.",
                &[
                    "Airline cancellation: likely entitled to a full refund",
                    "Voluntary cancellation: depends on fare type",
                    "Check for active travel waivers",
                ],
                &[],
            ),
            // ── Baggage ──────────────────────────────────────────────────
            rule(
                "baggage_lost",
                DisputeType::Baggage,
                SlotPattern {
                    baggage_status: Some(BaggageStatus::Lost),
                    ..Default::default()
                },
                Eligibility::Eligible,
                "Baggage reported lost. Statutory compensation pathway: file \
                 the claim, get a reference number, ask about liability caps. \
                 Airlines search 5-21 days before declaring a bag officially lost.",
                &[
                    "File the claim at the baggage desk or online and get a reference number",
                    "Keep receipts for essential purchases",
                    "Ask about the airline's liability cap and claim deadline",
                ],
                &["High-value items involved", "Airline refuses to process the claim"],
            ),
            rule(
                "baggage_delayed",
                DisputeType::Baggage,
                SlotPattern {
                    baggage_status: Some(BaggageStatus::Delayed),
                    ..Default::default()
                },
                Eligibility::Eligible,
                "Baggage delayed. File a Property Irregularity Report, keep \
                 receipts for essentials; reasonable expenses are reimbursable \
                 and bag fees become refundable past the delay thresholds \
                 (12h domestic, 15-30h international).",
                &[
                    "File a PIR immediately and keep the reference number",
                    "Keep receipts for essential purchases",
                    "Request the bag fee refund once the delay threshold passes",
                ],
                &["Airline refuses to accept the report"],
            ),
            rule(
                "baggage_damaged",
                DisputeType::Baggage,
                SlotPattern {
                    baggage_status: Some(BaggageStatus::Damaged),
                    ..Default::default()
                },
                Eligibility::Conditional,
                "Baggage damaged. Report before leaving the airport when \
                 possible, photograph the damage, and file within the window \
                 (24h domestic, 7 days international). The airline may repair, \
                 replace, or compensate.",
                &[
                    "Photograph the damage and keep the bag tag",
                    "File the damage report within the deadline",
                    "Ask whether the airline repairs, replaces, or compensates",
                ],
                &["Airline refuses to process the claim"],
            ),
            rule(
                "baggage_unclassified",
                DisputeType::Baggage,
                SlotPattern::default(),
                Eligibility::Conditional,
                "Baggage issue with unclear status. Give general claim \
                 guidance and report-timing windows.",
                &[
                    "File a baggage claim immediately and get a reference number",
                    "Keep receipts for essential purchases",
                    "Damage must be reported within 24h domestic / 7 days international",
                ],
                &["Airline refuses to accept a claim or provide a reference"],
            ),
        ];

        Self { rules }
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slots::DisputeSlots;

    /// Minimal synthetic slots that satisfy a rule's own pattern.
    fn synthetic_slots(rule: &PolicyRule) -> DisputeSlots {
        let mut slots = DisputeSlots::unknown(rule.dispute_type);
        if let Some(v) = rule.when.airline_cancelled {
            slots.airline_cancelled = v;
        }
        if let Some(v) = rule.when.schedule_change {
            slots.schedule_change = v;
        }
        if let Some(v) = rule.when.weather_related {
            slots.weather_related = v;
        }
        if let Some(v) = rule.when.fare_class {
            slots.fare_class = v;
        }
        if let Some(v) = rule.when.refund_denied {
            slots.refund_denied = v;
        }
        if let Some(v) = rule.when.cash_refund_refused {
            slots.cash_refund_refused = v;
        }
        if let Some(v) = rule.when.baggage_status {
            slots.baggage_status = v;
        }
        slots
    }

    #[test]
    fn test_every_builtin_rule_is_reachable() {
        let table = RuleTable::builtin();
        for rule in table.rules() {
            let slots = synthetic_slots(rule);
            let matched = table.find(&slots).expect("some rule must match");
            assert_eq!(
                matched.id, rule.id,
                "synthetic slots for {} matched {} instead",
                rule.id, matched.id
            );
        }
    }

    #[test]
    fn test_weather_outranks_airline_fault() {
        let table = RuleTable::builtin();
        let mut slots = DisputeSlots::unknown(DisputeType::Refund);
        slots.airline_cancelled = TriState::Yes;
        slots.weather_related = TriState::Yes;
        assert_eq!(table.find(&slots).unwrap().id, "weather_waiver");
    }

    #[test]
    fn test_denial_signals_outrank_everything() {
        let table = RuleTable::builtin();
        let mut slots = DisputeSlots::unknown(DisputeType::Refund);
        slots.airline_cancelled = TriState::Yes;
        slots.weather_related = TriState::Yes;
        slots.refund_denied = TriState::Yes;
        assert_eq!(table.find(&slots).unwrap().id, "refund_denied");
    }

    #[test]
    fn test_no_rule_for_legal_or_unknown() {
        let table = RuleTable::builtin();
        assert!(table.find(&DisputeSlots::unknown(DisputeType::Legal)).is_none());
        assert!(table.find(&DisputeSlots::unknown(DisputeType::Unknown)).is_none());
    }

    #[test]
    fn test_wildcard_pattern_matches_anything() {
        let pattern = SlotPattern::default();
        assert!(pattern.matches(&DisputeSlots::unknown(DisputeType::Refund)));
    }

    #[test]
    fn test_table_from_toml() {
        let table = RuleTable::from_toml_str(
            r#"
            [[rules]]
            id = "custom_lost"
            dispute_type = "baggage"
            eligibility = "eligible"
            guidance = "custom guidance"
            next_steps = ["do the thing"]

            [rules.when]
            baggage_status = "lost"
            "#,
        )
        .unwrap();
        assert_eq!(table.rules().len(), 1);

        let mut slots = DisputeSlots::unknown(DisputeType::Baggage);
        slots.baggage_status = BaggageStatus::Lost;
        assert_eq!(table.find(&slots).unwrap().id, "custom_lost");
    }
}

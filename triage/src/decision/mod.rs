//! Deterministic policy decision engine.
//!
//! Rules live in an inspectable table (dispute type × slot pattern →
//! outcome) evaluated in table order, first match wins. Rule choice is a
//! pure function of the slots; retrieved evidence is only referenced for
//! citations, never consulted for eligibility.

pub mod engine;
pub mod rules;

pub use engine::{DecisionEngine, DecisionResult, RuleEvaluation};
pub use rules::{Eligibility, PolicyRule, RuleTable, SlotPattern};

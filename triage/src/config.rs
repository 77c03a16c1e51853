//! Triage configuration — thresholds and decision tables.
//!
//! Everything here is externally overridable without code changes: the
//! numeric knobs via environment variables, the required-slot table and the
//! rule table via a TOML document.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::decision::rules::RuleTable;
use crate::gate::GateThresholds;
use crate::slots::validator::RequiredSlotTable;

/// Environment variable names for the numeric overrides.
pub const ENV_THRESHOLD_ANSWER: &str = "CONFIDENCE_THRESHOLD_ANSWER";
pub const ENV_THRESHOLD_CLARIFY: &str = "CONFIDENCE_THRESHOLD_CLARIFY";
pub const ENV_TOP_K: &str = "TOP_K";

#[derive(Debug, Error)]
pub enum TriageError {
    #[error("answer threshold {answer} must exceed clarify threshold {clarify}")]
    InvalidThresholds { answer: f32, clarify: f32 },
    #[error("invalid value for {name}: {detail}")]
    InvalidValue { name: String, detail: String },
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Configuration for the deterministic triage stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
    pub thresholds: GateThresholds,
    /// Candidates fetched by dense retrieval.
    pub top_k: usize,
    /// Reranked top score below which an airline-filtered search is retried
    /// without the filter.
    pub filter_retry_threshold: f32,
    pub required_slots: RequiredSlotTable,
    pub rules: RuleTable,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            thresholds: GateThresholds::default(),
            top_k: 8,
            filter_retry_threshold: 0.15,
            required_slots: RequiredSlotTable::builtin(),
            rules: RuleTable::builtin(),
        }
    }
}

impl TriageConfig {
    /// Defaults overlaid with process environment variables.
    pub fn from_env() -> Result<Self, TriageError> {
        let mut config = Self::default();
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a full config from TOML (missing sections keep defaults).
    pub fn from_toml_str(raw: &str) -> Result<Self, TriageError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply numeric overrides from a key lookup. Separated from `from_env`
    /// so tests do not have to mutate process environment.
    pub fn apply_overrides(
        &mut self,
        get: impl Fn(&str) -> Option<String>,
    ) -> Result<(), TriageError> {
        fn parse<T: std::str::FromStr>(name: &str, raw: String) -> Result<T, TriageError>
        where
            T::Err: std::fmt::Display,
        {
            raw.parse().map_err(|e: T::Err| TriageError::InvalidValue {
                name: name.to_string(),
                detail: e.to_string(),
            })
        }

        if let Some(raw) = get(ENV_THRESHOLD_ANSWER) {
            self.thresholds.answer = parse(ENV_THRESHOLD_ANSWER, raw)?;
        }
        if let Some(raw) = get(ENV_THRESHOLD_CLARIFY) {
            self.thresholds.clarify = parse(ENV_THRESHOLD_CLARIFY, raw)?;
        }
        if let Some(raw) = get(ENV_TOP_K) {
            self.top_k = parse(ENV_TOP_K, raw)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), TriageError> {
        if self.thresholds.answer <= self.thresholds.clarify {
            return Err(TriageError::InvalidThresholds {
                answer: self.thresholds.answer,
                clarify: self.thresholds.clarify,
            });
        }
        if self.top_k == 0 {
            return Err(TriageError::InvalidValue {
                name: ENV_TOP_K.to_string(),
                detail: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TriageConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.thresholds.answer, 0.40);
        assert_eq!(config.thresholds.clarify, 0.20);
        assert_eq!(config.top_k, 8);
    }

    #[test]
    fn test_overrides_from_lookup() {
        let mut config = TriageConfig::default();
        config
            .apply_overrides(|name| match name {
                ENV_THRESHOLD_ANSWER => Some("0.6".to_string()),
                ENV_THRESHOLD_CLARIFY => Some("0.3".to_string()),
                ENV_TOP_K => Some("5".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.thresholds.answer, 0.6);
        assert_eq!(config.thresholds.clarify, 0.3);
        assert_eq!(config.top_k, 5);
    }

    #[test]
    fn test_unparseable_override_is_rejected() {
        let mut config = TriageConfig::default();
        let err = config
            .apply_overrides(|name| (name == ENV_TOP_K).then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, TriageError::InvalidValue { .. }));
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let mut config = TriageConfig::default();
        config.thresholds.answer = 0.1;
        config.thresholds.clarify = 0.2;
        assert!(matches!(
            config.validate(),
            Err(TriageError::InvalidThresholds { .. })
        ));
    }

    #[test]
    fn test_from_toml_partial_document() {
        let config = TriageConfig::from_toml_str(
            r#"
            top_k = 6

            [thresholds]
            answer = 0.5
            clarify = 0.25
            "#,
        )
        .unwrap();
        assert_eq!(config.top_k, 6);
        assert_eq!(config.thresholds.answer, 0.5);
        // Unspecified sections keep the built-in tables
        assert!(!config.rules.rules().is_empty());
    }

    #[test]
    fn test_from_toml_rule_table_override() {
        let config = TriageConfig::from_toml_str(
            r#"
            [[rules]]
            id = "only_rule"
            dispute_type = "refund"
            eligibility = "conditional"
            guidance = "custom"
            "#,
        )
        .unwrap();
        assert_eq!(config.rules.rules().len(), 1);
        assert_eq!(config.rules.rules()[0].id, "only_rule");
    }

    #[test]
    fn test_from_toml_rejects_bad_thresholds() {
        let err = TriageConfig::from_toml_str(
            r#"
            [thresholds]
            answer = 0.2
            clarify = 0.4
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, TriageError::InvalidThresholds { .. }));
    }
}

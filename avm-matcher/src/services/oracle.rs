//! Classifier oracle interface and response parsing
//!
//! The oracle classifies the probe and picks a winner within a labeled batch.
//! Parsing tolerates surrounding text but never clamps an ordinal; range
//! checking happens in the comparator.

use async_trait::async_trait;
use image::DynamicImage;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use thiserror::Error;

use crate::models::Gender;

/// Oracle call errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum OracleError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Oracle request timed out")]
    Timeout,

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Oracle returned an empty response")]
    EmptyResponse,

    #[error("Unparseable oracle response: {0}")]
    Parse(String),

    #[error("Image encode failed: {0}")]
    Encode(String),

    #[error("Oracle client misconfigured: {0}")]
    Config(String),
}

/// Probe classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeClassification {
    pub gender: Gender,
    pub is_minor: bool,
}

/// External decision oracle
#[async_trait]
pub trait ClassifierOracle: Send + Sync {
    /// Classify the probe's gender and minor/adult status
    async fn classify_probe(&self, probe: &DynamicImage) -> Result<ProbeClassification, OracleError>;

    /// Pick the best match for the labeled probe among the ordered labeled
    /// candidates, as a 1-based ordinal (not guaranteed to be in range, may
    /// be negative)
    async fn compare_batch(
        &self,
        labeled_probe: &DynamicImage,
        candidates: &[DynamicImage],
    ) -> Result<i64, OracleError>;
}

/// Extract the first standalone integer from a response
///
/// "3" → 3, "Image 2." → 2, "best is #4" → 4, "-1" → -1. Digits glued to
/// letters ("gpt4") are not standalone and are skipped. The sign is kept so a
/// negative answer is reported as out of range, not as its absolute value.
pub fn parse_ordinal(text: &str) -> Option<i64> {
    ordinal_pattern()
        .find_iter(text)
        .find_map(|m| m.as_str().parse::<i64>().ok())
}

fn ordinal_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"-?\b\d+\b").expect("ordinal pattern is valid"))
}

fn json_object_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{[^}]*\}").expect("JSON object pattern is valid"))
}

/// Parse a classification response
///
/// Prefers the first `{...}` JSON object (`{"gender": "...", "child": "..."}`);
/// falls back to keyword matching when no usable JSON is present.
pub fn parse_classification(text: &str) -> ProbeClassification {
    if let Some(json) = extract_json_object(text) {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(json) {
            let gender = value
                .get("gender")
                .and_then(|g| g.as_str())
                .map(Gender::parse)
                .unwrap_or(Gender::Unknown);
            let is_minor = value.get("child").map(normalize_bool).unwrap_or(false);
            return ProbeClassification { gender, is_minor };
        }
        tracing::debug!("Classification JSON did not parse, using keyword fallback");
    }
    keyword_classification(text)
}

fn extract_json_object(text: &str) -> Option<&str> {
    json_object_pattern().find(text).map(|m| m.as_str())
}

fn normalize_bool(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_i64() == Some(1),
        serde_json::Value::String(s) => {
            matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")
        }
        _ => false,
    }
}

fn keyword_classification(text: &str) -> ProbeClassification {
    let lower = text.to_ascii_lowercase();

    // "female" contains "male"
    let gender = if lower.contains("female") {
        Gender::Female
    } else if lower.contains("male") {
        Gender::Male
    } else {
        Gender::Unknown
    };

    let is_minor = ["child", "kid", "young", "teen", "adolescent"]
        .iter()
        .any(|word| lower.contains(word));

    ProbeClassification { gender, is_minor }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ordinal_variants() {
        assert_eq!(parse_ordinal("3"), Some(3));
        assert_eq!(parse_ordinal(" 2\n"), Some(2));
        assert_eq!(parse_ordinal("Image 5."), Some(5));
        assert_eq!(parse_ordinal("The best match is #4"), Some(4));
        assert_eq!(parse_ordinal("0"), Some(0));
        assert_eq!(parse_ordinal("12"), Some(12));
    }

    #[test]
    fn test_parse_ordinal_skips_glued_digits() {
        assert_eq!(parse_ordinal("gpt4 says 2"), Some(2));
        assert_eq!(parse_ordinal("none"), None);
        assert_eq!(parse_ordinal(""), None);
    }

    #[test]
    fn test_parse_ordinal_keeps_sign() {
        assert_eq!(parse_ordinal("-1"), Some(-1));
        assert_eq!(parse_ordinal("Answer: #-2"), Some(-2));
        assert_eq!(parse_ordinal("x-3y 4"), Some(4));
    }

    #[test]
    fn test_parse_classification_takes_first_object() {
        let c = parse_classification(r#"Sure: {"gender": "male", "child": "no"} and {"gender": "female"}"#);
        assert_eq!(c, ProbeClassification { gender: Gender::Male, is_minor: false });
    }

    #[test]
    fn test_parse_classification_json() {
        let c = parse_classification(r#"{"gender": "female", "child": "false"}"#);
        assert_eq!(c, ProbeClassification { gender: Gender::Female, is_minor: false });

        let c = parse_classification("```json\n{\"gender\": \"Male\", \"child\": true}\n```");
        assert_eq!(c, ProbeClassification { gender: Gender::Male, is_minor: true });

        let c = parse_classification(r#"{"gender": "male", "child": "yes"}"#);
        assert!(c.is_minor);
    }

    #[test]
    fn test_parse_classification_invalid_gender_is_unknown() {
        let c = parse_classification(r#"{"gender": "male/female", "child": "0"}"#);
        assert_eq!(c.gender, Gender::Unknown);
        assert!(!c.is_minor);
    }

    #[test]
    fn test_parse_classification_keyword_fallback() {
        let c = parse_classification("This appears to be a young female.");
        assert_eq!(c, ProbeClassification { gender: Gender::Female, is_minor: true });

        let c = parse_classification("An adult male.");
        assert_eq!(c, ProbeClassification { gender: Gender::Male, is_minor: false });

        let c = parse_classification("I cannot tell.");
        assert_eq!(c.gender, Gender::Unknown);
    }
}

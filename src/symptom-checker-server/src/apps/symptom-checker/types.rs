// Copyright (c), Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub const MEDICAL_DISCLAIMER: &str = "\u{26a0}\u{fe0f} IMPORTANT MEDICAL DISCLAIMER \u{26a0}\u{fe0f}

This symptom checker is for EDUCATIONAL PURPOSES ONLY and should NOT be used as a substitute for professional medical advice, diagnosis, or treatment.

- This tool does not provide medical advice
- Always seek the advice of your physician or other qualified health provider
- Never disregard professional medical advice or delay seeking it because of information from this tool
- If you think you may have a medical emergency, call your doctor or emergency services immediately

This service is not intended to diagnose, treat, cure, or prevent any disease.";

pub const MIN_SYMPTOMS_LEN: usize = 3;
pub const MAX_SYMPTOMS_LEN: usize = 2000;
pub const MAX_AGE: i64 = 120;

/// Likelihood of a condition or urgency of a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Level {
    High,
    Medium,
    Low,
}

impl Level {
    /// Lenient parse of model output. Anything unrecognised reads as Medium.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "high" => Level::High,
            "low" => Level::Low,
            _ => Level::Medium,
        }
    }
}

impl<'de> Deserialize<'de> for Level {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(Level::parse_lenient(&raw))
    }
}

/// Body of `POST /api/check-symptoms`.
///
/// Every field is optional at the serde level so that missing or short input is reported by
/// `validate` as a 422 with a readable message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub symptoms: Option<String>,
    pub age: Option<i64>,
    pub gender: Option<String>,
    #[serde(alias = "sessionId")]
    pub session_id: Option<String>,
}

/// Input that passed validation. `symptoms` is trimmed.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRequest {
    pub symptoms: String,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub session_id: Option<String>,
}

impl AnalysisRequest {
    pub fn validate(self) -> Result<ValidatedRequest, String> {
        let symptoms = self.symptoms.as_deref().map(str::trim).unwrap_or_default();
        if symptoms.chars().count() < MIN_SYMPTOMS_LEN {
            return Err(format!(
                "Invalid \"symptoms\"; must be a string of length >= {MIN_SYMPTOMS_LEN}"
            ));
        }
        if symptoms.chars().count() > MAX_SYMPTOMS_LEN {
            return Err(format!(
                "Invalid \"symptoms\"; must be at most {MAX_SYMPTOMS_LEN} characters"
            ));
        }

        let age = match self.age {
            Some(age) if !(0..=MAX_AGE).contains(&age) => {
                return Err(format!("Invalid \"age\"; must be between 0 and {MAX_AGE}"));
            }
            Some(age) => Some(age as u32),
            None => None,
        };

        let gender = self
            .gender
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty());
        let session_id = self
            .session_id
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(ValidatedRequest {
            symptoms: symptoms.to_string(),
            age,
            gender,
            session_id,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub name: String,
    pub probability: Level,
    pub description: String,
    #[serde(default)]
    pub common_symptoms: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub category: String,
    pub action: String,
    pub priority: Level,
}

/// Conditions, recommendations and warning, before the disclaimer and timestamp are attached.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalysisCore {
    pub probable_conditions: Vec<Condition>,
    pub recommendations: Vec<Recommendation>,
    pub emergency_warning: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub probable_conditions: Vec<Condition>,
    pub recommendations: Vec<Recommendation>,
    pub emergency_warning: Option<String>,
    pub disclaimer: String,
    pub timestamp: DateTime<Utc>,
    pub query_id: Option<i64>,
}

impl AnalysisResult {
    pub fn from_core(core: AnalysisCore, timestamp: DateTime<Utc>) -> Self {
        Self {
            probable_conditions: core.probable_conditions,
            recommendations: core.recommendations,
            emergency_warning: core.emergency_warning,
            disclaimer: MEDICAL_DISCLAIMER.to_string(),
            timestamp,
            query_id: None,
        }
    }
}

/// One row of the query log.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredQuery {
    pub id: i64,
    pub symptoms: String,
    pub full_response: AnalysisCore,
    pub conditions: Vec<Condition>,
    pub recommendations: Vec<Recommendation>,
    pub session_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StoredQuery {
    pub fn into_result(self) -> AnalysisResult {
        let mut result = AnalysisResult::from_core(self.full_response, self.created_at);
        result.query_id = Some(self.id);
        result
    }
}

/// Summary row of `GET /api/history`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryHistory {
    pub id: i64,
    pub symptoms: String,
    pub created_at: DateTime<Utc>,
    pub conditions_summary: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryParams {
    /// Raw query value; empty or non-numeric values mean the default.
    pub limit: Option<String>,
    #[serde(alias = "sessionId")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
    pub llm_provider: String,
    pub llm_configured: bool,
    pub stub_mode: bool,
    pub allow_client_api_key: bool,
    pub heuristic_fallback: bool,
    pub persistence_enabled: bool,
    pub persistence_ready: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisclaimerResponse {
    pub disclaimer: String,
}

#[cfg(test)]
mod test {
    use super::*;

    fn request(symptoms: &str) -> AnalysisRequest {
        AnalysisRequest {
            symptoms: Some(symptoms.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_level_parse_is_case_insensitive() {
        assert_eq!(Level::parse_lenient("HIGH"), Level::High);
        assert_eq!(Level::parse_lenient(" low "), Level::Low);
        assert_eq!(Level::parse_lenient("Moderate"), Level::Medium);
        assert_eq!(Level::parse_lenient("unknown"), Level::Medium);
        assert_eq!(serde_json::to_value(Level::High).unwrap(), "High");
    }

    #[test]
    fn test_validate_trims_symptoms() {
        let ok = request("   headache  ").validate().unwrap();
        assert_eq!(ok.symptoms, "headache");
    }

    #[test]
    fn test_validate_rejects_short_or_missing_symptoms() {
        assert!(request("  ab  ").validate().is_err());
        assert!(request("").validate().is_err());
        assert!(AnalysisRequest::default().validate().is_err());
    }

    #[test]
    fn test_validate_rejects_long_symptoms() {
        let long = "a".repeat(MAX_SYMPTOMS_LEN + 1);
        assert!(request(&long).validate().is_err());
    }

    #[test]
    fn test_validate_age_range() {
        let mut req = request("fever");
        req.age = Some(-1);
        assert!(req.clone().validate().is_err());
        req.age = Some(121);
        assert!(req.clone().validate().is_err());
        req.age = Some(40);
        assert_eq!(req.validate().unwrap().age, Some(40));
    }

    #[test]
    fn test_session_id_alias() {
        let req: AnalysisRequest =
            serde_json::from_str(r#"{"symptoms":"cough","sessionId":"abc"}"#).unwrap();
        assert_eq!(req.session_id.as_deref(), Some("abc"));
    }

    #[test]
    fn test_result_serializes_null_warning_and_query_id() {
        let result = AnalysisResult::from_core(AnalysisCore::default(), Utc::now());
        let value = serde_json::to_value(&result).unwrap();
        assert!(value["emergency_warning"].is_null());
        assert!(value["query_id"].is_null());
        assert_eq!(value["disclaimer"], MEDICAL_DISCLAIMER);
    }
}

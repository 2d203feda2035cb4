// Copyright (c), Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Turns raw model text into an `AnalysisCore` and balances it against the caller's own words.
//!
//! The model is not trusted to calibrate urgency. Emergency warnings survive only when the
//! symptom text carries a red-flag phrase, and probabilities are pulled toward `Medium` for
//! common mild presentations.

use super::types::{AnalysisCore, Condition, Level, Recommendation};
use crate::CheckerError;
use regex::Regex;
use serde_json::{Map, Value};

/// Phrases that keep emergency wording in the output.
pub const RED_FLAGS: &[&str] = &[
    "severe chest pain",
    "shortness of breath",
    "difficulty breathing",
    "confusion",
    "stiff neck",
    "rash that doesn't blanch",
    "non-blanching rash",
    "persistent vomiting",
    "seizure",
    "unresponsive",
    "weakness on one side",
    "slurred speech",
    "severe abdominal pain",
    "blood in stool",
    "bloody stool",
    "fainting",
    "loss of consciousness",
    "pregnant and bleeding",
    "infant",
    "under 3 months",
];

/// Common mild symptoms.
pub const MILD_TERMS: &[&str] = &[
    "fever",
    "headache",
    "sore throat",
    "runny nose",
    "cough",
    "body aches",
    "fatigue",
    "congestion",
];

lazy_static::lazy_static! {
    /// Greedy first-`{` to last-`}` span.
    static ref JSON_OBJECT: Regex = Regex::new(r"(?s)\{.*\}").expect("valid regex");
}

/// Red-flag and mild-symptom signals found in the caller's symptom text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymptomSignals {
    pub has_red_flag: bool,
    pub mild_count: usize,
}

impl SymptomSignals {
    pub fn from_text(symptoms: &str) -> Self {
        let lower = symptoms.to_lowercase();
        Self {
            has_red_flag: RED_FLAGS.iter().any(|flag| lower.contains(flag)),
            mild_count: MILD_TERMS.iter().filter(|term| lower.contains(*term)).count(),
        }
    }
}

/// Parse, coerce and balance raw model output.
pub fn normalize(raw: &str, symptoms: &str) -> Result<AnalysisCore, CheckerError> {
    let value = parse_model_json(raw)?;
    let mut core = coerce(&value);
    balance(&mut core, SymptomSignals::from_text(symptoms));
    Ok(core)
}

/// Direct parse first, then the embedded object span.
pub fn parse_model_json(raw: &str) -> Result<Value, CheckerError> {
    match serde_json::from_str::<Value>(raw.trim()) {
        Ok(value) => Ok(value),
        Err(direct) => JSON_OBJECT
            .find(raw)
            .and_then(|m| serde_json::from_str::<Value>(m.as_str()).ok())
            .ok_or_else(|| {
                let preview: String = raw.chars().take(200).collect();
                CheckerError::UnparsableResponse(format!("{direct}; content starts with: {preview}"))
            }),
    }
}

/// Force arbitrary JSON into the response shape.
pub fn coerce(value: &Value) -> AnalysisCore {
    let empty = Map::new();
    let obj = value.as_object().unwrap_or(&empty);

    let probable_conditions = array_field(obj, &["probable_conditions", "probableConditions"])
        .iter()
        .filter_map(Value::as_object)
        .map(coerce_condition)
        .collect();

    let recommendations = array_field(obj, &["recommendations"])
        .iter()
        .filter_map(Value::as_object)
        .map(coerce_recommendation)
        .collect();

    let emergency_warning = field(obj, &["emergency_warning", "emergencyWarning"])
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|w| !w.is_empty())
        .map(str::to_string);

    AnalysisCore {
        probable_conditions,
        recommendations,
        emergency_warning,
    }
}

fn field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k)).filter(|v| !v.is_null())
}

fn array_field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> &'a [Value] {
    field(obj, keys)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn text_field(obj: &Map<String, Value>, keys: &[&str], default: &str) -> String {
    field(obj, keys)
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}

fn level_field(obj: &Map<String, Value>, keys: &[&str]) -> Level {
    field(obj, keys)
        .and_then(Value::as_str)
        .map(Level::parse_lenient)
        .unwrap_or(Level::Medium)
}

fn coerce_condition(obj: &Map<String, Value>) -> Condition {
    Condition {
        name: text_field(obj, &["name"], "Unknown condition"),
        probability: level_field(obj, &["probability"]),
        description: text_field(obj, &["description"], ""),
        common_symptoms: array_field(obj, &["common_symptoms", "commonSymptoms"])
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
    }
}

fn coerce_recommendation(obj: &Map<String, Value>) -> Recommendation {
    Recommendation {
        category: text_field(obj, &["category"], "Follow-up"),
        action: text_field(obj, &["action"], ""),
        priority: level_field(obj, &["priority"]),
    }
}

/// Apply the safety adjustments in place.
pub fn balance(core: &mut AnalysisCore, signals: SymptomSignals) {
    let SymptomSignals {
        has_red_flag,
        mild_count,
    } = signals;

    if !has_red_flag {
        core.emergency_warning = None;
        for rec in core
            .recommendations
            .iter_mut()
            .filter(|r| r.category.trim().eq_ignore_ascii_case("emergency"))
        {
            rec.category = "Immediate Action".to_string();
            if rec.priority != Level::High {
                rec.priority = Level::Medium;
            }
        }
    }

    let mut high_seen = 0;
    for condition in core.probable_conditions.iter_mut() {
        match condition.probability {
            Level::High if !has_red_flag && mild_count <= 2 => {
                condition.probability = Level::Medium;
            }
            Level::High => {
                high_seen += 1;
                // without a red flag only the first High stands
                if !has_red_flag && high_seen > 1 {
                    condition.probability = Level::Medium;
                }
            }
            Level::Low if mild_count >= 3 && !has_red_flag => {
                condition.probability = Level::Medium;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn condition(name: &str, probability: &str) -> Value {
        json!({
            "name": name,
            "probability": probability,
            "description": format!("{name} description"),
            "common_symptoms": ["fever"]
        })
    }

    fn levels(core: &AnalysisCore) -> Vec<Level> {
        core.probable_conditions.iter().map(|c| c.probability).collect()
    }

    #[test]
    fn test_signals() {
        let s = SymptomSignals::from_text("Mild HEADACHE, runny nose, sore throat");
        assert!(!s.has_red_flag);
        assert_eq!(s.mild_count, 3);

        let s = SymptomSignals::from_text("severe chest pain and shortness of breath");
        assert!(s.has_red_flag);
        assert_eq!(s.mild_count, 0);
    }

    #[test]
    fn test_extracts_embedded_object() {
        let raw = r#"Here is the result: {"probable_conditions":[],"recommendations":[]}"#;
        let core = normalize(raw, "headache").unwrap();
        assert!(core.probable_conditions.is_empty());
        assert!(core.recommendations.is_empty());
        assert!(core.emergency_warning.is_none());
    }

    #[test]
    fn test_extracts_fenced_json() {
        let raw = "```json\n{\"probable_conditions\":[{\"name\":\"Migraine\",\"probability\":\"low\",\"description\":\"d\",\"common_symptoms\":[]}],\"recommendations\":[]}\n```";
        let core = normalize(raw, "headache").unwrap();
        assert_eq!(core.probable_conditions[0].name, "Migraine");
        assert_eq!(core.probable_conditions[0].probability, Level::Low);
    }

    #[test]
    fn test_unparsable_response() {
        assert!(matches!(
            normalize("I cannot help with that.", "headache"),
            Err(CheckerError::UnparsableResponse(_))
        ));
        assert!(matches!(
            normalize("broken { not json }", "headache"),
            Err(CheckerError::UnparsableResponse(_))
        ));
    }

    #[test]
    fn test_non_object_json_becomes_empty() {
        let core = normalize("[1, 2, 3]", "headache").unwrap();
        assert_eq!(core, AnalysisCore::default());
    }

    #[test]
    fn test_coercion_fills_defaults() {
        let value = json!({
            "probable_conditions": [ { "probability": "HIGH" }, "junk", { "name": "Flu", "common_symptoms": ["fever", 3] } ],
            "recommendations": "not a list",
            "emergency_warning": "   "
        });
        let core = coerce(&value);
        assert_eq!(core.probable_conditions.len(), 2);
        assert_eq!(core.probable_conditions[0].name, "Unknown condition");
        assert_eq!(core.probable_conditions[0].probability, Level::High);
        assert_eq!(core.probable_conditions[1].probability, Level::Medium);
        assert_eq!(core.probable_conditions[1].common_symptoms, vec!["fever"]);
        assert!(core.recommendations.is_empty());
        assert!(core.emergency_warning.is_none());
    }

    #[test]
    fn test_accepts_camel_case_keys() {
        let value = json!({
            "probableConditions": [ { "name": "Cold", "probability": "Low", "description": "", "commonSymptoms": ["cough"] } ],
            "emergencyWarning": "Go now"
        });
        let core = coerce(&value);
        assert_eq!(core.probable_conditions[0].common_symptoms, vec!["cough"]);
        assert_eq!(core.emergency_warning.as_deref(), Some("Go now"));
    }

    #[test]
    fn test_conforming_json_is_unchanged_apart_from_balancing() {
        let value = json!({
            "probable_conditions": [ condition("Tension headache", "Medium") ],
            "recommendations": [ { "category": "Self-Care", "action": "Rest", "priority": "Low" } ],
            "emergency_warning": null
        });
        let core = normalize(&value.to_string(), "headache").unwrap();
        assert_eq!(core.probable_conditions[0].name, "Tension headache");
        assert_eq!(core.probable_conditions[0].probability, Level::Medium);
        assert_eq!(core.probable_conditions[0].common_symptoms, vec!["fever"]);
        assert_eq!(
            core.recommendations,
            vec![Recommendation {
                category: "Self-Care".into(),
                action: "Rest".into(),
                priority: Level::Low,
            }]
        );
    }

    #[test]
    fn test_warning_dropped_without_red_flag() {
        let value = json!({
            "probable_conditions": [],
            "recommendations": [
                { "category": "Emergency", "action": "Call 911", "priority": "High" },
                { "category": "emergency", "action": "Go to ER", "priority": "Low" }
            ],
            "emergency_warning": "Seek care immediately"
        });
        let core = normalize(&value.to_string(), "headache and fatigue").unwrap();
        assert!(core.emergency_warning.is_none());
        assert_eq!(core.recommendations[0].category, "Immediate Action");
        assert_eq!(core.recommendations[0].priority, Level::High);
        assert_eq!(core.recommendations[1].category, "Immediate Action");
        assert_eq!(core.recommendations[1].priority, Level::Medium);
    }

    #[test]
    fn test_red_flag_keeps_warning_and_emergency() {
        let value = json!({
            "probable_conditions": [ condition("Heart attack", "High"), condition("Pulmonary embolism", "High") ],
            "recommendations": [ { "category": "Emergency", "action": "Call emergency services", "priority": "High" } ],
            "emergency_warning": "Seek care"
        });
        let core = normalize(&value.to_string(), "severe chest pain and shortness of breath").unwrap();
        assert_eq!(core.emergency_warning.as_deref(), Some("Seek care"));
        assert_eq!(core.recommendations[0].category, "Emergency");
        assert_eq!(core.recommendations[0].priority, Level::High);
        assert_eq!(levels(&core), vec![Level::High, Level::High]);
    }

    #[test]
    fn test_high_demoted_when_few_mild_symptoms() {
        let value = json!({
            "probable_conditions": [ condition("Migraine", "High"), condition("Sinusitis", "Low") ],
            "recommendations": []
        });
        let core = normalize(&value.to_string(), "headache").unwrap();
        assert_eq!(levels(&core), vec![Level::Medium, Level::Low]);
    }

    #[test]
    fn test_single_high_survives_with_many_mild_symptoms() {
        let value = json!({
            "probable_conditions": [
                condition("Common cold", "High"),
                condition("Influenza", "High"),
                condition("Strep throat", "Low")
            ],
            "recommendations": []
        });
        let core = normalize(&value.to_string(), "mild headache, runny nose, sore throat").unwrap();
        assert_eq!(levels(&core), vec![Level::High, Level::Medium, Level::Medium]);
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let value = json!({
            "probable_conditions": [
                condition("Common cold", "High"),
                condition("Influenza", "High"),
                condition("Allergy", "Low")
            ],
            "recommendations": [ { "category": "Emergency", "action": "ER", "priority": "Medium" } ],
            "emergency_warning": "Danger"
        });
        for symptoms in ["cough", "fever, cough, fatigue, headache", "seizure and fever"] {
            let once = normalize(&value.to_string(), symptoms).unwrap();
            let reencoded = serde_json::to_string(&once).unwrap();
            let twice = normalize(&reencoded, symptoms).unwrap();
            assert_eq!(once, twice, "not idempotent for {symptoms}");
        }
    }
}

// Copyright (c), Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use super::types::{AnalysisCore, Condition, Level, Recommendation};
use regex::Regex;

lazy_static::lazy_static! {
    static ref COLD_LIKE: Regex =
        Regex::new(r"(?i)cough|sore throat|runny nose|congestion|sneez(e|ing)").expect("valid regex");
}

/// Keyword stand-in used when the model is disabled, unconfigured or failing.
pub fn heuristic_analysis(symptoms: &str) -> AnalysisCore {
    let condition = if COLD_LIKE.is_match(symptoms) {
        Condition {
            name: "Common Cold".to_string(),
            probability: Level::Medium,
            description: "A viral infection of the upper respiratory tract. This is a keyword-based estimate produced without AI analysis.".to_string(),
            common_symptoms: ["Cough", "Sore throat", "Runny nose", "Congestion", "Sneezing"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    } else {
        Condition {
            name: "Non-specific symptoms".to_string(),
            probability: Level::Low,
            description: "The described symptoms do not match a common pattern. This is a keyword-based estimate produced without AI analysis.".to_string(),
            common_symptoms: Vec::new(),
        }
    };

    AnalysisCore {
        probable_conditions: vec![condition],
        recommendations: vec![Recommendation {
            category: "Self-Care".to_string(),
            action: "Rest, stay hydrated and monitor your symptoms. Consult a healthcare professional if they worsen or persist.".to_string(),
            priority: Level::Low,
        }],
        emergency_warning: None,
    }
}

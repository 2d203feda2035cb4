// Copyright (c), Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

// ============================================
// System Prompt
// ============================================

pub const SYSTEM_PROMPT: &str = r#"You are a medical information assistant designed to provide educational information about health symptoms.

CRITICAL SAFETY RULES:
1. ALWAYS emphasize that this is for educational purposes only and not medical advice.
2. ALWAYS recommend consulting a healthcare professional for diagnosis/treatment.
3. Identify emergency symptoms and urge immediate medical attention when appropriate.
4. Do NOT provide prescriptions or specific treatments; focus on general guidance.
5. Be cautious and conservative; prioritize patient safety.

Task: Analyze the provided symptoms and return strictly valid JSON with the following schema:
{
  "probable_conditions": [
    {
      "name": "Condition Name",
      "probability": "High|Medium|Low",
      "description": "Brief description",
      "common_symptoms": ["symptom1", "symptom2"]
    }
  ],
  "recommendations": [
    {
      "category": "Immediate Action|Self-Care|Follow-up|Emergency",
      "action": "Specific recommendation",
      "priority": "High|Medium|Low"
    }
  ],
  "emergency_warning": "Warning if emergency symptoms detected, otherwise null"
}

Important output rules:
- Output ONLY raw JSON (no code fences, no extra text).
- Ensure it is parseable as strict JSON."#;

const CLOSING_INSTRUCTION: &str = "Please analyze these symptoms and provide probable conditions with recommendations. Remember to include emergency warnings if applicable.";

/// Compose the full prompt: system instruction, then the user section.
pub fn build_prompt(symptoms: &str, age: Option<u32>, gender: Option<&str>) -> String {
    let mut lines = vec![format!("Symptoms: {symptoms}")];
    if let Some(age) = age {
        lines.push(format!("Age: {age}"));
    }
    if let Some(gender) = gender.map(str::trim).filter(|g| !g.is_empty()) {
        lines.push(format!("Gender: {gender}"));
    }
    lines.push(String::new());
    lines.push(CLOSING_INSTRUCTION.to_string());

    format!("{SYSTEM_PROMPT}\n\n{}", lines.join("\n"))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_prompt_with_all_fields() {
        let prompt = build_prompt("fever and cough", Some(34), Some("female"));
        assert!(prompt.starts_with(SYSTEM_PROMPT));
        assert!(prompt.contains("\n\nSymptoms: fever and cough\nAge: 34\nGender: female\n\n"));
        assert!(prompt.ends_with(CLOSING_INSTRUCTION));
    }

    #[test]
    fn test_prompt_omits_missing_fields() {
        let prompt = build_prompt("headache", None, Some("  "));
        assert!(prompt.contains("Symptoms: headache\n\nPlease analyze"));
        assert!(!prompt.contains("Age:"));
        assert!(!prompt.contains("Gender:"));
    }

    #[test]
    fn test_age_zero_is_kept() {
        let prompt = build_prompt("rash", Some(0), None);
        assert!(prompt.contains("Age: 0"));
    }

    #[test]
    fn test_prompt_is_deterministic() {
        assert_eq!(
            build_prompt("sore throat", Some(8), None),
            build_prompt("sore throat", Some(8), None)
        );
    }
}

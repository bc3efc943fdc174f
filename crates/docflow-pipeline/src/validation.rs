//! Field-level validation.
//!
//! Validation never blocks the pipeline: every finding is a warning
//! attached to the processing result. Only fields that carry a value are
//! format-checked; empty fields are legitimate (they are what the form
//! will collect).

use regex::Regex;

use docflow_core::defaults;
use docflow_core::{DetectedField, FieldType};

/// A non-blocking validation finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    pub field_name: String,
    pub code: &'static str,
    pub message: String,
}

/// Stateless per-type field validator.
pub struct FieldValidator {
    email_re: Regex,
    ssn_re: Regex,
    zip_re: Regex,
    date_re: Regex,
}

impl FieldValidator {
    pub fn new() -> Self {
        Self {
            email_re: Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap(),
            ssn_re: Regex::new(r"^\d{3}-?\d{2}-?\d{4}$").unwrap(),
            zip_re: Regex::new(r"^\d{5}(-\d{4})?$").unwrap(),
            date_re: Regex::new(r"^(\d{4}-\d{2}-\d{2}|\d{1,2}/\d{1,2}/\d{2,4})$").unwrap(),
        }
    }

    /// Validate a full field set, returning all warnings.
    pub fn validate(&self, fields: &[DetectedField]) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();

        for field in fields {
            if field.confidence < defaults::FIELD_CONFIDENCE_REVIEW_THRESHOLD {
                warnings.push(ValidationWarning {
                    field_name: field.name.clone(),
                    code: "low_confidence",
                    message: format!(
                        "confidence {:.2} below review threshold {:.2}",
                        field.confidence,
                        defaults::FIELD_CONFIDENCE_REVIEW_THRESHOLD
                    ),
                });
            }

            let value = match field.value.as_deref().map(str::trim) {
                Some(v) if !v.is_empty() => v,
                _ => continue,
            };

            if let Some(warning) = self.check_value(field, value) {
                warnings.push(warning);
            }
        }

        warnings
    }

    fn check_value(&self, field: &DetectedField, value: &str) -> Option<ValidationWarning> {
        let failed = match field.field_type {
            FieldType::Email => !self.email_re.is_match(value),
            FieldType::Phone => {
                let digits = value.chars().filter(|c| c.is_ascii_digit()).count();
                !(7..=15).contains(&digits)
            }
            FieldType::Ssn => !self.ssn_re.is_match(value),
            FieldType::Zip => !self.zip_re.is_match(value),
            FieldType::Date => !self.date_re.is_match(value),
            FieldType::Number | FieldType::Currency => {
                let stripped: String = value
                    .chars()
                    .filter(|c| !matches!(c, '$' | ',' | ' ' | '€' | '£'))
                    .collect();
                stripped.parse::<f64>().is_err()
            }
            _ => false,
        };

        failed.then(|| ValidationWarning {
            field_name: field.name.clone(),
            code: "format_mismatch",
            message: format!(
                "value {:?} does not look like a {}",
                value,
                field.field_type.as_str()
            ),
        })
    }
}

impl Default for FieldValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn field(name: &str, field_type: FieldType, value: Option<&str>, confidence: f32) -> DetectedField {
        DetectedField {
            id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            name: name.to_string(),
            label: name.to_string(),
            field_type,
            value: value.map(str::to_string),
            confidence,
            coordinates: None,
            source_strategy: "pattern".to_string(),
            metadata: json!({}),
        }
    }

    #[test]
    fn test_valid_values_pass() {
        let validator = FieldValidator::new();
        let fields = vec![
            field("email", FieldType::Email, Some("jo@example.com"), 0.9),
            field("phone", FieldType::Phone, Some("(555) 123-4567"), 0.9),
            field("ssn", FieldType::Ssn, Some("123-45-6789"), 0.9),
            field("zip", FieldType::Zip, Some("90210-1234"), 0.9),
            field("date", FieldType::Date, Some("2026-08-27"), 0.9),
            field("total", FieldType::Currency, Some("$1,200.50"), 0.9),
        ];
        assert!(validator.validate(&fields).is_empty());
    }

    #[test]
    fn test_bad_email_warns() {
        let validator = FieldValidator::new();
        let warnings = validator.validate(&[field(
            "email",
            FieldType::Email,
            Some("not-an-email"),
            0.9,
        )]);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].code, "format_mismatch");
    }

    #[test]
    fn test_phone_digit_count() {
        let validator = FieldValidator::new();
        let warnings = validator.validate(&[field("phone", FieldType::Phone, Some("12345"), 0.9)]);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_low_confidence_flagged_not_blocked() {
        let validator = FieldValidator::new();
        let warnings =
            validator.validate(&[field("guess", FieldType::Text, Some("anything"), 0.3)]);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].code, "low_confidence");
    }

    #[test]
    fn test_empty_value_not_format_checked() {
        let validator = FieldValidator::new();
        let warnings = validator.validate(&[field("email", FieldType::Email, None, 0.9)]);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_low_confidence_and_bad_format_both_reported() {
        let validator = FieldValidator::new();
        let warnings =
            validator.validate(&[field("zip", FieldType::Zip, Some("ABCDE"), 0.2)]);
        assert_eq!(warnings.len(), 2);
    }
}

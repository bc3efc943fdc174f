//! Heuristic text-pattern detection over extracted text.
//!
//! Looks for common label phrases ("Name:", "Email:", "Signature") and
//! checkbox markers in line-oriented text. Works on extracted text from an
//! earlier stage, or directly on the bytes for plain-text uploads.

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;
use tracing::debug;

use docflow_core::{defaults, DetectedField};

use super::field_types::infer_field_type;
use super::{DetectionOutcome, DetectionRequest, DetectionStrategy};

/// Label phrases that indicate a fillable field when followed by a colon
/// or an underscore run.
const LABEL_PATTERN: &str = r"(?mi)^[\s>*-]*(full name|first name|last name|name|e-?mail(?: address)?|phone(?: number)?|telephone|mobile|date of birth|date|address|city|state|zip(?: code)?|postal code|ssn|social security number|signature|amount|total)\s*[:：]\s*(\S.*)?$";

/// Underscore blank lines: "Name ________".
const BLANK_PATTERN: &str = r"(?mi)^[\s>*-]*([A-Za-z][A-Za-z /]{2,40}?)\s*_{3,}\s*$";

/// Checkbox markers: "[ ] I agree", "[x] Subscribe".
const CHECKBOX_PATTERN: &str = r"(?m)^\s*\[([ xX])\]\s*(\S.{0,80})$";

/// Strategy matching label phrases and form markers in text.
pub struct PatternStrategy {
    label_re: Regex,
    blank_re: Regex,
    checkbox_re: Regex,
}

impl PatternStrategy {
    pub fn new() -> Self {
        Self {
            label_re: Regex::new(LABEL_PATTERN).unwrap(),
            blank_re: Regex::new(BLANK_PATTERN).unwrap(),
            checkbox_re: Regex::new(CHECKBOX_PATTERN).unwrap(),
        }
    }

    fn text_for(&self, request: &DetectionRequest) -> Option<String> {
        if let Some(ref text) = request.text {
            return Some(text.clone());
        }
        if request.mime_type.starts_with("text/") {
            return String::from_utf8(request.content.clone()).ok();
        }
        None
    }

    fn normalize_name(label: &str) -> String {
        label
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect::<String>()
            .trim_matches('_')
            .to_string()
    }

    fn make_field(
        &self,
        request: &DetectionRequest,
        label: &str,
        value: Option<String>,
        kind: &str,
    ) -> DetectedField {
        let name = Self::normalize_name(label);
        let field_type = if kind == "checkbox" {
            docflow_core::FieldType::Checkbox
        } else {
            infer_field_type(&name, label)
        };

        DetectedField {
            id: docflow_core::uuid_utils::new_v7(),
            document_id: request.document_id,
            name,
            label: label.trim().to_string(),
            field_type,
            value,
            confidence: defaults::PATTERN_FIELD_CONFIDENCE,
            coordinates: None,
            source_strategy: "pattern".to_string(),
            metadata: json!({ "match_kind": kind }),
        }
    }
}

impl Default for PatternStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DetectionStrategy for PatternStrategy {
    fn id(&self) -> &'static str {
        "pattern"
    }

    async fn attempt(&self, request: &DetectionRequest) -> DetectionOutcome {
        let text = match self.text_for(request) {
            Some(text) => text,
            None => {
                return DetectionOutcome::NotApplicable {
                    reason: "no text available".to_string(),
                }
            }
        };

        let mut fields = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for captures in self.label_re.captures_iter(&text) {
            let label = &captures[1];
            let value = captures
                .get(2)
                .map(|m| m.as_str().trim().to_string())
                .filter(|v| !v.is_empty() && !v.chars().all(|c| c == '_'));
            let name = Self::normalize_name(label);
            if seen.insert(name) {
                fields.push(self.make_field(request, label, value, "label"));
            }
        }

        for captures in self.blank_re.captures_iter(&text) {
            let label = &captures[1];
            let name = Self::normalize_name(label);
            if seen.insert(name) {
                fields.push(self.make_field(request, label, None, "blank"));
            }
        }

        for captures in self.checkbox_re.captures_iter(&text) {
            let checked = !captures[1].trim().is_empty();
            let label = &captures[2];
            let name = Self::normalize_name(label);
            if seen.insert(name) {
                let value = checked.then(|| "checked".to_string());
                fields.push(self.make_field(request, label, value, "checkbox"));
            }
        }

        debug!(
            subsystem = "pipeline",
            component = "detection_chain",
            strategy = "pattern",
            document_id = %request.document_id,
            field_count = fields.len(),
            "Pattern scan complete"
        );

        DetectionOutcome::Success {
            fields,
            text: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docflow_core::FieldType;
    use uuid::Uuid;

    fn text_request(text: &str) -> DetectionRequest {
        DetectionRequest {
            document_id: Uuid::new_v4(),
            filename: "form.txt".to_string(),
            mime_type: "text/plain".to_string(),
            content: text.as_bytes().to_vec(),
            text: None,
        }
    }

    #[tokio::test]
    async fn test_label_matches_with_values() {
        let text = "Name: Jo Doe\nEmail: jo@example.com\nPhone:\n";
        let outcome = PatternStrategy::new().attempt(&text_request(text)).await;

        match outcome {
            DetectionOutcome::Success { fields, .. } => {
                assert_eq!(fields.len(), 3);
                assert_eq!(fields[0].name, "name");
                assert_eq!(fields[0].value.as_deref(), Some("Jo Doe"));
                assert_eq!(fields[1].field_type, FieldType::Email);
                assert_eq!(fields[1].value.as_deref(), Some("jo@example.com"));
                assert!(fields[2].value.is_none());
                assert!(fields.iter().all(|f| f.confidence == 0.7));
            }
            _ => panic!("expected success"),
        }
    }

    #[tokio::test]
    async fn test_blank_line_matches() {
        let text = "Signature ______________\n";
        let outcome = PatternStrategy::new().attempt(&text_request(text)).await;

        match outcome {
            DetectionOutcome::Success { fields, .. } => {
                assert_eq!(fields.len(), 1);
                assert_eq!(fields[0].field_type, FieldType::Signature);
            }
            _ => panic!("expected success"),
        }
    }

    #[tokio::test]
    async fn test_checkbox_markers() {
        let text = "[ ] Subscribe to newsletter\n[x] I agree to the terms\n";
        let outcome = PatternStrategy::new().attempt(&text_request(text)).await;

        match outcome {
            DetectionOutcome::Success { fields, .. } => {
                assert_eq!(fields.len(), 2);
                assert!(fields.iter().all(|f| f.field_type == FieldType::Checkbox));
                assert!(fields[0].value.is_none());
                assert_eq!(fields[1].value.as_deref(), Some("checked"));
            }
            _ => panic!("expected success"),
        }
    }

    #[tokio::test]
    async fn test_uses_provided_extracted_text() {
        let mut request = text_request("");
        request.mime_type = "application/pdf".to_string();
        request.content = b"%PDF-1.4".to_vec();
        request.text = Some("Date of Birth: 1990-01-01".to_string());

        let outcome = PatternStrategy::new().attempt(&request).await;
        match outcome {
            DetectionOutcome::Success { fields, .. } => {
                assert_eq!(fields.len(), 1);
                assert_eq!(fields[0].field_type, FieldType::Date);
            }
            _ => panic!("expected success"),
        }
    }

    #[tokio::test]
    async fn test_binary_without_text_declines() {
        let mut request = text_request("");
        request.mime_type = "application/pdf".to_string();
        let outcome = PatternStrategy::new().attempt(&request).await;
        assert!(matches!(outcome, DetectionOutcome::NotApplicable { .. }));
    }
}

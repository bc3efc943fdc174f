//! Native form-field extraction from embedded PDF form annotations.
//!
//! Scans the raw bytes for AcroForm field dictionaries instead of fully
//! parsing the PDF object graph. Field names come from `/T (...)` entries
//! and widget types from the nearby `/FT` key. Good enough for the common
//! uncompressed-dictionary case; compressed object streams simply yield
//! zero fields and the chain moves on.

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;
use tracing::debug;

use docflow_core::{defaults, DetectedField, FieldType};

use super::field_types::infer_field_type;
use super::{DetectionOutcome, DetectionRequest, DetectionStrategy};

/// Strategy reading interactive form annotations embedded in the file.
pub struct NativeFormStrategy {
    field_name_re: Regex,
    field_type_re: Regex,
}

impl NativeFormStrategy {
    pub fn new() -> Self {
        Self {
            // /T (field_name)
            field_name_re: Regex::new(r"/T\s*\(([^)]{1,128})\)").unwrap(),
            // /FT /Tx | /Btn | /Ch | /Sig
            field_type_re: Regex::new(r"/FT\s*/(Tx|Btn|Ch|Sig)").unwrap(),
        }
    }

    fn widget_type(&self, window: &str, name: &str) -> FieldType {
        match self.field_type_re.captures(window).map(|c| c[1].to_string()) {
            Some(ft) => match ft.as_str() {
                "Btn" => FieldType::Checkbox,
                "Ch" => FieldType::Select,
                "Sig" => FieldType::Signature,
                // Text widgets get refined by name inference.
                _ => infer_field_type(name, name),
            },
            None => infer_field_type(name, name),
        }
    }
}

impl Default for NativeFormStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DetectionStrategy for NativeFormStrategy {
    fn id(&self) -> &'static str {
        "native"
    }

    async fn attempt(&self, request: &DetectionRequest) -> DetectionOutcome {
        if request.mime_type != "application/pdf" {
            return DetectionOutcome::NotApplicable {
                reason: format!("not a PDF: {}", request.mime_type),
            };
        }

        let raw = String::from_utf8_lossy(&request.content);
        if !raw.contains("AcroForm") {
            return DetectionOutcome::NotApplicable {
                reason: "no embedded form dictionary".to_string(),
            };
        }

        let mut fields = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for captures in self.field_name_re.captures_iter(&raw) {
            let full = captures.get(0).unwrap();
            let name = captures[1].trim().to_string();
            if name.is_empty() || !seen.insert(name.clone()) {
                continue;
            }

            // The /FT key lives in the same dictionary, so a window around
            // the name entry is enough.
            let start = full.start().saturating_sub(200);
            let end = (full.end() + 200).min(raw.len());
            let window = &raw[start..end];

            let field_type = self.widget_type(window, &name);

            fields.push(DetectedField {
                id: docflow_core::uuid_utils::new_v7(),
                document_id: request.document_id,
                name: name.clone(),
                label: name,
                field_type,
                value: None,
                confidence: defaults::NATIVE_FIELD_CONFIDENCE,
                coordinates: None,
                source_strategy: "native".to_string(),
                metadata: json!({ "acroform": true }),
            });
        }

        debug!(
            subsystem = "pipeline",
            component = "detection_chain",
            strategy = "native",
            document_id = %request.document_id,
            field_count = fields.len(),
            "Scanned embedded form annotations"
        );

        DetectionOutcome::Success {
            fields,
            text: None,
        }
    }
}

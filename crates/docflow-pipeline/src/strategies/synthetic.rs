//! Last-resort synthetic placeholder fields.
//!
//! When no real detection works, the document still gets an editable
//! field set so the form UI has something to render. The document kind is
//! guessed from the filename and any extracted text, and a per-kind field
//! template is emitted. Fields are clearly flagged as synthetic in
//! metadata; their confidence is deliberately high so they rank as
//! plausible defaults rather than review candidates.

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use docflow_core::{defaults, DetectedField, FieldType};

use super::{DetectionOutcome, DetectionRequest, DetectionStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentKind {
    Invoice,
    Application,
    Contract,
    Generic,
}

impl DocumentKind {
    fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Invoice => "invoice",
            DocumentKind::Application => "application",
            DocumentKind::Contract => "contract",
            DocumentKind::Generic => "generic",
        }
    }
}

const KIND_KEYWORDS: &[(DocumentKind, &[(&str, f32)])] = &[
    (
        DocumentKind::Invoice,
        &[
            ("invoice", 3.0),
            ("receipt", 2.5),
            ("bill", 2.0),
            ("amount due", 2.5),
            ("total", 1.0),
        ],
    ),
    (
        DocumentKind::Application,
        &[
            ("application", 3.0),
            ("enrollment", 2.5),
            ("registration", 2.5),
            ("applicant", 2.0),
            ("form", 1.0),
        ],
    ),
    (
        DocumentKind::Contract,
        &[
            ("contract", 3.0),
            ("agreement", 3.0),
            ("lease", 2.5),
            ("terms", 1.5),
            ("party", 1.0),
        ],
    ),
];

/// Per-kind placeholder field templates: (name, label, type).
fn template(kind: DocumentKind) -> &'static [(&'static str, &'static str, FieldType)] {
    match kind {
        DocumentKind::Invoice => &[
            ("invoice_number", "Invoice Number", FieldType::Number),
            ("invoice_date", "Invoice Date", FieldType::Date),
            ("total_amount", "Total Amount", FieldType::Currency),
            ("billing_address", "Billing Address", FieldType::Address),
        ],
        DocumentKind::Application => &[
            ("full_name", "Full Name", FieldType::Text),
            ("email", "Email", FieldType::Email),
            ("phone", "Phone", FieldType::Phone),
            ("date_of_birth", "Date of Birth", FieldType::Date),
            ("address", "Address", FieldType::Address),
            ("signature", "Signature", FieldType::Signature),
        ],
        DocumentKind::Contract => &[
            ("party_name", "Party Name", FieldType::Text),
            ("effective_date", "Effective Date", FieldType::Date),
            ("signature", "Signature", FieldType::Signature),
            ("date_signed", "Date Signed", FieldType::Date),
        ],
        DocumentKind::Generic => &[
            ("full_name", "Full Name", FieldType::Text),
            ("email", "Email", FieldType::Email),
            ("date", "Date", FieldType::Date),
            ("signature", "Signature", FieldType::Signature),
        ],
    }
}

/// Always-applicable fallback strategy producing placeholder fields.
#[derive(Debug, Clone, Default)]
pub struct SyntheticStrategy;

impl SyntheticStrategy {
    pub fn new() -> Self {
        Self
    }

    fn classify(haystack: &str) -> (DocumentKind, f32) {
        let mut best = (DocumentKind::Generic, 0.0f32);
        for (kind, keywords) in KIND_KEYWORDS {
            let score: f32 = keywords
                .iter()
                .filter(|(kw, _)| haystack.contains(kw))
                .map(|(_, w)| w)
                .sum();
            if score > best.1 {
                best = (*kind, score);
            }
        }
        best
    }
}

#[async_trait]
impl DetectionStrategy for SyntheticStrategy {
    fn id(&self) -> &'static str {
        "synthetic"
    }

    async fn attempt(&self, request: &DetectionRequest) -> DetectionOutcome {
        let mut haystack = request.filename.to_lowercase();
        if let Some(ref text) = request.text {
            haystack.push(' ');
            // A prefix is enough for kind detection.
            haystack.push_str(&text.chars().take(2000).collect::<String>().to_lowercase());
        }

        let (kind, score) = Self::classify(&haystack);

        // Stronger keyword evidence pushes confidence from the base toward
        // 1.0; a generic guess stays at the base.
        let confidence =
            (defaults::SYNTHETIC_FIELD_CONFIDENCE + score * 0.03).clamp(0.0, 1.0);

        let fields: Vec<DetectedField> = template(kind)
            .iter()
            .map(|(name, label, field_type)| DetectedField {
                id: docflow_core::uuid_utils::new_v7(),
                document_id: request.document_id,
                name: name.to_string(),
                label: label.to_string(),
                field_type: *field_type,
                value: None,
                confidence,
                coordinates: None,
                source_strategy: "synthetic".to_string(),
                metadata: json!({ "synthetic": true, "document_kind": kind.as_str() }),
            })
            .collect();

        debug!(
            subsystem = "pipeline",
            component = "detection_chain",
            strategy = "synthetic",
            document_id = %request.document_id,
            document_kind = kind.as_str(),
            field_count = fields.len(),
            "Generated placeholder fields"
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
    use uuid::Uuid;

    fn request(filename: &str, text: Option<&str>) -> DetectionRequest {
        DetectionRequest {
            document_id: Uuid::new_v4(),
            filename: filename.to_string(),
            mime_type: "application/pdf".to_string(),
            content: b"%PDF-1.4".to_vec(),
            text: text.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_always_produces_fields() {
        let outcome = SyntheticStrategy::new()
            .attempt(&request("scan0001.pdf", None))
            .await;
        match outcome {
            DetectionOutcome::Success { fields, .. } => {
                assert!(!fields.is_empty());
                assert!(fields
                    .iter()
                    .all(|f| f.metadata["synthetic"].as_bool() == Some(true)));
            }
            _ => panic!("expected success"),
        }
    }

    #[tokio::test]
    async fn test_invoice_kind_from_filename() {
        let outcome = SyntheticStrategy::new()
            .attempt(&request("acme-invoice-2026.pdf", None))
            .await;
        match outcome {
            DetectionOutcome::Success { fields, .. } => {
                assert!(fields.iter().any(|f| f.name == "total_amount"));
                assert!(fields
                    .iter()
                    .all(|f| f.metadata["document_kind"] == "invoice"));
            }
            _ => panic!("expected success"),
        }
    }

    #[tokio::test]
    async fn test_application_kind_from_text() {
        let outcome = SyntheticStrategy::new()
            .attempt(&request(
                "doc.pdf",
                Some("Rental Application. The applicant must complete this form."),
            ))
            .await;
        match outcome {
            DetectionOutcome::Success { fields, .. } => {
                assert!(fields.iter().any(|f| f.name == "date_of_birth"));
            }
            _ => panic!("expected success"),
        }
    }

    #[tokio::test]
    async fn test_confidence_range() {
        for (name, text) in [
            ("scan.pdf", None),
            ("invoice.pdf", Some("invoice receipt bill amount due total")),
        ] {
            let outcome = SyntheticStrategy::new().attempt(&request(name, text)).await;
            match outcome {
                DetectionOutcome::Success { fields, .. } => {
                    for field in fields {
                        assert!(field.confidence >= 0.85);
                        assert!(field.confidence <= 1.0);
                    }
                }
                _ => panic!("expected success"),
            }
        }
    }
}

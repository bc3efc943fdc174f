//! Field type inference from names and labels.
//!
//! Every strategy runs its raw field names through the same weighted
//! keyword scoring so "email_address", "E-Mail" and "contact email" all
//! land on the same type.

use docflow_core::FieldType;

/// Keyword weights per field type. Higher weight wins ties with more
/// generic keywords ("no" in "phone no" vs "number").
const KEYWORD_WEIGHTS: &[(FieldType, &[(&str, f32)])] = &[
    (
        FieldType::Email,
        &[("email", 3.0), ("e-mail", 3.0), ("mail", 1.0)],
    ),
    (
        FieldType::Phone,
        &[
            ("phone", 3.0),
            ("mobile", 2.5),
            ("fax", 2.0),
            ("telephone", 3.0),
            ("cell", 2.0),
        ],
    ),
    (
        FieldType::Date,
        &[
            ("date", 3.0),
            ("dob", 3.0),
            ("birth", 2.0),
            ("expiry", 2.0),
            ("expiration", 2.0),
            ("issued", 1.5),
        ],
    ),
    (
        FieldType::Ssn,
        &[
            ("ssn", 4.0),
            ("social security", 4.0),
            ("tax id", 2.5),
            ("tin", 2.0),
        ],
    ),
    (
        FieldType::Zip,
        &[("zip", 3.0), ("postal", 3.0), ("postcode", 3.0)],
    ),
    (
        FieldType::Currency,
        &[
            ("amount", 2.5),
            ("price", 2.5),
            ("total", 2.0),
            ("salary", 2.5),
            ("cost", 2.0),
            ("fee", 2.0),
            ("payment", 2.0),
        ],
    ),
    (
        FieldType::Number,
        &[
            ("number", 1.5),
            ("count", 1.5),
            ("quantity", 2.0),
            ("qty", 2.0),
            ("age", 2.0),
        ],
    ),
    (
        FieldType::Checkbox,
        &[
            ("checkbox", 3.0),
            ("check box", 3.0),
            ("agree", 2.0),
            ("consent", 2.0),
            ("accept", 1.5),
            ("opt in", 2.0),
        ],
    ),
    (
        FieldType::Radio,
        &[("radio", 3.0), ("choice", 1.5), ("option", 1.0)],
    ),
    (
        FieldType::Signature,
        &[("signature", 4.0), ("sign here", 4.0), ("signed", 2.0)],
    ),
    (
        FieldType::Address,
        &[
            ("address", 3.0),
            ("street", 2.5),
            ("city", 2.0),
            ("state", 1.0),
            ("country", 2.0),
        ],
    ),
    (
        FieldType::Select,
        &[("select", 2.5), ("dropdown", 3.0), ("drop-down", 3.0)],
    ),
    (
        FieldType::Textarea,
        &[
            ("comments", 2.5),
            ("description", 2.5),
            ("notes", 2.0),
            ("remarks", 2.5),
            ("message", 1.5),
        ],
    ),
];

/// Infer a field type from its name and label.
pub fn infer_field_type(name: &str, label: &str) -> FieldType {
    infer_field_type_scored(name, label).0
}

/// Infer a field type along with the winning keyword score.
///
/// Returns score 0.0 with [`FieldType::Text`] when nothing matches.
pub fn infer_field_type_scored(name: &str, label: &str) -> (FieldType, f32) {
    let haystack = format!("{} {}", name, label).to_lowercase();

    let mut best = (FieldType::Text, 0.0f32);
    for (field_type, keywords) in KEYWORD_WEIGHTS {
        let score: f32 = keywords
            .iter()
            .filter(|(kw, _)| haystack.contains(kw))
            .map(|(_, w)| w)
            .sum();
        if score > best.1 {
            best = (*field_type, score);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_inference() {
        assert_eq!(infer_field_type("email_address", ""), FieldType::Email);
        assert_eq!(infer_field_type("contact", "E-Mail"), FieldType::Email);
    }

    #[test]
    fn test_phone_beats_number() {
        // "phone number" contains both keywords; the phone weight wins.
        assert_eq!(infer_field_type("phone_number", ""), FieldType::Phone);
    }

    #[test]
    fn test_ssn_inference() {
        assert_eq!(
            infer_field_type("applicant_ssn", "Social Security Number"),
            FieldType::Ssn
        );
    }

    #[test]
    fn test_currency_inference() {
        assert_eq!(infer_field_type("total_amount", ""), FieldType::Currency);
    }

    #[test]
    fn test_signature_inference() {
        assert_eq!(
            infer_field_type("sig_1", "Signature of Applicant"),
            FieldType::Signature
        );
    }

    #[test]
    fn test_unmatched_defaults_to_text() {
        let (field_type, score) = infer_field_type_scored("xyzzy", "Frobnicate");
        assert_eq!(field_type, FieldType::Text);
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_label_contributes() {
        assert_eq!(
            infer_field_type("field_7", "Date of Birth"),
            FieldType::Date
        );
    }
}

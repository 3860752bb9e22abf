//! Content validation configuration.

use serde::{Deserialize, Serialize};

/// How the signature table is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Only declared types with a matching signature are accepted.
    #[serde(alias = "whitelist")]
    Allowlist,
    /// Declared types with a matching signature are refused.
    #[serde(alias = "blacklist")]
    Denylist,
}

/// Signatures registered for one MIME type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MimeTypeSignature {
    /// Declared MIME type, e.g. `image/png`.
    pub mime_type: String,
    /// Candidate leading byte sequences, hex encoded (spaces allowed).
    pub signatures: Vec<String>,
}

impl MimeTypeSignature {
    pub fn new(mime_type: impl Into<String>, signatures: &[&str]) -> Self {
        Self {
            mime_type: mime_type.into(),
            signatures: signatures.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Validation policy: a mode plus the signature table it applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentValidationOptions {
    pub validation_mode: ValidationMode,
    #[serde(default)]
    pub mime_type_signatures: Vec<MimeTypeSignature>,
}

impl Default for ContentValidationOptions {
    /// A deny-list with no entries: every file is accepted.
    fn default() -> Self {
        Self {
            validation_mode: ValidationMode::Denylist,
            mime_type_signatures: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_deserialization() {
        let json = r#"{
            "validationMode": "whitelist",
            "mimeTypeSignatures": [
                { "mimeType": "image/png", "signatures": ["89504E470D0A1A0A", "89 50 4E 47"] },
                { "mimeType": "image/jpeg", "signatures": ["FFD8FF"] }
            ]
        }"#;

        let options: ContentValidationOptions = serde_json::from_str(json).unwrap();
        assert_eq!(options.validation_mode, ValidationMode::Allowlist);
        assert_eq!(options.mime_type_signatures.len(), 2);

        let png = options
            .mime_type_signatures
            .iter()
            .find(|s| s.mime_type == "image/png")
            .unwrap();
        assert_eq!(png.signatures.len(), 2);

        let jpeg = options
            .mime_type_signatures
            .iter()
            .find(|s| s.mime_type == "image/jpeg")
            .unwrap();
        assert_eq!(jpeg.signatures.len(), 1);
    }

    #[test]
    fn test_mode_names() {
        let mode: ValidationMode = serde_json::from_str("\"blacklist\"").unwrap();
        assert_eq!(mode, ValidationMode::Denylist);
        let mode: ValidationMode = serde_json::from_str("\"allowlist\"").unwrap();
        assert_eq!(mode, ValidationMode::Allowlist);
    }

    #[test]
    fn test_default_blocks_nothing() {
        let options = ContentValidationOptions::default();
        assert_eq!(options.validation_mode, ValidationMode::Denylist);
        assert!(options.mime_type_signatures.is_empty());
    }
}

//! Byte signatures and the per-type signature table.

use std::collections::HashMap;

use filestore_common::{Error, Result};

use crate::options::MimeTypeSignature;

/// A leading byte sequence characteristic of a file format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature(Vec<u8>);

impl Signature {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Parse a hex encoded signature. Whitespace between digits is ignored.
    pub fn from_hex(value: &str) -> Result<Self> {
        let digits: String = value.chars().filter(|c| !c.is_whitespace()).collect();
        if digits.is_empty() {
            return Err(Error::Configuration(
                "Content signature cannot be empty".to_string(),
            ));
        }

        let bytes = hex::decode(&digits).map_err(|e| {
            Error::Configuration(format!("Invalid content signature '{}': {}", value, e))
        })?;
        Ok(Self(bytes))
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Whether `content` begins with exactly these bytes.
    pub fn matches(&self, content: &[u8]) -> bool {
        content.starts_with(&self.0)
    }
}

/// Immutable lookup of declared MIME type to candidate signatures.
///
/// MIME types are compared case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct SignatureTable {
    rules: HashMap<String, Vec<Signature>>,
    longest: usize,
}

impl SignatureTable {
    /// Build the table from configuration entries.
    ///
    /// Entries for the same type are merged in order.
    ///
    /// # Errors
    /// - An entry has an empty MIME type
    /// - A signature is not valid hex
    pub fn from_entries(entries: &[MimeTypeSignature]) -> Result<Self> {
        let mut rules: HashMap<String, Vec<Signature>> = HashMap::new();

        for entry in entries {
            let mime_type = normalize(&entry.mime_type);
            if mime_type.is_empty() {
                return Err(Error::Configuration(
                    "Content signature entry has an empty MIME type".to_string(),
                ));
            }

            let signatures = entry
                .signatures
                .iter()
                .map(|s| Signature::from_hex(s))
                .collect::<Result<Vec<_>>>()?;

            rules.entry(mime_type).or_default().extend(signatures);
        }

        let longest = rules
            .values()
            .flatten()
            .map(Signature::len)
            .max()
            .unwrap_or(0);

        Ok(Self { rules, longest })
    }

    /// Signatures registered for `mime_type`, empty when the type is unknown.
    pub fn signatures_for(&self, mime_type: &str) -> &[Signature] {
        self.rules
            .get(&normalize(mime_type))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether the declared type is covered and the content matches one of
    /// its signatures. A type without signatures is never covered.
    pub fn is_covered(&self, content: &[u8], mime_type: &str) -> bool {
        self.signatures_for(mime_type)
            .iter()
            .any(|signature| signature.matches(content))
    }

    /// Number of leading bytes needed to decide any rule in the table.
    pub fn longest_signature(&self) -> usize {
        self.longest
    }
}

fn normalize(mime_type: &str) -> String {
    mime_type.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_table() -> SignatureTable {
        SignatureTable::from_entries(&[
            MimeTypeSignature::new("image/png", &["89504E470D0A1A0A"]),
            MimeTypeSignature::new("image/jpeg", &["FF D8 FF E0", "FF D8 FF E1"]),
        ])
        .unwrap()
    }

    #[test]
    fn test_signature_from_hex() {
        let signature = Signature::from_hex("ff d8 ff").unwrap();
        assert_eq!(signature.as_bytes(), &[0xFF, 0xD8, 0xFF]);
    }

    #[test]
    fn test_signature_invalid_hex_fails() {
        assert!(Signature::from_hex("zz").is_err());
        assert!(Signature::from_hex("ABC").is_err());
        assert!(Signature::from_hex("  ").is_err());
    }

    #[test]
    fn test_signature_matches_prefix_only() {
        let signature = Signature::new(vec![0x25, 0x50, 0x44, 0x46]);
        assert!(signature.matches(b"%PDF-1.7 ..."));
        assert!(!signature.matches(b"%PD"));
        assert!(!signature.matches(b" %PDF"));
    }

    #[test]
    fn test_table_lookup_is_case_insensitive() {
        let table = png_table();
        assert_eq!(table.signatures_for("IMAGE/PNG").len(), 1);
        assert_eq!(table.signatures_for("image/jpeg").len(), 2);
        assert!(table.signatures_for("text/plain").is_empty());
    }

    #[test]
    fn test_table_coverage() {
        let table = png_table();
        let png = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00];
        assert!(table.is_covered(&png, "image/png"));
        assert!(!table.is_covered(&png, "image/jpeg"));
        assert!(!table.is_covered(&png, "text/plain"));
        assert!(table.is_covered(&[0xFF, 0xD8, 0xFF, 0xE1, 0x10], "image/jpeg"));
    }

    #[test]
    fn test_table_longest_signature() {
        assert_eq!(png_table().longest_signature(), 8);
        assert_eq!(SignatureTable::default().longest_signature(), 0);
    }

    #[test]
    fn test_duplicate_entries_merge() {
        let table = SignatureTable::from_entries(&[
            MimeTypeSignature::new("image/png", &["89504E47"]),
            MimeTypeSignature::new("Image/PNG", &["00"]),
        ])
        .unwrap();
        assert_eq!(table.signatures_for("image/png").len(), 2);
    }
}

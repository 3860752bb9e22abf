//! Allow-list / deny-list admission decisions.

use std::sync::Arc;
use tracing::{debug, warn};

use filestore_common::{ByteStream, Error, Result};

use crate::options::{ContentValidationOptions, ValidationMode};
use crate::peek::peek_prefix;
use crate::signature::SignatureTable;

/// Decides whether a file may be stored, given its bytes and declared type.
///
/// * Allow-list: allowed iff the declared type is covered by the table and
///   the content starts with one of its signatures.
/// * Deny-list: the exact negation of the allow-list test over the same
///   table. An empty table therefore blocks nothing.
///
/// A refused file is reported as `false`; only I/O failures while reading a
/// stream produce errors. Cloning is cheap and the policy never changes.
#[derive(Debug, Clone)]
pub struct ContentValidator {
    mode: ValidationMode,
    table: Arc<SignatureTable>,
}

impl ContentValidator {
    /// Build a validator from configuration.
    ///
    /// # Errors
    /// - A signature entry is malformed
    pub fn from_options(options: &ContentValidationOptions) -> Result<Self> {
        let table = SignatureTable::from_entries(&options.mime_type_signatures)?;
        Ok(Self::new(options.validation_mode, table))
    }

    pub fn new(mode: ValidationMode, table: SignatureTable) -> Self {
        Self {
            mode,
            table: Arc::new(table),
        }
    }

    /// A deny-list with no entries.
    pub fn allow_all() -> Self {
        Self::new(ValidationMode::Denylist, SignatureTable::default())
    }

    pub fn mode(&self) -> ValidationMode {
        self.mode
    }

    /// Decide admission for in-memory content.
    pub fn is_allowed(&self, content: &[u8], mime_type: &str) -> bool {
        let covered = self.table.is_covered(content, mime_type);
        match self.mode {
            ValidationMode::Allowlist => covered,
            ValidationMode::Denylist => !covered,
        }
    }

    /// Decide admission for streamed content.
    ///
    /// Only the head of the stream is read. The returned stream yields the
    /// complete original content and must be used in place of `content`.
    pub async fn is_stream_allowed(
        &self,
        content: ByteStream,
        mime_type: &str,
    ) -> Result<(bool, ByteStream)> {
        let (head, content) = peek_prefix(content, self.table.longest_signature()).await?;
        Ok((self.is_allowed(&head, mime_type), content))
    }

    /// Like [`is_allowed`](Self::is_allowed) but turns a refusal into
    /// [`Error::ContentRejected`] for upload paths.
    pub fn ensure_allowed(&self, name: &str, content: &[u8], mime_type: &str) -> Result<()> {
        if self.is_allowed(content, mime_type) {
            debug!("Content of '{}' accepted as {}", name, mime_type);
            Ok(())
        } else {
            Err(rejected(name, mime_type))
        }
    }

    /// Stream variant of [`ensure_allowed`](Self::ensure_allowed).
    pub async fn ensure_stream_allowed(
        &self,
        name: &str,
        content: ByteStream,
        mime_type: &str,
    ) -> Result<ByteStream> {
        let (allowed, content) = self.is_stream_allowed(content, mime_type).await?;
        if allowed {
            debug!("Content of '{}' accepted as {}", name, mime_type);
            Ok(content)
        } else {
            Err(rejected(name, mime_type))
        }
    }
}

impl Default for ContentValidator {
    fn default() -> Self {
        Self::allow_all()
    }
}

fn rejected(name: &str, mime_type: &str) -> Error {
    warn!("Content of '{}' rejected for declared type {}", name, mime_type);
    Error::ContentRejected {
        name: name.to_string(),
        content_type: mime_type.to_string(),
    }
}

//! Common types used throughout the file storage crates.

use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Byte stream type for upload/download operations.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Unique identifier for a stored file.
///
/// Never the nil UUID. Used directly as the object key by every backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Uuid", into = "Uuid")]
pub struct FileId(Uuid);

impl FileId {
    /// Mint a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing identifier, e.g. when re-hydrating from persistence.
    ///
    /// # Errors
    /// - Returns error if `key` is the nil UUID
    pub fn new(key: Uuid) -> Result<Self> {
        if key.is_nil() {
            return Err(Error::InvalidInput(
                "File id cannot be the nil identifier".to_string(),
            ));
        }
        Ok(Self(key))
    }

    /// Parse an identifier from its string form.
    pub fn parse(value: &str) -> Result<Self> {
        let key = Uuid::parse_str(value)
            .map_err(|e| Error::InvalidInput(format!("Invalid file id '{}': {}", value, e)))?;
        Self::new(key)
    }

    /// Get the underlying UUID.
    pub fn key(&self) -> Uuid {
        self.0
    }
}

impl TryFrom<Uuid> for FileId {
    type Error = Error;

    fn try_from(value: Uuid) -> Result<Self> {
        Self::new(value)
    }
}

impl From<FileId> for Uuid {
    fn from(value: FileId) -> Self {
        value.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metadata for a stored file.
///
/// The record is owned by the caller; storage backends create it on upload
/// and update it when content is replaced, but never persist it themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "FileRecordData")]
pub struct FileRecord {
    id: FileId,
    name: String,
    size: u64,
    content_type: String,
}

#[derive(Deserialize)]
struct FileRecordData {
    id: FileId,
    name: String,
    size: u64,
    content_type: String,
}

impl TryFrom<FileRecordData> for FileRecord {
    type Error = Error;

    fn try_from(data: FileRecordData) -> Result<Self> {
        Self::with_id(data.id, data.name, data.size, data.content_type)
    }
}

impl FileRecord {
    /// Create a record for a new file with a freshly minted id.
    ///
    /// # Errors
    /// - Name is empty or whitespace
    /// - Content type is empty or whitespace
    pub fn new(
        name: impl Into<String>,
        size: u64,
        content_type: impl Into<String>,
    ) -> Result<Self> {
        Self::with_id(FileId::generate(), name, size, content_type)
    }

    /// Create a record with an explicitly supplied id.
    pub fn with_id(
        id: FileId,
        name: impl Into<String>,
        size: u64,
        content_type: impl Into<String>,
    ) -> Result<Self> {
        let name = name.into();
        let content_type = content_type.into();

        if name.trim().is_empty() {
            return Err(Error::InvalidInput("File name cannot be empty".to_string()));
        }
        ensure_content_type(&content_type)?;

        Ok(Self {
            id,
            name,
            size,
            content_type,
        })
    }

    pub fn id(&self) -> FileId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Replace size and content type together after a content swap.
    ///
    /// # Postconditions
    /// - On error neither field has changed
    pub fn update_content_info(
        &mut self,
        size: u64,
        content_type: impl Into<String>,
    ) -> Result<()> {
        let content_type = content_type.into();
        ensure_content_type(&content_type)?;

        self.size = size;
        self.content_type = content_type;
        Ok(())
    }

    /// Duplicate this record's metadata as a new logical file.
    ///
    /// The copy gets a fresh id. A blank `name` keeps the original name.
    pub fn copy(&self, name: Option<&str>) -> Self {
        let name = match name {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => self.name.clone(),
        };

        Self {
            id: FileId::generate(),
            name,
            size: self.size,
            content_type: self.content_type.clone(),
        }
    }
}

fn ensure_content_type(content_type: &str) -> Result<()> {
    if content_type.trim().is_empty() {
        return Err(Error::InvalidInput(
            "Content type cannot be empty".to_string(),
        ));
    }
    Ok(())
}

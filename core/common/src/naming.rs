//! Provider naming rules for blob keys, container names and tags.
//!
//! Object stores reject malformed names with opaque remote errors. These
//! checks run locally so the failure is immediate and names the broken rule.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::NamingError;

/// Maximum blob key length in characters.
pub const MAX_BLOB_NAME_LEN: usize = 1024;
/// Maximum number of `/` delimited segments in a blob key.
pub const MAX_BLOB_SEGMENTS: usize = 254;
/// Minimum container name length.
pub const MIN_CONTAINER_NAME_LEN: usize = 3;
/// Maximum container name length.
pub const MAX_CONTAINER_NAME_LEN: usize = 63;
/// Maximum number of tags on a single object.
pub const MAX_TAGS: usize = 10;

const MAX_TAG_KEY_LEN: usize = 128;
const MAX_TAG_VALUE_LEN: usize = 256;

/// Validate a blob key.
///
/// # Errors
/// - Empty key
/// - Length outside 1..=1024
/// - Trailing `.` or `/`
/// - More than 254 `/` delimited segments
/// - A segment ending in `.`
pub fn validate_blob_name(name: &str) -> Result<(), NamingError> {
    if name.trim().is_empty() {
        return Err(NamingError::EmptyBlobName);
    }

    let len = name.chars().count();
    if len > MAX_BLOB_NAME_LEN {
        return Err(NamingError::BlobNameLength(len));
    }

    if name.ends_with('.') || name.ends_with('/') {
        return Err(NamingError::BlobNameTrailingCharacter);
    }

    let segments: Vec<&str> = name.split('/').collect();
    if segments.len() > MAX_BLOB_SEGMENTS {
        return Err(NamingError::TooManySegments(segments.len()));
    }

    if let Some(segment) = segments.iter().find(|s| s.ends_with('.')) {
        return Err(NamingError::SegmentEndsWithDot(segment.to_string()));
    }

    Ok(())
}

/// Validate a container name.
///
/// # Errors
/// - Empty name
/// - Length outside 3..=63
/// - Characters other than `[a-z0-9-]`
/// - Leading or trailing hyphen
/// - Two hyphens in a row
pub fn validate_container_name(name: &str) -> Result<(), NamingError> {
    if name.trim().is_empty() {
        return Err(NamingError::EmptyContainerName);
    }

    let len = name.chars().count();
    if !(MIN_CONTAINER_NAME_LEN..=MAX_CONTAINER_NAME_LEN).contains(&len) {
        return Err(NamingError::ContainerNameLength(len));
    }

    if !name
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '-'))
    {
        return Err(NamingError::ContainerNameCharacters);
    }

    if name.starts_with('-') || name.ends_with('-') {
        return Err(NamingError::ContainerNameBoundary);
    }

    if name.contains("--") {
        return Err(NamingError::ContainerNameConsecutiveHyphens);
    }

    Ok(())
}

/// Validate a tag set before it is sent to a backend.
pub fn validate_tags(tags: &HashMap<String, String>) -> Result<(), NamingError> {
    if tags.len() > MAX_TAGS {
        return Err(NamingError::TooManyTags {
            count: tags.len(),
            max: MAX_TAGS,
        });
    }

    for (key, value) in tags {
        let key_len = key.chars().count();
        if key_len == 0 || key_len > MAX_TAG_KEY_LEN {
            return Err(NamingError::TagKeyLength(key.clone()));
        }
        if value.chars().count() > MAX_TAG_VALUE_LEN {
            return Err(NamingError::TagValueLength(key.clone()));
        }
    }

    Ok(())
}

/// A container name that has passed [`validate_container_name`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContainerName(String);

impl ContainerName {
    /// Parse and validate a container name.
    pub fn parse(name: impl Into<String>) -> Result<Self, NamingError> {
        let name = name.into();
        validate_container_name(&name)?;
        Ok(Self(name))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ContainerName {
    type Error = NamingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ContainerName> for String {
    fn from(value: ContainerName) -> Self {
        value.0
    }
}

impl fmt::Display for ContainerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

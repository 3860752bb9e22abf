//! Common utilities and types shared across the file storage crates.
//!
//! This crate holds the vocabulary every backend speaks: the error taxonomy,
//! the [`FileRecord`] entity, the byte stream alias used for transfers, and
//! the provider naming rules that are checked before any network call.

pub mod error;
pub mod naming;
pub mod types;

pub use error::{Error, NamingError, Result};
pub use naming::{validate_blob_name, validate_container_name, validate_tags, ContainerName};
pub use types::{ByteStream, FileId, FileRecord};

//! File storage contracts.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use std::collections::HashMap;
use std::fmt;
use tokio_util::sync::CancellationToken;
use url::Url;

use filestore_common::{ByteStream, FileId, FileRecord, Result};

use crate::archive;

/// A file's content together with the metadata needed to serve it.
pub struct FileContent {
    pub name: String,
    pub content_type: String,
    pub content: ByteStream,
}

impl fmt::Debug for FileContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileContent")
            .field("name", &self.name)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Wrap in-memory content as a single-chunk stream.
pub fn bytes_stream(content: Bytes) -> ByteStream {
    Box::pin(stream::once(async move { Ok(content) }))
}

/// Storage backend for opaque files.
///
/// Content is validated before any byte reaches the backend. Records are
/// returned to the caller, who owns their persistence; backends address
/// content by [`FileId`] only.
///
/// Every operation honours `cancel` at its next suspension point.
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Get the backend name (e.g., "filesystem", "blob").
    fn name(&self) -> &str;

    /// Store a new file.
    ///
    /// # Postconditions
    /// - Returns a record with a fresh id and the stored size
    ///
    /// # Errors
    /// - `ContentRejected` if validation refuses the content
    /// - `InvalidInput` for an empty name or content type
    async fn upload(
        &self,
        name: &str,
        content: ByteStream,
        content_type: &str,
        cancel: &CancellationToken,
    ) -> Result<FileRecord>;

    /// Store a new file from memory.
    async fn upload_bytes(
        &self,
        name: &str,
        content: Bytes,
        content_type: &str,
        cancel: &CancellationToken,
    ) -> Result<FileRecord> {
        self.upload(name, bytes_stream(content), content_type, cancel)
            .await
    }

    /// Replace a file's content.
    ///
    /// A `content_type` of `None` keeps the record's current type. On
    /// success the record's size and type are updated together.
    async fn update_content(
        &self,
        record: &mut FileRecord,
        content: ByteStream,
        content_type: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Replace a file's content from memory.
    async fn update_content_bytes(
        &self,
        record: &mut FileRecord,
        content: Bytes,
        content_type: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.update_content(record, bytes_stream(content), content_type, cancel)
            .await
    }

    /// Duplicate a file under a fresh id, optionally renaming it.
    async fn copy(
        &self,
        record: &FileRecord,
        name: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<FileRecord>;

    /// Stream a file's content.
    ///
    /// # Errors
    /// - `NotFound` if no content is stored under `id`
    async fn download(&self, id: FileId, cancel: &CancellationToken) -> Result<ByteStream>;

    /// Stream a file's content with its stored name and type.
    async fn download_with_metadata(
        &self,
        id: FileId,
        cancel: &CancellationToken,
    ) -> Result<FileContent>;

    /// Bundle several files into one zip archive.
    ///
    /// The whole archive fails if any file fails; the error names the file.
    async fn download_zip(&self, ids: &[FileId], cancel: &CancellationToken) -> Result<ByteStream> {
        archive::build_zip(self, ids, cancel).await
    }

    /// Whether content is stored under `id`.
    async fn exists(&self, id: FileId, cancel: &CancellationToken) -> Result<bool>;

    /// Remove a file's content.
    ///
    /// # Errors
    /// - `NotFound` if no content is stored under `id`
    async fn delete(&self, id: FileId, cancel: &CancellationToken) -> Result<()>;

    /// A stable URL the file can be read from.
    async fn get_file_url(&self, id: FileId, cancel: &CancellationToken) -> Result<Url>;
}

/// Object-storage backends additionally hand out capability URLs and
/// manage tags.
#[async_trait]
pub trait CloudFileStorage: FileStorage {
    async fn get_download_url(&self, id: FileId, cancel: &CancellationToken) -> Result<Url>;

    async fn get_upload_url(&self, id: FileId, cancel: &CancellationToken) -> Result<Url>;

    async fn get_delete_url(&self, id: FileId, cancel: &CancellationToken) -> Result<Url>;

    /// Store a new file and set its tags.
    ///
    /// Tags are validated before the upload starts.
    async fn upload_with_tags(
        &self,
        name: &str,
        content: ByteStream,
        content_type: &str,
        tags: &HashMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<FileRecord>;

    /// Replace the tag set of a stored file.
    async fn set_tags(
        &self,
        id: FileId,
        tags: &HashMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

//! Local filesystem storage backend.

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use filestore_common::{ByteStream, Error, FileId, FileRecord, Result};
use filestore_content::ContentValidator;

use crate::cancel::{ensure_active, run_cancellable};
use crate::options::FileSystemStorageOptions;
use crate::provider::{FileContent, FileStorage};

const META_SUFFIX: &str = ".meta.json";
const PARTIAL_SUFFIX: &str = ".partial";

/// Sidecar kept next to each stored file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredMetadata {
    name: String,
    content_type: String,
}

/// Local filesystem storage backend.
///
/// Stores each file as `<root>/<id>` with its name and content type in
/// `<root>/<id>.meta.json`. Both are staged under `.partial` names unique to
/// one write and renamed into place, sidecar first. Readers never see a
/// half-written file and concurrent writers of one id end last-writer-wins.
pub struct LocalFileStorage {
    root: PathBuf,
    allow_download_url: bool,
    validator: ContentValidator,
}

impl LocalFileStorage {
    /// Create a backend rooted at `options.storage_root_path`.
    ///
    /// # Postconditions
    /// - Root directory is created if it doesn't exist
    ///
    /// # Errors
    /// - Root cannot be created or resolved
    pub fn new(options: &FileSystemStorageOptions, validator: ContentValidator) -> Result<Self> {
        let root = &options.storage_root_path;
        if root.as_os_str().is_empty() {
            return Err(Error::Configuration(
                "Storage root path cannot be empty".to_string(),
            ));
        }

        std::fs::create_dir_all(root)?;
        let root = std::fs::canonicalize(root)?;

        Ok(Self {
            root,
            allow_download_url: options.allow_download_url,
            validator,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn content_path(&self, id: FileId) -> PathBuf {
        self.root.join(id.to_string())
    }

    fn meta_path(&self, id: FileId) -> PathBuf {
        self.root.join(format!("{}{}", id, META_SUFFIX))
    }

    /// Content and sidecar staging paths private to one write.
    fn staging_paths(&self, id: FileId) -> (PathBuf, PathBuf) {
        let write = Uuid::new_v4().simple();
        (
            self.root.join(format!("{}.{}{}", id, write, PARTIAL_SUFFIX)),
            self.root
                .join(format!("{}.{}{}{}", id, write, META_SUFFIX, PARTIAL_SUFFIX)),
        )
    }

    /// Store content and sidecar for `id`, returning the byte count.
    ///
    /// Nothing is replaced unless both were staged. When the sidecar cannot
    /// be committed the previous version stays intact. `fresh` marks a new
    /// file whose sidecar is removed again if the content fails to land.
    async fn store(
        &self,
        id: FileId,
        metadata: &StoredMetadata,
        content: ByteStream,
        fresh: bool,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let (partial, meta_partial) = self.staging_paths(id);

        let size = match stage(&partial, &meta_partial, metadata, content, cancel).await {
            Ok(size) => size,
            Err(error) => {
                discard(&partial).await;
                discard(&meta_partial).await;
                return Err(error);
            }
        };

        if let Err(error) = fs::rename(&meta_partial, self.meta_path(id)).await {
            discard(&partial).await;
            discard(&meta_partial).await;
            return Err(error.into());
        }

        if let Err(error) = fs::rename(&partial, self.content_path(id)).await {
            discard(&partial).await;
            if fresh {
                discard(&self.meta_path(id)).await;
            }
            return Err(error.into());
        }

        debug!("Wrote {} bytes for {}", size, id);
        Ok(size)
    }

    async fn write_metadata(&self, id: FileId, metadata: &StoredMetadata) -> Result<()> {
        fs::write(self.meta_path(id), encode_metadata(metadata)?).await?;
        Ok(())
    }

    async fn read_metadata(&self, id: FileId) -> Result<StoredMetadata> {
        let json = fs::read(self.meta_path(id))
            .await
            .map_err(|e| not_found_or(e, id))?;
        serde_json::from_slice(&json).map_err(|e| Error::Serialization(e.to_string()))
    }

    async fn open(&self, id: FileId) -> Result<ByteStream> {
        let file = fs::File::open(self.content_path(id))
            .await
            .map_err(|e| not_found_or(e, id))?;
        Ok(ReaderStream::new(file).map_err(Error::from).boxed())
    }
}

async fn stage(
    partial: &Path,
    meta_partial: &Path,
    metadata: &StoredMetadata,
    content: ByteStream,
    cancel: &CancellationToken,
) -> Result<u64> {
    let size = run_cancellable(cancel, write_stream(partial, content)).await?;
    fs::write(meta_partial, encode_metadata(metadata)?).await?;
    Ok(size)
}

fn encode_metadata(metadata: &StoredMetadata) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(metadata).map_err(|e| Error::Serialization(e.to_string()))
}

async fn discard(path: &Path) {
    if let Err(error) = fs::remove_file(path).await {
        if error.kind() != ErrorKind::NotFound {
            debug!("Could not remove {}: {}", path.display(), error);
        }
    }
}

async fn write_stream(path: &Path, mut content: ByteStream) -> Result<u64> {
    let mut file = fs::File::create(path).await?;
    let mut size = 0u64;

    while let Some(chunk) = content.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        size += chunk.len() as u64;
    }

    file.flush().await?;
    file.sync_all().await?;
    Ok(size)
}

fn not_found_or(error: std::io::Error, id: FileId) -> Error {
    if error.kind() == ErrorKind::NotFound {
        Error::NotFound(format!("File not found: {}", id))
    } else {
        Error::Io(error)
    }
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    fn name(&self) -> &str {
        "filesystem"
    }

    async fn upload(
        &self,
        name: &str,
        content: ByteStream,
        content_type: &str,
        cancel: &CancellationToken,
    ) -> Result<FileRecord> {
        ensure_active(cancel)?;
        let mut record = FileRecord::new(name, 0, content_type)?;
        let content = self
            .validator
            .ensure_stream_allowed(name, content, content_type)
            .await?;

        let metadata = StoredMetadata {
            name: record.name().to_string(),
            content_type: content_type.to_string(),
        };
        let size = self.store(record.id(), &metadata, content, true, cancel).await?;

        record.update_content_info(size, content_type)?;
        Ok(record)
    }

    async fn update_content(
        &self,
        record: &mut FileRecord,
        content: ByteStream,
        content_type: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        ensure_active(cancel)?;
        let content_type = content_type.unwrap_or(record.content_type()).to_string();
        if content_type.trim().is_empty() {
            return Err(Error::InvalidInput("Content type cannot be empty".to_string()));
        }

        let content = self
            .validator
            .ensure_stream_allowed(record.name(), content, &content_type)
            .await?;

        let metadata = StoredMetadata {
            name: record.name().to_string(),
            content_type: content_type.clone(),
        };
        let size = self.store(record.id(), &metadata, content, false, cancel).await?;

        record.update_content_info(size, content_type)
    }

    async fn copy(
        &self,
        record: &FileRecord,
        name: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<FileRecord> {
        ensure_active(cancel)?;
        let copy = record.copy(name);

        run_cancellable(cancel, async {
            fs::copy(self.content_path(record.id()), self.content_path(copy.id()))
                .await
                .map_err(|e| not_found_or(e, record.id()))
        })
        .await?;

        let metadata = StoredMetadata {
            name: copy.name().to_string(),
            content_type: copy.content_type().to_string(),
        };
        if let Err(error) = self.write_metadata(copy.id(), &metadata).await {
            discard(&self.content_path(copy.id())).await;
            return Err(error);
        }

        debug!("Copied {} to {}", record.id(), copy.id());
        Ok(copy)
    }

    async fn download(&self, id: FileId, cancel: &CancellationToken) -> Result<ByteStream> {
        ensure_active(cancel)?;
        self.open(id).await
    }

    async fn download_with_metadata(
        &self,
        id: FileId,
        cancel: &CancellationToken,
    ) -> Result<FileContent> {
        ensure_active(cancel)?;
        let content = self.open(id).await?;
        let metadata = self.read_metadata(id).await?;

        Ok(FileContent {
            name: metadata.name,
            content_type: metadata.content_type,
            content,
        })
    }

    async fn exists(&self, id: FileId, cancel: &CancellationToken) -> Result<bool> {
        ensure_active(cancel)?;
        Ok(fs::try_exists(self.content_path(id)).await?)
    }

    async fn delete(&self, id: FileId, cancel: &CancellationToken) -> Result<()> {
        ensure_active(cancel)?;
        fs::remove_file(self.content_path(id))
            .await
            .map_err(|e| not_found_or(e, id))?;

        match fs::remove_file(self.meta_path(id)).await {
            Err(e) if e.kind() != ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }

        debug!("Deleted {}", id);
        Ok(())
    }

    async fn get_file_url(&self, id: FileId, cancel: &CancellationToken) -> Result<Url> {
        ensure_active(cancel)?;
        if !self.allow_download_url {
            return Err(Error::NotPermitted(
                "Download URLs are disabled for this storage".to_string(),
            ));
        }

        let path = self.content_path(id);
        if !fs::try_exists(&path).await? {
            return Err(Error::NotFound(format!("File not found: {}", id)));
        }

        Url::from_file_path(&path).map_err(|_| {
            Error::InvalidInput(format!("Cannot express '{}' as a URL", path.display()))
        })
    }
}

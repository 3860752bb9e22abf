//! Object-storage backend facade.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use filestore_common::{validate_tags, ByteStream, Error, FileId, FileRecord, Result};
use filestore_content::ContentValidator;
use filestore_signing::CloudStorageAction;

use crate::backend::ObjectStoreClient;
use crate::cancel::{ensure_active, run_cancellable};
use crate::container::{ContainerRef, SharedContainer};
use crate::issuer::{SigningStrategy, UrlIssuer};
use crate::options::StorageOptions;
use crate::provider::{CloudFileStorage, FileContent, FileStorage};

/// File storage on an object store.
///
/// Each file is one object keyed by its id, with the file name and content
/// type stored as object properties. The container is created on first use.
pub struct BlobStorage {
    container: Arc<SharedContainer>,
    validator: ContentValidator,
    issuer: Option<UrlIssuer>,
}

impl BlobStorage {
    /// Build a backend. Capability URLs are only available when a shared
    /// access duration is configured.
    ///
    /// # Errors
    /// - Credential rule broken (neither or both modes set)
    /// - Invalid container name
    /// - A configured duration that is not strictly positive
    /// - A duration with shared-key signing but no account key
    pub fn new(
        client: Arc<dyn ObjectStoreClient>,
        options: &StorageOptions,
        validator: ContentValidator,
    ) -> Result<Self> {
        let credential = options.credential()?;
        let duration = options.shared_access_duration()?;
        let container = Arc::new(SharedContainer::new(client, &options.container_name)?);

        let issuer = match duration {
            Some(duration) => Some(UrlIssuer::new(
                SigningStrategy::select(&credential, options.signing_mode)?,
                container.clone(),
                duration,
            )?),
            None => None,
        };

        Ok(Self {
            container,
            validator,
            issuer,
        })
    }

    /// Build a backend that issues capability URLs.
    ///
    /// # Errors
    /// - As [`new`](Self::new), and a missing shared access duration
    pub fn cloud(
        client: Arc<dyn ObjectStoreClient>,
        options: &StorageOptions,
        validator: ContentValidator,
    ) -> Result<Self> {
        options.require_shared_access_duration()?;
        Self::new(client, options, validator)
    }

    pub fn container(&self) -> &SharedContainer {
        &self.container
    }

    fn client(&self) -> &Arc<dyn ObjectStoreClient> {
        self.container.client()
    }

    async fn ready(&self, cancel: &CancellationToken) -> Result<ContainerRef> {
        self.container.get_container(cancel).await
    }

    fn issuer(&self) -> Result<&UrlIssuer> {
        self.issuer.as_ref().ok_or_else(|| {
            Error::Configuration(
                "Capability URLs require a shared access duration".to_string(),
            )
        })
    }

    async fn issue(
        &self,
        id: FileId,
        action: CloudStorageAction,
        cancel: &CancellationToken,
    ) -> Result<Url> {
        self.issuer()?.issue_url(&id.to_string(), action, cancel).await
    }

    async fn put(
        &self,
        record: &FileRecord,
        content: ByteStream,
        content_type: &str,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let container = self.ready(cancel).await?;
        let key = record.id().to_string();
        let size = run_cancellable(
            cancel,
            self.client().put_object(
                container.name(),
                &key,
                content,
                content_type,
                record.name(),
            ),
        )
        .await?;
        debug!("Uploaded {} ({} bytes) to '{}'", key, size, container.name());
        Ok(size)
    }
}

#[async_trait]
impl FileStorage for BlobStorage {
    fn name(&self) -> &str {
        "blob"
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

        let size = self.put(&record, content, content_type, cancel).await?;
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

        let size = self.put(record, content, &content_type, cancel).await?;
        record.update_content_info(size, content_type)
    }

    async fn copy(
        &self,
        record: &FileRecord,
        name: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<FileRecord> {
        let container = self.ready(cancel).await?;
        let copy = record.copy(name);

        run_cancellable(
            cancel,
            self.client().copy_object(
                container.name(),
                &record.id().to_string(),
                &copy.id().to_string(),
                copy.name(),
            ),
        )
        .await?;

        debug!("Copied {} to {}", record.id(), copy.id());
        Ok(copy)
    }

    async fn download(&self, id: FileId, cancel: &CancellationToken) -> Result<ByteStream> {
        Ok(self.download_with_metadata(id, cancel).await?.content)
    }

    async fn download_with_metadata(
        &self,
        id: FileId,
        cancel: &CancellationToken,
    ) -> Result<FileContent> {
        let container = self.ready(cancel).await?;
        let key = id.to_string();
        let object =
            run_cancellable(cancel, self.client().get_object(container.name(), &key)).await?;

        Ok(FileContent {
            name: object.properties.file_name.unwrap_or(key),
            content_type: object.properties.content_type,
            content: object.content,
        })
    }

    async fn exists(&self, id: FileId, cancel: &CancellationToken) -> Result<bool> {
        let container = self.ready(cancel).await?;
        run_cancellable(
            cancel,
            self.client().object_exists(container.name(), &id.to_string()),
        )
        .await
    }

    async fn delete(&self, id: FileId, cancel: &CancellationToken) -> Result<()> {
        let container = self.ready(cancel).await?;
        run_cancellable(
            cancel,
            self.client().delete_object(container.name(), &id.to_string()),
        )
        .await?;
        debug!("Deleted {} from '{}'", id, container.name());
        Ok(())
    }

    /// A signed download URL, or the plain object URL when no shared access
    /// duration is configured.
    async fn get_file_url(&self, id: FileId, cancel: &CancellationToken) -> Result<Url> {
        match &self.issuer {
            Some(_) => self.issue(id, CloudStorageAction::Download, cancel).await,
            None => self.ready(cancel).await?.object_url(&id.to_string()),
        }
    }
}

#[async_trait]
impl CloudFileStorage for BlobStorage {
    async fn get_download_url(&self, id: FileId, cancel: &CancellationToken) -> Result<Url> {
        self.issue(id, CloudStorageAction::Download, cancel).await
    }

    async fn get_upload_url(&self, id: FileId, cancel: &CancellationToken) -> Result<Url> {
        self.issue(id, CloudStorageAction::Upload, cancel).await
    }

    async fn get_delete_url(&self, id: FileId, cancel: &CancellationToken) -> Result<Url> {
        self.issue(id, CloudStorageAction::Delete, cancel).await
    }

    async fn upload_with_tags(
        &self,
        name: &str,
        content: ByteStream,
        content_type: &str,
        tags: &HashMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<FileRecord> {
        validate_tags(tags)?;
        let record = self.upload(name, content, content_type, cancel).await?;
        if !tags.is_empty() {
            self.set_tags(record.id(), tags, cancel).await?;
        }
        Ok(record)
    }

    async fn set_tags(
        &self,
        id: FileId,
        tags: &HashMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        validate_tags(tags)?;
        let container = self.ready(cancel).await?;
        run_cancellable(
            cancel,
            self.client().set_object_tags(container.name(), &id.to_string(), tags),
        )
        .await?;
        debug!("Set {} tags on {}", tags.len(), id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::collect_stream;
    use crate::memory::MemoryObjectStore;
    use crate::provider::bytes_stream;
    use bytes::Bytes;
    use filestore_common::ContainerName;
    use filestore_content::{ContentValidationOptions, MimeTypeSignature, ValidationMode};
    use filestore_signing::{Permissions, SharedAccessSignature, SigningKey};

    const ACCOUNT_KEY: &str = "c2VjcmV0LWtleQ==";

    fn options(duration: Option<i64>) -> StorageOptions {
        StorageOptions {
            connection_string: Some(format!("AccountName=devaccount;AccountKey={}", ACCOUNT_KEY)),
            container_name: "media".to_string(),
            shared_access_duration_secs: duration,
            ..Default::default()
        }
    }

    fn setup(duration: Option<i64>) -> (BlobStorage, Arc<MemoryObjectStore>) {
        let store = Arc::new(MemoryObjectStore::with_endpoint(
            "https://devaccount.blob.example.net",
        ));
        let storage =
            BlobStorage::new(store.clone(), &options(duration), ContentValidator::default())
                .unwrap();
        (storage, store)
    }

    fn media() -> ContainerName {
        ContainerName::parse("media").unwrap()
    }

    fn tags(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_construction_rules() {
        let store: Arc<dyn ObjectStoreClient> = Arc::new(MemoryObjectStore::new());

        assert!(
            BlobStorage::new(store.clone(), &options(None), ContentValidator::default()).is_ok()
        );
        assert!(matches!(
            BlobStorage::cloud(store.clone(), &options(None), ContentValidator::default()),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            BlobStorage::cloud(store.clone(), &options(Some(0)), ContentValidator::default()),
            Err(Error::Configuration(_))
        ));

        let no_credential = StorageOptions {
            connection_string: None,
            ..options(Some(60))
        };
        assert!(matches!(
            BlobStorage::new(store.clone(), &no_credential, ContentValidator::default()),
            Err(Error::Configuration(_))
        ));

        let bad_container = StorageOptions {
            container_name: "Media".to_string(),
            ..options(Some(60))
        };
        assert!(matches!(
            BlobStorage::new(store, &bad_container, ContentValidator::default()),
            Err(Error::Naming(_))
        ));
    }

    #[test]
    fn test_missing_account_key_fails_before_network() {
        let store = Arc::new(MemoryObjectStore::new());
        let keyless = StorageOptions {
            connection_string: Some("AccountName=devaccount".to_string()),
            ..options(Some(600))
        };

        let err = BlobStorage::cloud(store.clone(), &keyless, ContentValidator::default())
            .err()
            .unwrap();
        assert!(matches!(err, Error::Configuration(_)));
        assert_eq!(store.create_calls(), 0);

        let without_urls = StorageOptions {
            shared_access_duration_secs: None,
            ..keyless
        };
        assert!(BlobStorage::new(store, &without_urls, ContentValidator::default()).is_ok());
    }

    #[tokio::test]
    async fn test_upload_download() {
        let (storage, store) = setup(None);
        let cancel = CancellationToken::new();

        let record = storage
            .upload_bytes("hello.txt", Bytes::from_static(b"Hello"), "text/plain", &cancel)
            .await
            .unwrap();
        assert_eq!(record.size(), 5);

        let file = storage
            .download_with_metadata(record.id(), &cancel)
            .await
            .unwrap();
        assert_eq!(file.name, "hello.txt");
        assert_eq!(file.content_type, "text/plain");
        assert_eq!(collect_stream(file.content).await.unwrap(), b"Hello");

        assert!(storage.exists(record.id(), &cancel).await.unwrap());
        assert_eq!(store.create_calls(), 1);
    }

    #[tokio::test]
    async fn test_rejected_content_never_reaches_store() {
        let store = Arc::new(MemoryObjectStore::new());
        let validator = ContentValidator::from_options(&ContentValidationOptions {
            validation_mode: ValidationMode::Allowlist,
            mime_type_signatures: vec![MimeTypeSignature::new("application/pdf", &["25504446"])],
        })
        .unwrap();
        let storage = BlobStorage::new(store.clone(), &options(None), validator).unwrap();
        let cancel = CancellationToken::new();

        let err = storage
            .upload_bytes("x.pdf", Bytes::from_static(b"MZ\x90\x00"), "application/pdf", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ContentRejected { .. }));
        assert_eq!(store.object_count(&media()).await, 0);

        storage
            .upload_bytes("y.pdf", Bytes::from_static(b"%PDF-1.7"), "application/pdf", &cancel)
            .await
            .unwrap();
        assert_eq!(store.object_count(&media()).await, 1);
    }

    #[tokio::test]
    async fn test_update_copy_delete() {
        let (storage, _store) = setup(None);
        let cancel = CancellationToken::new();

        let mut record = storage
            .upload_bytes("a.json", Bytes::from_static(b"{}"), "application/json", &cancel)
            .await
            .unwrap();
        storage
            .update_content_bytes(&mut record, Bytes::from_static(b"{\"k\":1}"), None, &cancel)
            .await
            .unwrap();
        assert_eq!(record.size(), 7);
        assert_eq!(record.content_type(), "application/json");

        let copy = storage.copy(&record, Some("b.json"), &cancel).await.unwrap();
        assert_ne!(copy.id(), record.id());
        let file = storage.download_with_metadata(copy.id(), &cancel).await.unwrap();
        assert_eq!(file.name, "b.json");
        assert_eq!(collect_stream(file.content).await.unwrap(), b"{\"k\":1}");

        storage.delete(record.id(), &cancel).await.unwrap();
        assert!(!storage.exists(record.id(), &cancel).await.unwrap());
        assert!(storage.exists(copy.id(), &cancel).await.unwrap());
        assert!(storage.delete(record.id(), &cancel).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_tags() {
        let (storage, store) = setup(None);
        let cancel = CancellationToken::new();

        let record = storage
            .upload_with_tags(
                "a.txt",
                bytes_stream(Bytes::from_static(b"x")),
                "text/plain",
                &tags(&[("project", "apollo")]),
                &cancel,
            )
            .await
            .unwrap();
        let stored = store.tags(&media(), &record.id().to_string()).await.unwrap();
        assert_eq!(stored.get("project").map(String::as_str), Some("apollo"));

        storage
            .set_tags(record.id(), &tags(&[("stage", "final")]), &cancel)
            .await
            .unwrap();
        let stored = store.tags(&media(), &record.id().to_string()).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored.contains_key("stage"));
    }

    #[tokio::test]
    async fn test_invalid_tags_rejected_before_upload() {
        let (storage, store) = setup(None);
        let cancel = CancellationToken::new();
        let too_many: HashMap<String, String> =
            (0..11).map(|i| (format!("k{}", i), "v".to_string())).collect();

        let err = storage
            .upload_with_tags(
                "a.txt",
                bytes_stream(Bytes::from_static(b"x")),
                "text/plain",
                &too_many,
                &cancel,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Naming(_)));
        assert_eq!(store.object_count(&media()).await, 0);
    }

    #[tokio::test]
    async fn test_capability_urls() {
        let (storage, _store) = setup(Some(600));
        let cancel = CancellationToken::new();
        let record = storage
            .upload_bytes("a.txt", Bytes::from_static(b"x"), "text/plain", &cancel)
            .await
            .unwrap();
        let key = SigningKey::from_base64(ACCOUNT_KEY).unwrap();

        let id = record.id();
        for (url, action) in [
            (storage.get_download_url(id, &cancel).await.unwrap(), CloudStorageAction::Download),
            (storage.get_upload_url(id, &cancel).await.unwrap(), CloudStorageAction::Upload),
            (storage.get_delete_url(id, &cancel).await.unwrap(), CloudStorageAction::Delete),
        ] {
            assert!(url.as_str().starts_with(&format!(
                "https://devaccount.blob.example.net/media/{}?",
                record.id()
            )));
            let sas = SharedAccessSignature::from_url(&url).unwrap();
            assert_eq!(sas.permissions, Permissions::for_action(action));
            sas.verify(
                "devaccount",
                "media",
                &record.id().to_string(),
                &key,
                sas.window.starts_on(),
            )
            .unwrap();
        }

        let file_url = storage.get_file_url(record.id(), &cancel).await.unwrap();
        let file_sas = SharedAccessSignature::from_url(&file_url).unwrap();
        assert!(file_sas.permits(CloudStorageAction::Download));
    }

    #[tokio::test]
    async fn test_urls_without_duration() {
        let (storage, _store) = setup(None);
        let cancel = CancellationToken::new();
        let id = FileId::generate();

        assert!(matches!(
            storage.get_download_url(id, &cancel).await,
            Err(Error::Configuration(_))
        ));

        let url = storage.get_file_url(id, &cancel).await.unwrap();
        assert_eq!(
            url.as_str(),
            format!("https://devaccount.blob.example.net/media/{}", id)
        );
    }

    #[tokio::test]
    async fn test_download_zip() {
        let (storage, _store) = setup(None);
        let cancel = CancellationToken::new();
        let a = storage
            .upload_bytes("a.txt", Bytes::from_static(b"alpha"), "text/plain", &cancel)
            .await
            .unwrap();
        let missing = FileId::generate();

        let archive = storage.download_zip(&[a.id()], &cancel).await.unwrap();
        assert!(!collect_stream(archive).await.unwrap().is_empty());

        let err = storage
            .download_zip(&[a.id(), missing], &cancel)
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains(&missing.to_string()));
    }
}

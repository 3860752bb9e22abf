//! Object store capability consumed by the blob backend.
//!
//! Concrete network clients live outside this crate. They implement
//! [`ObjectStoreClient`] and are injected into
//! [`BlobStorage`](crate::cloud::BlobStorage).

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

use filestore_common::{ByteStream, ContainerName, Error, Result};
use filestore_signing::{AccessWindow, DelegationKey, SasRequest, UrlSigningKey};

/// Properties stored with an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectProperties {
    pub content_type: String,
    /// Original file name, recorded at upload.
    pub file_name: Option<String>,
    pub size: u64,
}

/// An object's properties together with its content.
pub struct StoredObject {
    pub properties: ObjectProperties,
    pub content: ByteStream,
}

/// Operations a storage service must offer.
///
/// Keys passed in have already been validated. A missing object is reported
/// as [`Error::NotFound`]; every other failure as [`Error::Backend`].
#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    /// Client name for logs, e.g. "memory".
    fn name(&self) -> &str;

    /// Base URL of a container.
    fn container_url(&self, container: &ContainerName) -> Result<Url>;

    /// Create the container unless it already exists.
    async fn create_container_if_missing(&self, container: &ContainerName) -> Result<()>;

    /// Store `content` under `key`, replacing any existing object.
    ///
    /// Returns the number of bytes written.
    async fn put_object(
        &self,
        container: &ContainerName,
        key: &str,
        content: ByteStream,
        content_type: &str,
        file_name: &str,
    ) -> Result<u64>;

    async fn get_object(&self, container: &ContainerName, key: &str) -> Result<StoredObject>;

    async fn delete_object(&self, container: &ContainerName, key: &str) -> Result<()>;

    async fn object_exists(&self, container: &ContainerName, key: &str) -> Result<bool>;

    /// Replace the object's tag set.
    async fn set_object_tags(
        &self,
        container: &ContainerName,
        key: &str,
        tags: &HashMap<String, String>,
    ) -> Result<()>;

    /// Copy an object within the container, recording a new file name.
    ///
    /// The default reads the source and writes it back.
    async fn copy_object(
        &self,
        container: &ContainerName,
        source_key: &str,
        target_key: &str,
        file_name: &str,
    ) -> Result<()> {
        let source = self.get_object(container, source_key).await?;
        self.put_object(
            container,
            target_key,
            source.content,
            &source.properties.content_type,
            file_name,
        )
        .await?;
        Ok(())
    }

    /// Turn `url`, the address of one object, into a capability URL
    /// granting `request`.
    ///
    /// Signing is local; no network call is made.
    fn sign_url(&self, url: Url, _request: &SasRequest, _key: UrlSigningKey<'_>) -> Result<Url> {
        Err(Error::Configuration(format!(
            "Object store '{}' does not sign URLs (requested for {})",
            self.name(),
            url
        )))
    }

    /// Obtain a delegated signing key valid for `window`.
    async fn fetch_delegation_key(&self, _window: &AccessWindow) -> Result<DelegationKey> {
        Err(Error::Configuration(format!(
            "Object store '{}' does not issue delegation keys",
            self.name()
        )))
    }
}

/// URL of one object: `{container_url}/{key}` with the key as a single
/// encoded path segment.
pub fn object_url(container_url: &Url, key: &str) -> Result<Url> {
    let mut url = container_url.clone();
    url.path_segments_mut()
        .map_err(|_| {
            Error::Configuration(format!("Container URL '{}' cannot hold objects", container_url))
        })?
        .pop_if_empty()
        .push(key);
    Ok(url)
}

/// Read a whole stream into memory.
pub async fn collect_stream(mut content: ByteStream) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    while let Some(chunk) = content.next().await {
        data.extend_from_slice(&chunk?);
    }
    Ok(data)
}

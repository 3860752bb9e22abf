//! In-memory object store for testing.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use filestore_common::{ByteStream, ContainerName, Error, Result};
use filestore_signing::{
    AccessWindow, DelegationKey, SasRequest, SharedAccessSignature, SigningKey, UrlSigningKey,
};

use crate::backend::{collect_stream, ObjectProperties, ObjectStoreClient, StoredObject};

const DEFAULT_ENDPOINT: &str = "https://memory.blob.localhost";

#[derive(Debug, Clone)]
struct MemoryObject {
    data: Bytes,
    content_type: String,
    file_name: String,
    tags: HashMap<String, String>,
}

/// In-memory object store.
///
/// Useful for testing and development. All data is stored in memory
/// and lost on drop.
pub struct MemoryObjectStore {
    endpoint: String,
    containers: RwLock<HashMap<String, HashMap<String, MemoryObject>>>,
    delegation_principal: Option<String>,
    issued_keys: RwLock<Vec<DelegationKey>>,
    create_calls: AtomicUsize,
}

impl MemoryObjectStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::with_endpoint(DEFAULT_ENDPOINT)
    }

    /// Create a store that reports `endpoint` as its base URL.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            containers: RwLock::new(HashMap::new()),
            delegation_principal: None,
            issued_keys: RwLock::new(Vec::new()),
            create_calls: AtomicUsize::new(0),
        }
    }

    /// Issue delegation keys to `object_id`.
    pub fn with_delegation(mut self, object_id: impl Into<String>) -> Self {
        self.delegation_principal = Some(object_id.into());
        self
    }

    /// Number of times a container creation was requested.
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Delegation keys handed out so far.
    pub async fn issued_keys(&self) -> Vec<DelegationKey> {
        self.issued_keys.read().await.clone()
    }

    /// Tags currently set on an object.
    pub async fn tags(
        &self,
        container: &ContainerName,
        key: &str,
    ) -> Option<HashMap<String, String>> {
        let containers = self.containers.read().await;
        containers
            .get(container.as_str())
            .and_then(|objects| objects.get(key))
            .map(|object| object.tags.clone())
    }

    /// Number of objects in a container.
    pub async fn object_count(&self, container: &ContainerName) -> usize {
        let containers = self.containers.read().await;
        containers.get(container.as_str()).map_or(0, HashMap::len)
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

fn missing_container(container: &ContainerName) -> Error {
    Error::NotFound(format!("Container not found: {}", container))
}

fn missing_object(container: &ContainerName, key: &str) -> Error {
    Error::NotFound(format!("Object not found: {}/{}", container, key))
}

#[async_trait]
impl ObjectStoreClient for MemoryObjectStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn container_url(&self, container: &ContainerName) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint).map_err(|e| {
            Error::Configuration(format!("Invalid endpoint '{}': {}", self.endpoint, e))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                Error::Configuration(format!("Endpoint '{}' cannot hold paths", self.endpoint))
            })?
            .pop_if_empty()
            .push(container.as_str());
        Ok(url)
    }

    async fn create_container_if_missing(&self, container: &ContainerName) -> Result<()> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let mut containers = self.containers.write().await;
        containers.entry(container.as_str().to_string()).or_default();
        Ok(())
    }

    async fn put_object(
        &self,
        container: &ContainerName,
        key: &str,
        content: ByteStream,
        content_type: &str,
        file_name: &str,
    ) -> Result<u64> {
        let data = Bytes::from(collect_stream(content).await?);
        let size = data.len() as u64;

        let mut containers = self.containers.write().await;
        let objects = containers
            .get_mut(container.as_str())
            .ok_or_else(|| missing_container(container))?;

        objects.insert(
            key.to_string(),
            MemoryObject {
                data,
                content_type: content_type.to_string(),
                file_name: file_name.to_string(),
                tags: HashMap::new(),
            },
        );
        debug!("Stored {} bytes at {}/{}", size, container, key);
        Ok(size)
    }

    async fn get_object(&self, container: &ContainerName, key: &str) -> Result<StoredObject> {
        let containers = self.containers.read().await;
        let object = containers
            .get(container.as_str())
            .ok_or_else(|| missing_container(container))?
            .get(key)
            .ok_or_else(|| missing_object(container, key))?;

        let data = object.data.clone();
        Ok(StoredObject {
            properties: ObjectProperties {
                content_type: object.content_type.clone(),
                file_name: Some(object.file_name.clone()),
                size: data.len() as u64,
            },
            content: Box::pin(stream::once(async move { Ok(data) })),
        })
    }

    async fn delete_object(&self, container: &ContainerName, key: &str) -> Result<()> {
        let mut containers = self.containers.write().await;
        containers
            .get_mut(container.as_str())
            .ok_or_else(|| missing_container(container))?
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| missing_object(container, key))
    }

    async fn object_exists(&self, container: &ContainerName, key: &str) -> Result<bool> {
        let containers = self.containers.read().await;
        Ok(containers
            .get(container.as_str())
            .is_some_and(|objects| objects.contains_key(key)))
    }

    async fn set_object_tags(
        &self,
        container: &ContainerName,
        key: &str,
        tags: &HashMap<String, String>,
    ) -> Result<()> {
        let mut containers = self.containers.write().await;
        let object = containers
            .get_mut(container.as_str())
            .ok_or_else(|| missing_container(container))?
            .get_mut(key)
            .ok_or_else(|| missing_object(container, key))?;
        object.tags = tags.clone();
        Ok(())
    }

    async fn copy_object(
        &self,
        container: &ContainerName,
        source_key: &str,
        target_key: &str,
        file_name: &str,
    ) -> Result<()> {
        let mut containers = self.containers.write().await;
        let objects = containers
            .get_mut(container.as_str())
            .ok_or_else(|| missing_container(container))?;

        let mut copy = objects
            .get(source_key)
            .cloned()
            .ok_or_else(|| missing_object(container, source_key))?;
        copy.file_name = file_name.to_string();
        copy.tags.clear();
        objects.insert(target_key.to_string(), copy);
        Ok(())
    }

    /// Signs with the crate's own BLAKE2b capability format.
    fn sign_url(&self, mut url: Url, request: &SasRequest, key: UrlSigningKey<'_>) -> Result<Url> {
        SharedAccessSignature::sign_with(request, key)?.append_to(&mut url);
        Ok(url)
    }

    async fn fetch_delegation_key(&self, window: &AccessWindow) -> Result<DelegationKey> {
        let object_id = self.delegation_principal.clone().ok_or_else(|| {
            Error::NotPermitted("Memory store has no delegation principal".to_string())
        })?;

        let mut material = Uuid::new_v4().as_bytes().to_vec();
        material.extend_from_slice(Uuid::new_v4().as_bytes());

        let key = DelegationKey {
            object_id,
            window: *window,
            key: SigningKey::from_bytes(material)?,
        };
        self.issued_keys.write().await.push(key.clone());
        Ok(key)
    }
}

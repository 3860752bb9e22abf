//! Lazily created, shared handle to a remote container.
//!
//! The first caller starts the creation attempt and publishes it; concurrent
//! callers attach to the same attempt. A successful outcome is kept for the
//! life of the handle. A failed attempt is cleared so the next call starts
//! over. A caller that gives up while waiting leaves the attempt in place for
//! whoever comes next.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use filestore_common::{ContainerName, Error, Result};

use crate::backend::{object_url, ObjectStoreClient};
use crate::cancel::ensure_active;

/// A container known to exist.
///
/// Cheap to clone; clones share identity.
#[derive(Debug, Clone)]
pub struct ContainerRef(Arc<ContainerInner>);

#[derive(Debug)]
struct ContainerInner {
    name: ContainerName,
    url: Url,
}

impl ContainerRef {
    fn new(name: ContainerName, url: Url) -> Self {
        Self(Arc::new(ContainerInner { name, url }))
    }

    pub fn name(&self) -> &ContainerName {
        &self.0.name
    }

    pub fn url(&self) -> &Url {
        &self.0.url
    }

    /// URL of an object in this container.
    pub fn object_url(&self, key: &str) -> Result<Url> {
        object_url(&self.0.url, key)
    }

    /// Whether both references come from the same initialisation.
    #[cfg(test)]
    pub(crate) fn ptr_eq(&self, other: &ContainerRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

type Attempt = Shared<BoxFuture<'static, std::result::Result<ContainerRef, Arc<Error>>>>;

enum Slot {
    Empty,
    Pending { id: u64, attempt: Attempt },
    Ready(ContainerRef),
}

/// Single-flight initialiser for one container.
pub struct SharedContainer {
    name: ContainerName,
    client: Arc<dyn ObjectStoreClient>,
    slot: Mutex<Slot>,
    next_id: AtomicU64,
}

impl SharedContainer {
    /// Create a handle. No network call is made until first use.
    ///
    /// # Errors
    /// - `container_name` breaks the container naming rules
    pub fn new(client: Arc<dyn ObjectStoreClient>, container_name: &str) -> Result<Self> {
        Ok(Self {
            name: ContainerName::parse(container_name)?,
            client,
            slot: Mutex::new(Slot::Empty),
            next_id: AtomicU64::new(0),
        })
    }

    pub fn name(&self) -> &ContainerName {
        &self.name
    }

    pub fn client(&self) -> &Arc<dyn ObjectStoreClient> {
        &self.client
    }

    /// Get the container, creating it on first use.
    ///
    /// # Errors
    /// - `Cancelled` if `cancel` fires before the attempt completes
    /// - The creation error, if the attempt this call joined failed
    pub async fn get_container(&self, cancel: &CancellationToken) -> Result<ContainerRef> {
        ensure_active(cancel)?;

        let (id, attempt) = {
            let mut slot = self.slot.lock().await;
            match &*slot {
                Slot::Ready(container) => return Ok(container.clone()),
                Slot::Pending { id, attempt } => (*id, attempt.clone()),
                Slot::Empty => {
                    let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                    let attempt = create(self.client.clone(), self.name.clone())
                        .boxed()
                        .shared();
                    *slot = Slot::Pending {
                        id,
                        attempt: attempt.clone(),
                    };
                    debug!("Started creation attempt {} for container '{}'", id, self.name);
                    (id, attempt)
                }
            }
        };

        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            outcome = attempt => outcome,
        };

        let mut slot = self.slot.lock().await;
        let current = matches!(&*slot, Slot::Pending { id: pending, .. } if *pending == id);
        match outcome {
            Ok(container) => {
                if current {
                    *slot = Slot::Ready(container.clone());
                }
                Ok(container)
            }
            Err(error) => {
                if current {
                    *slot = Slot::Empty;
                }
                Err(share_error(&error))
            }
        }
    }

    /// Whether the container has been created through this handle.
    #[cfg(test)]
    pub(crate) async fn is_ready(&self) -> bool {
        matches!(&*self.slot.lock().await, Slot::Ready(_))
    }
}

async fn create(
    client: Arc<dyn ObjectStoreClient>,
    name: ContainerName,
) -> std::result::Result<ContainerRef, Arc<Error>> {
    let url = client.container_url(&name).map_err(Arc::new)?;
    match client.create_container_if_missing(&name).await {
        Ok(()) => {
            info!("Container '{}' is ready on {}", name, client.name());
            Ok(ContainerRef::new(name, url))
        }
        Err(error) => {
            warn!("Creating container '{}' failed: {}", name, error);
            Err(Arc::new(error))
        }
    }
}

/// Hand each waiter its own copy of a shared failure.
fn share_error(error: &Error) -> Error {
    match error {
        Error::Configuration(message) => Error::Configuration(message.clone()),
        Error::Naming(naming) => Error::Naming(naming.clone()),
        Error::NotFound(message) => Error::NotFound(message.clone()),
        Error::NotPermitted(message) => Error::NotPermitted(message.clone()),
        Error::Cancelled => Error::Cancelled,
        Error::Backend { operation, message } => Error::backend(operation.clone(), message),
        other => Error::backend("create container", other),
    }
}

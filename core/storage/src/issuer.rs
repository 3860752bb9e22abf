//! Capability URL issuance.

use chrono::Duration;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use url::Url;

use filestore_common::{validate_blob_name, Error, Result};
use filestore_signing::{AccessWindow, CloudStorageAction, SasRequest, SigningKey, UrlSigningKey};

use crate::cancel::{ensure_active, run_cancellable};
use crate::container::SharedContainer;
use crate::options::{Credential, SigningMode};

/// How capability URLs get signed.
#[derive(Debug, Clone)]
pub enum SigningStrategy {
    /// Sign locally with the account's shared key.
    SharedKey { account: String, key: SigningKey },
    /// Fetch a delegated key from the backend for each URL.
    UserDelegation { account: String },
}

impl SigningStrategy {
    /// Pick the strategy for a credential.
    ///
    /// # Errors
    /// - `Configuration` if shared-key signing is selected but the
    ///   credential carries no account key
    pub fn select(credential: &Credential, mode: SigningMode) -> Result<Self> {
        let account = credential.account_name().to_string();
        let key = match credential {
            Credential::ConnectionString(cs) => cs.account_key().cloned(),
            Credential::Identity { .. } => None,
        };

        match (mode, credential) {
            (SigningMode::SharedKey, _) | (SigningMode::Auto, Credential::ConnectionString(_)) => {
                let key = key.ok_or_else(|| {
                    Error::Configuration("Shared key signing requires an account key".to_string())
                })?;
                Ok(Self::SharedKey { account, key })
            }
            (SigningMode::UserDelegation, _) | (SigningMode::Auto, Credential::Identity { .. }) => {
                Ok(Self::UserDelegation { account })
            }
        }
    }

    pub fn account(&self) -> &str {
        match self {
            Self::SharedKey { account, .. } | Self::UserDelegation { account } => account,
        }
    }
}

/// Issues time-bounded, action-scoped URLs for objects in one container.
pub struct UrlIssuer {
    strategy: SigningStrategy,
    container: Arc<SharedContainer>,
    duration: Duration,
}

impl UrlIssuer {
    /// # Errors
    /// - `duration` is not strictly positive
    pub fn new(
        strategy: SigningStrategy,
        container: Arc<SharedContainer>,
        duration: Duration,
    ) -> Result<Self> {
        if duration <= Duration::zero() {
            return Err(Error::Configuration(
                "Shared access duration must be positive".to_string(),
            ));
        }
        Ok(Self {
            strategy,
            container,
            duration,
        })
    }

    pub fn strategy(&self) -> &SigningStrategy {
        &self.strategy
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Issue a URL granting `action` on `key` for the configured duration,
    /// starting now. The storage client does the signing.
    ///
    /// # Errors
    /// - `Naming` if `key` is not a valid blob name
    /// - `Configuration` if the client cannot sign URLs
    /// - `Cancelled` if `cancel` fires before or after the delegated key fetch
    pub async fn issue_url(
        &self,
        key: &str,
        action: CloudStorageAction,
        cancel: &CancellationToken,
    ) -> Result<Url> {
        validate_blob_name(key)?;
        ensure_active(cancel)?;

        let container = self.container.get_container(cancel).await?;
        let window = AccessWindow::starting_now(self.duration)?;
        let request = SasRequest::for_action(
            self.strategy.account(),
            container.name().as_str(),
            key,
            action,
            window,
        );
        let object_url = container.object_url(key)?;
        let client = self.container.client();

        let url = match &self.strategy {
            SigningStrategy::SharedKey { key: signing_key, .. } => {
                client.sign_url(object_url, &request, UrlSigningKey::Shared(signing_key))?
            }
            SigningStrategy::UserDelegation { .. } => {
                let delegation =
                    run_cancellable(cancel, client.fetch_delegation_key(&window)).await?;
                ensure_active(cancel)?;
                client.sign_url(object_url, &request, UrlSigningKey::Delegated(&delegation))?
            }
        };

        info!(
            "Issued {} URL for '{}' in '{}' until {}",
            action,
            key,
            container.name(),
            window.expires_on()
        );
        Ok(url)
    }
}

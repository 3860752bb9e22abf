//! Backend configuration.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use filestore_common::{Error, Result};

use crate::connection::ConnectionString;

/// How capability URLs are signed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningMode {
    /// Shared key for connection strings, delegation for named identities.
    #[default]
    Auto,
    SharedKey,
    UserDelegation,
}

/// Options for an object-storage backend.
///
/// Exactly one of `connection_string` and `account_name` must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_name: Option<String>,
    pub container_name: String,
    /// Lifetime of issued capability URLs, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_access_duration_secs: Option<i64>,
    #[serde(default)]
    pub signing_mode: SigningMode,
}

/// The credential an object store is reached with.
#[derive(Debug, Clone)]
pub enum Credential {
    ConnectionString(ConnectionString),
    Identity { account_name: String },
}

impl Credential {
    pub fn account_name(&self) -> &str {
        match self {
            Self::ConnectionString(cs) => cs.account_name(),
            Self::Identity { account_name } => account_name,
        }
    }
}

impl StorageOptions {
    /// Resolve the configured credential.
    ///
    /// # Errors
    /// - Neither or both credential modes are set
    /// - The connection string is malformed
    pub fn credential(&self) -> Result<Credential> {
        let connection_string = non_blank(&self.connection_string);
        let account_name = non_blank(&self.account_name);

        match (connection_string, account_name) {
            (Some(cs), None) => Ok(Credential::ConnectionString(ConnectionString::parse(cs)?)),
            (None, Some(name)) => Ok(Credential::Identity {
                account_name: name.to_string(),
            }),
            _ => Err(Error::Configuration(
                "Exactly one of connection string or account name must be configured".to_string(),
            )),
        }
    }

    /// The configured URL lifetime, if any.
    ///
    /// # Errors
    /// - A duration is configured but is not strictly positive
    pub fn shared_access_duration(&self) -> Result<Option<Duration>> {
        match self.shared_access_duration_secs {
            None => Ok(None),
            Some(secs) if secs > 0 => Ok(Some(Duration::seconds(secs))),
            Some(secs) => Err(Error::Configuration(format!(
                "Shared access duration must be positive (got {}s)",
                secs
            ))),
        }
    }

    /// Like [`shared_access_duration`](Self::shared_access_duration) but a
    /// missing duration is also an error.
    pub fn require_shared_access_duration(&self) -> Result<Duration> {
        self.shared_access_duration()?.ok_or_else(|| {
            Error::Configuration("Shared access duration is required".to_string())
        })
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Options for the local filesystem backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSystemStorageOptions {
    pub storage_root_path: PathBuf,
    /// Whether `file://` URLs may be handed out for stored files.
    #[serde(default)]
    pub allow_download_url: bool,
}

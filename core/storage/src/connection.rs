//! Storage account connection strings.

use std::str::FromStr;

use filestore_common::{Error, Result};
use filestore_signing::SigningKey;

/// A parsed `Key=Value;` connection string.
///
/// Only `AccountName` and `AccountKey` are read. Endpoint entries and other
/// keys are ignored; object URLs come from the storage client.
#[derive(Debug, Clone)]
pub struct ConnectionString {
    account_name: String,
    account_key: Option<SigningKey>,
}

impl ConnectionString {
    /// Parse a connection string.
    ///
    /// # Errors
    /// - An entry is not a `Key=Value` pair
    /// - `AccountName` is missing
    /// - `AccountKey` is not valid base64
    pub fn parse(value: &str) -> Result<Self> {
        let mut account_name = None;
        let mut account_key = None;

        for pair in value.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, val) = pair.split_once('=').ok_or_else(|| {
                Error::Configuration(format!(
                    "Connection string entry '{}' is not a Key=Value pair",
                    pair
                ))
            })?;

            match key.trim().to_ascii_lowercase().as_str() {
                "accountname" => account_name = Some(val.trim().to_string()),
                "accountkey" => account_key = Some(SigningKey::from_base64(val)?),
                _ => {}
            }
        }

        let account_name = account_name.filter(|a| !a.is_empty()).ok_or_else(|| {
            Error::Configuration("Connection string does not name an account".to_string())
        })?;

        Ok(Self {
            account_name,
            account_key,
        })
    }

    pub fn account_name(&self) -> &str {
        &self.account_name
    }

    /// The shared account key, when the connection string carries one.
    pub fn account_key(&self) -> Option<&SigningKey> {
        self.account_key.as_ref()
    }
}

impl FromStr for ConnectionString {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

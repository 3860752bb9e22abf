//! Shared access signatures: signing, URL encoding and verification.
//!
//! This is the crate's own capability format, checked by
//! [`SharedAccessSignature::verify`]. Services with their own URL signing
//! format sign through their storage client instead.
//!
//! The signature is a keyed BLAKE2b MAC over a newline-joined
//! string-to-sign that binds the permission set, the validity window, the
//! canonical object resource and, for delegated keys, the delegation
//! identity. Keys are hashed to 32 bytes before keying the MAC, so account
//! keys of any length are accepted.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use blake2::digest::consts::U32;
use blake2::digest::Mac;
use blake2::{Blake2b, Blake2bMac512, Digest};
use chrono::{DateTime, SecondsFormat, Utc};
use url::Url;

use filestore_common::{Error, Result};

use crate::keys::{DelegationKey, SigningKey};
use crate::permissions::{CloudStorageAction, Permissions};
use crate::window::AccessWindow;

/// Signature format version written to `sv`.
pub const SIGNATURE_VERSION: &str = "fs-b2-1";

const SIGNED_RESOURCE_BLOB: &str = "b";
const SIGNED_PROTOCOL: &str = "https";

/// What is being signed: one object, one permission set, one window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SasRequest {
    pub account: String,
    pub container: String,
    pub blob: String,
    pub permissions: Permissions,
    pub window: AccessWindow,
}

impl SasRequest {
    /// Request scoped to exactly the permissions `action` needs.
    pub fn for_action(
        account: impl Into<String>,
        container: impl Into<String>,
        blob: impl Into<String>,
        action: CloudStorageAction,
        window: AccessWindow,
    ) -> Self {
        Self {
            account: account.into(),
            container: container.into(),
            blob: blob.into(),
            permissions: Permissions::for_action(action),
            window,
        }
    }

    fn canonical_resource(&self) -> String {
        canonical_resource(&self.account, &self.container, &self.blob)
    }
}

/// Delegation identity embedded in a signature made with a delegated key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegationInfo {
    pub object_id: String,
    pub window: AccessWindow,
}

/// Key a capability URL is signed with.
#[derive(Debug, Clone, Copy)]
pub enum UrlSigningKey<'a> {
    /// Long-lived account key.
    Shared(&'a SigningKey),
    /// Short-lived key issued by the backend.
    Delegated(&'a DelegationKey),
}

/// The signed query parameters of a capability URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedAccessSignature {
    pub version: String,
    pub permissions: Permissions,
    pub window: AccessWindow,
    pub delegation: Option<DelegationInfo>,
    pub signature: String,
}

impl SharedAccessSignature {
    /// Sign `request` with a pre-shared key.
    pub fn sign(request: &SasRequest, key: &SigningKey) -> Result<Self> {
        let mut sas = Self {
            version: SIGNATURE_VERSION.to_string(),
            permissions: request.permissions,
            window: request.window,
            delegation: None,
            signature: String::new(),
        };
        let message = sas.string_to_sign(&request.canonical_resource());
        sas.signature = STANDARD.encode(compute_mac(key, &message)?);
        Ok(sas)
    }

    /// Sign `request` with a delegated key.
    ///
    /// # Errors
    /// - The request window is not covered by the delegation window
    pub fn sign_delegated(request: &SasRequest, delegation: &DelegationKey) -> Result<Self> {
        if !request.window.within(&delegation.window) {
            return Err(Error::InvalidInput(
                "Signature window exceeds the delegation key window".to_string(),
            ));
        }

        let mut sas = Self {
            version: SIGNATURE_VERSION.to_string(),
            permissions: request.permissions,
            window: request.window,
            delegation: Some(DelegationInfo {
                object_id: delegation.object_id.clone(),
                window: delegation.window,
            }),
            signature: String::new(),
        };
        sas.signature = STANDARD.encode(compute_mac(
            &delegation.key,
            &sas.string_to_sign(&request.canonical_resource()),
        )?);
        Ok(sas)
    }

    /// Sign `request` with either kind of key.
    pub fn sign_with(request: &SasRequest, key: UrlSigningKey<'_>) -> Result<Self> {
        match key {
            UrlSigningKey::Shared(key) => Self::sign(request, key),
            UrlSigningKey::Delegated(delegation) => Self::sign_delegated(request, delegation),
        }
    }

    /// Append the signature to `url` as query parameters.
    pub fn append_to(&self, url: &mut Url) {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("sv", &self.version)
            .append_pair("sr", SIGNED_RESOURCE_BLOB)
            .append_pair("sp", &self.permissions.to_string())
            .append_pair("st", &format_time(self.window.starts_on()))
            .append_pair("se", &format_time(self.window.expires_on()))
            .append_pair("spr", SIGNED_PROTOCOL);

        if let Some(delegation) = &self.delegation {
            query
                .append_pair("skoid", &delegation.object_id)
                .append_pair("skt", &format_time(delegation.window.starts_on()))
                .append_pair("ske", &format_time(delegation.window.expires_on()));
        }

        query.append_pair("sig", &self.signature);
    }

    /// Read the signature back out of a capability URL.
    ///
    /// # Errors
    /// - A required parameter is missing or malformed
    pub fn from_url(url: &Url) -> Result<Self> {
        let param = |name: &str| {
            url.query_pairs()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.into_owned())
        };
        let required = |name: &str| {
            param(name).ok_or_else(|| {
                Error::InvalidInput(format!("Capability URL is missing '{}'", name))
            })
        };

        if required("sr")? != SIGNED_RESOURCE_BLOB {
            return Err(Error::InvalidInput(
                "Capability URL is not scoped to a single blob".to_string(),
            ));
        }

        let window = AccessWindow::new(
            parse_time(&required("st")?)?,
            parse_time(&required("se")?)?,
        )?;

        let delegation = match param("skoid") {
            Some(object_id) => Some(DelegationInfo {
                object_id,
                window: AccessWindow::new(
                    parse_time(&required("skt")?)?,
                    parse_time(&required("ske")?)?,
                )?,
            }),
            None => None,
        };

        Ok(Self {
            version: required("sv")?,
            permissions: Permissions::parse(&required("sp")?)?,
            window,
            delegation,
            signature: required("sig")?,
        })
    }

    /// Whether the signature grants everything `action` needs.
    pub fn permits(&self, action: CloudStorageAction) -> bool {
        self.permissions.contains(Permissions::for_action(action))
    }

    /// Check the signature for the given object at time `at`.
    ///
    /// `key` is the account key, or the delegated key for delegated
    /// signatures.
    ///
    /// # Errors
    /// - `NotPermitted` when `at` is outside the window or the MAC does not
    ///   match
    pub fn verify(
        &self,
        account: &str,
        container: &str,
        blob: &str,
        key: &SigningKey,
        at: DateTime<Utc>,
    ) -> Result<()> {
        if at < self.window.starts_on() {
            return Err(Error::NotPermitted(
                "Capability URL is not valid yet".to_string(),
            ));
        }
        if !self.window.contains(at) {
            return Err(Error::NotPermitted("Capability URL has expired".to_string()));
        }
        if let Some(delegation) = &self.delegation {
            if !delegation.window.contains(at) {
                return Err(Error::NotPermitted("Delegation key has expired".to_string()));
            }
        }

        let tag = STANDARD
            .decode(&self.signature)
            .map_err(|_| Error::NotPermitted("Signature is malformed".to_string()))?;

        let message = self.string_to_sign(&canonical_resource(account, container, blob));
        let mut mac = mac_for(key)?;
        Mac::update(&mut mac, message.as_bytes());
        mac.verify_slice(&tag)
            .map_err(|_| Error::NotPermitted("Signature does not match".to_string()))
    }

    fn string_to_sign(&self, resource: &str) -> String {
        let (object_id, key_start, key_expiry) = match &self.delegation {
            Some(d) => (
                d.object_id.clone(),
                format_time(d.window.starts_on()),
                format_time(d.window.expires_on()),
            ),
            None => (String::new(), String::new(), String::new()),
        };

        [
            self.permissions.to_string(),
            format_time(self.window.starts_on()),
            format_time(self.window.expires_on()),
            resource.to_string(),
            object_id,
            key_start,
            key_expiry,
            SIGNED_PROTOCOL.to_string(),
            self.version.clone(),
            SIGNED_RESOURCE_BLOB.to_string(),
        ]
        .join("\n")
    }
}

fn canonical_resource(account: &str, container: &str, blob: &str) -> String {
    format!("/blob/{}/{}/{}", account, container, blob)
}

fn mac_for(key: &SigningKey) -> Result<Blake2bMac512> {
    let derived = Blake2b::<U32>::digest(key.as_bytes());
    <Blake2bMac512 as Mac>::new_from_slice(&derived)
        .map_err(|e| Error::Configuration(format!("Unusable signing key: {}", e)))
}

fn compute_mac(key: &SigningKey, message: &str) -> Result<Vec<u8>> {
    let mut mac = mac_for(key)?;
    Mac::update(&mut mac, message.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_time(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::InvalidInput(format!("Invalid timestamp '{}': {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn key() -> SigningKey {
        SigningKey::from_bytes(b"account-key-material".to_vec()).unwrap()
    }

    fn request(action: CloudStorageAction) -> SasRequest {
        SasRequest::for_action(
            "devaccount",
            "media",
            "reports/q1.pdf",
            action,
            AccessWindow::starting_at(at(0), Duration::seconds(600)).unwrap(),
        )
    }

    fn signed(action: CloudStorageAction) -> SharedAccessSignature {
        SharedAccessSignature::sign(&request(action), &key()).unwrap()
    }

    fn signed_url(sas: &SharedAccessSignature) -> Url {
        let mut url =
            Url::parse("https://devaccount.blob.example.net/media/reports%2Fq1.pdf").unwrap();
        sas.append_to(&mut url);
        url
    }

    #[test]
    fn test_sign_and_verify() {
        let sas = signed(CloudStorageAction::Download);
        let parsed = SharedAccessSignature::from_url(&signed_url(&sas)).unwrap();

        assert_eq!(parsed, sas);
        parsed
            .verify("devaccount", "media", "reports/q1.pdf", &key(), at(300))
            .unwrap();
    }

    #[test]
    fn test_expiry_boundaries() {
        let sas = signed(CloudStorageAction::Download);

        assert!(sas.verify("devaccount", "media", "reports/q1.pdf", &key(), at(599)).is_ok());
        assert!(matches!(
            sas.verify("devaccount", "media", "reports/q1.pdf", &key(), at(600)),
            Err(Error::NotPermitted(_))
        ));
        assert!(matches!(
            sas.verify("devaccount", "media", "reports/q1.pdf", &key(), at(-1)),
            Err(Error::NotPermitted(_))
        ));
    }

    #[test]
    fn test_signature_is_bound_to_object_and_key() {
        let sas = signed(CloudStorageAction::Delete);

        assert!(sas.verify("devaccount", "media", "reports/q2.pdf", &key(), at(1)).is_err());
        assert!(sas.verify("devaccount", "other", "reports/q1.pdf", &key(), at(1)).is_err());

        let other_key = SigningKey::from_bytes(b"different".to_vec()).unwrap();
        assert!(sas.verify("devaccount", "media", "reports/q1.pdf", &other_key, at(1)).is_err());
    }

    #[test]
    fn test_tampered_permissions_fail_verification() {
        let sas = signed(CloudStorageAction::Download);
        let mut tampered = sas.clone();
        tampered.permissions = Permissions::for_action(CloudStorageAction::Upload);

        assert!(tampered.verify("devaccount", "media", "reports/q1.pdf", &key(), at(1)).is_err());
    }

    #[test]
    fn test_permissions_follow_action() {
        let download = signed(CloudStorageAction::Download);
        let upload = signed(CloudStorageAction::Upload);

        assert!(download.permits(CloudStorageAction::Download));
        assert!(!download.permits(CloudStorageAction::Upload));
        assert!(upload.permits(CloudStorageAction::Upload));
        assert!(!upload.permits(CloudStorageAction::Delete));
        assert_ne!(download.permissions, upload.permissions);
    }

    #[test]
    fn test_delegated_signature() {
        let delegation = DelegationKey {
            object_id: "principal-1".to_string(),
            window: AccessWindow::new(at(0), at(600)).unwrap(),
            key: SigningKey::from_bytes(b"delegated".to_vec()).unwrap(),
        };

        let sas =
            SharedAccessSignature::sign_delegated(&request(CloudStorageAction::Upload), &delegation)
                .unwrap();
        let url = signed_url(&sas);
        assert!(url.query_pairs().any(|(k, v)| k == "skoid" && v == "principal-1"));

        let parsed = SharedAccessSignature::from_url(&url).unwrap();
        parsed
            .verify("devaccount", "media", "reports/q1.pdf", &delegation.key, at(10))
            .unwrap();
        assert!(parsed
            .verify("devaccount", "media", "reports/q1.pdf", &key(), at(10))
            .is_err());
    }

    #[test]
    fn test_delegated_window_must_cover_request() {
        let delegation = DelegationKey {
            object_id: "principal-1".to_string(),
            window: AccessWindow::new(at(0), at(60)).unwrap(),
            key: SigningKey::from_bytes(b"delegated".to_vec()).unwrap(),
        };

        let request = request(CloudStorageAction::Upload);
        assert!(SharedAccessSignature::sign_delegated(&request, &delegation).is_err());
    }

    #[test]
    fn test_sign_with_either_key() {
        let request = request(CloudStorageAction::Download);
        let shared = SharedAccessSignature::sign_with(&request, UrlSigningKey::Shared(&key()))
            .unwrap();
        assert_eq!(shared, SharedAccessSignature::sign(&request, &key()).unwrap());
        assert_eq!(shared.version, SIGNATURE_VERSION);

        let delegation = DelegationKey {
            object_id: "principal-1".to_string(),
            window: AccessWindow::new(at(0), at(600)).unwrap(),
            key: SigningKey::from_bytes(b"delegated".to_vec()).unwrap(),
        };
        let delegated =
            SharedAccessSignature::sign_with(&request, UrlSigningKey::Delegated(&delegation))
                .unwrap();
        assert_eq!(delegated.delegation.unwrap().object_id, "principal-1");
    }

    #[test]
    fn test_from_url_requires_parameters() {
        let url = Url::parse("https://devaccount.blob.example.net/media/a?sv=1&sr=b").unwrap();
        assert!(SharedAccessSignature::from_url(&url).is_err());
    }
}

//! Capability URL signing for object storage.
//!
//! A capability URL grants one action on one object for a bounded window of
//! time. This crate builds the signed query string, either with a
//! long-lived shared key or with a short-lived delegated key obtained from the
//! backend, and verifies such URLs for holders of the key.

pub mod keys;
pub mod permissions;
pub mod sas;
pub mod window;

pub use keys::{DelegationKey, SigningKey};
pub use permissions::{CloudStorageAction, Permissions};
pub use sas::{
    DelegationInfo, SasRequest, SharedAccessSignature, UrlSigningKey, SIGNATURE_VERSION,
};
pub use window::AccessWindow;

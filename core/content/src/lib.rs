//! Content validation for uploaded files.
//!
//! Checks a file's real content type against its declared MIME type by
//! comparing the leading bytes with configured signatures ("magic numbers").
//! The same signature table is applied either as an allow-list or as a
//! deny-list.

pub mod options;
pub mod peek;
pub mod signature;
pub mod validator;

pub use options::{ContentValidationOptions, MimeTypeSignature, ValidationMode};
pub use peek::peek_prefix;
pub use signature::{Signature, SignatureTable};
pub use validator::ContentValidator;

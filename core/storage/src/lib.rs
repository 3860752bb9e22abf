//! Backend-agnostic file storage.
//!
//! This crate provides the [`FileStorage`] contract and two backends: a
//! local filesystem store and a facade over object-storage services
//! ([`BlobStorage`]). Object stores are reached through the
//! [`ObjectStoreClient`] capability trait; concrete network clients are
//! injected by the caller.
//!
//! # Design Principles
//! - Validate early: names, tags and content are checked before any byte
//!   reaches a backend
//! - One container handle per backend instance, created lazily and shared
//!   by concurrent callers
//! - Async operations with cooperative cancellation
//! - Streaming transfers for file content

pub mod archive;
pub mod backend;
pub mod cancel;
pub mod cloud;
pub mod connection;
pub mod container;
pub mod issuer;
pub mod local;
pub mod memory;
pub mod options;
pub mod provider;

pub use backend::{ObjectProperties, ObjectStoreClient, StoredObject};
pub use cloud::BlobStorage;
pub use connection::ConnectionString;
pub use container::{ContainerRef, SharedContainer};
pub use issuer::{SigningStrategy, UrlIssuer};
pub use local::LocalFileStorage;
pub use memory::MemoryObjectStore;
pub use options::{Credential, FileSystemStorageOptions, SigningMode, StorageOptions};
pub use provider::{bytes_stream, CloudFileStorage, FileContent, FileStorage};

//! blossom-storage: Content-addressed blob storage
//!
//! Stores immutable blobs keyed by their SHA-256 digest, with an owner
//! index for listing. No authorization logic here; that lives in
//! `blossom-auth`.
//!
//! ## Backends
//!
//! | Backend           | Use Case                     |
//! |-------------------|------------------------------|
//! | `InMemoryStore`   | Unit tests                   |
//! | `FilesystemStore` | Production, integration tests |
//!
//! ## Example
//!
//! ```rust,ignore
//! use blossom_storage::{BlobStore, InMemoryStore, SaveRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = InMemoryStore::new();
//!
//!     let descriptor = store.save_bytes(b"Hello, blobs!", SaveRequest::new()).await?;
//!     assert!(store.exists(&descriptor.digest).await?);
//!
//!     Ok(())
//! }
//! ```

mod error;
mod ingest;
mod local;
mod locks;
mod memory;
mod policy;
mod sqlite;
mod traits;

// Re-exports
pub use error::{StorageError, StorageResult};
pub use locks::DigestLocks;
pub use policy::UploadPolicy;
pub use traits::{BlobDescriptor, BlobReader, BlobStore, BlobStream, SaveRequest, TimeRange};

pub use local::FilesystemStore;
pub use memory::InMemoryStore;
pub use sqlite::{SCHEMA_VERSION, SqliteIndex};

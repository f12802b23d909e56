//! Content-addressed object storage for grove.
//!
//! Every piece of source-control data — file contents and directory
//! listings — is stored as an immutable object identified by its BLAKE3
//! hash. The local [`ContentStore`] is only a cache: objects missing from it
//! are fetched on demand from an external [`BackingStore`] through the
//! [`ObjectStore`] facade and written back for the next reader.
//!
//! # Object Types
//!
//! - [`Blob`] — raw file content
//! - [`Tree`] — sorted directory listing mapping names to object references
//! - [`BlobMetadata`] — derived size/digest facts, cached separately so
//!   repeated identity checks never re-hash blob contents
//!
//! # Design Rules
//!
//! 1. Objects are immutable once written (content-addressing guarantees this).
//! 2. Writes are idempotent: re-putting identical content is observably a no-op.
//! 3. A reader never observes a miss for a key already put by the same store,
//!    regardless of batching state (read-after-write consistency).
//! 4. All I/O errors are propagated, never silently ignored or retried.
//! 5. The store never interprets object contents beyond the kind tag.

pub mod backing;
pub mod content_store;
pub mod engine;
pub mod error;
pub mod object;
pub mod object_store;

pub use backing::BackingStore;
pub use content_store::ContentStore;
pub use engine::{MemoryEngine, StorageEngine};
pub use error::{StoreError, StoreResult};
pub use object::{Blob, BlobMetadata, FileType, ObjectKind, Tree, TreeEntry};
pub use object_store::ObjectStore;

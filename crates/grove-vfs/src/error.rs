use std::sync::Arc;

use grove_store::StoreError;

/// Errors from namespace and inode operations.
///
/// Namespace errors are surfaced to the immediate caller and never retried
/// internally. Store failures bubble up through the same composition as
/// success; they are shared behind an `Arc` so a single failed load can be
/// reported to every caller coalesced onto it.
#[derive(Clone, Debug, thiserror::Error)]
pub enum VfsError {
    /// No entry with this name exists.
    #[error("no entry named {0:?}")]
    NotFound(String),

    /// The path component or inode is not a directory.
    #[error("{0:?} is not a directory")]
    NotADirectory(String),

    /// The entry is a directory and the operation requires a file.
    #[error("{0:?} is a directory")]
    IsADirectory(String),

    /// An entry with this name already exists.
    #[error("entry {0:?} already exists")]
    AlreadyExists(String),

    /// The directory still contains entries.
    #[error("directory {0:?} is not empty")]
    DirectoryNotEmpty(String),

    /// A write was attempted against unmaterialized file contents.
    #[error("file must be materialized before writing")]
    NotMaterialized,

    /// Failure from the object store or backing store.
    #[error("store error: {0}")]
    Store(#[source] Arc<StoreError>),
}

impl From<StoreError> for VfsError {
    fn from(err: StoreError) -> Self {
        Self::Store(Arc::new(err))
    }
}

/// Result alias for inode and checkout operations.
pub type VfsResult<T> = Result<T, VfsError>;

use std::sync::Arc;

use grove_store::{FileType, ObjectStore};
use grove_types::{InodeNumber, InodeNumberAllocator};

use crate::error::{VfsError, VfsResult};
use crate::file::FileInode;
use crate::tree::TreeInode;

/// Shared per-workspace context handed to every inode: the fetch-through
/// object store and the inode-number allocator.
pub(crate) struct VfsContext {
    pub(crate) store: Arc<ObjectStore>,
    pub(crate) allocator: InodeNumberAllocator,
}

/// A reference to one loaded inode, directory or file.
///
/// A closed variant type: the checkout engine matches on it exhaustively
/// rather than dispatching through an open trait.
#[derive(Clone)]
pub enum InodeHandle {
    /// A directory inode.
    Tree(Arc<TreeInode>),
    /// A file or symlink inode.
    File(Arc<FileInode>),
}

impl InodeHandle {
    /// The inode's process-lifetime-unique number.
    pub fn number(&self) -> InodeNumber {
        match self {
            Self::Tree(t) => t.number(),
            Self::File(f) => f.number(),
        }
    }

    /// The filesystem object kind this handle refers to.
    pub fn file_type(&self) -> FileType {
        match self {
            Self::Tree(_) => FileType::Directory,
            Self::File(f) => f.file_type(),
        }
    }

    /// Borrow as a directory inode, if this is one.
    pub fn as_tree(&self) -> Option<&Arc<TreeInode>> {
        match self {
            Self::Tree(t) => Some(t),
            Self::File(_) => None,
        }
    }

    /// Borrow as a file inode, if this is one.
    pub fn as_file(&self) -> Option<&Arc<FileInode>> {
        match self {
            Self::File(f) => Some(f),
            Self::Tree(_) => None,
        }
    }

    /// Convert into a directory inode, failing with `NotADirectory`.
    pub fn into_tree(self, path: &str) -> VfsResult<Arc<TreeInode>> {
        match self {
            Self::Tree(t) => Ok(t),
            Self::File(_) => Err(VfsError::NotADirectory(path.to_string())),
        }
    }

    /// Convert into a file inode, failing with `IsADirectory`.
    pub fn into_file(self, path: &str) -> VfsResult<Arc<FileInode>> {
        match self {
            Self::File(f) => Ok(f),
            Self::Tree(_) => Err(VfsError::IsADirectory(path.to_string())),
        }
    }
}

impl std::fmt::Debug for InodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tree(t) => write!(f, "InodeHandle::Tree({})", t.number()),
            Self::File(file) => write!(f, "InodeHandle::File({})", file.number()),
        }
    }
}

use std::sync::{Arc, RwLock, Weak};

use tracing::debug;

use grove_store::FileType;
use grove_types::{Hash, InodeNumber};

use crate::error::{VfsError, VfsResult};
use crate::inode::VfsContext;
use crate::tree::TreeInode;

/// File contents: either a reference to the unmodified source-control blob,
/// or an exclusively-owned local buffer that has diverged from it.
enum FileContents {
    /// Unmodified; bytes live in the object store under this hash.
    Clean(Hash),
    /// Locally edited; this buffer is authoritative over the source blob
    /// until the next successful, non-conflicting checkout overwrites it.
    Materialized(Vec<u8>),
}

struct FileState {
    perms: u32,
    contents: FileContents,
}

/// In-memory representation of one file or symlink.
///
/// Constructed lazily, on first load of its directory entry. Once removed
/// from its parent's mapping (by `unlink` or by checkout replacing the
/// entry), a held reference remains valid: reads and writes keep operating
/// on the inode's own data until the caller drops it.
pub struct FileInode {
    number: InodeNumber,
    ftype: FileType,
    parent: Weak<TreeInode>,
    ctx: Arc<VfsContext>,
    state: RwLock<FileState>,
}

impl FileInode {
    /// Build a clean file inode over a source-control blob.
    pub(crate) fn new_clean(
        number: InodeNumber,
        ftype: FileType,
        hash: Hash,
        perms: u32,
        parent: Weak<TreeInode>,
        ctx: Arc<VfsContext>,
    ) -> Arc<Self> {
        Arc::new(Self {
            number,
            ftype,
            parent,
            ctx,
            state: RwLock::new(FileState {
                perms,
                contents: FileContents::Clean(hash),
            }),
        })
    }

    /// Build a locally-created file inode with no source-control
    /// counterpart; materialized from birth.
    pub(crate) fn new_untracked(
        number: InodeNumber,
        ftype: FileType,
        data: Vec<u8>,
        perms: u32,
        parent: Weak<TreeInode>,
        ctx: Arc<VfsContext>,
    ) -> Arc<Self> {
        Arc::new(Self {
            number,
            ftype,
            parent,
            ctx,
            state: RwLock::new(FileState {
                perms,
                contents: FileContents::Materialized(data),
            }),
        })
    }

    /// The inode's process-lifetime-unique number.
    pub fn number(&self) -> InodeNumber {
        self.number
    }

    /// Regular file or symlink.
    pub fn file_type(&self) -> FileType {
        self.ftype
    }

    /// Owner permission bits.
    pub fn perms(&self) -> u32 {
        self.state.read().expect("lock poisoned").perms
    }

    /// Whether local edits have diverged this inode from source control.
    pub fn is_materialized(&self) -> bool {
        matches!(
            self.state.read().expect("lock poisoned").contents,
            FileContents::Materialized(_)
        )
    }

    /// The parent directory, if this inode is still linked and the parent
    /// is still alive.
    pub fn parent(&self) -> Option<Arc<TreeInode>> {
        self.parent.upgrade()
    }

    /// Reconstruct the path of this inode, if still linked into the tree.
    pub fn path(&self) -> Option<String> {
        let parent = self.parent.upgrade()?;
        let name = parent.name_of_child(self.number)?;
        let base = parent.path()?;
        Some(if base.is_empty() {
            name
        } else {
            format!("{base}/{name}")
        })
    }

    /// Read the full contents of the file.
    ///
    /// Clean inodes fetch their blob through the object store; materialized
    /// inodes serve their own buffer.
    pub async fn read(&self) -> VfsResult<Vec<u8>> {
        let hash = {
            let state = self.state.read().expect("lock poisoned");
            match &state.contents {
                FileContents::Materialized(data) => return Ok(data.clone()),
                FileContents::Clean(hash) => *hash,
            }
        };
        let blob = self.ctx.store.get_blob(&hash).await?;
        Ok(blob.data)
    }

    /// Transition to MATERIALIZED before the first local write, copying the
    /// clean content into an exclusively-owned buffer.
    ///
    /// A no-op if the inode is already materialized. Concurrent callers
    /// race benignly: whichever copy lands first wins and the others keep
    /// it.
    pub async fn materialize_for_write(&self) -> VfsResult<()> {
        let hash = {
            let state = self.state.read().expect("lock poisoned");
            match &state.contents {
                FileContents::Materialized(_) => return Ok(()),
                FileContents::Clean(hash) => *hash,
            }
        };
        let blob = self.ctx.store.get_blob(&hash).await?;
        {
            let mut state = self.state.write().expect("lock poisoned");
            if let FileContents::Clean(_) = state.contents {
                state.contents = FileContents::Materialized(blob.data);
            }
        }
        debug!(inode = %self.number, "file materialized for write");
        if let Some(parent) = self.parent.upgrade() {
            parent.mark_dirty_upwards();
        }
        Ok(())
    }

    /// Write `data` into the materialized buffer at `offset`, extending it
    /// if needed. Fails if the inode has not been materialized.
    pub fn write_at(&self, offset: usize, data: &[u8]) -> VfsResult<usize> {
        let mut state = self.state.write().expect("lock poisoned");
        match &mut state.contents {
            FileContents::Materialized(buf) => {
                let end = offset + data.len();
                if buf.len() < end {
                    buf.resize(end, 0);
                }
                buf[offset..end].copy_from_slice(data);
                Ok(data.len())
            }
            FileContents::Clean(_) => Err(VfsError::NotMaterialized),
        }
    }

    /// Replace the file's contents entirely, materializing first if needed.
    pub async fn overwrite(&self, data: &[u8]) -> VfsResult<()> {
        self.materialize_for_write().await?;
        let mut state = self.state.write().expect("lock poisoned");
        match &mut state.contents {
            FileContents::Materialized(buf) => {
                buf.clear();
                buf.extend_from_slice(data);
                Ok(())
            }
            FileContents::Clean(_) => Err(VfsError::NotMaterialized),
        }
    }

    /// The content hash of the live data: the source hash for clean inodes,
    /// a freshly computed digest for materialized buffers. Used by the
    /// checkout engine to detect untracked additions that already match the
    /// target.
    pub(crate) fn local_content_hash(&self) -> Hash {
        let state = self.state.read().expect("lock poisoned");
        match &state.contents {
            FileContents::Clean(hash) => *hash,
            FileContents::Materialized(data) => Hash::of_blob(data),
        }
    }
}

impl std::fmt::Debug for FileInode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileInode")
            .field("number", &self.number)
            .field("ftype", &self.ftype)
            .field("materialized", &self.is_materialized())
            .finish()
    }
}

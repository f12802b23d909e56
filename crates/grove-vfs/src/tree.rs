use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::watch;
use tracing::{debug, trace};

use grove_store::{FileType, Tree};
use grove_types::{Hash, InodeNumber};

use crate::error::{VfsError, VfsResult};
use crate::file::FileInode;
use crate::inode::{InodeHandle, VfsContext};

/// Broadcast state of one in-flight child load, observed by every caller
/// coalesced onto it.
#[derive(Clone)]
pub(crate) enum LoadOutcome {
    /// The fetch has not resolved yet.
    Pending,
    /// The child inode was constructed and linked.
    Ready(InodeHandle),
    /// The entry was unlinked while the load was in flight; the loaded
    /// result was discarded.
    Gone,
    /// The fetch failed.
    Failed(VfsError),
}

/// Per-slot lifecycle state of one child entry.
///
/// ```text
/// Unloaded --assign--> Assigned --load--> Loading --(resolved)--> Loaded
/// ```
///
/// Unlink removes the whole entry in any state; a constructed child object
/// remains independently valid afterwards.
pub(crate) enum EntrySlot {
    /// Source hash and metadata only; no number, no object.
    Unloaded,
    /// An inode number is reserved but the object is not constructed.
    Assigned(InodeNumber),
    /// A load is in flight; concurrent loads coalesce on the channel.
    Loading {
        number: InodeNumber,
        done: watch::Receiver<LoadOutcome>,
    },
    /// The child object is constructed and owned by this directory.
    Loaded(InodeHandle),
}

impl EntrySlot {
    pub(crate) fn number(&self) -> Option<InodeNumber> {
        match self {
            Self::Unloaded => None,
            Self::Assigned(n) => Some(*n),
            Self::Loading { number, .. } => Some(*number),
            Self::Loaded(handle) => Some(handle.number()),
        }
    }

    pub(crate) fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }
}

/// One child entry of a directory: tree metadata plus lifecycle slot.
pub(crate) struct DirEntry {
    pub(crate) ftype: FileType,
    pub(crate) perms: u32,
    /// The source-control hash this entry was last checked out from.
    /// `None` for locally-created (untracked) entries.
    pub(crate) hash: Option<Hash>,
    pub(crate) slot: EntrySlot,
}

impl DirEntry {
    /// Whether the loaded child carries local edits.
    pub(crate) fn is_materialized_file(&self) -> bool {
        match &self.slot {
            EntrySlot::Loaded(InodeHandle::File(f)) => f.is_materialized(),
            _ => false,
        }
    }
}

pub(crate) struct TreeState {
    pub(crate) entries: BTreeMap<String, DirEntry>,
    /// Hash of the tree this directory was last checked out from; the merge
    /// base for the next checkout. `None` for locally-created directories.
    pub(crate) source_hash: Option<Hash>,
    /// Whether this directory or anything beneath it carries local
    /// divergence (materialized files, untracked or removed entries). A
    /// dirty directory's source hash no longer vouches for its subtree.
    pub(crate) dirty: bool,
}

/// In-memory representation of one directory.
///
/// Owns its child entries by value; the parent relation is a non-owning
/// `Weak` back-reference used only for path reconstruction and dirty
/// propagation, never for ownership, which keeps the parent/child graph
/// acyclic for destruction purposes.
pub struct TreeInode {
    number: InodeNumber,
    parent: Weak<TreeInode>,
    ctx: Arc<VfsContext>,
    state: Mutex<TreeState>,
}

impl TreeInode {
    /// Build a directory inode from a source-control tree object.
    pub(crate) fn from_tree(
        tree: &Tree,
        number: InodeNumber,
        parent: Weak<TreeInode>,
        ctx: Arc<VfsContext>,
        source_hash: Hash,
    ) -> Arc<Self> {
        let entries = tree
            .entries
            .iter()
            .map(|e| {
                (
                    e.name.clone(),
                    DirEntry {
                        ftype: e.ftype,
                        perms: e.perms,
                        hash: Some(e.hash),
                        slot: EntrySlot::Unloaded,
                    },
                )
            })
            .collect();
        Arc::new(Self {
            number,
            parent,
            ctx,
            state: Mutex::new(TreeState {
                entries,
                source_hash: Some(source_hash),
                dirty: false,
            }),
        })
    }

    /// Build an empty, locally-created directory with no source tree.
    pub(crate) fn new_untracked(
        number: InodeNumber,
        parent: Weak<TreeInode>,
        ctx: Arc<VfsContext>,
    ) -> Arc<Self> {
        Arc::new(Self {
            number,
            parent,
            ctx,
            state: Mutex::new(TreeState {
                entries: BTreeMap::new(),
                source_hash: None,
                dirty: false,
            }),
        })
    }

    /// The inode's process-lifetime-unique number.
    pub fn number(&self) -> InodeNumber {
        self.number
    }

    /// The hash of the tree this directory was last checked out from.
    pub fn source_hash(&self) -> Option<Hash> {
        self.lock_state().source_hash
    }

    /// Whether this directory subtree carries local divergence.
    pub fn is_dirty(&self) -> bool {
        self.lock_state().dirty
    }

    /// Returns `true` if the directory has no entries.
    pub fn is_empty(&self) -> bool {
        self.lock_state().entries.is_empty()
    }

    /// Sorted names of all current entries.
    pub fn entry_names(&self) -> Vec<String> {
        self.lock_state().entries.keys().cloned().collect()
    }

    /// Whether an entry with this name exists, in any lifecycle state.
    pub fn contains(&self, name: &str) -> bool {
        self.lock_state().entries.contains_key(name)
    }

    /// Whether the named child's inode object is currently constructed.
    pub fn is_child_loaded(&self, name: &str) -> bool {
        self.lock_state()
            .entries
            .get(name)
            .map(|e| e.slot.is_loaded())
            .unwrap_or(false)
    }

    /// The parent directory, if any and still alive.
    pub fn parent(&self) -> Option<Arc<TreeInode>> {
        self.parent.upgrade()
    }

    /// Reconstruct this directory's path; the root is the empty string.
    /// Returns `None` when this directory was detached from a still-living
    /// parent.
    pub fn path(&self) -> Option<String> {
        match self.parent.upgrade() {
            None => Some(String::new()),
            Some(parent) => {
                let name = parent.name_of_child(self.number)?;
                let base = parent.path()?;
                Some(if base.is_empty() {
                    name
                } else {
                    format!("{base}/{name}")
                })
            }
        }
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, TreeState> {
        self.state.lock().expect("lock poisoned")
    }

    /// Find the name of a child by inode number, if assigned and present.
    pub(crate) fn name_of_child(&self, number: InodeNumber) -> Option<String> {
        self.lock_state()
            .entries
            .iter()
            .find(|(_, e)| e.slot.number() == Some(number))
            .map(|(name, _)| name.clone())
    }

    /// Mark this directory and all its ancestors as carrying local
    /// divergence. Stops early once an already-dirty ancestor is reached,
    /// since dirtiness is propagated upward invariantly.
    pub(crate) fn mark_dirty_upwards(self: &Arc<Self>) {
        let mut current = Arc::clone(self);
        loop {
            let already = {
                let mut state = current.lock_state();
                let already = state.dirty;
                state.dirty = true;
                already
            };
            if already {
                break;
            }
            match current.parent.upgrade() {
                Some(parent) => current = parent,
                None => break,
            }
        }
    }

    // -----------------------------------------------------------------
    // Lifecycle operations
    // -----------------------------------------------------------------

    /// Return the entry's inode number, assigning a fresh one if none
    /// exists yet. Does not construct the child object.
    pub fn child_inode_number(&self, name: &str) -> VfsResult<InodeNumber> {
        let mut state = self.lock_state();
        let entry = state
            .entries
            .get_mut(name)
            .ok_or_else(|| VfsError::NotFound(name.to_string()))?;
        match entry.slot.number() {
            Some(number) => Ok(number),
            None => {
                let number = self.ctx.allocator.allocate();
                entry.slot = EntrySlot::Assigned(number);
                trace!(name, %number, "assigned inode number");
                Ok(number)
            }
        }
    }

    /// Load the named child, constructing its inode object if needed.
    ///
    /// File and symlink children construct immediately; their blob is only
    /// fetched when the contents are read. Directory children fetch their
    /// tree object from the store, and concurrent loads for the same
    /// still-loading child coalesce onto the single in-flight fetch.
    pub async fn load_child(self: &Arc<Self>, name: &str) -> VfsResult<InodeHandle> {
        enum Plan {
            Done(InodeHandle),
            Wait(watch::Receiver<LoadOutcome>),
            FetchDir {
                number: InodeNumber,
                hash: Hash,
                tx: watch::Sender<LoadOutcome>,
            },
        }

        let plan = {
            let mut state = self.lock_state();
            let entry = state
                .entries
                .get_mut(name)
                .ok_or_else(|| VfsError::NotFound(name.to_string()))?;
            match &entry.slot {
                EntrySlot::Loaded(handle) => Plan::Done(handle.clone()),
                EntrySlot::Loading { done, .. } => Plan::Wait(done.clone()),
                EntrySlot::Unloaded | EntrySlot::Assigned(_) => {
                    let number = entry
                        .slot
                        .number()
                        .unwrap_or_else(|| self.ctx.allocator.allocate());
                    // Unloaded and assigned slots always carry a source
                    // hash; untracked entries are loaded from birth.
                    let hash = entry
                        .hash
                        .ok_or_else(|| VfsError::NotFound(name.to_string()))?;
                    if entry.ftype == FileType::Directory {
                        let (tx, rx) = watch::channel(LoadOutcome::Pending);
                        entry.slot = EntrySlot::Loading { number, done: rx };
                        Plan::FetchDir { number, hash, tx }
                    } else {
                        let file = FileInode::new_clean(
                            number,
                            entry.ftype,
                            hash,
                            entry.perms,
                            Arc::downgrade(self),
                            Arc::clone(&self.ctx),
                        );
                        let handle = InodeHandle::File(file);
                        entry.slot = EntrySlot::Loaded(handle.clone());
                        Plan::Done(handle)
                    }
                }
            }
        };

        match plan {
            Plan::Done(handle) => Ok(handle),
            Plan::Wait(rx) => wait_for_load(rx, name).await,
            Plan::FetchDir { number, hash, tx } => {
                self.finish_directory_load(name, number, hash, tx).await
            }
        }
    }

    /// Resolve an in-flight directory load: fetch the tree, then re-check
    /// the slot under the lock before linking the constructed inode.
    async fn finish_directory_load(
        self: &Arc<Self>,
        name: &str,
        number: InodeNumber,
        hash: Hash,
        tx: watch::Sender<LoadOutcome>,
    ) -> VfsResult<InodeHandle> {
        let fetched = self.ctx.store.get_tree(&hash).await;

        let mut state = self.lock_state();
        let ours = matches!(
            state.entries.get(name).map(|e| &e.slot),
            Some(EntrySlot::Loading { number: n, .. }) if *n == number
        );
        if !ours {
            // The entry was unlinked (or replaced) while the fetch was in
            // flight. The load's result is discarded, never reinserted.
            drop(state);
            debug!(name, "entry removed during load, discarding result");
            let _ = tx.send(LoadOutcome::Gone);
            return Err(VfsError::NotFound(name.to_string()));
        }

        match fetched {
            Ok(tree) => {
                let child = TreeInode::from_tree(
                    &tree,
                    number,
                    Arc::downgrade(self),
                    Arc::clone(&self.ctx),
                    hash,
                );
                let handle = InodeHandle::Tree(child);
                if let Some(entry) = state.entries.get_mut(name) {
                    entry.slot = EntrySlot::Loaded(handle.clone());
                }
                drop(state);
                let _ = tx.send(LoadOutcome::Ready(handle.clone()));
                Ok(handle)
            }
            Err(store_err) => {
                // Roll the slot back so a later load can retry.
                if let Some(entry) = state.entries.get_mut(name) {
                    entry.slot = EntrySlot::Assigned(number);
                }
                drop(state);
                let err = VfsError::from(store_err);
                let _ = tx.send(LoadOutcome::Failed(err.clone()));
                Err(err)
            }
        }
    }

    /// Remove the named non-directory entry, whatever its lifecycle state.
    ///
    /// A previously obtained reference to the child inode remains valid
    /// and keeps serving its own data (unlink-while-open semantics). Safe
    /// against a concurrent load of the same name: if the unlink completes
    /// first, the in-flight load's result is discarded.
    pub fn unlink(self: &Arc<Self>, name: &str) -> VfsResult<()> {
        {
            let mut state = self.lock_state();
            let entry = state
                .entries
                .get(name)
                .ok_or_else(|| VfsError::NotFound(name.to_string()))?;
            if entry.ftype == FileType::Directory {
                return Err(VfsError::IsADirectory(name.to_string()));
            }
            state.entries.remove(name);
        }
        debug!(name, "unlinked entry");
        self.mark_dirty_upwards();
        Ok(())
    }

    /// Remove the named directory entry.
    ///
    /// A non-empty directory is a reportable condition, never a silent
    /// deletion: fails with `DirectoryNotEmpty` if the child (loaded or
    /// fetched) has any entries.
    pub async fn rmdir(self: &Arc<Self>, name: &str) -> VfsResult<()> {
        enum Listing {
            Loaded(Arc<TreeInode>),
            Fetch(Hash),
        }

        let listing = {
            let state = self.lock_state();
            let entry = state
                .entries
                .get(name)
                .ok_or_else(|| VfsError::NotFound(name.to_string()))?;
            if entry.ftype != FileType::Directory {
                return Err(VfsError::NotADirectory(name.to_string()));
            }
            match (&entry.slot, entry.hash) {
                (EntrySlot::Loaded(InodeHandle::Tree(t)), _) => Listing::Loaded(Arc::clone(t)),
                (_, Some(hash)) => Listing::Fetch(hash),
                // An untracked directory is always loaded; nothing else can
                // carry a hashless slot.
                (_, None) => return Err(VfsError::NotFound(name.to_string())),
            }
        };

        if let Listing::Fetch(hash) = &listing {
            let tree = self.ctx.store.get_tree(hash).await?;
            if !tree.is_empty() {
                return Err(VfsError::DirectoryNotEmpty(name.to_string()));
            }
        }

        {
            let mut state = self.lock_state();
            let entry = state
                .entries
                .get(name)
                .ok_or_else(|| VfsError::NotFound(name.to_string()))?;
            if entry.ftype != FileType::Directory {
                return Err(VfsError::NotADirectory(name.to_string()));
            }
            // Re-check emptiness under the lock for loaded children, so a
            // concurrently created entry is not silently discarded.
            if let EntrySlot::Loaded(InodeHandle::Tree(t)) = &entry.slot {
                if !t.is_empty() {
                    return Err(VfsError::DirectoryNotEmpty(name.to_string()));
                }
            } else if matches!(listing, Listing::Loaded(_)) {
                // The slot changed shape while unlocked; retry-worthy, but
                // treat it as removal racing us.
                return Err(VfsError::NotFound(name.to_string()));
            }
            state.entries.remove(name);
        }
        debug!(name, "removed directory entry");
        self.mark_dirty_upwards();
        Ok(())
    }

    // -----------------------------------------------------------------
    // Local namespace mutations
    // -----------------------------------------------------------------

    /// Create an untracked file with the given contents, materialized from
    /// birth.
    pub fn create_file(
        self: &Arc<Self>,
        name: &str,
        data: &[u8],
        perms: u32,
    ) -> VfsResult<Arc<FileInode>> {
        let file = {
            let mut state = self.lock_state();
            if state.entries.contains_key(name) {
                return Err(VfsError::AlreadyExists(name.to_string()));
            }
            let number = self.ctx.allocator.allocate();
            let file = FileInode::new_untracked(
                number,
                FileType::Regular,
                data.to_vec(),
                perms,
                Arc::downgrade(self),
                Arc::clone(&self.ctx),
            );
            state.entries.insert(
                name.to_string(),
                DirEntry {
                    ftype: FileType::Regular,
                    perms,
                    hash: None,
                    slot: EntrySlot::Loaded(InodeHandle::File(Arc::clone(&file))),
                },
            );
            file
        };
        self.mark_dirty_upwards();
        Ok(file)
    }

    /// Create an untracked symlink pointing at `target`.
    pub fn create_symlink(self: &Arc<Self>, name: &str, target: &str) -> VfsResult<Arc<FileInode>> {
        let file = {
            let mut state = self.lock_state();
            if state.entries.contains_key(name) {
                return Err(VfsError::AlreadyExists(name.to_string()));
            }
            let number = self.ctx.allocator.allocate();
            let file = FileInode::new_untracked(
                number,
                FileType::Symlink,
                target.as_bytes().to_vec(),
                0o777,
                Arc::downgrade(self),
                Arc::clone(&self.ctx),
            );
            state.entries.insert(
                name.to_string(),
                DirEntry {
                    ftype: FileType::Symlink,
                    perms: 0o777,
                    hash: None,
                    slot: EntrySlot::Loaded(InodeHandle::File(Arc::clone(&file))),
                },
            );
            file
        };
        self.mark_dirty_upwards();
        Ok(file)
    }

    /// Create an untracked empty subdirectory.
    pub fn mkdir(self: &Arc<Self>, name: &str, perms: u32) -> VfsResult<Arc<TreeInode>> {
        let dir = {
            let mut state = self.lock_state();
            if state.entries.contains_key(name) {
                return Err(VfsError::AlreadyExists(name.to_string()));
            }
            let number = self.ctx.allocator.allocate();
            let dir =
                TreeInode::new_untracked(number, Arc::downgrade(self), Arc::clone(&self.ctx));
            state.entries.insert(
                name.to_string(),
                DirEntry {
                    ftype: FileType::Directory,
                    perms,
                    hash: None,
                    slot: EntrySlot::Loaded(InodeHandle::Tree(Arc::clone(&dir))),
                },
            );
            dir
        };
        self.mark_dirty_upwards();
        Ok(dir)
    }

    /// Detach every remaining entry. Used by forced checkout when a removed
    /// directory still holds content the target discards.
    pub(crate) fn clear_entries(&self) {
        self.lock_state().entries.clear();
    }
}

impl std::fmt::Debug for TreeInode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock_state();
        f.debug_struct("TreeInode")
            .field("number", &self.number)
            .field("entries", &state.entries.len())
            .field("source_hash", &state.source_hash)
            .field("dirty", &state.dirty)
            .finish()
    }
}

/// Await the outcome of a load another caller started.
async fn wait_for_load(
    mut rx: watch::Receiver<LoadOutcome>,
    name: &str,
) -> VfsResult<InodeHandle> {
    loop {
        let outcome = rx.borrow_and_update().clone();
        match outcome {
            LoadOutcome::Pending => {}
            LoadOutcome::Ready(handle) => return Ok(handle),
            LoadOutcome::Gone => return Err(VfsError::NotFound(name.to_string())),
            LoadOutcome::Failed(err) => return Err(err),
        }
        if rx.changed().await.is_err() {
            // The loading task was dropped without resolving; the entry is
            // in whatever state the concurrent operations left it.
            return Err(VfsError::NotFound(name.to_string()));
        }
    }
}

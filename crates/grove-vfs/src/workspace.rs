use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use grove_store::ObjectStore;
use grove_types::{Hash, InodeNumberAllocator};

use crate::checkout::checkout_tree;
use crate::conflict::CheckoutConflict;
use crate::error::{VfsError, VfsResult};
use crate::file::FileInode;
use crate::inode::{InodeHandle, VfsContext};
use crate::tree::TreeInode;

/// The live namespace: a lazily populated in-memory mirror of one committed
/// tree, re-pointable between snapshots.
///
/// A `Workspace` owns the root directory inode and the snapshot hash it was
/// last checked out from. All other inodes are constructed on demand as
/// paths are resolved.
pub struct Workspace {
    ctx: Arc<VfsContext>,
    root: Arc<TreeInode>,
    snapshot: Mutex<Hash>,
    /// Checkouts run one at a time; a started checkout always runs to
    /// completion.
    checkout_serial: tokio::sync::Mutex<()>,
}

impl Workspace {
    /// Open a workspace at the given root tree.
    pub async fn open(store: Arc<ObjectStore>, root_hash: Hash) -> VfsResult<Arc<Self>> {
        let ctx = Arc::new(VfsContext {
            store,
            allocator: InodeNumberAllocator::new(),
        });
        let tree = ctx.store.get_tree(&root_hash).await?;
        let root_number = ctx.allocator.allocate();
        let root = TreeInode::from_tree(
            &tree,
            root_number,
            std::sync::Weak::new(),
            Arc::clone(&ctx),
            root_hash,
        );
        info!(root = %root_hash.short_hex(), "workspace opened");
        Ok(Arc::new(Self {
            ctx,
            root,
            snapshot: Mutex::new(root_hash),
            checkout_serial: tokio::sync::Mutex::new(()),
        }))
    }

    /// The root directory inode.
    pub fn root(&self) -> Arc<TreeInode> {
        Arc::clone(&self.root)
    }

    /// The hash of the currently checked-out snapshot.
    pub fn snapshot(&self) -> Hash {
        *self.snapshot.lock().expect("lock poisoned")
    }

    /// Re-point the recorded snapshot without touching live inodes.
    ///
    /// Live entries keep whatever state they have; the next checkout merges
    /// from the new base, surfacing any divergence as conflicts.
    pub fn reset_snapshot(&self, hash: Hash) {
        debug!(snapshot = %hash.short_hex(), "snapshot reset");
        *self.snapshot.lock().expect("lock poisoned") = hash;
    }

    // -----------------------------------------------------------------
    // Path resolution
    // -----------------------------------------------------------------

    /// Resolve a relative, '/'-joined path to an inode, loading lazily
    /// along the way. The empty path resolves to the root.
    pub async fn resolve(&self, path: &str) -> VfsResult<InodeHandle> {
        let mut current = InodeHandle::Tree(self.root());
        for component in path.split('/').filter(|c| !c.is_empty()) {
            let dir = match current {
                InodeHandle::Tree(tree) => tree,
                InodeHandle::File(_) => return Err(VfsError::NotADirectory(path.to_string())),
            };
            current = dir.load_child(component).await?;
        }
        Ok(current)
    }

    /// Resolve a path to a file inode.
    pub async fn file_inode(&self, path: &str) -> VfsResult<Arc<FileInode>> {
        self.resolve(path).await?.into_file(path)
    }

    /// Resolve a path to a directory inode.
    pub async fn tree_inode(&self, path: &str) -> VfsResult<Arc<TreeInode>> {
        self.resolve(path).await?.into_tree(path)
    }

    /// Read a file's full contents by path.
    pub async fn read_file(&self, path: &str) -> VfsResult<Vec<u8>> {
        self.file_inode(path).await?.read().await
    }

    // -----------------------------------------------------------------
    // Checkout
    // -----------------------------------------------------------------

    /// Re-point the workspace from the current snapshot to `target`.
    ///
    /// Three-way-merges the previous tree, the live inode tree, and the
    /// target tree. Local edits are preserved and reported as conflicts
    /// unless `force` is set, in which case the conflicting entries are
    /// overwritten (type transitions excepted). Always returns the complete
    /// conflict list; a non-empty list is not an error.
    pub async fn checkout(&self, target: Hash, force: bool) -> VfsResult<Vec<CheckoutConflict>> {
        let _serial = self.checkout_serial.lock().await;

        let from_hash = self.snapshot();
        if from_hash == target && !self.root.is_dirty() {
            debug!(target = %target.short_hex(), "target equals clean snapshot, nothing to do");
            return Ok(Vec::new());
        }

        info!(
            from = %from_hash.short_hex(),
            to = %target.short_hex(),
            force,
            "checkout starting"
        );
        let from_tree = self.ctx.store.get_tree(&from_hash).await?;
        let to_tree = self.ctx.store.get_tree(&target).await?;

        let conflicts = checkout_tree(
            Arc::clone(&self.ctx),
            self.root(),
            String::new(),
            Some(from_tree),
            Some((to_tree, target)),
            force,
        )
        .await?;

        *self.snapshot.lock().expect("lock poisoned") = target;
        info!(conflicts = conflicts.len(), "checkout complete");
        Ok(conflicts)
    }
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("snapshot", &self.snapshot())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use grove_testutil::{TestWorkspace, TreeBuilder, VfsError};

    fn fixture() -> TreeBuilder {
        let mut builder = TreeBuilder::new();
        builder.set_file("src/main.c", "int main() { return 0; }\n");
        builder.set_file("src/lib/util.c", "utility\n");
        builder.set_file("readme.txt", "hello\n");
        builder
    }

    #[tokio::test]
    async fn resolve_walks_nested_paths() {
        let t = TestWorkspace::new(&fixture()).await;
        assert_eq!(t.read_file("src/lib/util.c").await, b"utility\n");
        assert_eq!(t.read_file("readme.txt").await, b"hello\n");
    }

    #[tokio::test]
    async fn resolve_empty_path_is_root() {
        let t = TestWorkspace::new(&fixture()).await;
        let handle = t.workspace().resolve("").await.expect("resolve root");
        assert_eq!(handle.number(), t.workspace().root().number());
    }

    #[tokio::test]
    async fn resolve_missing_path_is_not_found() {
        let t = TestWorkspace::new(&fixture()).await;
        assert!(matches!(
            t.workspace().resolve("src/nope.c").await,
            Err(VfsError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn resolve_through_a_file_is_not_a_directory() {
        let t = TestWorkspace::new(&fixture()).await;
        assert!(matches!(
            t.workspace().resolve("readme.txt/deeper").await,
            Err(VfsError::NotADirectory(_))
        ));
    }

    #[tokio::test]
    async fn file_inode_on_a_directory_fails() {
        let t = TestWorkspace::new(&fixture()).await;
        assert!(matches!(
            t.workspace().file_inode("src").await,
            Err(VfsError::IsADirectory(_))
        ));
        assert!(matches!(
            t.workspace().tree_inode("readme.txt").await,
            Err(VfsError::NotADirectory(_))
        ));
    }

    #[tokio::test]
    async fn child_numbers_are_stable_across_assignment_and_load() {
        let t = TestWorkspace::new(&fixture()).await;
        let src = t.workspace().tree_inode("src").await.expect("src");
        let assigned = src.child_inode_number("main.c").expect("assign");
        let again = src.child_inode_number("main.c").expect("again");
        assert_eq!(assigned, again);

        let file = t.workspace().file_inode("src/main.c").await.expect("load");
        assert_eq!(file.number(), assigned);
    }

    #[tokio::test]
    async fn local_edits_mark_the_ancestry_dirty() {
        let t = TestWorkspace::new(&fixture()).await;
        let root = t.workspace().root();
        assert!(!root.is_dirty());

        let file = t.workspace().file_inode("src/main.c").await.expect("load");
        file.materialize_for_write().await.expect("materialize");

        assert!(root.is_dirty());
        let src = t.workspace().tree_inode("src").await.expect("src");
        assert!(src.is_dirty());
    }

    #[tokio::test]
    async fn path_reconstruction_uses_parent_links() {
        let t = TestWorkspace::new(&fixture()).await;
        let util = t.workspace().file_inode("src/lib/util.c").await.expect("load");
        assert_eq!(util.path().as_deref(), Some("src/lib/util.c"));

        let lib = t.workspace().tree_inode("src/lib").await.expect("lib");
        assert_eq!(lib.path().as_deref(), Some("src/lib"));
        assert_eq!(t.workspace().root().path().as_deref(), Some(""));
    }
}

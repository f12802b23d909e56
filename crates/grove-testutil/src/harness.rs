use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};

use grove_store::{BackingStore, ContentStore, ObjectStore};
use grove_types::Hash;
use grove_vfs::{FileInode, InodeHandle, TreeInode, Workspace};

use crate::backing::FakeBackingStore;
use crate::builder::TreeBuilder;

/// A fully wired workspace over fake stores, playing the role the real
/// mount plays in production.
pub struct TestWorkspace {
    backing: Arc<FakeBackingStore>,
    store: Arc<ObjectStore>,
    workspace: Arc<Workspace>,
}

impl TestWorkspace {
    /// Finalize the builder (all objects ready) and open a workspace on the
    /// resulting root.
    pub async fn new(builder: &TreeBuilder) -> Self {
        let backing = Arc::new(FakeBackingStore::new());
        let root = builder.finalize(&backing, true);
        Self::open(backing, root).await
    }

    /// Open a workspace over an existing fake backing store.
    pub async fn open(backing: Arc<FakeBackingStore>, root: Hash) -> Self {
        let local = Arc::new(ContentStore::in_memory());
        let store = Arc::new(ObjectStore::new(
            local,
            Arc::clone(&backing) as Arc<dyn BackingStore>,
        ));
        let workspace = Workspace::open(Arc::clone(&store), root)
            .await
            .expect("open workspace");
        Self {
            backing,
            store,
            workspace,
        }
    }

    /// The fake backing store, for readiness gates and fetch counters.
    pub fn backing(&self) -> &Arc<FakeBackingStore> {
        &self.backing
    }

    /// The fetch-through object store.
    pub fn store(&self) -> &Arc<ObjectStore> {
        &self.store
    }

    /// The workspace under test.
    pub fn workspace(&self) -> &Arc<Workspace> {
        &self.workspace
    }

    /// Resolve a path to a directory inode, panicking on failure.
    pub async fn tree_inode(&self, path: &str) -> Arc<TreeInode> {
        self.workspace
            .tree_inode(path)
            .await
            .unwrap_or_else(|e| panic!("expected directory at {path:?}: {e}"))
    }

    /// Resolve a path to a file inode, panicking on failure.
    pub async fn file_inode(&self, path: &str) -> Arc<FileInode> {
        self.workspace
            .file_inode(path)
            .await
            .unwrap_or_else(|e| panic!("expected file at {path:?}: {e}"))
    }

    /// Read a file's contents by path, panicking on failure.
    pub async fn read_file(&self, path: &str) -> Vec<u8> {
        self.workspace
            .read_file(path)
            .await
            .unwrap_or_else(|e| panic!("expected readable file at {path:?}: {e}"))
    }

    /// Materialize and replace a tracked file's contents, the way a write
    /// through the dispatcher would.
    pub async fn overwrite_file(&self, path: &str, contents: &str) {
        let file = self.file_inode(path).await;
        file.materialize_for_write()
            .await
            .expect("materialize for write");
        file.overwrite(contents.as_bytes())
            .await
            .expect("overwrite file");
    }

    /// Create an untracked file under an existing directory.
    pub async fn add_file(&self, path: &str, contents: &str) {
        let (dir_path, name) = match path.rsplit_once('/') {
            Some((dir, name)) => (dir, name),
            None => ("", path),
        };
        let dir = self.tree_inode(dir_path).await;
        dir.create_file(name, contents.as_bytes(), 0o644)
            .expect("create file");
    }

    /// Walk the whole tree, constructing every inode.
    pub async fn load_all(&self) {
        load_all_under(self.workspace.root()).await;
    }
}

fn load_all_under(dir: Arc<TreeInode>) -> BoxFuture<'static, ()> {
    async move {
        for name in dir.entry_names() {
            let handle = dir
                .load_child(&name)
                .await
                .unwrap_or_else(|e| panic!("load {name:?}: {e}"));
            if let InodeHandle::Tree(child) = handle {
                load_all_under(child).await;
            }
        }
    }
    .boxed()
}

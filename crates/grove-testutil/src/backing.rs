use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::watch;

use grove_store::{BackingStore, Blob, StoreResult, Tree};
use grove_types::Hash;

enum FakeObject {
    Tree(Tree),
    Blob(Blob),
}

struct Stored {
    object: FakeObject,
    ready: watch::Sender<bool>,
}

/// In-memory backing store with per-object readiness gating.
///
/// A fetch for an object that is not ready suspends until [`set_ready`] is
/// called, which lets tests order loads against other operations (an
/// unlink racing an in-flight load, for instance). Fetch counters record
/// how many requests actually reached the backing store, for asserting
/// that unchanged subtrees are never loaded.
///
/// [`set_ready`]: FakeBackingStore::set_ready
pub struct FakeBackingStore {
    objects: Mutex<HashMap<Hash, Stored>>,
    tree_fetches: AtomicU64,
    blob_fetches: AtomicU64,
}

impl FakeBackingStore {
    /// Create an empty fake backing store.
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            tree_fetches: AtomicU64::new(0),
            blob_fetches: AtomicU64::new(0),
        }
    }

    /// Store a tree, returning its hash. When `ready` is false, fetches
    /// for it suspend until [`set_ready`](Self::set_ready).
    pub fn put_tree(&self, tree: &Tree, ready: bool) -> Hash {
        let hash = tree.hash().expect("serialize tree");
        self.insert(hash, FakeObject::Tree(tree.clone()), ready);
        hash
    }

    /// Store a blob, returning its hash.
    pub fn put_blob(&self, blob: &Blob, ready: bool) -> Hash {
        let hash = blob.hash();
        self.insert(hash, FakeObject::Blob(blob.clone()), ready);
        hash
    }

    fn insert(&self, hash: Hash, object: FakeObject, ready: bool) {
        let mut objects = self.objects.lock().expect("lock poisoned");
        objects.entry(hash).or_insert_with(|| {
            let (tx, _rx) = watch::channel(ready);
            Stored { object, ready: tx }
        });
        if ready {
            if let Some(stored) = objects.get(&hash) {
                let _ = stored.ready.send(true);
            }
        }
    }

    /// Release all fetches suspended on the given object.
    pub fn set_ready(&self, hash: &Hash) {
        let objects = self.objects.lock().expect("lock poisoned");
        let stored = objects.get(hash).expect("object not stored");
        let _ = stored.ready.send(true);
    }

    /// Gate the given object again: subsequent fetches suspend until the
    /// next `set_ready`.
    pub fn set_unready(&self, hash: &Hash) {
        let objects = self.objects.lock().expect("lock poisoned");
        let stored = objects.get(hash).expect("object not stored");
        let _ = stored.ready.send(false);
    }

    /// Release every gated object at once.
    pub fn set_all_ready(&self) {
        let objects = self.objects.lock().expect("lock poisoned");
        for stored in objects.values() {
            let _ = stored.ready.send(true);
        }
    }

    /// Number of tree fetches that reached this store.
    pub fn tree_fetch_count(&self) -> u64 {
        self.tree_fetches.load(Ordering::SeqCst)
    }

    /// Number of blob fetches that reached this store.
    pub fn blob_fetch_count(&self) -> u64 {
        self.blob_fetches.load(Ordering::SeqCst)
    }

    /// Total fetches of any kind.
    pub fn fetch_count(&self) -> u64 {
        self.tree_fetch_count() + self.blob_fetch_count()
    }

    fn readiness(&self, hash: &Hash) -> Option<watch::Receiver<bool>> {
        let objects = self.objects.lock().expect("lock poisoned");
        objects.get(hash).map(|s| s.ready.subscribe())
    }
}

impl Default for FakeBackingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackingStore for FakeBackingStore {
    async fn get_tree(&self, hash: &Hash) -> StoreResult<Option<Tree>> {
        let Some(mut ready) = self.readiness(hash) else {
            return Ok(None);
        };
        self.tree_fetches.fetch_add(1, Ordering::SeqCst);
        if ready.wait_for(|r| *r).await.is_err() {
            return Ok(None);
        }
        let objects = self.objects.lock().expect("lock poisoned");
        match objects.get(hash).map(|s| &s.object) {
            Some(FakeObject::Tree(tree)) => Ok(Some(tree.clone())),
            _ => Ok(None),
        }
    }

    async fn get_blob(&self, hash: &Hash) -> StoreResult<Option<Blob>> {
        let Some(mut ready) = self.readiness(hash) else {
            return Ok(None);
        };
        self.blob_fetches.fetch_add(1, Ordering::SeqCst);
        if ready.wait_for(|r| *r).await.is_err() {
            return Ok(None);
        }
        let objects = self.objects.lock().expect("lock poisoned");
        match objects.get(hash).map(|s| &s.object) {
            Some(FakeObject::Blob(blob)) => Ok(Some(blob.clone())),
            _ => Ok(None),
        }
    }
}

impl std::fmt::Debug for FakeBackingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeBackingStore")
            .field(
                "objects",
                &self.objects.lock().expect("lock poisoned").len(),
            )
            .field("tree_fetches", &self.tree_fetch_count())
            .field("blob_fetches", &self.blob_fetch_count())
            .finish()
    }
}

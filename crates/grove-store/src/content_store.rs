use std::collections::HashSet;
use std::sync::Mutex;

use tracing::debug;

use grove_types::Hash;

use crate::engine::{MemoryEngine, StorageEngine};
use crate::error::StoreResult;
use crate::object::{frame, unframe, Blob, BlobMetadata, ObjectKind, Tree};

/// Suffix appended to a blob's key to form its metadata key. Metadata rows
/// live in a keyspace distinct from the objects themselves, so metadata
/// lookups never require decoding the full blob.
const METADATA_SUFFIX: u8 = b'm';

fn object_key(hash: &Hash) -> Vec<u8> {
    hash.as_bytes().to_vec()
}

fn metadata_key(hash: &Hash) -> Vec<u8> {
    let mut key = hash.as_bytes().to_vec();
    key.push(METADATA_SUFFIX);
    key
}

/// Buffered writes accumulated while batch mode is enabled.
struct Batch {
    writes: Vec<(Vec<u8>, Vec<u8>)>,
    /// Keys inserted since batch mode was enabled, so `has_key` can report
    /// buffered-but-not-yet-flushed keys.
    keys: HashSet<Vec<u8>>,
    buffered_bytes: usize,
    capacity: usize,
}

impl Batch {
    fn new(capacity: usize) -> Self {
        Self {
            writes: Vec::new(),
            keys: HashSet::new(),
            buffered_bytes: 0,
            capacity,
        }
    }
}

/// Local content-addressed cache of source-control objects.
///
/// Objects are retrievable only by hash. The store is a cache: a miss here
/// means the object must be fetched from the backing store (see
/// [`ObjectStore`]). All operations are safe for concurrent use from
/// multiple threads; the buffered-write state is the one internally
/// synchronized shared structure.
///
/// # Batch mode
///
/// [`enable_batch_mode`] switches writes into a buffered mode intended for
/// bulk import. Writes accumulate until the buffered byte volume exceeds the
/// configured threshold, then flush automatically. Any read issued while
/// buffered writes are outstanding triggers an implicit flush first, so a
/// reader never observes a miss for a key already put by this store.
///
/// [`ObjectStore`]: crate::ObjectStore
/// [`enable_batch_mode`]: ContentStore::enable_batch_mode
pub struct ContentStore {
    engine: Box<dyn StorageEngine>,
    pending: Mutex<Option<Batch>>,
}

impl ContentStore {
    /// Create a content store over the given engine.
    pub fn new(engine: Box<dyn StorageEngine>) -> Self {
        Self {
            engine,
            pending: Mutex::new(None),
        }
    }

    /// Create a content store over a fresh in-memory engine.
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryEngine::new()))
    }

    // -----------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------

    /// Get the raw stored value (kind tag + payload) for a hash.
    ///
    /// Returns `None` if the key is not present.
    pub fn get(&self, hash: &Hash) -> StoreResult<Option<Vec<u8>>> {
        self.flush_for_read()?;
        self.engine.get(&object_key(hash))
    }

    /// Get and decode a tree object.
    ///
    /// Returns `None` if the key is absent, and a corrupt-object error if
    /// the stored bytes are not a tree.
    pub fn get_tree(&self, hash: &Hash) -> StoreResult<Option<Tree>> {
        match self.get(hash)? {
            Some(value) => {
                let payload = unframe(hash, &value, ObjectKind::Tree)?;
                Ok(Some(Tree::from_bytes(hash, &payload)?))
            }
            None => Ok(None),
        }
    }

    /// Get and decode a blob object.
    ///
    /// Returns `None` if the key is absent, and a corrupt-object error if
    /// the stored bytes are not a blob.
    pub fn get_blob(&self, hash: &Hash) -> StoreResult<Option<Blob>> {
        match self.get(hash)? {
            Some(value) => {
                let payload = unframe(hash, &value, ObjectKind::Blob)?;
                Ok(Some(Blob::new(payload)))
            }
            None => Ok(None),
        }
    }

    /// Get the cached size and content digest for a blob.
    ///
    /// The metadata row is written by [`put_blob`] and backfilled here when
    /// only the blob itself is present. Returns `None` if neither the
    /// metadata nor the blob is stored.
    ///
    /// [`put_blob`]: ContentStore::put_blob
    pub fn get_blob_metadata(&self, hash: &Hash) -> StoreResult<Option<BlobMetadata>> {
        self.flush_for_read()?;
        if let Some(bytes) = self.engine.get(&metadata_key(hash))? {
            let meta = serde_json::from_slice(&bytes)
                .map_err(|e| crate::error::StoreError::Serialization(e.to_string()))?;
            return Ok(Some(meta));
        }
        // Backfill from the blob when present.
        match self.get_blob(hash)? {
            Some(blob) => {
                let meta = blob.metadata();
                self.put_metadata(hash, &meta)?;
                Ok(Some(meta))
            }
            None => Ok(None),
        }
    }

    /// Whether the key is stored or pending storage as part of batch mode.
    pub fn has_key(&self, hash: &Hash) -> StoreResult<bool> {
        let key = object_key(hash);
        {
            let pending = self.pending.lock().expect("lock poisoned");
            if let Some(batch) = pending.as_ref() {
                if batch.keys.contains(&key) {
                    return Ok(true);
                }
            }
        }
        self.engine.contains(&key)
    }

    // -----------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------

    /// Store a raw value under a hash key. Idempotent: content-addressing
    /// guarantees identical keys always carry identical bytes.
    pub fn put(&self, hash: &Hash, kind: ObjectKind, payload: &[u8]) -> StoreResult<()> {
        self.put_value(object_key(hash), frame(kind, payload))
    }

    /// Store a blob and its derived metadata row.
    pub fn put_blob(&self, blob: &Blob) -> StoreResult<BlobMetadata> {
        let hash = blob.hash();
        let meta = blob.metadata();
        self.put(&hash, ObjectKind::Blob, &blob.data)?;
        self.put_metadata(&hash, &meta)?;
        Ok(meta)
    }

    /// Store a tree and return its hash.
    pub fn put_tree(&self, tree: &Tree) -> StoreResult<Hash> {
        let bytes = tree.to_bytes()?;
        let hash = Hash::of_tree(&bytes);
        self.put(&hash, ObjectKind::Tree, &bytes)?;
        Ok(hash)
    }

    fn put_metadata(&self, hash: &Hash, meta: &BlobMetadata) -> StoreResult<()> {
        let bytes = serde_json::to_vec(meta)
            .map_err(|e| crate::error::StoreError::Serialization(e.to_string()))?;
        self.put_value(metadata_key(hash), bytes)
    }

    fn put_value(&self, key: Vec<u8>, value: Vec<u8>) -> StoreResult<()> {
        let mut pending = self.pending.lock().expect("lock poisoned");
        match pending.as_mut() {
            Some(batch) => {
                batch.buffered_bytes += key.len() + value.len();
                batch.keys.insert(key.clone());
                batch.writes.push((key, value));
                if batch.buffered_bytes > batch.capacity {
                    debug!(
                        buffered = batch.buffered_bytes,
                        capacity = batch.capacity,
                        "batch buffer exceeded capacity, flushing"
                    );
                    self.flush_batch(batch)?;
                }
                Ok(())
            }
            None => self.engine.put(&key, &value),
        }
    }

    // -----------------------------------------------------------------
    // Batch mode
    // -----------------------------------------------------------------

    /// Enable batch loading mode.
    ///
    /// Configures the store to buffer writes for bulk import. `capacity` is
    /// the maximum volume of encoded bytes to accumulate before flushing to
    /// the engine.
    pub fn enable_batch_mode(&self, capacity: usize) {
        let mut pending = self.pending.lock().expect("lock poisoned");
        if pending.is_none() {
            *pending = Some(Batch::new(capacity));
        }
    }

    /// Disable batch loading mode, flushing any pending writes.
    pub fn disable_batch_mode(&self) -> StoreResult<()> {
        let mut pending = self.pending.lock().expect("lock poisoned");
        if let Some(batch) = pending.as_mut() {
            self.flush_batch(batch)?;
        }
        *pending = None;
        Ok(())
    }

    /// Flush any batched writes to the engine.
    pub fn flush(&self) -> StoreResult<()> {
        let mut pending = self.pending.lock().expect("lock poisoned");
        if let Some(batch) = pending.as_mut() {
            self.flush_batch(batch)?;
        }
        Ok(())
    }

    /// Reads must not observe a miss for a key this store already accepted;
    /// flush outstanding buffered writes before consulting the engine.
    fn flush_for_read(&self) -> StoreResult<()> {
        let mut pending = self.pending.lock().expect("lock poisoned");
        if let Some(batch) = pending.as_mut() {
            if !batch.writes.is_empty() {
                debug!(
                    buffered = batch.writes.len(),
                    "flushing buffered writes before read"
                );
                self.flush_batch(batch)?;
            }
        }
        Ok(())
    }

    fn flush_batch(&self, batch: &mut Batch) -> StoreResult<()> {
        for (key, value) in batch.writes.drain(..) {
            self.engine.put(&key, &value)?;
        }
        batch.keys.clear();
        batch.buffered_bytes = 0;
        Ok(())
    }
}

impl std::fmt::Debug for ContentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let batching = self.pending.lock().expect("lock poisoned").is_some();
        f.debug_struct("ContentStore")
            .field("batch_mode", &batching)
            .finish()
    }
}

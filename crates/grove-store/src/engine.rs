use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::StoreResult;

/// Byte-level key/value engine underneath the [`ContentStore`].
///
/// The production system runs this over a persistent store; the engine
/// contract is all the content store depends on. Implementations must be
/// internally synchronized: all operations are safe for concurrent
/// invocation without external locking.
///
/// [`ContentStore`]: crate::ContentStore
pub trait StorageEngine: Send + Sync {
    /// Read the value stored under `key`, or `None` if absent.
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>>;

    /// Store `value` under `key`, overwriting any previous value.
    fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<()>;

    /// Check whether `key` is present.
    fn contains(&self, key: &[u8]) -> StoreResult<bool>;
}

/// In-memory, HashMap-based storage engine.
///
/// Intended for tests and embedding. All values are held in memory behind a
/// `RwLock`; values are cloned on read.
pub struct MemoryEngine {
    map: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryEngine {
    /// Create a new empty engine.
    pub fn new() -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
        }
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.map.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the engine holds no keys.
    pub fn is_empty(&self) -> bool {
        self.map.read().expect("lock poisoned").is_empty()
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine for MemoryEngine {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.map.read().expect("lock poisoned").get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.map
            .write()
            .expect("lock poisoned")
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn contains(&self, key: &[u8]) -> StoreResult<bool> {
        Ok(self.map.read().expect("lock poisoned").contains_key(key))
    }
}

impl std::fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEngine")
            .field("key_count", &self.len())
            .finish()
    }
}

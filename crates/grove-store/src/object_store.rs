use std::sync::Arc;

use tracing::trace;

use grove_types::Hash;

use crate::backing::BackingStore;
use crate::content_store::ContentStore;
use crate::error::{StoreError, StoreResult};
use crate::object::{Blob, BlobMetadata, Tree};

/// Fetch-through facade over the local cache and the backing store.
///
/// Reads consult the [`ContentStore`] first; on a miss the object is fetched
/// from the [`BackingStore`] and written back to the cache so the next
/// reader hits locally. An object absent from both sides is an error: the
/// caller asked for a hash nothing can produce.
pub struct ObjectStore {
    local: Arc<ContentStore>,
    backing: Arc<dyn BackingStore>,
}

impl ObjectStore {
    /// Create an object store over a local cache and a backing store.
    pub fn new(local: Arc<ContentStore>, backing: Arc<dyn BackingStore>) -> Self {
        Self { local, backing }
    }

    /// The local content-addressed cache.
    pub fn local(&self) -> &Arc<ContentStore> {
        &self.local
    }

    /// Get a tree, fetching from the backing store on a local miss.
    pub async fn get_tree(&self, hash: &Hash) -> StoreResult<Tree> {
        if let Some(tree) = self.local.get_tree(hash)? {
            return Ok(tree);
        }
        trace!(hash = %hash.short_hex(), "tree miss, fetching from backing store");
        match self.backing.get_tree(hash).await? {
            Some(tree) => {
                self.local.put_tree(&tree)?;
                Ok(tree)
            }
            None => Err(StoreError::NotFound(*hash)),
        }
    }

    /// Get a blob, fetching from the backing store on a local miss.
    pub async fn get_blob(&self, hash: &Hash) -> StoreResult<Blob> {
        if let Some(blob) = self.local.get_blob(hash)? {
            return Ok(blob);
        }
        trace!(hash = %hash.short_hex(), "blob miss, fetching from backing store");
        match self.backing.get_blob(hash).await? {
            Some(blob) => {
                self.local.put_blob(&blob)?;
                Ok(blob)
            }
            None => Err(StoreError::NotFound(*hash)),
        }
    }

    /// Get blob metadata, preferring the cached derived fact over fetching
    /// and hashing blob contents.
    pub async fn get_blob_metadata(&self, hash: &Hash) -> StoreResult<BlobMetadata> {
        if let Some(meta) = self.local.get_blob_metadata(hash)? {
            return Ok(meta);
        }
        let blob = self.get_blob(hash).await?;
        Ok(blob.metadata())
    }
}

impl std::fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStore").finish_non_exhaustive()
    }
}

use async_trait::async_trait;

use grove_types::Hash;

use crate::error::StoreResult;
use crate::object::{Blob, Tree};

/// External supplier of trees and blobs not present in the local cache.
///
/// Implementations typically talk to a source-control server; fetches
/// resolve when the remote object becomes available, so "not yet ready" is
/// an await point rather than a failure. Returning `Ok(None)` means the
/// object does not exist at all.
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Fetch a tree by hash.
    async fn get_tree(&self, hash: &Hash) -> StoreResult<Option<Tree>>;

    /// Fetch a blob by hash.
    async fn get_blob(&self, hash: &Hash) -> StoreResult<Option<Blob>>;
}

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Content-addressed identifier for a stored object.
///
/// A `Hash` is the BLAKE3 digest of an object's content. Identical bytes
/// always produce the same `Hash`, making objects deduplicatable and
/// verifiable. Digests are domain-separated by object kind, so a blob and a
/// tree with identical serialized bytes never collide.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash([u8; 32]);

const BLOB_CONTEXT: &str = "grove blob v1";
const TREE_CONTEXT: &str = "grove tree v1";

impl Hash {
    /// Compute the digest of raw blob content.
    pub fn of_blob(data: &[u8]) -> Self {
        Self(*blake3::Hasher::new_derive_key(BLOB_CONTEXT)
            .update(data)
            .finalize()
            .as_bytes())
    }

    /// Compute the digest of a serialized tree.
    pub fn of_tree(data: &[u8]) -> Self {
        Self(*blake3::Hasher::new_derive_key(TREE_CONTEXT)
            .update(data)
            .finalize()
            .as_bytes())
    }

    /// Plain digest of arbitrary bytes, without domain separation.
    ///
    /// Used for derived facts (e.g. blob content digests) where the input is
    /// already the raw content, not a storable object.
    pub fn of_bytes(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Create a `Hash` from a pre-computed digest.
    pub const fn from_raw(digest: [u8; 32]) -> Self {
        Self(digest)
    }

    /// The raw 32-byte digest.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(TypeError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.short_hex())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; 32]> for Hash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl From<Hash> for [u8; 32] {
    fn from(hash: Hash) -> Self {
        hash.0
    }
}

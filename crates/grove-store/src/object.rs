use serde::{Deserialize, Serialize};

use grove_types::Hash;

use crate::error::{StoreError, StoreResult};

/// The kind of object stored under a hash key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    /// Raw file content.
    Blob,
    /// Directory listing: sorted entries mapping names to object references.
    Tree,
}

impl ObjectKind {
    /// One-byte tag prefixed to stored values, so reads can validate that
    /// the bytes under a key are the requested kind of object.
    pub fn tag(&self) -> u8 {
        match self {
            Self::Blob => b'B',
            Self::Tree => b'T',
        }
    }

    /// Parse a stored tag byte.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            b'B' => Some(Self::Blob),
            b'T' => Some(Self::Tree),
            _ => None,
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blob => write!(f, "blob"),
            Self::Tree => write!(f, "tree"),
        }
    }
}

/// Frame a payload with its kind tag for storage.
pub(crate) fn frame(kind: ObjectKind, payload: &[u8]) -> Vec<u8> {
    let mut value = Vec::with_capacity(payload.len() + 1);
    value.push(kind.tag());
    value.extend_from_slice(payload);
    value
}

/// Split a stored value into kind tag and payload, validating the expected
/// kind.
pub(crate) fn unframe(hash: &Hash, value: &[u8], expected: ObjectKind) -> StoreResult<Vec<u8>> {
    let (&tag, payload) = value.split_first().ok_or_else(|| StoreError::CorruptObject {
        hash: *hash,
        reason: "empty stored value".to_string(),
    })?;
    let kind = ObjectKind::from_tag(tag).ok_or_else(|| StoreError::CorruptObject {
        hash: *hash,
        reason: format!("unknown object tag {tag:#04x}"),
    })?;
    if kind != expected {
        return Err(StoreError::CorruptObject {
            hash: *hash,
            reason: format!("expected {expected}, got {kind}"),
        });
    }
    Ok(payload.to_vec())
}

// ---------------------------------------------------------------------------
// Blob
// ---------------------------------------------------------------------------

/// Immutable file content, identified by its hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Blob {
    pub data: Vec<u8>,
}

impl Blob {
    /// Create a new blob from raw bytes.
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// The content-addressed hash of this blob.
    pub fn hash(&self) -> Hash {
        Hash::of_blob(&self.data)
    }

    /// Derived size and content-digest facts for this blob.
    pub fn metadata(&self) -> BlobMetadata {
        BlobMetadata {
            size: self.data.len() as u64,
            content_digest: Hash::of_bytes(&self.data),
        }
    }
}

/// Derived facts about a blob, cached separately from the blob itself so
/// repeated integrity/identity checks avoid re-hashing blob contents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMetadata {
    /// Size of the blob content in bytes.
    pub size: u64,
    /// Plain digest of the raw content.
    pub content_digest: Hash,
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

/// The kind of filesystem object a tree entry refers to.
///
/// A closed set: the checkout engine matches on it exhaustively to enumerate
/// every type-transition case.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileType {
    /// Normal file.
    Regular,
    /// Symbolic link; the referenced blob holds the target path.
    Symlink,
    /// Subtree.
    Directory,
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Regular => write!(f, "file"),
            Self::Symlink => write!(f, "symlink"),
            Self::Directory => write!(f, "directory"),
        }
    }
}

/// A single entry in a tree object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    /// Entry name (one path component).
    pub name: String,
    /// Content-addressed hash of the referenced blob or tree.
    pub hash: Hash,
    /// Kind of object the entry refers to.
    pub ftype: FileType,
    /// Owner permission bits, e.g. `0o644`.
    pub perms: u32,
}

impl TreeEntry {
    /// Create a new tree entry.
    pub fn new(name: impl Into<String>, hash: Hash, ftype: FileType, perms: u32) -> Self {
        Self {
            name: name.into(),
            hash,
            ftype,
            perms,
        }
    }

    /// Returns `true` if this entry refers to a subtree.
    pub fn is_directory(&self) -> bool {
        self.ftype == FileType::Directory
    }
}

impl PartialOrd for TreeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TreeEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name.cmp(&other.name)
    }
}

/// Immutable directory listing.
///
/// Entries are sorted by name. The sort order is load-bearing: the checkout
/// engine merges two trees with a single linear pass and relies on monotonic
/// name ordering to run in time proportional to the union of entries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    /// Sorted entries in this directory.
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    /// Create a new tree with the given entries.
    ///
    /// Entries are sorted by name for deterministic hashing and merging.
    pub fn new(mut entries: Vec<TreeEntry>) -> Self {
        entries.sort();
        Self { entries }
    }

    /// Create an empty tree.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Look up an entry by name.
    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries
            .binary_search_by(|e| e.name.as_str().cmp(name))
            .ok()
            .map(|idx| &self.entries[idx])
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the tree has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize to the stored byte form.
    pub fn to_bytes(&self) -> StoreResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Decode from the stored byte form.
    pub fn from_bytes(hash: &Hash, bytes: &[u8]) -> StoreResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::CorruptObject {
            hash: *hash,
            reason: e.to_string(),
        })
    }

    /// The content-addressed hash of this tree.
    pub fn hash(&self) -> StoreResult<Hash> {
        Ok(Hash::of_tree(&self.to_bytes()?))
    }
}

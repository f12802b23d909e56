use grove_types::Hash;

/// Errors from object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested object was not found locally or in the backing store.
    #[error("object not found: {0}")]
    NotFound(Hash),

    /// The stored bytes are not the requested kind of object, or cannot be
    /// decoded.
    #[error("corrupt object {hash}: {reason}")]
    CorruptObject { hash: Hash, reason: String },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage engine.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// The kind of collision between a local edit and a remote change.
///
/// A closed set so the checkout engine can enumerate every case, including
/// the type-transition collisions whose merge policy is intentionally left
/// unresolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConflictType {
    /// An untracked local entry blocks an entry the target adds.
    UntrackedAdded,
    /// A locally modified entry collides with a remote change or removal.
    Modified,
    /// A locally missing entry was scheduled to be changed or removed.
    MissingRemoved,
    /// A directory to be removed still contains local content.
    DirectoryNotEmpty,
    /// A file/directory/symlink type transition that checkout does not
    /// apply; reported for the caller to resolve.
    TypeChanged,
}

impl std::fmt::Display for ConflictType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UntrackedAdded => write!(f, "untracked-added"),
            Self::Modified => write!(f, "modified"),
            Self::MissingRemoved => write!(f, "missing-removed"),
            Self::DirectoryNotEmpty => write!(f, "directory-not-empty"),
            Self::TypeChanged => write!(f, "type-changed"),
        }
    }
}

/// A reported collision, produced (never mutated) by the checkout engine.
///
/// Conflicts are data, not errors: a non-empty conflict list does not fail
/// the checkout, and unrelated parts of the tree still apply their changes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckoutConflict {
    /// Relative, '/'-joined path of the colliding entry.
    pub path: String,
    /// Kind of collision.
    pub kind: ConflictType,
    /// Optional human-readable detail.
    pub message: String,
}

impl CheckoutConflict {
    /// Create a conflict with no detail message.
    pub fn new(kind: ConflictType, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind,
            message: String::new(),
        }
    }

    /// Create a conflict with a detail message.
    pub fn with_message(
        kind: ConflictType,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for CheckoutConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.path)?;
        if !self.message.is_empty() {
            write!(f, " ({})", self.message)?;
        }
        Ok(())
    }
}

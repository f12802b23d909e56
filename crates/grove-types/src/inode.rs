use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Process-lifetime-unique identity of one filesystem object.
///
/// Inode numbers are assigned lazily: a directory entry can carry an
/// assigned number long before the in-memory inode object is constructed.
/// Once assigned, the number is stable for the life of the process.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InodeNumber(u64);

impl InodeNumber {
    /// The raw numeric value.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for InodeNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InodeNumber({})", self.0)
    }
}

impl fmt::Display for InodeNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic allocator for [`InodeNumber`]s.
///
/// The first allocated number is 1; numbers are never reused. Safe for
/// concurrent use from multiple threads.
#[derive(Debug)]
pub struct InodeNumberAllocator {
    next: AtomicU64,
}

impl InodeNumberAllocator {
    /// Create a new allocator starting at 1.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Allocate a fresh, never-before-returned number.
    pub fn allocate(&self) -> InodeNumber {
        InodeNumber(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for InodeNumberAllocator {
    fn default() -> Self {
        Self::new()
    }
}

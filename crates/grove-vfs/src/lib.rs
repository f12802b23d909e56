//! The grove inode tree and checkout engine.
//!
//! This crate holds the live, in-memory mirror of a committed directory
//! tree. Contents are populated lazily from the content-addressed store as
//! paths are resolved, and the whole namespace can be atomically re-pointed
//! ("checked out") from one immutable snapshot to another while preserving
//! local, uncommitted edits and reporting conflicts where local and remote
//! changes collide.
//!
//! # Key Types
//!
//! - [`Workspace`] — the mount-like root: snapshot hash, root inode, checkout
//! - [`TreeInode`] / [`FileInode`] — directory and file inodes with lazy
//!   loading, inode-number assignment, and local-edit materialization
//! - [`InodeHandle`] — closed directory-or-file variant
//! - [`CheckoutConflict`] / [`ConflictType`] — conflicts reported as data
//! - [`VfsError`] — typed namespace and store failures
//!
//! # Correctness Rules
//!
//! 1. The outcome of a checkout is independent of how much of the tree
//!    happens to be resident in memory when it runs.
//! 2. All mutations of one directory's child mapping are serialized on that
//!    inode; concurrent load and unlink of the same name resolve
//!    deterministically, and a load result is never linked back after its
//!    entry was removed.
//! 3. A removed inode still referenced by a caller stays valid and serves
//!    its own data until the reference is dropped.
//! 4. Conflicts are data, not errors; store failures are errors and abort
//!    the operation that needed the object.

mod checkout;
pub mod conflict;
pub mod error;
pub mod file;
pub mod inode;
pub mod tree;
pub mod workspace;

pub use conflict::{CheckoutConflict, ConflictType};
pub use error::{VfsError, VfsResult};
pub use file::FileInode;
pub use inode::InodeHandle;
pub use tree::TreeInode;
pub use workspace::Workspace;

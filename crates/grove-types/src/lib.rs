//! Foundation types for grove.
//!
//! This crate provides the identity types used throughout the grove virtual
//! filesystem. Every other grove crate depends on `grove-types`.
//!
//! # Key Types
//!
//! - [`Hash`] — Content-addressed identifier (BLAKE3 digest)
//! - [`InodeNumber`] — Process-lifetime-unique filesystem object identity
//! - [`InodeNumberAllocator`] — Monotonic allocator backing lazy assignment

pub mod error;
pub mod hash;
pub mod inode;

pub use error::TypeError;
pub use hash::Hash;
pub use inode::{InodeNumber, InodeNumberAllocator};

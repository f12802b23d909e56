//! Test harness for grove.
//!
//! Mirrors the tools the production system is exercised with:
//!
//! - [`TreeBuilder`] — declarative construction of fake source-control
//!   trees, clonable so one commit can be derived from another
//! - [`FakeBackingStore`] — an in-memory backing store with per-object
//!   readiness gates (fetches await until an object is made ready) and
//!   fetch counters for asserting loading behavior
//! - [`TestWorkspace`] — a fully wired workspace over the fakes

pub mod backing;
pub mod builder;
pub mod harness;

pub use backing::FakeBackingStore;
pub use builder::TreeBuilder;
pub use harness::TestWorkspace;

// Re-exported so tests can match against the same `grove-vfs` crate instance
// the harness links, avoiding the duplicate-crate mismatch that arises from
// the dev-dependency cycle (grove-vfs[test] -> grove-testutil -> grove-vfs).
pub use grove_vfs::{VfsError, VfsResult};

/// Install a fmt subscriber honoring `RUST_LOG`, once per process.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

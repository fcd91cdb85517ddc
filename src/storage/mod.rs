//! Local persistence backends
//!
//! `LocalStore` keeps records in sled when no remote database is configured.
//! `MemoryStore` keeps them in process for tests and dry runs.

pub mod local_store;
pub mod lockfile;
pub mod memory;

pub use local_store::LocalStore;
pub use lockfile::ProcessLock;
pub use memory::MemoryStore;

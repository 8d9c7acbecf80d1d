//! Versioned cache storage.
//!
//! A storage holds any number of named caches; each cache maps a GET request
//! to the response last stored for it. The proxy only ever reads the cache
//! named after its current version and deletes all others on activation.
//!
//! Two backends are provided:
//! - [`MemoryStorage`] - process-local, shared between clones
//! - [`DiskStorage`] - one directory per cache, survives restarts

pub mod disk;
pub mod entry;
pub mod error;
pub mod memory;
pub mod storage;

pub use disk::DiskStorage;
pub use entry::{CachedData, EntrySummary};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStorage;
pub use storage::{CacheStorage, StoreFuture};

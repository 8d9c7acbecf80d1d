//! Offline cache proxy core.
//!
//! This crate implements a network-first, cache-fallback request proxy that
//! keeps a single versioned cache store populated and pruned:
//!
//! - [`OfflineCacheProxy::install`] pre-caches the seed resources
//! - [`OfflineCacheProxy::activate`] deletes every cache whose name is not
//!   the current version
//! - [`OfflineCacheProxy::fetch`] serves GET requests from the network,
//!   copying each response into the cache, and falls back to the cache when
//!   the network is unreachable
//!
//! The network and the cache store are consumed through the [`Network`] and
//! [`CacheStorage`] traits so hosts (and tests) can supply their own.

pub mod cache;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod network;
pub mod proxy;
pub mod utils;

#[cfg(test)]
mod testing;

pub use cache::{CacheStorage, CachedData, DiskStorage, EntrySummary, MemoryStorage, StoreError};
pub use config::ProxyConfig;
pub use error::ProxyError;
pub use lifecycle::{DispatchError, LifecycleError, LifecycleHandler, Registration, WorkerState};
pub use models::{Method, Request, Response};
pub use network::{HttpNetwork, Network, NetworkError};
pub use proxy::{ActivateReport, FetchOutcome, InstallReport, OfflineCacheProxy};

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::models::{Request, Response};

use super::{CachedData, EntrySummary, StoreResult};

pub type StoreFuture<'a, T> = BoxFuture<'a, StoreResult<T>>;

/// A set of named request/response caches.
///
/// Every operation is independent and atomic on its own; nothing here
/// groups several operations into a transaction. Concurrent `put`s for the
/// same request leave whichever finished last.
pub trait CacheStorage: Send + Sync {
    /// Create the named cache if it does not exist yet.
    fn open<'a>(&'a self, name: &'a str) -> StoreFuture<'a, ()>;

    /// Store `response` for `request`, replacing any previous entry.
    ///
    /// Fails with [`StoreError::UnknownCache`](super::StoreError::UnknownCache)
    /// if the cache was never opened, and with
    /// [`StoreError::UnsupportedMethod`](super::StoreError::UnsupportedMethod)
    /// for anything but GET.
    fn put<'a>(
        &'a self,
        name: &'a str,
        request: &'a Request,
        response: Response,
    ) -> StoreFuture<'a, ()>;

    /// Look up `request` in the named cache. A missing cache is a miss.
    fn match_request<'a>(
        &'a self,
        name: &'a str,
        request: &'a Request,
    ) -> StoreFuture<'a, Option<Response>>;

    /// Names of all caches, oldest first.
    fn keys(&self) -> StoreFuture<'_, Vec<String>>;

    /// Delete the named cache. Returns whether it existed.
    fn delete<'a>(&'a self, name: &'a str) -> StoreFuture<'a, bool>;

    /// Summaries of everything stored in the named cache, sorted by key.
    fn entries<'a>(&'a self, name: &'a str) -> StoreFuture<'a, Vec<CachedData<EntrySummary>>>;
}

impl<T: CacheStorage + ?Sized> CacheStorage for Arc<T> {
    fn open<'a>(&'a self, name: &'a str) -> StoreFuture<'a, ()> {
        (**self).open(name)
    }

    fn put<'a>(
        &'a self,
        name: &'a str,
        request: &'a Request,
        response: Response,
    ) -> StoreFuture<'a, ()> {
        (**self).put(name, request, response)
    }

    fn match_request<'a>(
        &'a self,
        name: &'a str,
        request: &'a Request,
    ) -> StoreFuture<'a, Option<Response>> {
        (**self).match_request(name, request)
    }

    fn keys(&self) -> StoreFuture<'_, Vec<String>> {
        (**self).keys()
    }

    fn delete<'a>(&'a self, name: &'a str) -> StoreFuture<'a, bool> {
        (**self).delete(name)
    }

    fn entries<'a>(&'a self, name: &'a str) -> StoreFuture<'a, Vec<CachedData<EntrySummary>>> {
        (**self).entries(name)
    }
}

/// Shared precondition for `put` across backends.
pub(crate) fn ensure_cacheable(request: &Request) -> StoreResult<()> {
    if request.is_get() {
        Ok(())
    } else {
        Err(super::StoreError::UnsupportedMethod(request.method.clone()))
    }
}

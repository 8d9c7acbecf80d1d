//! Test doubles shared by the proxy and lifecycle tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::cache::{CacheStorage, CachedData, EntrySummary, MemoryStorage, StoreError, StoreFuture};
use crate::models::{Method, Request, Response};
use crate::network::{Network, NetworkError, NetworkFuture};

/// Network that answers from a fixed table of URL -> response.
/// Unknown URLs and offline mode fail at the transport level; header names
/// with whitespace are rejected before anything is sent, as `HttpNetwork` does.
#[derive(Default)]
pub struct ScriptedNetwork {
    routes: Mutex<HashMap<String, Response>>,
    offline: AtomicBool,
    calls: Mutex<Vec<(Method, String)>>,
}

impl ScriptedNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, url: &str, response: Response) {
        self.routes.lock().unwrap().insert(url.to_string(), response);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<(Method, String)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Network for ScriptedNetwork {
    fn fetch<'a>(&'a self, request: &'a Request) -> NetworkFuture<'a> {
        Box::pin(async move {
            self.calls
                .lock()
                .unwrap()
                .push((request.method.clone(), request.url.to_string()));
            let invalid = request
                .headers
                .iter()
                .find(|(name, _)| name.contains(char::is_whitespace));
            if let Some((name, _)) = invalid {
                return Err(NetworkError::InvalidHeader {
                    name: name.clone(),
                    reason: "invalid HTTP header name".to_string(),
                });
            }
            if self.offline.load(Ordering::SeqCst) {
                return Err(NetworkError::Unreachable("offline".to_string()));
            }
            self.routes
                .lock()
                .unwrap()
                .get(request.url.as_str())
                .cloned()
                .ok_or_else(|| NetworkError::Unreachable(format!("no route to {}", request.url)))
        })
    }
}

/// Memory storage whose operations can be made to fail.
#[derive(Default)]
pub struct FlakyStorage {
    pub inner: MemoryStorage,
    pub fail_puts: AtomicBool,
    pub fail_matches: AtomicBool,
    pub fail_deletes: AtomicBool,
    failing_deletes: Mutex<Vec<String>>,
}

impl FlakyStorage {
    /// Make deletes of `name` fail while other deletes succeed.
    pub fn fail_delete_of(&self, name: &str) {
        self.failing_deletes.lock().unwrap().push(name.to_string());
    }
}

fn disk_full<'a, T: Send + 'a>() -> StoreFuture<'a, T> {
    Box::pin(async { Err(StoreError::Io(std::io::Error::other("disk full"))) })
}

impl CacheStorage for FlakyStorage {
    fn open<'a>(&'a self, name: &'a str) -> StoreFuture<'a, ()> {
        self.inner.open(name)
    }

    fn put<'a>(
        &'a self,
        name: &'a str,
        request: &'a Request,
        response: Response,
    ) -> StoreFuture<'a, ()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return disk_full();
        }
        self.inner.put(name, request, response)
    }

    fn match_request<'a>(
        &'a self,
        name: &'a str,
        request: &'a Request,
    ) -> StoreFuture<'a, Option<Response>> {
        if self.fail_matches.load(Ordering::SeqCst) {
            return disk_full();
        }
        self.inner.match_request(name, request)
    }

    fn keys(&self) -> StoreFuture<'_, Vec<String>> {
        self.inner.keys()
    }

    fn delete<'a>(&'a self, name: &'a str) -> StoreFuture<'a, bool> {
        if self.fail_deletes.load(Ordering::SeqCst)
            || self.failing_deletes.lock().unwrap().iter().any(|n| n == name)
        {
            return disk_full();
        }
        self.inner.delete(name)
    }

    fn entries<'a>(&'a self, name: &'a str) -> StoreFuture<'a, Vec<CachedData<EntrySummary>>> {
        self.inner.entries(name)
    }
}

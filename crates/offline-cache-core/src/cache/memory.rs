//! In-process cache storage.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::models::{Request, Response};

use super::storage::ensure_cacheable;
use super::{CacheStorage, CachedData, EntrySummary, StoreError, StoreFuture};

#[derive(Debug, Default)]
struct NamedCache {
    name: String,
    entries: HashMap<String, CachedData<Response>>,
}

/// Cache storage kept in memory.
/// Clone is cheap and clones share the same caches.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    // Vec keeps caches in creation order for `keys()`.
    caches: Arc<RwLock<Vec<NamedCache>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStorage for MemoryStorage {
    fn open<'a>(&'a self, name: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut caches = self.caches.write().await;
            if !caches.iter().any(|c| c.name == name) {
                caches.push(NamedCache {
                    name: name.to_string(),
                    entries: HashMap::new(),
                });
            }
            Ok(())
        })
    }

    fn put<'a>(
        &'a self,
        name: &'a str,
        request: &'a Request,
        response: Response,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            ensure_cacheable(request)?;
            let mut caches = self.caches.write().await;
            let cache = caches
                .iter_mut()
                .find(|c| c.name == name)
                .ok_or_else(|| StoreError::UnknownCache(name.to_string()))?;
            cache
                .entries
                .insert(request.cache_key(), CachedData::new(response));
            Ok(())
        })
    }

    fn match_request<'a>(
        &'a self,
        name: &'a str,
        request: &'a Request,
    ) -> StoreFuture<'a, Option<Response>> {
        Box::pin(async move {
            let caches = self.caches.read().await;
            Ok(caches
                .iter()
                .find(|c| c.name == name)
                .and_then(|c| c.entries.get(&request.cache_key()))
                .map(|cached| cached.data.clone()))
        })
    }

    fn keys(&self) -> StoreFuture<'_, Vec<String>> {
        Box::pin(async move {
            let caches = self.caches.read().await;
            Ok(caches.iter().map(|c| c.name.clone()).collect())
        })
    }

    fn delete<'a>(&'a self, name: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let mut caches = self.caches.write().await;
            let before = caches.len();
            caches.retain(|c| c.name != name);
            Ok(caches.len() != before)
        })
    }

    fn entries<'a>(&'a self, name: &'a str) -> StoreFuture<'a, Vec<CachedData<EntrySummary>>> {
        Box::pin(async move {
            let caches = self.caches.read().await;
            let cache = caches
                .iter()
                .find(|c| c.name == name)
                .ok_or_else(|| StoreError::UnknownCache(name.to_string()))?;
            let mut entries: Vec<_> = cache
                .entries
                .iter()
                .map(|(key, cached)| {
                    cached.clone().map(|response| EntrySummary {
                        key: key.clone(),
                        status: response.status,
                        size: response.body.len(),
                    })
                })
                .collect();
            entries.sort_by(|a, b| a.data.key.cmp(&b.data.key));
            Ok(entries)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Method;
    use url::Url;

    fn get(path: &str) -> Request {
        Request::get(Url::parse("http://localhost:8000").unwrap().join(path).unwrap())
    }

    #[tokio::test]
    async fn test_open_is_idempotent_and_ordered() {
        let storage = MemoryStorage::new();
        storage.open("v1").await.unwrap();
        storage.open("v2").await.unwrap();
        storage.open("v1").await.unwrap();
        assert_eq!(storage.keys().await.unwrap(), vec!["v1", "v2"]);
    }

    #[tokio::test]
    async fn test_put_and_match() {
        let storage = MemoryStorage::new();
        storage.open("v1").await.unwrap();
        storage
            .put("v1", &get("/page"), Response::new(200, "A"))
            .await
            .unwrap();

        let hit = storage.match_request("v1", &get("/page")).await.unwrap();
        assert_eq!(hit, Some(Response::new(200, "A")));
        assert_eq!(storage.match_request("v1", &get("/other")).await.unwrap(), None);
        assert_eq!(storage.match_request("v2", &get("/page")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_put_replaces_previous_entry() {
        let storage = MemoryStorage::new();
        storage.open("v1").await.unwrap();
        storage.put("v1", &get("/page"), Response::new(200, "A")).await.unwrap();
        storage.put("v1", &get("/page"), Response::new(200, "B")).await.unwrap();
        let hit = storage.match_request("v1", &get("/page")).await.unwrap().unwrap();
        assert_eq!(hit.text(), "B");
        assert_eq!(storage.entries("v1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_put_requires_open_cache() {
        let storage = MemoryStorage::new();
        let err = storage
            .put("v1", &get("/page"), Response::new(200, "A"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownCache(name) if name == "v1"));
    }

    #[tokio::test]
    async fn test_put_rejects_non_get() {
        let storage = MemoryStorage::new();
        storage.open("v1").await.unwrap();
        let post = Request::new(Method::POST, Url::parse("http://localhost/devis").unwrap());
        let err = storage.put("v1", &post, Response::new(201, "")).await.unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedMethod(Method::POST)));
    }

    #[tokio::test]
    async fn test_delete() {
        let storage = MemoryStorage::new();
        storage.open("v1").await.unwrap();
        assert!(storage.delete("v1").await.unwrap());
        assert!(!storage.delete("v1").await.unwrap());
        assert!(storage.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let storage = MemoryStorage::new();
        let other = storage.clone();
        storage.open("v1").await.unwrap();
        assert_eq!(other.keys().await.unwrap(), vec!["v1"]);
    }

    #[tokio::test]
    async fn test_entries_sorted_by_key() {
        let storage = MemoryStorage::new();
        storage.open("v1").await.unwrap();
        storage.put("v1", &get("/b"), Response::new(200, "bb")).await.unwrap();
        storage.put("v1", &get("/a"), Response::new(404, "a")).await.unwrap();

        let entries = storage.entries("v1").await.unwrap();
        let keys: Vec<_> = entries.iter().map(|e| e.data.key.as_str()).collect();
        assert_eq!(keys, vec!["http://localhost:8000/a", "http://localhost:8000/b"]);
        assert_eq!(entries[0].data.status, 404);
        assert_eq!(entries[1].data.size, 2);
    }
}

//! The offline cache proxy.
//!
//! Three independent operations share one piece of state, the cache name
//! (version identifier):
//!
//! - **install** pre-caches the seed resources, all or nothing
//! - **activate** deletes every cache that is not the current version
//! - **fetch** is network-first: a GET that reaches the network is returned
//!   and a copy is stored; a GET that cannot reach the network is answered
//!   from the cache if possible. Other methods are declined.

use futures::future::{join_all, try_join_all, BoxFuture};
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{CacheStorage, StoreResult};
use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::lifecycle::LifecycleHandler;
use crate::models::{Request, Response};
use crate::network::Network;

/// Result of intercepting one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Not a GET; the host should perform the request itself.
    Declined,
    /// Live network response (any status). A copy was offered to the cache.
    Network(Response),
    /// The network failed and the cache had a match.
    Cached(Response),
    /// The network failed and the cache had nothing.
    Unavailable,
}

impl FetchOutcome {
    pub fn response(&self) -> Option<&Response> {
        match self {
            FetchOutcome::Network(r) | FetchOutcome::Cached(r) => Some(r),
            FetchOutcome::Declined | FetchOutcome::Unavailable => None,
        }
    }

    pub fn into_response(self) -> Option<Response> {
        match self {
            FetchOutcome::Network(r) | FetchOutcome::Cached(r) => Some(r),
            FetchOutcome::Declined | FetchOutcome::Unavailable => None,
        }
    }

    pub fn source(&self) -> &'static str {
        match self {
            FetchOutcome::Declined => "declined",
            FetchOutcome::Network(_) => "network",
            FetchOutcome::Cached(_) => "cache",
            FetchOutcome::Unavailable => "unavailable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub cache_name: String,
    pub cached: Vec<Url>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivateReport {
    pub kept: String,
    pub deleted: Vec<String>,
}

pub struct OfflineCacheProxy<N, S> {
    config: ProxyConfig,
    network: N,
    storage: S,
}

impl<N: Network, S: CacheStorage> OfflineCacheProxy<N, S> {
    pub fn new(config: ProxyConfig, network: N, storage: S) -> Self {
        Self {
            config,
            network,
            storage,
        }
    }

    pub fn cache_name(&self) -> &str {
        &self.config.cache_name
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Pre-cache every seed resource under the current version.
    ///
    /// All seeds are fetched before anything is written, so a transport
    /// failure or non-2xx status on any of them stores nothing. The cache
    /// itself is opened (created) up front and survives a failed install.
    pub async fn install(&self) -> Result<InstallReport, ProxyError> {
        let name = self.cache_name();
        self.storage.open(name).await?;

        let requests = self.config.seed_requests()?;
        let responses = try_join_all(requests.iter().map(|r| self.fetch_seed(r))).await?;

        try_join_all(
            requests
                .iter()
                .zip(responses)
                .map(|(request, response)| self.storage.put(name, request, response)),
        )
        .await?;

        let cached: Vec<Url> = requests.into_iter().map(|r| r.url).collect();
        info!(cache = name, resources = cached.len(), "Installed");
        Ok(InstallReport {
            cache_name: name.to_string(),
            cached,
        })
    }

    async fn fetch_seed(&self, request: &Request) -> Result<Response, ProxyError> {
        let response = self
            .network
            .fetch(request)
            .await
            .map_err(|source| ProxyError::SeedFetch {
                url: request.url.clone(),
                source,
            })?;
        if !response.is_ok() {
            return Err(ProxyError::SeedStatus {
                url: request.url.clone(),
                status: response.status,
            });
        }
        Ok(response)
    }

    /// Delete every cache other than the current version.
    ///
    /// Every delete runs to completion even if another fails; the first
    /// failure is returned afterwards.
    pub async fn activate(&self) -> Result<ActivateReport, ProxyError> {
        let name = self.cache_name();
        let stale: Vec<String> = self
            .storage
            .keys()
            .await?
            .into_iter()
            .filter(|key| key != name)
            .collect();

        let results = join_all(stale.iter().map(|key| self.storage.delete(key))).await;
        for (key, result) in stale.iter().zip(&results) {
            if let Err(e) = result {
                warn!(cache = %key, error = %e, "Failed to delete stale cache");
            }
        }
        results.into_iter().collect::<StoreResult<Vec<bool>>>()?;

        if stale.is_empty() {
            debug!(cache = name, "Activated, no stale caches");
        } else {
            info!(cache = name, deleted = ?stale, "Activated, removed stale caches");
        }
        Ok(ActivateReport {
            kept: name.to_string(),
            deleted: stale,
        })
    }

    /// Network first, cache on transport failure. Only GET is intercepted.
    ///
    /// A request the network layer rejects before sending (bad header,
    /// unbuildable request) is returned as [`ProxyError::InvalidRequest`]
    /// rather than answered from the cache.
    pub async fn fetch(&self, request: &Request) -> Result<FetchOutcome, ProxyError> {
        if !request.is_get() {
            debug!(method = %request.method, url = %request.url, "Declined non-GET request");
            return Ok(FetchOutcome::Declined);
        }

        match self.network.fetch(request).await {
            Ok(response) => {
                if let Err(e) = self.store(request, response.clone()).await {
                    warn!(url = %request.url, error = %e, "Failed to cache network response");
                }
                Ok(FetchOutcome::Network(response))
            }
            Err(source) if !source.is_transport() => Err(ProxyError::InvalidRequest {
                url: request.url.clone(),
                source,
            }),
            Err(network_error) => {
                let cached = self
                    .storage
                    .match_request(self.cache_name(), request)
                    .await?;
                match cached {
                    Some(response) => {
                        debug!(url = %request.url, error = %network_error, "Network failed, served from cache");
                        Ok(FetchOutcome::Cached(response))
                    }
                    None => {
                        debug!(url = %request.url, error = %network_error, "Network failed, no cached response");
                        Ok(FetchOutcome::Unavailable)
                    }
                }
            }
        }
    }

    async fn store(&self, request: &Request, response: Response) -> StoreResult<()> {
        let name = self.cache_name();
        self.storage.open(name).await?;
        self.storage.put(name, request, response).await
    }
}

impl<N: Network, S: CacheStorage> LifecycleHandler for OfflineCacheProxy<N, S> {
    fn version(&self) -> &str {
        self.cache_name()
    }

    fn on_install(&self) -> BoxFuture<'_, Result<(), ProxyError>> {
        Box::pin(async move { self.install().await.map(|_| ()) })
    }

    fn on_activate(&self) -> BoxFuture<'_, Result<(), ProxyError>> {
        Box::pin(async move { self.activate().await.map(|_| ()) })
    }

    fn on_fetch<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<FetchOutcome, ProxyError>> {
        Box::pin(self.fetch(request))
    }
}

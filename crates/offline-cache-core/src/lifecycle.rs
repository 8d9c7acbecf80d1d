//! Host-side lifecycle: registering versions and dispatching requests.
//!
//! A [`LifecycleHandler`] receives install, activate and fetch events.
//! [`Registration`] plays the host's part: it installs a new version,
//! activates it only if install succeeded, and routes requests through the
//! active version (the controller).
//!
//! Sequencing per version: install completes before activate starts, and
//! activate completes before the version handles any request. A version
//! whose install fails never becomes the controller; the previous one keeps
//! serving.

use std::sync::Arc;

use futures::future::BoxFuture;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::error::ProxyError;
use crate::models::{Request, Response};
use crate::network::{Network, NetworkError};
use crate::proxy::FetchOutcome;

/// Receiver of lifecycle events. Each method completes when the work it
/// started has finished.
pub trait LifecycleHandler: Send + Sync {
    /// Version identifier, for logging.
    fn version(&self) -> &str;

    fn on_install(&self) -> BoxFuture<'_, Result<(), ProxyError>>;

    fn on_activate(&self) -> BoxFuture<'_, Result<(), ProxyError>>;

    fn on_fetch<'a>(&'a self, request: &'a Request)
        -> BoxFuture<'a, Result<FetchOutcome, ProxyError>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Installing,
    Installed,
    Activating,
    Activated,
    /// Install failed, or a newer version took over.
    Redundant,
}

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Install of {version} failed: {source}")]
    Install {
        version: String,
        #[source]
        source: ProxyError,
    },
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// The controller could not reach the network and had nothing cached.
    #[error("Offline and not cached: {0}")]
    Offline(Url),

    #[error(transparent)]
    Proxy(#[from] ProxyError),
}

struct Worker<H> {
    handler: Arc<H>,
    state: WorkerState,
}

pub struct Registration<N, H> {
    network: N,
    active: Option<Worker<H>>,
    /// State of the most recently registered version, if it is not active.
    last_failed: Option<WorkerState>,
}

impl<N: Network, H: LifecycleHandler> Registration<N, H> {
    pub fn new(network: N) -> Self {
        Self {
            network,
            active: None,
            last_failed: None,
        }
    }

    /// A registration whose controller was activated earlier (e.g. by a
    /// previous run of the host).
    pub fn with_controller(network: N, handler: H) -> Self {
        Self {
            network,
            active: Some(Worker {
                handler: Arc::new(handler),
                state: WorkerState::Activated,
            }),
            last_failed: None,
        }
    }

    pub fn controller(&self) -> Option<&H> {
        self.active.as_ref().map(|w| w.handler.as_ref())
    }

    /// State of the most recent registration attempt.
    pub fn state(&self) -> Option<WorkerState> {
        self.last_failed.or(self.active.as_ref().map(|w| w.state))
    }

    /// Install `handler` and, if that succeeds, activate it and make it the
    /// controller.
    ///
    /// An activate failure is logged but does not stop the takeover: by then
    /// the new version is fully installed and the old one is retired.
    pub async fn register(&mut self, handler: H) -> Result<(), LifecycleError> {
        let handler = Arc::new(handler);
        let version = handler.version().to_string();

        info!(version = %version, state = ?WorkerState::Installing, "Registering");
        if let Err(source) = handler.on_install().await {
            warn!(version = %version, error = %source, "Install failed, keeping current controller");
            self.last_failed = Some(WorkerState::Redundant);
            return Err(LifecycleError::Install { version, source });
        }
        info!(version = %version, state = ?WorkerState::Installed, "Installed");

        if let Err(e) = handler.on_activate().await {
            warn!(version = %version, state = ?WorkerState::Activating, error = %e, "Activate failed");
        }

        if let Some(previous) = self.active.take() {
            info!(version = %previous.handler.version(), state = ?WorkerState::Redundant, "Replaced");
        }
        self.active = Some(Worker {
            handler,
            state: WorkerState::Activated,
        });
        self.last_failed = None;
        info!(version = %version, "Activated");
        Ok(())
    }

    /// Route a request through the controller.
    ///
    /// Without a controller, or when the controller declines, the request
    /// goes straight to the network and its outcome is returned unchanged.
    pub async fn dispatch(&self, request: &Request) -> Result<Response, DispatchError> {
        let outcome = match self.active {
            Some(ref worker) => worker.handler.on_fetch(request).await?,
            None => FetchOutcome::Declined,
        };

        match outcome {
            FetchOutcome::Declined => Ok(self.network.fetch(request).await?),
            FetchOutcome::Network(response) | FetchOutcome::Cached(response) => Ok(response),
            FetchOutcome::Unavailable => Err(DispatchError::Offline(request.url.clone())),
        }
    }
}

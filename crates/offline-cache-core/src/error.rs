use thiserror::Error;
use url::Url;

use crate::cache::StoreError;
use crate::network::NetworkError;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Invalid URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Failed to fetch seed resource {url}: {source}")]
    SeedFetch {
        url: Url,
        #[source]
        source: NetworkError,
    },

    #[error("Seed resource {url} returned status {status}")]
    SeedStatus { url: Url, status: u16 },

    /// The request could not be sent as given; the cache is not consulted.
    #[error("Invalid request {url}: {source}")]
    InvalidRequest {
        url: Url,
        #[source]
        source: NetworkError,
    },

    #[error("Cache storage error: {0}")]
    Store(#[from] StoreError),
}

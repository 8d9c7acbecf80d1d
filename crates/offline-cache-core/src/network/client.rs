//! HTTP implementation of the network primitive.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use tracing::debug;

use crate::config::ProxyConfig;
use crate::models::{Request, Response};

use super::NetworkError;

pub type NetworkFuture<'a> = BoxFuture<'a, Result<Response, NetworkError>>;

/// Perform a request, yielding a response or a transport failure.
///
/// Implementations must not retry and must not turn HTTP error statuses
/// into errors.
pub trait Network: Send + Sync {
    fn fetch<'a>(&'a self, request: &'a Request) -> NetworkFuture<'a>;
}

impl<T: Network + ?Sized> Network for Arc<T> {
    fn fetch<'a>(&'a self, request: &'a Request) -> NetworkFuture<'a> {
        (**self).fetch(request)
    }
}

/// `reqwest`-backed network.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpNetwork {
    client: Client,
}

impl HttpNetwork {
    /// Create a client with no request timeout.
    pub fn new() -> Result<Self, NetworkError> {
        Self::with_timeout(None)
    }

    pub fn with_timeout(timeout: Option<Duration>) -> Result<Self, NetworkError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }

    pub fn from_config(config: &ProxyConfig) -> Result<Self, NetworkError> {
        Self::with_timeout(config.request_timeout_secs.map(Duration::from_secs))
    }

    fn header_map(headers: &[(String, String)]) -> Result<HeaderMap, NetworkError> {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            let key = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                NetworkError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                }
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| NetworkError::InvalidHeader {
                name: name.clone(),
                reason: e.to_string(),
            })?;
            map.append(key, value);
        }
        Ok(map)
    }

    async fn send(&self, request: &Request) -> Result<Response, NetworkError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(Self::header_map(&request.headers)?);
        if let Some(ref body) = request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;

        let status = response.status();
        let url = response.url().clone();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        debug!(method = %request.method, url = %request.url, status = status.as_u16(), bytes = body.len(), "Network response");

        Ok(Response {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
            url: Some(url),
        })
    }
}

impl Network for HttpNetwork {
    fn fetch<'a>(&'a self, request: &'a Request) -> NetworkFuture<'a> {
        Box::pin(self.send(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use url::Url;

    /// Serve exactly one canned HTTP response on a local port.
    fn serve_once(raw_response: &'static str) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut chunk) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                }
                let _ = stream.write_all(raw_response.as_bytes());
            }
        });
        Url::parse(&format!("http://{}/static/style.css", addr)).expect("valid URL")
    }

    #[test]
    fn test_header_map_rejects_invalid_name() {
        let headers = vec![("bad header".to_string(), "x".to_string())];
        let err = HttpNetwork::header_map(&headers).unwrap_err();
        assert!(matches!(err, NetworkError::InvalidHeader { .. }));
        assert!(!err.is_transport());
    }

    #[test]
    fn test_header_map_keeps_repeated_headers() {
        let headers = vec![
            ("accept".to_string(), "text/html".to_string()),
            ("accept".to_string(), "text/css".to_string()),
        ];
        let map = HttpNetwork::header_map(&headers).expect("valid headers");
        assert_eq!(map.get_all("accept").iter().count(), 2);
    }

    #[tokio::test]
    async fn test_error_status_is_a_response() {
        let url = serve_once(
            "HTTP/1.1 404 Not Found\r\ncontent-type: text/plain\r\ncontent-length: 7\r\nconnection: close\r\n\r\nmissing",
        );
        let network = HttpNetwork::new().expect("client");

        let response = network.fetch(&Request::get(url)).await.expect("response");
        assert_eq!(response.status, 404);
        assert_eq!(response.status_text, "Not Found");
        assert_eq!(response.header("content-type"), Some("text/plain"));
        assert_eq!(response.text(), "missing");
    }

    #[tokio::test]
    async fn test_refused_connection_is_transport_error() {
        // Bind then drop to get a port nothing listens on.
        let addr = TcpListener::bind("127.0.0.1:0")
            .and_then(|l| l.local_addr())
            .expect("free port");
        let url = Url::parse(&format!("http://{}/", addr)).expect("valid URL");
        let network = HttpNetwork::new().expect("client");

        let err = network.fetch(&Request::get(url)).await.unwrap_err();
        assert!(matches!(err, NetworkError::Transport(_)));
        assert!(err.is_transport());
    }
}

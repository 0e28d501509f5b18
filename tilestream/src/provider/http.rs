//! HTTP client abstraction for testability

use std::future::Future;
use std::time::Duration;

use tracing::{debug, trace, warn};

use super::types::TransportError;
use crate::layer::NetworkOptions;

/// Default request timeout when a layer does not set one.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// User-Agent sent with every request.
const DEFAULT_USER_AGENT: &str = concat!("tilestream/", env!("CARGO_PKG_VERSION"));

/// Trait for asynchronous tile transport.
///
/// This abstraction allows for dependency injection and easier testing
/// by enabling mock transports in tests. Implementations return the raw
/// response body; decoding happens elsewhere.
pub trait AsyncHttpClient: Send + Sync + 'static {
    /// Performs an async GET request.
    ///
    /// # Arguments
    ///
    /// * `url` - The URL to request
    /// * `network` - Per-layer headers and timeout
    ///
    /// # Returns
    ///
    /// The response body as bytes or an error.
    fn get(
        &self,
        url: &str,
        network: &NetworkOptions,
    ) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send;
}

/// Async HTTP client implementation using reqwest.
#[derive(Clone)]
pub struct AsyncReqwestClient {
    client: reqwest::Client,
}

impl AsyncReqwestClient {
    /// Creates a new AsyncReqwestClient with default configuration.
    ///
    /// Tile servers are hit with many small parallel requests, so the pool
    /// keeps plenty of idle connections per host.
    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeout(DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a new AsyncReqwestClient with custom default timeout.
    ///
    /// A layer's own `timeout_secs` overrides this per request.
    pub fn with_timeout(timeout_secs: u64) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(DEFAULT_USER_AGENT)
            .pool_max_idle_per_host(32)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(30))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;

        Ok(Self { client })
    }
}

impl AsyncHttpClient for AsyncReqwestClient {
    async fn get(&self, url: &str, network: &NetworkOptions) -> Result<Vec<u8>, TransportError> {
        trace!(url = url, headers = network.headers.len(), "HTTP GET request starting");

        let mut request = self.client.get(url);
        for (name, value) in &network.headers {
            let header_name = reqwest::header::HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::InvalidHeader {
                    name: name.clone(),
                    message: e.to_string(),
                })?;
            request = request.header(header_name, value.as_str());
        }
        if let Some(timeout) = network.timeout() {
            request = request.timeout(timeout);
        }

        let response = match request.send().await {
            Ok(resp) => {
                debug!(
                    url = url,
                    status = resp.status().as_u16(),
                    "HTTP response received"
                );
                resp
            }
            Err(e) => {
                warn!(
                    url = url,
                    error = %e,
                    is_connect = e.is_connect(),
                    is_timeout = e.is_timeout(),
                    "HTTP request failed"
                );
                if e.is_timeout() {
                    return Err(TransportError::Timeout {
                        url: url.to_string(),
                    });
                }
                return Err(TransportError::Request {
                    url: url.to_string(),
                    message: e.to_string(),
                });
            }
        };

        // Check HTTP status
        let status = response.status();
        if !status.is_success() {
            warn!(url = url, status = status.as_u16(), "HTTP error status");
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        // Read response body
        match response.bytes().await {
            Ok(bytes) => {
                trace!(url = url, bytes = bytes.len(), "HTTP response body read");
                Ok(bytes.to_vec())
            }
            Err(e) => {
                warn!(url = url, error = %e, "Failed to read response body");
                Err(TransportError::Body {
                    url: url.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Mock async transport for testing.
    ///
    /// Returns the same response for every URL and records the requests it
    /// received.
    #[derive(Clone)]
    pub struct MockAsyncHttpClient {
        pub response: Result<Vec<u8>, TransportError>,
        pub delay: Option<Duration>,
        pub calls: Arc<AtomicUsize>,
        pub urls: Arc<Mutex<Vec<String>>>,
    }

    impl MockAsyncHttpClient {
        pub fn ok(bytes: Vec<u8>) -> Self {
            Self {
                response: Ok(bytes),
                delay: None,
                calls: Arc::new(AtomicUsize::new(0)),
                urls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub fn failing(error: TransportError) -> Self {
            Self {
                response: Err(error),
                ..Self::ok(Vec::new())
            }
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn requested_urls(&self) -> Vec<String> {
            self.urls.lock().unwrap().clone()
        }
    }

    impl AsyncHttpClient for MockAsyncHttpClient {
        async fn get(
            &self,
            url: &str,
            _network: &NetworkOptions,
        ) -> Result<Vec<u8>, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.urls.lock().unwrap().push(url.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.response.clone()
        }
    }

    #[tokio::test]
    async fn test_mock_async_client_success() {
        let mock = MockAsyncHttpClient::ok(vec![1, 2, 3, 4]);

        let result = mock
            .get("http://example.com/1/2/3", &NetworkOptions::default())
            .await;
        assert_eq!(result.unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(mock.call_count(), 1);
        assert_eq!(mock.requested_urls(), vec!["http://example.com/1/2/3"]);
    }

    #[tokio::test]
    async fn test_mock_async_client_error() {
        let mock = MockAsyncHttpClient::failing(TransportError::Status {
            url: "http://example.com".to_string(),
            status: 500,
        });

        let result = mock
            .get("http://example.com", &NetworkOptions::default())
            .await;
        assert!(matches!(
            result,
            Err(TransportError::Status { status: 500, .. })
        ));
    }

    #[test]
    fn test_reqwest_client_builds() {
        assert!(AsyncReqwestClient::new().is_ok());
    }
}

//! HTTP client abstraction for testability

use std::time::Duration;

use thiserror::Error;

use crate::cache::BoxFuture;

/// Default per-request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// User agent sent with tile requests; public tile servers reject anonymous clients.
pub const USER_AGENT: &str = concat!("gpxtrack/", env!("CARGO_PKG_VERSION"));

/// Errors raised by an HTTP client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HttpError {
    #[error("failed to create HTTP client: {0}")]
    Client(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("failed to read response: {0}")]
    Body(String),
}

/// Trait for asynchronous HTTP GET requests.
///
/// Dyn-compatible so the tile cache can hold `Arc<dyn AsyncHttpClient>` and
/// tests can inject a counting stub.
pub trait AsyncHttpClient: Send + Sync {
    /// Performs an HTTP GET request and returns the response body.
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>, HttpError>>;
}

/// Real HTTP client implementation using reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Creates a new client with the default timeout.
    pub fn new() -> Result<Self, HttpError> {
        Self::with_timeout(DEFAULT_HTTP_TIMEOUT)
    }

    /// Creates a new client with a custom timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| HttpError::Client(e.to_string()))?;

        Ok(Self { client })
    }
}

impl AsyncHttpClient for ReqwestClient {
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>, HttpError>> {
        Box::pin(async move {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| HttpError::Request(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(HttpError::Status {
                    status: status.as_u16(),
                    url: url.to_string(),
                });
            }

            response
                .bytes()
                .await
                .map(|b| b.to_vec())
                .map_err(|e| HttpError::Body(e.to_string()))
        })
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Stub HTTP client that counts requests and can be slowed down.
    pub struct MockHttpClient {
        pub response: Result<Vec<u8>, HttpError>,
        pub delay: Duration,
        pub calls: AtomicUsize,
        pub urls: Mutex<Vec<String>>,
    }

    impl MockHttpClient {
        pub fn ok(body: Vec<u8>) -> Self {
            Self {
                response: Ok(body),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
                urls: Mutex::new(Vec::new()),
            }
        }

        pub fn failing(error: HttpError) -> Self {
            Self {
                response: Err(error),
                ..Self::ok(Vec::new())
            }
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl AsyncHttpClient for MockHttpClient {
        fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>, HttpError>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                self.urls.lock().push(url.to_string());
                if !self.delay.is_zero() {
                    tokio::time::sleep(self.delay).await;
                }
                self.response.clone()
            })
        }
    }

    #[tokio::test]
    async fn test_mock_client_success() {
        let mock = MockHttpClient::ok(vec![1, 2, 3, 4]);

        let result = mock.get("http://example.com").await;
        assert_eq!(result.unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_client_error() {
        let mock = MockHttpClient::failing(HttpError::Request("Test error".to_string()));

        let result = mock.get("http://example.com").await;
        assert!(result.is_err());
        assert_eq!(mock.urls.lock().as_slice(), ["http://example.com"]);
    }

    #[test]
    fn test_status_error_display() {
        let err = HttpError::Status {
            status: 404,
            url: "https://a.tile.example/1/2/3.png".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "HTTP 404 from https://a.tile.example/1/2/3.png"
        );
    }
}

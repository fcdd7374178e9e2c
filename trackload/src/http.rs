//! Contains the transport seam and its HTTP implementation used to reach the tracking service.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;

use crate::error::TransportFailure;

/// User agent string used for outgoing requests.
pub const USER_AGENT: &str = concat!("trackload/", env!("CARGO_PKG_VERSION"));

/// Timeout of a single request, including reading the response, unless configured otherwise.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A successful response of the tracking service.
#[derive(Debug, Clone)]
pub struct Response {
    /// The HTTP status code, always a success code.
    pub status: u16,
    /// The raw response body.
    pub body: Bytes,
}

/// Delivers JSON request bodies to the tracking service.
///
/// This is the only way the workload talks to the outside world. Implementations must return an
/// error for non-success status codes.
#[async_trait::async_trait]
pub trait Transport: Debug + Send + Sync {
    /// Sends `body` as a JSON `POST` to `path`, relative to the service root.
    async fn post(&self, path: &str, body: Bytes) -> Result<Response, TransportFailure>;
}

#[async_trait::async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn post(&self, path: &str, body: Bytes) -> Result<Response, TransportFailure> {
        (**self).post(path, body).await
    }
}

/// A remote implementation using HTTP to interact with the tracking service.
#[derive(Debug)]
pub struct HttpRemote {
    /// Base URL of the service, such as `http://localhost:5000`.
    pub remote: String,
    /// The pooled client shared by all virtual users.
    pub client: reqwest::Client,
}

impl HttpRemote {
    /// Creates a new `HttpRemote` instance with the given remote URL and a default client.
    ///
    /// Requests time out after [`DEFAULT_REQUEST_TIMEOUT`].
    pub fn new(remote: impl Into<String>) -> crate::Result<Self> {
        Self::with_timeout(remote, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Creates a new `HttpRemote` whose requests fail after `timeout`.
    ///
    /// Cancellation only takes effect between iterations, so this bounds how long a stalled
    /// service can keep a virtual user busy.
    pub fn with_timeout(remote: impl Into<String>, timeout: Duration) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            remote: remote.into(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.remote.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[async_trait::async_trait]
impl Transport for HttpRemote {
    async fn post(&self, path: &str, body: Bytes) -> Result<Response, TransportFailure> {
        let request_failed = |cause| TransportFailure::Request {
            path: path.to_owned(),
            cause,
        };

        let response = self
            .client
            .post(self.url(path))
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(request_failed)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportFailure::Status {
                path: path.to_owned(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(request_failed)?;
        Ok(Response {
            status: status.as_u16(),
            body,
        })
    }
}

//! Pull transport: periodic HTTP fetches of the current snapshot.
//!
//! [`HttpPullTransport`] issues `GET` against the configured telemetry
//! endpoint and returns the raw body. Parsing happens in the coordinator so
//! both transports share one snapshot parser.

use async_trait::async_trait;

/// One request/response cycle against the telemetry endpoint.
#[async_trait]
pub trait PullTransport: Send + Sync + 'static {
    /// Fetch the current snapshot body.
    ///
    /// A non-success status is an error; the body is returned unparsed.
    async fn fetch(&self) -> Result<String, PullError>;
}

/// Errors from a single pull cycle.
#[derive(Debug, thiserror::Error)]
pub enum PullError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The endpoint answered with a non-2xx status code.
    #[error("Telemetry endpoint error ({status}): {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The body was received but is not a usable snapshot.
    #[error("Unusable snapshot body: {0}")]
    Body(String),
}

/// HTTP client for the telemetry endpoint.
pub struct HttpPullTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpPullTransport {
    /// Create a pull transport for `url`.
    ///
    /// Requests carry no timeout; a hung request is superseded by the next
    /// scheduled pull.
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }

    /// Reuse an existing [`reqwest::Client`] (connection pooling).
    pub fn with_client(client: reqwest::Client, url: String) -> Self {
        Self { client, url }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, PullError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(PullError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl PullTransport for HttpPullTransport {
    async fn fetch(&self) -> Result<String, PullError> {
        let response = self.client.get(&self.url).send().await?;
        let response = Self::ensure_success(response).await?;
        Ok(response.text().await?)
    }
}

//! HTTP transport used by actions.
//!
//! This module defines the contract between an [`Action`](crate::Action) and
//! whatever actually moves bytes over the network, plus the default
//! implementation built on `reqwest`.
//!
//! # Architecture
//!
//! - [`Transport`] - The collaborator contract: send one request, get one
//!   fully-read response or a classified failure
//! - [`HttpTransport`] - Default transport backed by a `reqwest_middleware`
//!   client
//! - [`RequestOptions`] - Typed option bag (headers, query, body, json,
//!   timeout, delay) with an extension map for unknown keys
//! - [`ActionResponse`] - Buffered response handed to hooks and errors
//!
//! # Failure classification
//!
//! A transport must keep the following failures apart, because the action
//! engine maps each onto a different error category:
//!
//! - Connection failures (refused, DNS, TLS) → [`TransportError::Connect`]
//! - Timeouts → [`TransportError::Timeout`]
//! - Responses outside 2xx → [`TransportError::Status`], carrying the response
//! - Requests that could not be built at all → [`TransportError::InvalidRequest`]
//!
//! # Example
//!
//! ```rust,no_run
//! use reqwest::Method;
//! use service_action::transport::{HttpTransport, RequestOptions, Transport};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = HttpTransport::new();
//! let mut options = RequestOptions::new().header("Accept", "application/json");
//! options.timeout = Some(2.0);
//!
//! let response = transport
//!     .send(Method::GET, "http://localhost:8080/api/v1/user", &options)
//!     .await?;
//! println!("{}", response.text());
//! # Ok(())
//! # }
//! ```

mod http;
mod options;
mod response;

use async_trait::async_trait;
use reqwest::Method;
use thiserror::Error;

pub use http::HttpTransport;
pub use options::{BODY, DELAY, HEADERS, JSON, OptionError, QUERY, RequestOptions, TIMEOUT, is_valid_seconds};
pub use response::ActionResponse;

/// Errors a transport can report for a single request.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The endpoint could not be reached.
    ///
    /// This typically indicates connectivity issues such as:
    /// - Connection refused (server not running)
    /// - DNS resolution failure
    /// - TLS/SSL handshake errors
    #[error("Connection failed: {0}")]
    Connect(String),

    /// No complete response arrived within the configured timeout.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// The server answered outside the 2xx range.
    #[error("Server responded with status {}", .0.status())]
    Status(ActionResponse),

    /// The request could not be constructed (bad URL, invalid header, ...).
    /// Retrying cannot fix this.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::InvalidRequest(_))
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one request.
    ///
    /// Implementations must honour `options.delay` (wait before sending) and
    /// `options.timeout` (bound the whole exchange).
    async fn send(
        &self,
        method: Method,
        url: &str,
        options: &RequestOptions,
    ) -> Result<ActionResponse, TransportError>;
}

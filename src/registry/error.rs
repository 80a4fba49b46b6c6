use thiserror::Error;

/// Errors raised while resolving service names or talking to a discovery
/// backend.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The name is neither a literal URL, a static entry nor a discovered one.
    #[error("Service '{service}' is not registered and was not discovered")]
    NotFound { service: String },

    /// Settings that would produce an unusable endpoint.
    #[error("Invalid settings for service '{service}': {reason}")]
    InvalidSettings { service: String, reason: String },

    /// The discovery configuration is missing required settings for the
    /// selected mode.
    #[error("Invalid discovery configuration: {0}")]
    InvalidConfiguration(String),

    /// `refresh_discovered` was called while no backend is configured.
    #[error("No discovery backend is configured")]
    NotConfigured,

    #[error("Discovery request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Discovery backend returned status {status}: {body}")]
    BackendStatus { status: reqwest::StatusCode, body: String },

    #[error("Discovery response could not be decoded: {0}")]
    InvalidResponse(#[from] serde_json::Error),

    #[error("Discovery URL error: {0}")]
    UrlError(#[from] url::ParseError),
}

impl DiscoveryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DiscoveryError::NotFound { .. })
    }
}

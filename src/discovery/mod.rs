//! Pluggable discovery backends.
//!
//! A backend produces the registry's discovered subset. The registry owns the
//! swap of the discovered map; backends only report whether their source
//! changed since the last call and, if so, the complete new set of services.
//!
//! Two backends ship with the crate:
//!
//! - [`FabioDiscovery`] reads the route table of a Fabio reverse proxy and
//!   routes every discovered service through the proxy, using the service name
//!   as the first path segment.
//! - [`ConsulDiscovery`] lists the Consul catalog and picks a passing instance
//!   for each service.
//!
//! Backends are selected through [`DiscoveryConfig`], whose keys mirror the
//! in-memory configuration structure:
//!
//! ```rust
//! use service_action::discovery::{DiscoverMode, DiscoveryConfig};
//!
//! let config: DiscoveryConfig = serde_json::from_value(serde_json::json!({
//!     "discoverMode": "fabio",
//!     "fabio": {
//!         "routeServiceUrl": "http://fabio.local:9998",
//!         "proxyServiceUrl": "http://fabio.local:9999"
//!     }
//! }))
//! .unwrap();
//! assert_eq!(config.discover_mode, DiscoverMode::Fabio);
//! ```

mod consul;
mod fabio;
mod refresher;

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::registry::{DiscoveryError, ServiceSettings};

pub use consul::{ConsulDiscovery, ConsulSettings};
pub use fabio::{FabioDiscovery, FabioSettings};
pub use refresher::spawn_discovery_refresher;

const DISCOVERY_TIMEOUT_SECS: u64 = 5;

/// Result of asking a backend for its current view of the world.
#[derive(Debug, Clone, PartialEq)]
pub enum DiscoverySnapshot {
    /// The source has not changed since the previous call.
    Unchanged,
    /// The complete replacement set of discovered services.
    Changed(HashMap<String, ServiceSettings>),
}

#[async_trait]
pub trait DiscoveryBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    async fn discover(&self) -> Result<DiscoverySnapshot, DiscoveryError>;

    /// Forgets any change-detection state so the next `discover` call
    /// reports a full set.
    fn reset(&self) {}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoverMode {
    #[default]
    None,
    /// Consul catalog lookup.
    Default,
    /// Fabio route table.
    Fabio,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(
        default,
        rename = "discoverMode",
        alias = "discover_mode",
        alias = "discovermode"
    )]
    pub discover_mode: DiscoverMode,
    #[serde(default)]
    pub default: Option<ConsulSettings>,
    #[serde(default)]
    pub fabio: Option<FabioSettings>,
}

impl DiscoveryConfig {
    /// Builds the backend for the selected mode.
    ///
    /// Returns `Ok(None)` for [`DiscoverMode::None`]. Missing or malformed
    /// settings for the selected mode fail here rather than on first refresh.
    pub fn build_backend(&self) -> Result<Option<Arc<dyn DiscoveryBackend>>, DiscoveryError> {
        match self.discover_mode {
            DiscoverMode::None => Ok(None),
            DiscoverMode::Fabio => {
                let settings = self.fabio.as_ref().ok_or_else(|| {
                    DiscoveryError::InvalidConfiguration(
                        "discoverMode is 'fabio' but the 'fabio' section is missing".into(),
                    )
                })?;
                Ok(Some(Arc::new(FabioDiscovery::new(settings)?)))
            },
            DiscoverMode::Default => {
                let settings = self.default.as_ref().ok_or_else(|| {
                    DiscoveryError::InvalidConfiguration(
                        "discoverMode is 'default' but the 'default' section is missing".into(),
                    )
                })?;
                Ok(Some(Arc::new(ConsulDiscovery::new(settings)?)))
            },
        }
    }
}

pub(crate) fn discovery_client() -> Result<reqwest::Client, DiscoveryError> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(DISCOVERY_TIMEOUT_SECS))
        .build()?)
}

/// Parses a configured endpoint, requiring an `http`/`https` scheme and a
/// host. The returned URL always ends in `/` so it can be joined.
pub(crate) fn parse_endpoint(value: &str, key: &str) -> Result<Url, DiscoveryError> {
    if value.trim().is_empty() {
        return Err(DiscoveryError::InvalidConfiguration(format!("'{key}' is required")));
    }

    let mut url = Url::parse(value.trim())
        .map_err(|e| DiscoveryError::InvalidConfiguration(format!("'{key}' is not a valid URL: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(DiscoveryError::InvalidConfiguration(format!(
            "'{key}' must be an absolute http(s) URL, got '{value}'"
        )));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

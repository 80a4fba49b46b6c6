//! Client configuration.
//!
//! A [`ClientConfig`] describes the statically known services, the discovery
//! backend and the default call policy. It is usually read from a TOML file
//! with environment overrides (see [`ClientConfig::load`]) and turned into a
//! [`ServiceContext`](crate::ServiceContext) with
//! [`ServiceContext::from_config`](crate::ServiceContext::from_config).

mod loader;

use serde::{Deserialize, Serialize};

use crate::{ActionError, discovery::DiscoveryConfig, registry::StaticService, transport::is_valid_seconds};

pub use loader::{ENV_PREFIX, get_default_config, load_configuration, write_config_to};

pub const DEFAULT_RETRY: u32 = 0;
pub const DEFAULT_RETRY_DELAY_SECS: f64 = 0.2;
pub const DEFAULT_TIMEOUT_SECS: f64 = 2.0;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub services: Vec<StaticService>,
    #[serde(default)]
    pub defaults: ActionDefaults,
}

/// Retry and timeout policy applied to every new action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionDefaults {
    pub retry: u32,
    #[serde(alias = "retryDelay", alias = "retrydelay")]
    pub retry_delay: f64,
    /// Seconds; `0.0` disables the timeout.
    pub timeout: f64,
}

impl Default for ActionDefaults {
    fn default() -> Self {
        Self {
            retry: DEFAULT_RETRY,
            retry_delay: DEFAULT_RETRY_DELAY_SECS,
            timeout: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ActionDefaults {
    pub fn validate(&self) -> Result<(), ActionError> {
        if !self.retry_delay.is_finite() || self.retry_delay < 0.0 {
            return Err(ActionError::configuration(
                "defaults",
                format!("retry_delay must be a non-negative number of seconds, got {}", self.retry_delay),
            ));
        }
        if !is_valid_seconds(self.timeout) {
            return Err(ActionError::configuration(
                "defaults",
                format!("timeout must be a non-negative number of seconds within range, got {}", self.timeout),
            ));
        }
        Ok(())
    }
}

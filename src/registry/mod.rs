//! Service name resolution.
//!
//! The registry keeps two maps: static entries set by explicit calls and the
//! discovered entries produced by a [`DiscoveryBackend`]. Resolution order is
//! literal URL, then static entry, then discovered entry.
//!
//! The discovered map is rebuilt off to the side and swapped in whole, so a
//! reader never observes a half-built map.

mod error;
mod settings;

use std::{collections::HashMap, sync::Arc};

use arc_swap::ArcSwap;
use log::{debug, info, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::discovery::{DiscoveryBackend, DiscoveryConfig, DiscoverySnapshot};

pub use error::DiscoveryError;
pub use settings::ServiceSettings;

/// A statically registered service as it appears in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticService {
    pub name: String,
    #[serde(alias = "address")]
    pub host: String,
    pub port: u16,
    #[serde(default, alias = "isHttps", alias = "is_https", alias = "ishttps")]
    pub secure: bool,
}

pub struct ServiceRegistry {
    static_entries: RwLock<HashMap<String, ServiceSettings>>,
    discovered: ArcSwap<HashMap<String, ServiceSettings>>,
    backend: RwLock<Option<Arc<dyn DiscoveryBackend>>>,
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("static_entries", &self.static_entries.read().len())
            .field("discovered", &self.discovered.load().len())
            .field("backend", &self.discovery_backend_name())
            .finish()
    }
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            static_entries: RwLock::new(HashMap::new()),
            discovered: ArcSwap::from_pointee(HashMap::new()),
            backend: RwLock::new(None),
        }
    }

    /// Registers (or replaces) a static service.
    pub fn register_static(
        &self,
        name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        secure: bool,
    ) -> Result<(), DiscoveryError> {
        let settings = ServiceSettings::new(name, host, port, secure)?;
        debug!(service = settings.name(), url:% = settings.base_url(); "Registered static service");
        self.static_entries.write().insert(settings.name().to_string(), settings);
        Ok(())
    }

    /// Registers a batch of services. Nothing is registered if any entry is
    /// invalid.
    pub fn register_services<'a>(
        &self,
        services: impl IntoIterator<Item = &'a StaticService>,
    ) -> Result<(), DiscoveryError> {
        let built = services
            .into_iter()
            .map(|s| ServiceSettings::new(s.name.clone(), s.host.clone(), s.port, s.secure))
            .collect::<Result<Vec<_>, _>>()?;

        let mut entries = self.static_entries.write();
        for settings in built {
            entries.insert(settings.name().to_string(), settings);
        }
        Ok(())
    }

    pub fn remove_static(&self, name: &str) -> Option<ServiceSettings> {
        self.static_entries.write().remove(name)
    }

    pub fn clear_static(&self) {
        self.static_entries.write().clear();
    }

    pub fn static_services(&self) -> HashMap<String, ServiceSettings> {
        self.static_entries.read().clone()
    }

    /// The current discovered map. Cheap; the map is shared, not copied.
    pub fn discovered_services(&self) -> Arc<HashMap<String, ServiceSettings>> {
        self.discovered.load_full()
    }

    pub fn resolve(&self, name_or_url: &str) -> Result<ServiceSettings, DiscoveryError> {
        if let Some(settings) = ServiceSettings::from_literal_url(name_or_url) {
            return Ok(settings);
        }
        if let Some(settings) = self.static_entries.read().get(name_or_url) {
            return Ok(settings.clone());
        }
        if let Some(settings) = self.discovered.load().get(name_or_url) {
            return Ok(settings.clone());
        }

        Err(DiscoveryError::NotFound {
            service: name_or_url.to_string(),
        })
    }

    /// Like [`resolve`](Self::resolve), but refreshes discovery once when the
    /// name is unknown and a backend is configured. A failing backend is
    /// logged and treated as "not found".
    pub async fn resolve_or_refresh(&self, name_or_url: &str) -> Result<ServiceSettings, DiscoveryError> {
        match self.resolve(name_or_url) {
            Err(DiscoveryError::NotFound { .. }) if self.is_discovery_configured() => {
                if let Err(e) = self.refresh_discovered().await {
                    warn!(service = name_or_url, error:% = e; "Discovery refresh failed during resolution");
                }
                self.resolve(name_or_url)
            },
            other => other,
        }
    }

    /// Selects a discovery backend from configuration.
    ///
    /// Any previously discovered services are dropped; the new backend starts
    /// out with nothing discovered until the first refresh.
    pub fn configure_discovery(&self, config: &DiscoveryConfig) -> Result<(), DiscoveryError> {
        let backend = config.build_backend()?;
        info!(mode:? = config.discover_mode; "Discovery configured");
        *self.backend.write() = backend;
        self.discovered.store(Arc::new(HashMap::new()));
        Ok(())
    }

    /// Installs a custom backend.
    pub fn set_discovery_backend(&self, backend: Arc<dyn DiscoveryBackend>) {
        info!(backend = backend.name(); "Discovery backend installed");
        *self.backend.write() = Some(backend);
        self.discovered.store(Arc::new(HashMap::new()));
    }

    pub fn is_discovery_configured(&self) -> bool {
        self.backend.read().is_some()
    }

    pub fn discovery_backend_name(&self) -> Option<&'static str> {
        self.backend.read().as_ref().map(|b| b.name())
    }

    /// Asks the backend for its current services and swaps them in.
    ///
    /// Returns `true` if the discovered map was replaced, `false` if the
    /// backend reported no change.
    pub async fn refresh_discovered(&self) -> Result<bool, DiscoveryError> {
        let backend = self.backend.read().clone().ok_or(DiscoveryError::NotConfigured)?;

        match backend.discover().await? {
            DiscoverySnapshot::Unchanged => {
                debug!(backend = backend.name(); "Discovered services unchanged");
                Ok(false)
            },
            DiscoverySnapshot::Changed(services) => {
                info!(backend = backend.name(), services = services.len(); "Discovered services updated");
                self.discovered.store(Arc::new(services));
                Ok(true)
            },
        }
    }

    pub fn clear_discovered(&self) {
        self.discovered.store(Arc::new(HashMap::new()));
        if let Some(backend) = self.backend.read().as_ref() {
            backend.reset();
        }
    }
}

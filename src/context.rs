use std::sync::{Arc, OnceLock};

use log::info;
use reqwest::Method;

use crate::{
    Action, ActionError,
    config::{ActionDefaults, ClientConfig},
    filter::GlobalFilters,
    registry::ServiceRegistry,
    transport::{HttpTransport, Transport},
};

/// Everything actions share: the registry, the global filters, the transport
/// and the default call policy.
///
/// Build one per application and hand out clones of the `Arc`. Code that
/// prefers a process-wide instance can use [`ServiceContext::global`].
pub struct ServiceContext {
    registry: Arc<ServiceRegistry>,
    filters: GlobalFilters,
    transport: Arc<dyn Transport>,
    defaults: ActionDefaults,
}

impl std::fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext")
            .field("registry", &self.registry)
            .field("filters", &self.filters)
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

impl ServiceContext {
    pub fn new() -> Arc<Self> {
        Self::with_transport(Arc::new(HttpTransport::new()))
    }

    pub fn with_transport(transport: Arc<dyn Transport>) -> Arc<Self> {
        Self::build(transport, ActionDefaults::default())
    }

    fn build(transport: Arc<dyn Transport>, defaults: ActionDefaults) -> Arc<Self> {
        Arc::new(Self {
            registry: Arc::new(ServiceRegistry::new()),
            filters: GlobalFilters::new(),
            transport,
            defaults,
        })
    }

    /// Builds a context from loaded configuration: registers the static
    /// services, selects the discovery backend and applies the action
    /// defaults.
    pub fn from_config(config: &ClientConfig) -> Result<Arc<Self>, ActionError> {
        Self::from_config_with_transport(config, Arc::new(HttpTransport::new()))
    }

    pub fn from_config_with_transport(
        config: &ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Arc<Self>, ActionError> {
        config.defaults.validate()?;

        let context = Self::build(transport, config.defaults.clone());
        context.registry.register_services(&config.services)?;
        context.registry.configure_discovery(&config.discovery)?;

        info!(
            services = config.services.len(),
            discovery:? = config.discovery.discover_mode;
            "Service context initialized from configuration"
        );
        Ok(context)
    }

    /// The lazily created process-wide context using the default transport.
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<ServiceContext>> = OnceLock::new();
        GLOBAL.get_or_init(ServiceContext::new).clone()
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub fn filters(&self) -> &GlobalFilters {
        &self.filters
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn defaults(&self) -> &ActionDefaults {
        &self.defaults
    }

    /// Shorthand for [`Action::new`].
    pub fn action(self: &Arc<Self>, service: &str, method: Method, path: impl Into<String>) -> Result<Action, ActionError> {
        Action::new(self, service, method, path)
    }
}

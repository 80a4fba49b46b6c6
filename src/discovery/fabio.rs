use std::collections::HashMap;

use async_trait::async_trait;
use log::debug;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{DiscoveryBackend, DiscoverySnapshot, discovery_client, parse_endpoint};
use crate::registry::{DiscoveryError, ServiceSettings};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FabioSettings {
    /// Base URL of Fabio's admin UI/API, e.g. `http://fabio:9998`.
    #[serde(
        rename = "routeServiceUrl",
        alias = "route_service_url",
        alias = "routeserviceurl",
        alias = "fabioRouteService"
    )]
    pub route_service_url: String,
    /// Base URL of Fabio's proxy listener, e.g. `http://fabio:9999`.
    #[serde(
        rename = "proxyServiceUrl",
        alias = "proxy_service_url",
        alias = "proxyserviceurl",
        alias = "fabioProxyService"
    )]
    pub proxy_service_url: String,
}

#[derive(Debug, Deserialize)]
struct RouteEntry {
    service: String,
}

/// Discovers services from Fabio's route table.
///
/// Every discovered name resolves to the proxy address with the name as a path
/// prefix, so traffic is always routed through the proxy.
pub struct FabioDiscovery {
    client: reqwest::Client,
    routes_url: Url,
    proxy_host: String,
    proxy_port: u16,
    proxy_secure: bool,
    last_route_table: Mutex<Option<String>>,
}

impl FabioDiscovery {
    pub fn new(settings: &FabioSettings) -> Result<Self, DiscoveryError> {
        let routes_url = parse_endpoint(&settings.route_service_url, "fabio.routeServiceUrl")?.join("api/routes")?;
        let proxy = parse_endpoint(&settings.proxy_service_url, "fabio.proxyServiceUrl")?;

        let proxy_host = proxy
            .host_str()
            .ok_or_else(|| DiscoveryError::InvalidConfiguration("fabio.proxyServiceUrl has no host".into()))?
            .to_string();
        let proxy_port = proxy
            .port_or_known_default()
            .ok_or_else(|| DiscoveryError::InvalidConfiguration("fabio.proxyServiceUrl has no port".into()))?;

        Ok(Self {
            client: discovery_client()?,
            routes_url,
            proxy_host,
            proxy_port,
            proxy_secure: proxy.scheme() == "https",
            last_route_table: Mutex::new(None),
        })
    }

    fn build_services(&self, routes: Vec<RouteEntry>) -> Result<HashMap<String, ServiceSettings>, DiscoveryError> {
        let mut services = HashMap::with_capacity(routes.len());
        for route in routes {
            if route.service.is_empty() || services.contains_key(&route.service) {
                continue;
            }
            let settings = ServiceSettings::new(
                route.service.clone(),
                self.proxy_host.clone(),
                self.proxy_port,
                self.proxy_secure,
            )?
            .with_proxy_path_segment(route.service.clone());
            services.insert(route.service, settings);
        }
        Ok(services)
    }
}

#[async_trait]
impl DiscoveryBackend for FabioDiscovery {
    fn name(&self) -> &'static str {
        "fabio"
    }

    async fn discover(&self) -> Result<DiscoverySnapshot, DiscoveryError> {
        let response = self.client.get(self.routes_url.clone()).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(DiscoveryError::BackendStatus { status, body });
        }

        if self.last_route_table.lock().as_deref() == Some(body.as_str()) {
            debug!(url:% = self.routes_url; "Fabio route table unchanged");
            return Ok(DiscoverySnapshot::Unchanged);
        }

        // Fabio answers `null` when the table is empty.
        let routes: Option<Vec<RouteEntry>> = serde_json::from_str(&body)?;
        let services = self.build_services(routes.unwrap_or_default())?;
        *self.last_route_table.lock() = Some(body);

        Ok(DiscoverySnapshot::Changed(services))
    }

    fn reset(&self) {
        *self.last_route_table.lock() = None;
    }
}

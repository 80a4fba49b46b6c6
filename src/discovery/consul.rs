use std::collections::HashMap;

use async_trait::async_trait;
use log::{debug, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use url::Url;

use super::{DiscoveryBackend, DiscoverySnapshot, discovery_client, parse_endpoint};
use crate::registry::{DiscoveryError, ServiceSettings};

const CONSUL_SERVICE_NAME: &str = "consul";
const SECURE_TAG: &str = "https";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsulSettings {
    /// Agent address, either `host:port` or a full URL.
    #[serde(alias = "Address")]
    pub address: String,
    /// Scheme used when `address` carries none. Defaults to `http`.
    #[serde(default, alias = "Scheme")]
    pub scheme: Option<String>,
    #[serde(default, alias = "Token")]
    pub token: Option<String>,
    #[serde(default, alias = "Datacenter")]
    pub datacenter: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HealthEntry {
    #[serde(rename = "Node")]
    node: HealthNode,
    #[serde(rename = "Service")]
    service: HealthService,
}

#[derive(Debug, Deserialize)]
struct HealthNode {
    #[serde(rename = "Address")]
    address: String,
}

#[derive(Debug, Deserialize)]
struct HealthService {
    #[serde(rename = "Address", default)]
    address: String,
    #[serde(rename = "Port")]
    port: u16,
}

/// Discovers services from the Consul catalog, keeping only instances that
/// pass their health checks. Services tagged `https` are called over TLS.
pub struct ConsulDiscovery {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
    datacenter: Option<String>,
    last_services: Mutex<Option<HashMap<String, ServiceSettings>>>,
}

impl ConsulDiscovery {
    pub fn new(settings: &ConsulSettings) -> Result<Self, DiscoveryError> {
        let address = settings.address.trim();
        let address = if address.is_empty() || address.contains("://") {
            address.to_string()
        } else {
            let scheme = settings.scheme.as_deref().unwrap_or("http").to_lowercase();
            format!("{scheme}://{address}")
        };

        Ok(Self {
            client: discovery_client()?,
            base_url: parse_endpoint(&address, "default.address")?,
            token: settings.token.clone().filter(|t| !t.is_empty()),
            datacenter: settings.datacenter.clone().filter(|dc| !dc.is_empty()),
            last_services: Mutex::new(None),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, DiscoveryError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| DiscoveryError::InvalidConfiguration(format!("{} cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        if let Some(dc) = &self.datacenter {
            url.query_pairs_mut().append_pair("dc", dc);
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, DiscoveryError> {
        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.header("X-Consul-Token", token);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(DiscoveryError::BackendStatus { status, body });
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn passing_instance(&self, name: &str) -> Result<Option<HealthEntry>, DiscoveryError> {
        let mut url = self.endpoint(&["v1", "health", "service", name])?;
        url.query_pairs_mut().append_pair("passing", "true");
        let entries: Vec<HealthEntry> = self.get_json(url).await?;
        Ok(entries.into_iter().next())
    }
}

#[async_trait]
impl DiscoveryBackend for ConsulDiscovery {
    fn name(&self) -> &'static str {
        "consul"
    }

    async fn discover(&self) -> Result<DiscoverySnapshot, DiscoveryError> {
        let catalog: HashMap<String, Vec<String>> = self.get_json(self.endpoint(&["v1", "catalog", "services"])?).await?;

        let mut names: Vec<(String, Vec<String>)> = catalog
            .into_iter()
            .filter(|(name, _)| name != CONSUL_SERVICE_NAME)
            .collect();
        names.sort_by(|a, b| a.0.cmp(&b.0));

        let mut services = HashMap::with_capacity(names.len());
        for (name, tags) in names {
            let entry = match self.passing_instance(&name).await {
                Ok(Some(entry)) => entry,
                Ok(None) => {
                    debug!(service = name.as_str(); "No passing instance in Consul, skipping");
                    continue;
                },
                Err(e) => {
                    warn!(service = name.as_str(), error:% = e; "Consul health lookup failed, skipping");
                    continue;
                },
            };
            let host = if entry.service.address.is_empty() {
                entry.node.address
            } else {
                entry.service.address
            };
            let is_secure = tags.iter().any(|tag| tag == SECURE_TAG);
            match ServiceSettings::new(name.clone(), host, entry.service.port, is_secure) {
                Ok(settings) => {
                    services.insert(name, settings);
                },
                Err(e) => warn!(service = name.as_str(), error:% = e; "Unusable Consul instance, skipping"),
            }
        }

        let mut last = self.last_services.lock();
        if last.as_ref() == Some(&services) {
            return Ok(DiscoverySnapshot::Unchanged);
        }
        *last = Some(services.clone());
        Ok(DiscoverySnapshot::Changed(services))
    }

    fn reset(&self) {
        *self.last_services.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn bare_address_takes_scheme() {
        let backend = ConsulDiscovery::new(&ConsulSettings {
            address: "consul.local:8500".into(),
            scheme: Some("HTTPS".into()),
            token: None,
            datacenter: None,
        })
        .unwrap();
        assert_eq!(backend.base_url.as_str(), "https://consul.local:8500/");
    }

    #[test]
    fn empty_address_is_rejected() {
        let result = ConsulDiscovery::new(&ConsulSettings {
            address: "  ".into(),
            scheme: None,
            token: None,
            datacenter: None,
        });
        assert!(matches!(result, Err(DiscoveryError::InvalidConfiguration(_))));
    }

    #[tokio::test]
    async fn discovers_passing_instances() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/catalog/services"))
            .and(header("X-Consul-Token", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"consul":[],"users":["https"],"orders":[],"billing":[]}"#,
            ))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/health/service/users"))
            .and(query_param("passing", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"[{"Node":{"Address":"10.0.0.1"},"Service":{"Address":"10.0.1.1","Port":8443}}]"#,
            ))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/health/service/orders"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"[{"Node":{"Address":"10.0.0.2"},"Service":{"Address":"","Port":8080}}]"#,
            ))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/health/service/billing"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .mount(&mock_server)
            .await;

        let backend = ConsulDiscovery::new(&ConsulSettings {
            address: mock_server.uri(),
            scheme: None,
            token: Some("secret".into()),
            datacenter: None,
        })
        .unwrap();

        let DiscoverySnapshot::Changed(services) = backend.discover().await.unwrap() else {
            panic!("first refresh must report a change");
        };
        assert_eq!(services.len(), 2);
        assert_eq!(services["users"].base_url(), "https://10.0.1.1:8443/");
        assert_eq!(services["orders"].base_url(), "http://10.0.0.2:8080/");
        assert!(!services.contains_key("billing"));

        assert_eq!(backend.discover().await.unwrap(), DiscoverySnapshot::Unchanged);
    }

    #[tokio::test]
    async fn unusable_instances_do_not_block_the_rest() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/catalog/services"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"users":[],"worker":[],"flaky":[]}"#,
            ))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/health/service/users"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"[{"Node":{"Address":"10.0.0.1"},"Service":{"Address":"","Port":8080}}]"#,
            ))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/health/service/worker"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"[{"Node":{"Address":"10.0.0.2"},"Service":{"Address":"","Port":0}}]"#,
            ))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/health/service/flaky"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let backend = ConsulDiscovery::new(&ConsulSettings {
            address: mock_server.uri(),
            scheme: None,
            token: None,
            datacenter: None,
        })
        .unwrap();

        let DiscoverySnapshot::Changed(services) = backend.discover().await.unwrap() else {
            panic!("first refresh must report a change");
        };
        assert_eq!(services.len(), 1);
        assert_eq!(services["users"].base_url(), "http://10.0.0.1:8080/");
    }

    #[tokio::test]
    async fn service_names_are_percent_encoded() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/catalog/services"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"web api":[]}"#))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/health/service/web%20api"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"[{"Node":{"Address":"10.0.0.3"},"Service":{"Address":"","Port":9000}}]"#,
            ))
            .expect(1)
            .mount(&mock_server)
            .await;

        let backend = ConsulDiscovery::new(&ConsulSettings {
            address: format!("{}/", mock_server.uri()),
            scheme: None,
            token: None,
            datacenter: Some("dc1".into()),
        })
        .unwrap();

        let DiscoverySnapshot::Changed(services) = backend.discover().await.unwrap() else {
            panic!("first refresh must report a change");
        };
        assert!(services.contains_key("web api"));
    }
}

use serde::{Deserialize, Serialize};
use url::Url;

use super::error::DiscoveryError;

const HTTP_PORT: u16 = 80;
const HTTPS_PORT: u16 = 443;

/// One resolvable endpoint.
///
/// Settings are immutable once built. Re-registering a name or refreshing
/// discovery replaces the whole value instead of mutating it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSettings {
    name: String,
    host: String,
    port: u16,
    is_secure: bool,
    proxy_path_segment: Option<String>,
}

impl ServiceSettings {
    pub fn new(
        name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        is_secure: bool,
    ) -> Result<Self, DiscoveryError> {
        let name = name.into();
        let host = host.into();
        if port == 0 {
            return Err(DiscoveryError::InvalidSettings {
                service: name,
                reason: "port must be greater than 0".into(),
            });
        }
        if host.is_empty() {
            return Err(DiscoveryError::InvalidSettings {
                service: name,
                reason: "host must not be empty".into(),
            });
        }

        Ok(Self {
            name,
            host,
            port,
            is_secure,
            proxy_path_segment: None,
        })
    }

    /// Routes the service through a proxy under `/{segment}/`.
    pub fn with_proxy_path_segment(mut self, segment: impl Into<String>) -> Self {
        let segment = segment.into();
        let trimmed = segment.trim_matches('/');
        self.proxy_path_segment = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self
    }

    /// Builds settings straight from an absolute `http`/`https` URL.
    ///
    /// Returns `None` when the input is not such a URL, so callers can fall
    /// back to a registry lookup.
    pub fn from_literal_url(input: &str) -> Option<Self> {
        let url = Url::parse(input).ok()?;
        let is_secure = match url.scheme() {
            "http" => false,
            "https" => true,
            _ => return None,
        };
        let host = url.host_str()?.to_string();
        let port = url.port_or_known_default()?;

        Self::new(host.clone(), host, port, is_secure).ok()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_secure(&self) -> bool {
        self.is_secure
    }

    pub fn proxy_path_segment(&self) -> Option<&str> {
        self.proxy_path_segment.as_deref()
    }

    pub fn scheme(&self) -> &'static str {
        if self.is_secure { "https" } else { "http" }
    }

    /// `scheme://host[:port]/[segment/]`, the port omitted only for 80 and 443.
    pub fn base_url(&self) -> String {
        let mut url = format!("{}://{}", self.scheme(), self.host);
        if self.port != HTTP_PORT && self.port != HTTPS_PORT {
            url.push(':');
            url.push_str(&self.port.to_string());
        }
        url.push('/');
        if let Some(segment) = &self.proxy_path_segment {
            url.push_str(segment);
            url.push('/');
        }
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_includes_non_default_port() {
        let settings = ServiceSettings::new("users", "localhost", 8080, false).unwrap();
        assert_eq!(settings.base_url(), "http://localhost:8080/");
    }

    #[test]
    fn base_url_omits_default_ports() {
        let plain = ServiceSettings::new("users", "example.com", 80, false).unwrap();
        let secure = ServiceSettings::new("users", "example.com", 443, true).unwrap();
        assert_eq!(plain.base_url(), "http://example.com/");
        assert_eq!(secure.base_url(), "https://example.com/");
    }

    #[test]
    fn base_url_appends_proxy_segment() {
        let settings = ServiceSettings::new("orders", "proxy.local", 9999, false)
            .unwrap()
            .with_proxy_path_segment("orders");
        assert_eq!(settings.base_url(), "http://proxy.local:9999/orders/");
    }

    #[test]
    fn zero_port_is_rejected() {
        let err = ServiceSettings::new("users", "localhost", 0, false).unwrap_err();
        assert!(matches!(err, DiscoveryError::InvalidSettings { ref service, .. } if service == "users"));
    }

    #[test]
    fn literal_url_round_trips_host_port_and_scheme() {
        let settings = ServiceSettings::from_literal_url("https://api.example.com:8443/v1").unwrap();
        assert_eq!(settings.host(), "api.example.com");
        assert_eq!(settings.port(), 8443);
        assert!(settings.is_secure());

        let settings = ServiceSettings::from_literal_url("http://10.0.0.5").unwrap();
        assert_eq!(settings.port(), 80);
        assert!(!settings.is_secure());
        assert_eq!(settings.base_url(), "http://10.0.0.5/");
    }

    #[test]
    fn plain_names_are_not_literal_urls() {
        assert!(ServiceSettings::from_literal_url("userService").is_none());
        assert!(ServiceSettings::from_literal_url("ftp://files.example.com").is_none());
    }
}

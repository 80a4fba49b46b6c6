use reqwest::Method;

use crate::transport::RequestOptions;

/// The request an action last sent: method, full URL, the path it was built
/// from and the options handed to the transport (including the effective
/// timeout and retry delay).
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSettings {
    pub method: Method,
    pub url: String,
    pub path: String,
    pub options: RequestOptions,
}

/// Joins a base URL ending in `/` with a request path, dropping one leading
/// slash from the path.
pub(crate) fn join_url(base_url: &str, path: &str) -> String {
    let path = path.strip_prefix('/').unwrap_or(path);
    format!("{base_url}{path}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_slash_is_not_doubled() {
        assert_eq!(join_url("http://users/", "/api/v1/user"), "http://users/api/v1/user");
        assert_eq!(join_url("http://users/", "api/v1/user"), "http://users/api/v1/user");
        assert_eq!(join_url("http://proxy:9999/users/", ""), "http://proxy:9999/users/");
    }
}

use std::time::Instant;

use async_trait::async_trait;
use log::trace;
use reqwest::{Method, header::CONTENT_TYPE};
use url::Url;

use super::{ActionResponse, RequestOptions, Transport, TransportError};

/// Default [`Transport`] backed by a `reqwest_middleware` client.
///
/// Retries are owned by the action engine, so the default client carries no
/// retry middleware. Callers that want extra middleware (tracing, auth, ...)
/// can build their own client and hand it to
/// [`from_middleware_client`](Self::from_middleware_client).
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest_middleware::ClientWithMiddleware,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self::from_middleware_client(reqwest_middleware::ClientBuilder::new(client).build())
    }

    pub fn from_middleware_client(client: reqwest_middleware::ClientWithMiddleware) -> Self {
        Self { client }
    }

    fn build_request(
        &self,
        method: Method,
        url: &str,
        options: &RequestOptions,
    ) -> Result<reqwest_middleware::RequestBuilder, TransportError> {
        let url = Url::parse(url).map_err(|e| TransportError::InvalidRequest(format!("{url}: {e}")))?;
        let mut req = self.client.request(method, url);

        for (name, value) in &options.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        if !options.query.is_empty() {
            req = req.query(&options.query);
        }

        if let Some(body) = &options.body {
            req = req.body(body.clone());
        } else if let Some(json) = &options.json {
            let body = serde_json::to_string(json).map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
            if !options.has_header(CONTENT_TYPE.as_str()) {
                req = req.header(CONTENT_TYPE, "application/json");
            }
            req = req.body(body);
        }

        let timeout = options
            .timeout_duration()
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        if let Some(timeout) = timeout {
            req = req.timeout(timeout);
        }

        Ok(req)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        method: Method,
        url: &str,
        options: &RequestOptions,
    ) -> Result<ActionResponse, TransportError> {
        let req = self.build_request(method, url, options)?;

        if let Some(delay) = options.delay_duration() {
            tokio::time::sleep(delay).await;
        }

        let start = Instant::now();
        let resp = req.send().await.map_err(classify_middleware_error)?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.bytes().await.map_err(classify_reqwest_error)?;
        trace!(url = url, status = status.as_u16(), latency_ms = start.elapsed().as_millis() as u64; "Response received");

        let response = ActionResponse::new(status, headers, body.to_vec());
        if !status.is_success() {
            return Err(TransportError::Status(response));
        }
        Ok(response)
    }
}

fn classify_middleware_error(err: reqwest_middleware::Error) -> TransportError {
    match err {
        reqwest_middleware::Error::Reqwest(e) => classify_reqwest_error(e),
        reqwest_middleware::Error::Middleware(e) => TransportError::Connect(e.to_string()),
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(err.to_string())
    } else if err.is_builder() {
        TransportError::InvalidRequest(err.to_string())
    } else {
        TransportError::Connect(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn sends_headers_query_and_json() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/user"))
            .and(header("X-User-Key", "1"))
            .and(header("Content-Type", "application/json"))
            .and(query_param("page", "2"))
            .and(body_json(serde_json::json!({"name": "amos"})))
            .respond_with(ResponseTemplate::new(201).set_body_string("created"))
            .mount(&mock_server)
            .await;

        let mut options = RequestOptions::new().header("X-User-Key", "1");
        options.query.insert("page".into(), "2".into());
        options.json = Some(serde_json::json!({"name": "amos"}));

        let response = HttpTransport::new()
            .send(Method::POST, &format!("{}/api/v1/user", mock_server.uri()), &options)
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 201);
        assert_eq!(response.text(), "created");
    }

    #[tokio::test]
    async fn non_success_status_carries_the_response() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("missing"))
            .mount(&mock_server)
            .await;

        let err = HttpTransport::new()
            .send(Method::GET, &mock_server.uri(), &RequestOptions::new())
            .await
            .unwrap_err();
        let TransportError::Status(response) = err else {
            panic!("expected a status error, got {err:?}");
        };
        assert_eq!(response.status().as_u16(), 404);
        assert_eq!(response.text(), "missing");
    }

    #[tokio::test]
    async fn slow_response_times_out() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&mock_server)
            .await;

        let mut options = RequestOptions::new();
        options.timeout = Some(0.1);
        let err = HttpTransport::new()
            .send(Method::GET, &mock_server.uri(), &options)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_connect_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = HttpTransport::new()
            .send(Method::GET, &format!("http://127.0.0.1:{port}/"), &RequestOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Connect(_)), "got {err:?}");
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn malformed_url_is_not_retryable() {
        let err = HttpTransport::new()
            .send(Method::GET, "not a url", &RequestOptions::new())
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn oversized_timeout_is_rejected_before_sending() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let mut options = RequestOptions::new();
        options.timeout = Some(1e20);
        let err = HttpTransport::new()
            .send(Method::GET, &mock_server.uri(), &options)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidRequest(_)), "got {err:?}");
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn delay_is_waited_before_sending() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let mut options = RequestOptions::new();
        options.delay = Some(300);
        let start = Instant::now();
        HttpTransport::new()
            .send(Method::GET, &mock_server.uri(), &options)
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(300), "sent after {:?}", start.elapsed());
    }
}

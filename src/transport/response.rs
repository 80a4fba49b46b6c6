use std::borrow::Cow;

use reqwest::{StatusCode, header::HeaderMap};
use serde::de::DeserializeOwned;

/// A fully read HTTP response.
///
/// The body is buffered so the response can be stored on the action, handed
/// to hooks and attached to errors without further I/O.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl ActionResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

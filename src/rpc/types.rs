use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Invalid JSON was received by the server.
pub const PARSE_ERROR: i64 = -32700;
/// The JSON sent is not a valid request object.
pub const INVALID_REQUEST: i64 = -32600;
/// The method does not exist or is not available.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Invalid method parameters.
pub const INVALID_PARAMS: i64 = -32602;
/// Internal JSON-RPC error.
pub const INTERNAL_ERROR: i64 = -32603;
/// Lower bound of the implementation-defined server error range.
pub const SERVER_ERROR_MIN: i64 = -32099;
/// Upper bound of the implementation-defined server error range.
pub const SERVER_ERROR_MAX: i64 = -32000;

/// A query as supplied by the caller. The id is optional; a missing id is
/// filled with a random UUID when the action is configured.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcQuery {
    pub method: String,
    pub params: Vec<Value>,
    pub id: Option<String>,
}

impl RpcQuery {
    pub fn new(method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            method: method.into(),
            params,
            id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub(crate) fn into_request(self) -> RpcRequest {
        RpcRequest {
            jsonrpc: "2.0".to_string(),
            method: self.method,
            params: self.params,
            id: self.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
        }
    }
}

/// Wire form of one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Vec<Value>,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RpcResultResponse {
    pub id: Option<String>,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RpcErrorResponse {
    /// `None` when the server could not determine the id (e.g. parse errors).
    pub id: Option<String>,
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
}

impl RpcErrorResponse {
    pub fn kind(&self) -> RpcErrorKind {
        RpcErrorKind::from_code(self.code)
    }
}

/// Classification of JSON-RPC error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcErrorKind {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    /// `-32000` to `-32099`.
    ServerError,
    /// Any code outside the reserved range.
    Application,
}

impl RpcErrorKind {
    pub fn from_code(code: i64) -> Self {
        match code {
            PARSE_ERROR => RpcErrorKind::ParseError,
            INVALID_REQUEST => RpcErrorKind::InvalidRequest,
            METHOD_NOT_FOUND => RpcErrorKind::MethodNotFound,
            INVALID_PARAMS => RpcErrorKind::InvalidParams,
            INTERNAL_ERROR => RpcErrorKind::InternalError,
            SERVER_ERROR_MIN..=SERVER_ERROR_MAX => RpcErrorKind::ServerError,
            _ => RpcErrorKind::Application,
        }
    }
}

/// One entry of a (possibly batched) response.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcResponse {
    Result(RpcResultResponse),
    Error(RpcErrorResponse),
}

impl RpcResponse {
    pub fn id(&self) -> Option<&str> {
        match self {
            RpcResponse::Result(r) => r.id.as_deref(),
            RpcResponse::Error(e) => e.id.as_deref(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RpcResponse::Error(_))
    }
}

/// Decoded sub-responses partitioned by kind, each list keeping response
/// order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RpcOutcomes {
    pub success: Vec<RpcResultResponse>,
    pub error: Vec<RpcErrorResponse>,
}

impl RpcOutcomes {
    pub fn partition(responses: Vec<RpcResponse>) -> Self {
        let mut outcomes = Self::default();
        for response in responses {
            match response {
                RpcResponse::Result(r) => outcomes.success.push(r),
                RpcResponse::Error(e) => outcomes.error.push(e),
            }
        }
        outcomes
    }

    pub fn has_errors(&self) -> bool {
        !self.error.is_empty()
    }

    /// First successful value carrying `id`.
    pub fn result_by_id(&self, id: &str) -> Option<&Value> {
        self.success
            .iter()
            .find(|r| r.id.as_deref() == Some(id))
            .map(|r| &r.value)
    }

    /// Every successful value carrying `id`, in response order.
    pub fn results_by_id(&self, id: &str) -> Vec<&Value> {
        self.success
            .iter()
            .filter(|r| r.id.as_deref() == Some(id))
            .map(|r| &r.value)
            .collect()
    }

    pub fn error_by_id(&self, id: &str) -> Option<&RpcErrorResponse> {
        self.error.iter().find(|e| e.id.as_deref() == Some(id))
    }
}

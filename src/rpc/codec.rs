use serde_json::{Map, Value};
use thiserror::Error;

use super::types::{RpcErrorResponse, RpcRequest, RpcResponse, RpcResultResponse};

#[derive(Debug, Error)]
pub enum RpcDecodeError {
    #[error("RPC response is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("RPC response is empty")]
    Empty,

    #[error("RPC response entry {index} is invalid: {reason}")]
    InvalidEntry { index: usize, reason: String },
}

pub fn encode_query(request: &RpcRequest) -> Result<String, serde_json::Error> {
    serde_json::to_string(request)
}

pub fn encode_batch(requests: &[RpcRequest]) -> Result<String, serde_json::Error> {
    serde_json::to_string(requests)
}

/// Decodes a single response object or a batch array into ordered entries.
pub fn decode(body: &[u8]) -> Result<Vec<RpcResponse>, RpcDecodeError> {
    let value: Value = serde_json::from_slice(body)?;
    let entries = match value {
        Value::Array(entries) => entries,
        single @ Value::Object(_) => vec![single],
        other => {
            return Err(RpcDecodeError::InvalidEntry {
                index: 0,
                reason: format!("expected an object or array, got {other}"),
            });
        },
    };
    if entries.is_empty() {
        return Err(RpcDecodeError::Empty);
    }

    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| decode_entry(index, entry))
        .collect()
}

fn decode_entry(index: usize, entry: Value) -> Result<RpcResponse, RpcDecodeError> {
    let invalid = |reason: &str| RpcDecodeError::InvalidEntry {
        index,
        reason: reason.to_string(),
    };

    let Value::Object(mut object) = entry else {
        return Err(invalid("entry is not an object"));
    };
    let id = id_to_string(object.remove("id"));

    if let Some(error) = object.remove("error") {
        let Value::Object(mut error) = error else {
            return Err(invalid("'error' is not an object"));
        };
        let code = error
            .get("code")
            .and_then(Value::as_i64)
            .ok_or_else(|| invalid("'error.code' is missing or not an integer"))?;
        let message = take_string(&mut error, "message").ok_or_else(|| invalid("'error.message' is missing"))?;

        return Ok(RpcResponse::Error(RpcErrorResponse {
            id,
            code,
            message,
            data: error.remove("data"),
        }));
    }

    match object.remove("result") {
        Some(value) => Ok(RpcResponse::Result(RpcResultResponse { id, value })),
        None => Err(invalid("entry has neither 'result' nor 'error'")),
    }
}

fn take_string(object: &mut Map<String, Value>, key: &str) -> Option<String> {
    match object.remove(key)? {
        Value::String(s) => Some(s),
        _ => None,
    }
}

fn id_to_string(id: Option<Value>) -> Option<String> {
    match id? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

//! JSON-RPC 2.0 payloads carried by an [`Action`](crate::Action).
//!
//! Requests are encoded as a single object for one query and as an array for
//! a batch. Responses decode into an ordered list of [`RpcResponse`] entries,
//! either results or errors, so callers can address them by position even when
//! ids repeat.

mod codec;
mod types;

pub use codec::{RpcDecodeError, decode, encode_batch, encode_query};
pub use types::{
    INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR, RpcErrorKind, RpcErrorResponse,
    RpcOutcomes, RpcQuery, RpcRequest, RpcResponse, RpcResultResponse, SERVER_ERROR_MAX, SERVER_ERROR_MIN,
};

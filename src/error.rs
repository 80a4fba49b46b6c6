//! Error types for action execution.
//!
//! This module defines [`ActionError`], the single error type returned by
//! [`Action::execute`](crate::Action::execute),
//! [`ConcurrentActions::send`](crate::ConcurrentActions::send) and handed to
//! fail hooks. Call failures carry a [`CallFailure`] snapshot with everything
//! known about the failed call, so a fail hook can inspect the response, the
//! request that produced it and the state of the action without further I/O.

use std::fmt;

use reqwest::{Method, StatusCode};
use serde_json::Value;
use thiserror::Error;

use crate::{
    action::RequestSettings,
    registry::DiscoveryError,
    rpc::{RpcErrorResponse, RpcOutcomes, RpcResultResponse},
    transport::ActionResponse,
};

/// Errors that can occur while configuring or executing an action.
///
/// Call failures are split by category so callers can match on the variant
/// rather than inspect status codes:
///
/// # Error Categories
///
/// - **Setup errors**: [`Configuration`](ActionError::Configuration),
///   [`Discovery`](ActionError::Discovery). Raised before any network call and
///   never retried.
/// - **Transport errors**: [`Connect`](ActionError::Connect). The endpoint
///   could not be reached or did not answer in time.
/// - **HTTP errors**: [`HttpClient`](ActionError::HttpClient) for 4xx and
///   other non-2xx answers, [`HttpServer`](ActionError::HttpServer) for 5xx.
/// - **Protocol errors**: [`RpcProtocol`](ActionError::RpcProtocol). The
///   server answered 2xx but the JSON-RPC body contained errors or could not
///   be decoded.
///
/// # Example
///
/// ```rust,no_run
/// use service_action::ActionError;
///
/// fn handle_error(err: &ActionError) {
///     match err {
///         ActionError::HttpClient(failure) => {
///             eprintln!("Rejected with {:?}: {}", err.status_code(), failure.message);
///         }
///         ActionError::RpcProtocol(_) => {
///             eprintln!("RPC error {:?}: {:?}", err.rpc_error_code(), err.rpc_error_message());
///         }
///         _ => eprintln!("Other error: {}", err),
///     }
/// }
/// ```
#[derive(Debug, Error)]
pub enum ActionError {
    /// An invalid value was supplied while building an action or coordinator.
    ///
    /// Examples include a negative retry delay, an empty RPC batch, duplicate
    /// batch ids, a duplicate coordinator alias or a blocking call made from
    /// inside an async runtime.
    #[error("Invalid configuration for '{target}': {reason}")]
    Configuration {
        /// The service name or alias the setting belongs to.
        target: String,
        reason: String,
    },

    /// The service name could not be resolved.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// The transport could not complete the exchange.
    ///
    /// This covers refused connections, DNS and TLS failures as well as
    /// timeouts; [`CallFailure::timed_out`] tells the latter apart.
    #[error("{0}")]
    Connect(Box<CallFailure>),

    /// The server answered with a 4xx status (or any other non-2xx status
    /// outside the 5xx range).
    #[error("{0}")]
    HttpClient(Box<CallFailure>),

    /// The server answered with a 5xx status.
    #[error("{0}")]
    HttpServer(Box<CallFailure>),

    /// The server answered 2xx but the JSON-RPC payload reported errors.
    ///
    /// The decoded outcomes are available through
    /// [`rpc_errors`](ActionError::rpc_errors) and
    /// [`rpc_successes`](ActionError::rpc_successes). Never retried.
    #[error("{0}")]
    RpcProtocol(Box<CallFailure>),
}

/// Snapshot of a failed call.
#[derive(Debug, Clone)]
pub struct CallFailure {
    /// Human-readable description, prefixed with `"{alias}-"` when the action
    /// ran under a coordinator alias.
    pub message: String,
    pub alias: Option<String>,
    /// The last response received, if the server answered at all.
    pub response: Option<ActionResponse>,
    /// The last request sent.
    pub request: Option<RequestSettings>,
    pub action: ActionSnapshot,
    pub timed_out: bool,
    pub rpc_outcomes: Option<RpcOutcomes>,
}

impl fmt::Display for CallFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// The state of the owning action at the moment it failed.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionSnapshot {
    pub service_name: String,
    pub method: Method,
    pub base_url: String,
    pub path: String,
    pub attempts: u32,
}

impl ActionError {
    pub(crate) fn configuration(target: impl Into<String>, reason: impl Into<String>) -> Self {
        ActionError::Configuration {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// The call snapshot, for errors that happened during a call.
    pub fn failure(&self) -> Option<&CallFailure> {
        match self {
            ActionError::Connect(f)
            | ActionError::HttpClient(f)
            | ActionError::HttpServer(f)
            | ActionError::RpcProtocol(f) => Some(f),
            ActionError::Configuration { .. } | ActionError::Discovery(_) => None,
        }
    }

    pub fn is_connect_error(&self) -> bool {
        matches!(self, ActionError::Connect(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ActionError::Connect(f) if f.timed_out)
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, ActionError::HttpClient(_))
    }

    pub fn is_server_error(&self) -> bool {
        matches!(self, ActionError::HttpServer(_))
    }

    pub fn is_rpc_error(&self) -> bool {
        matches!(self, ActionError::RpcProtocol(_))
    }

    pub fn is_configuration_error(&self) -> bool {
        matches!(self, ActionError::Configuration { .. })
    }

    pub fn is_discovery_error(&self) -> bool {
        matches!(self, ActionError::Discovery(_))
    }

    pub fn response(&self) -> Option<&ActionResponse> {
        self.failure()?.response.as_ref()
    }

    pub fn request(&self) -> Option<&RequestSettings> {
        self.failure()?.request.as_ref()
    }

    pub fn action(&self) -> Option<&ActionSnapshot> {
        self.failure().map(|f| &f.action)
    }

    pub fn alias(&self) -> Option<&str> {
        self.failure()?.alias.as_deref()
    }

    pub fn status_code(&self) -> Option<StatusCode> {
        self.response().map(ActionResponse::status)
    }

    /// Error sub-responses of a JSON-RPC call, in response order.
    pub fn rpc_errors(&self) -> Option<&[RpcErrorResponse]> {
        let outcomes = self.failure()?.rpc_outcomes.as_ref()?;
        (!outcomes.error.is_empty()).then_some(outcomes.error.as_slice())
    }

    /// Successful sub-responses of a partially failed batch. `None` when every
    /// entry failed.
    pub fn rpc_successes(&self) -> Option<&[RpcResultResponse]> {
        let outcomes = self.failure()?.rpc_outcomes.as_ref()?;
        (!outcomes.success.is_empty()).then_some(outcomes.success.as_slice())
    }

    fn first_rpc_error(&self) -> Option<&RpcErrorResponse> {
        self.rpc_errors()?.first()
    }

    pub fn rpc_error_code(&self) -> Option<i64> {
        self.first_rpc_error().map(|e| e.code)
    }

    pub fn rpc_error_message(&self) -> Option<&str> {
        self.first_rpc_error().map(|e| e.message.as_str())
    }

    pub fn rpc_error_data(&self) -> Option<&Value> {
        self.first_rpc_error()?.data.as_ref()
    }

    pub fn rpc_error_id(&self) -> Option<&str> {
        self.first_rpc_error()?.id.as_deref()
    }
}

//! Calls to remote services by logical name.
//!
//! A [`ServiceContext`] holds the [`ServiceRegistry`](registry::ServiceRegistry)
//! that maps service names to endpoints (statically registered or found by a
//! discovery backend), the global filters and the HTTP transport. Calls are
//! described by [`Action`]s, which carry their own retry and timeout policy,
//! optional JSON-RPC payload and done/fail hooks. [`ConcurrentActions`] sends
//! a named set of actions at once and waits for all of them.

pub mod action;
pub mod concurrent;
pub mod config;
pub mod context;
pub mod discovery;
pub mod error;
pub mod filter;
pub mod log;
pub mod registry;
pub mod rpc;
pub mod transport;

pub use crate::action::{Action, ActionStatus, DoneHandler, FailHandler, RequestSettings, ServiceTemplate};
pub use crate::concurrent::ConcurrentActions;
pub use crate::config::{ActionDefaults, ClientConfig};
pub use crate::context::ServiceContext;
pub use crate::error::{ActionError, ActionSnapshot, CallFailure};
pub use crate::filter::{ActionFilter, GlobalFilters};
pub use crate::registry::{DiscoveryError, ServiceRegistry, ServiceSettings, StaticService};
pub use crate::rpc::RpcQuery;

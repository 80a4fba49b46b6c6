//! A single call against a named service.
//!
//! An [`Action`] is resolved against the registry when it is built, then
//! configured (options, retry policy, JSON-RPC payload, filters and hooks) and
//! finally executed. Execution runs the before-filters, sends the request
//! under the retry policy, verifies the response and then either runs the
//! after-filters and the done hook or hands the failure to the fail hook.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use reqwest::Method;
//! use service_action::{Action, ServiceContext};
//!
//! # async fn example() -> Result<(), service_action::ActionError> {
//! let context = ServiceContext::new();
//! context.registry().register_static("users", "localhost", 8080, false)?;
//!
//! let mut action = Action::new(&context, "users", Method::GET, "/api/v1/user")?;
//! action
//!     .set_retry(2, 0.1)?
//!     .done_handler(Arc::new(|response, action| {
//!         action.set_meaning_data(response.json().ok());
//!     }));
//!
//! action.execute().await?;
//! println!("{:?}", action.meaning_data());
//! # Ok(())
//! # }
//! ```

mod request;
mod template;

use std::{fmt, sync::Arc};

use log::{debug, warn};
use reqwest::Method;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::{
    ServiceContext,
    error::{ActionError, ActionSnapshot, CallFailure},
    filter::{ActionFilter, push_unique},
    rpc::{self, RpcOutcomes, RpcQuery, RpcRequest, RpcResultResponse},
    transport::{ActionResponse, RequestOptions, TransportError, is_valid_seconds},
};

pub use request::RequestSettings;
pub use template::ServiceTemplate;

pub type DoneHandler = Arc<dyn Fn(&ActionResponse, &mut Action) + Send + Sync>;
pub type FailHandler = Arc<dyn Fn(&ActionError, &mut Action) + Send + Sync>;

/// Where an action stands after (or before) execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActionStatus {
    #[default]
    Pending,
    Success,
    /// The call failed and the fail hook consumed the error.
    HandledFailure,
    /// The call failed without a fail hook; the error was returned.
    UnhandledFailure,
}

#[derive(Debug, Clone)]
struct RpcPayload {
    requests: Vec<RpcRequest>,
    body: String,
}

pub struct Action {
    context: Arc<ServiceContext>,
    service_name: String,
    base_url: String,
    method: Method,
    path: String,
    options: RequestOptions,
    retry: u32,
    retry_delay: f64,
    timeout: f64,
    before_filters: Vec<Arc<dyn ActionFilter>>,
    after_filters: Vec<Arc<dyn ActionFilter>>,
    rpc: Option<RpcPayload>,
    done_handler: Option<DoneHandler>,
    fail_handler: Option<FailHandler>,
    attempts: u32,
    response: Option<ActionResponse>,
    request: Option<RequestSettings>,
    status: ActionStatus,
    meaning_data: Option<Value>,
    rpc_outcomes: Option<RpcOutcomes>,
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("service_name", &self.service_name)
            .field("base_url", &self.base_url)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("retry", &self.retry)
            .field("retry_delay", &self.retry_delay)
            .field("timeout", &self.timeout)
            .field("is_rpc", &self.rpc.is_some())
            .field("attempts", &self.attempts)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl Action {
    /// Builds an action for `service`, which may be a registered name or an
    /// absolute `http(s)` URL.
    ///
    /// Fails with [`ActionError::Discovery`] when the name cannot be resolved.
    pub fn new(
        context: &Arc<ServiceContext>,
        service: &str,
        method: Method,
        path: impl Into<String>,
    ) -> Result<Self, ActionError> {
        let settings = context.registry().resolve(service)?;
        let defaults = context.defaults();

        Ok(Self {
            context: context.clone(),
            service_name: service.to_string(),
            base_url: settings.base_url(),
            method,
            path: path.into(),
            options: RequestOptions::new(),
            retry: defaults.retry,
            retry_delay: defaults.retry_delay,
            timeout: defaults.timeout,
            before_filters: Vec::new(),
            after_filters: Vec::new(),
            rpc: None,
            done_handler: None,
            fail_handler: None,
            attempts: 0,
            response: None,
            request: None,
            status: ActionStatus::Pending,
            meaning_data: None,
            rpc_outcomes: None,
        })
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn url(&self) -> String {
        request::join_url(&self.base_url, &self.path)
    }

    /// Runs the call to completion under the configured retry policy.
    ///
    /// Returns `Ok(())` on success and when a fail hook consumed the failure;
    /// check [`status`](Self::status) to tell the two apart.
    pub async fn execute(&mut self) -> Result<(), ActionError> {
        self.run(None).await
    }

    /// Drives [`execute`](Self::execute) on a private current-thread runtime.
    ///
    /// Must not be called from inside an async runtime; doing so returns a
    /// configuration error instead of blocking a worker thread.
    pub fn execute_blocking(&mut self) -> Result<(), ActionError> {
        let runtime = blocking_runtime(&self.service_name)?;
        runtime.block_on(self.run(None))
    }

    /// Runs the action as its own task. Error messages are prefixed with
    /// `alias`. The task hands the action back together with its outcome.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn execute_async(mut self, alias: impl Into<String>) -> JoinHandle<(Action, Result<(), ActionError>)> {
        let alias = alias.into();
        tokio::spawn(async move {
            let result = self.run(Some(&alias)).await;
            (self, result)
        })
    }

    /// Sets the retry count and the delay between attempts in seconds.
    pub fn set_retry(&mut self, max: u32, delay_seconds: f64) -> Result<&mut Self, ActionError> {
        if !delay_seconds.is_finite() || delay_seconds < 0.0 {
            return Err(ActionError::configuration(
                &self.service_name,
                format!("retry delay must be a non-negative number of seconds, got {delay_seconds}"),
            ));
        }
        self.retry = max;
        self.retry_delay = delay_seconds;
        Ok(self)
    }

    pub fn retry_setting(&self) -> (u32, f64) {
        (self.retry, self.retry_delay)
    }

    /// Sets the per-attempt timeout in seconds. `0.0` disables it.
    ///
    /// This always wins over a `timeout` entry in the options.
    pub fn set_timeout(&mut self, seconds: f64) -> Result<&mut Self, ActionError> {
        if !is_valid_seconds(seconds) {
            return Err(ActionError::configuration(
                &self.service_name,
                format!("timeout must be a non-negative number of seconds within range, got {seconds}"),
            ));
        }
        self.timeout = seconds;
        Ok(self)
    }

    pub fn timeout(&self) -> f64 {
        self.timeout
    }

    pub fn set_options(&mut self, options: RequestOptions) -> &mut Self {
        self.options = options;
        self
    }

    pub fn add_option(&mut self, key: &str, value: Value) -> Result<&mut Self, ActionError> {
        self.options
            .set(key, value)
            .map_err(|e| ActionError::configuration(&self.service_name, e.to_string()))?;
        Ok(self)
    }

    pub fn remove_option(&mut self, key: &str) -> Option<Value> {
        self.options.remove(key)
    }

    pub fn option(&self, key: &str) -> Option<Value> {
        self.options.get(key)
    }

    pub fn options(&self) -> &RequestOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut RequestOptions {
        &mut self.options
    }

    /// Turns the action into a single JSON-RPC call and forces `POST`.
    ///
    /// Replaces any payload set earlier. A missing id is filled with a random
    /// UUID.
    pub fn set_rpc_query(
        &mut self,
        method: impl Into<String>,
        params: Vec<Value>,
        id: Option<String>,
    ) -> Result<&mut Self, ActionError> {
        let mut query = RpcQuery::new(method, params);
        query.id = id;
        self.set_batch_rpc_query(vec![query])
    }

    /// Turns the action into a JSON-RPC batch and forces `POST`.
    ///
    /// A one-entry batch is sent as a single request object.
    pub fn set_batch_rpc_query(&mut self, queries: Vec<RpcQuery>) -> Result<&mut Self, ActionError> {
        if queries.is_empty() {
            return Err(ActionError::configuration(
                &self.service_name,
                "a JSON-RPC batch needs at least one query",
            ));
        }
        if queries.len() > 1 {
            let mut seen = std::collections::HashSet::new();
            if let Some(id) = queries
                .iter()
                .filter_map(|q| q.id.as_deref())
                .find(|id| !seen.insert(*id))
            {
                return Err(ActionError::configuration(
                    &self.service_name,
                    format!("duplicate JSON-RPC id '{id}' in batch"),
                ));
            }
        }

        let requests: Vec<RpcRequest> = queries.into_iter().map(RpcQuery::into_request).collect();
        let body = match requests.as_slice() {
            [single] => rpc::encode_query(single),
            batch => rpc::encode_batch(batch),
        }
        .map_err(|e| ActionError::configuration(&self.service_name, format!("JSON-RPC payload: {e}")))?;

        self.method = Method::POST;
        self.rpc = Some(RpcPayload { requests, body });
        Ok(self)
    }

    pub fn is_rpc(&self) -> bool {
        self.rpc.is_some()
    }

    /// The encoded JSON-RPC payload, if any.
    pub fn rpc_request(&self) -> Option<&str> {
        self.rpc.as_ref().map(|p| p.body.as_str())
    }

    /// Ids of the queries in the payload, in send order.
    pub fn rpc_request_ids(&self) -> Option<Vec<&str>> {
        self.rpc
            .as_ref()
            .map(|p| p.requests.iter().map(|r| r.id.as_str()).collect())
    }

    pub fn done_handler(&mut self, handler: DoneHandler) -> &mut Self {
        self.done_handler = Some(handler);
        self
    }

    pub fn fail_handler(&mut self, handler: FailHandler) -> &mut Self {
        self.fail_handler = Some(handler);
        self
    }

    pub fn add_before_filter(&mut self, filter: Arc<dyn ActionFilter>) -> &mut Self {
        push_unique(&mut self.before_filters, filter);
        self
    }

    pub fn add_after_filter(&mut self, filter: Arc<dyn ActionFilter>) -> &mut Self {
        push_unique(&mut self.after_filters, filter);
        self
    }

    /// Registers `filter` on both sides of the call.
    pub fn set_filter(&mut self, filter: Arc<dyn ActionFilter>) -> &mut Self {
        push_unique(&mut self.before_filters, filter.clone());
        push_unique(&mut self.after_filters, filter);
        self
    }

    pub fn set_meaning_data(&mut self, data: Option<Value>) -> &mut Self {
        self.meaning_data = data;
        self
    }

    pub fn meaning_data(&self) -> Option<&Value> {
        self.meaning_data.as_ref()
    }

    pub fn take_meaning_data(&mut self) -> Option<Value> {
        self.meaning_data.take()
    }

    pub fn is_success(&self) -> bool {
        self.status == ActionStatus::Success
    }

    /// Overrides the verified outcome, e.g. for endpoints that report
    /// failures inside a 200 body. `false` marks the action as a handled
    /// failure.
    pub fn set_success(&mut self, success: bool) -> &mut Self {
        self.status = if success {
            ActionStatus::Success
        } else {
            ActionStatus::HandledFailure
        };
        self
    }

    pub fn status(&self) -> ActionStatus {
        self.status
    }

    pub fn number_of_attempts(&self) -> u32 {
        self.attempts
    }

    /// The last response received, including non-2xx responses.
    pub fn response(&self) -> Option<&ActionResponse> {
        self.response.as_ref()
    }

    pub fn request_settings(&self) -> Option<&RequestSettings> {
        self.request.as_ref()
    }

    pub fn rpc_outcomes(&self) -> Option<&RpcOutcomes> {
        self.rpc_outcomes.as_ref()
    }

    /// Successful JSON-RPC sub-responses. `None` when there were none.
    pub fn rpc_responses(&self) -> Option<&[RpcResultResponse]> {
        let outcomes = self.rpc_outcomes.as_ref()?;
        (!outcomes.success.is_empty()).then_some(outcomes.success.as_slice())
    }

    pub fn rpc_results(&self) -> Option<Vec<&Value>> {
        self.rpc_responses()
            .map(|responses| responses.iter().map(|r| &r.value).collect())
    }

    pub fn rpc_ids(&self) -> Option<Vec<Option<&str>>> {
        self.rpc_responses()
            .map(|responses| responses.iter().map(|r| r.id.as_deref()).collect())
    }

    pub fn rpc_result_by_id(&self, id: &str) -> Option<&Value> {
        self.rpc_outcomes.as_ref()?.result_by_id(id)
    }

    fn reset_state(&mut self) {
        self.attempts = 0;
        self.response = None;
        self.request = None;
        self.status = ActionStatus::Pending;
        self.rpc_outcomes = None;
    }

    pub(crate) async fn run(&mut self, alias: Option<&str>) -> Result<(), ActionError> {
        self.reset_state();

        for filter in self.context.filters().before_filters() {
            filter.before_call(self);
        }
        for filter in self.before_filters.clone() {
            filter.before_call(self);
        }

        let transport = self.context.transport().clone();
        let url = self.url();

        let outcome = loop {
            self.attempts += 1;
            let options = self.final_options();
            self.request = Some(RequestSettings {
                method: self.method.clone(),
                url: url.clone(),
                path: self.path.clone(),
                options: options.clone(),
            });
            debug!(
                service = self.service_name,
                method:% = self.method,
                url = url,
                attempt = self.attempts;
                "Sending request"
            );

            match transport.send(self.method.clone(), &url, &options).await {
                Ok(response) => break self.verify_response(response, alias),
                Err(err) if err.is_retryable() && self.attempts <= self.retry => {
                    warn!(
                        service = self.service_name,
                        attempt = self.attempts,
                        retry = self.retry,
                        error:% = err;
                        "Request failed, retrying"
                    );
                },
                Err(err) => break Err(self.transport_failure(err, alias)),
            }
        };

        match outcome {
            Ok(()) => {
                self.status = ActionStatus::Success;
                for filter in self.context.filters().after_filters() {
                    filter.after_call(self);
                }
                for filter in self.after_filters.clone() {
                    filter.after_call(self);
                }
                if let (Some(handler), Some(response)) = (self.done_handler.clone(), self.response.clone()) {
                    handler(&response, self);
                }
                Ok(())
            },
            Err(err) => match self.fail_handler.clone() {
                Some(handler) => {
                    self.status = ActionStatus::HandledFailure;
                    debug!(service = self.service_name, attempt = self.attempts, error:% = err; "Call failed, passing to fail handler");
                    handler(&err, self);
                    Ok(())
                },
                None => {
                    self.status = ActionStatus::UnhandledFailure;
                    warn!(service = self.service_name, attempt = self.attempts, error:% = err; "Call failed");
                    Err(err)
                },
            },
        }
    }

    fn final_options(&self) -> RequestOptions {
        let mut options = self.options.clone();
        options.timeout = Some(self.timeout);
        if self.attempts > 1 {
            options.delay = Some((self.retry_delay * 1000.0).round() as u64);
        }
        if let Some(rpc) = &self.rpc {
            options.body = Some(rpc.body.clone());
            if !options.has_header("Content-Type") {
                options.insert_header("Content-Type", "application/json");
            }
        }
        options
    }

    fn verify_response(&mut self, response: ActionResponse, alias: Option<&str>) -> Result<(), ActionError> {
        let decoded = self.rpc.as_ref().map(|_| rpc::decode(response.body()));
        self.response = Some(response);
        let Some(decoded) = decoded else {
            return Ok(());
        };

        match decoded {
            Ok(entries) => {
                let outcomes = RpcOutcomes::partition(entries);
                let failed = outcomes.has_errors();
                self.rpc_outcomes = Some(outcomes);
                if failed {
                    let message = self.describe("received JSON-RPC error responses", alias);
                    return Err(ActionError::RpcProtocol(self.failure(message, alias, false)));
                }
                Ok(())
            },
            Err(e) => {
                self.rpc_outcomes = Some(RpcOutcomes::default());
                let message = self.describe(&format!("received an invalid JSON-RPC response ({e})"), alias);
                Err(ActionError::RpcProtocol(self.failure(message, alias, false)))
            },
        }
    }

    fn transport_failure(&mut self, err: TransportError, alias: Option<&str>) -> ActionError {
        match err {
            TransportError::Status(response) => {
                let status = response.status();
                self.response = Some(response);
                let message = self.describe(&format!("failed with HTTP {status}"), alias);
                let failure = self.failure(message, alias, false);
                if status.is_server_error() {
                    ActionError::HttpServer(failure)
                } else {
                    ActionError::HttpClient(failure)
                }
            },
            TransportError::Timeout(reason) => {
                let message = self.describe(&format!("timed out ({reason})"), alias);
                ActionError::Connect(self.failure(message, alias, true))
            },
            TransportError::Connect(reason) => {
                let message = self.describe(&format!("could not connect ({reason})"), alias);
                ActionError::Connect(self.failure(message, alias, false))
            },
            TransportError::InvalidRequest(reason) => ActionError::configuration(
                alias.unwrap_or(self.service_name.as_str()),
                format!("request to {} could not be built: {reason}", self.url()),
            ),
        }
    }

    fn describe(&self, what: &str, alias: Option<&str>) -> String {
        let message = format!(
            "Action {} calling {} {} at {} {what}",
            self.service_name, self.method, self.path, self.base_url
        );
        match alias {
            Some(alias) => format!("{alias}-{message}"),
            None => message,
        }
    }

    fn failure(&self, message: String, alias: Option<&str>, timed_out: bool) -> Box<CallFailure> {
        Box::new(CallFailure {
            message,
            alias: alias.map(str::to_string),
            response: self.response.clone(),
            request: self.request.clone(),
            action: ActionSnapshot {
                service_name: self.service_name.clone(),
                method: self.method.clone(),
                base_url: self.base_url.clone(),
                path: self.path.clone(),
                attempts: self.attempts,
            },
            timed_out,
            rpc_outcomes: self.rpc_outcomes.clone(),
        })
    }
}

pub(crate) fn blocking_runtime(target: &str) -> Result<tokio::runtime::Runtime, ActionError> {
    if tokio::runtime::Handle::try_current().is_ok() {
        return Err(ActionError::configuration(
            target,
            "blocking execution is not allowed inside an async runtime; await the async API instead",
        ));
    }
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| ActionError::configuration(target, format!("could not start a runtime: {e}")))
}

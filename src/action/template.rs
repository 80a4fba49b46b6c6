use std::sync::Arc;

use reqwest::Method;

use super::Action;
use crate::{
    ActionError, ActionFilter, ServiceContext,
    transport::{RequestOptions, is_valid_seconds},
};

/// Shared defaults for every action against one service.
///
/// ```rust,no_run
/// use reqwest::Method;
/// use service_action::{ServiceContext, ServiceTemplate};
///
/// # fn example() -> Result<(), service_action::ActionError> {
/// let context = ServiceContext::new();
/// context.registry().register_static("orders", "localhost", 8081, false)?;
///
/// let orders = ServiceTemplate::new("orders").with_retry(1, 0.5)?.with_timeout(5.0)?;
/// let action = orders.action(&context, Method::GET, "/api/v1/order")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ServiceTemplate {
    service_name: String,
    retry: Option<(u32, f64)>,
    timeout: Option<f64>,
    options: RequestOptions,
    before_filters: Vec<Arc<dyn ActionFilter>>,
    after_filters: Vec<Arc<dyn ActionFilter>>,
}

impl std::fmt::Debug for ServiceTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceTemplate")
            .field("service_name", &self.service_name)
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ServiceTemplate {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            retry: None,
            timeout: None,
            options: RequestOptions::new(),
            before_filters: Vec::new(),
            after_filters: Vec::new(),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn with_retry(mut self, max: u32, delay_seconds: f64) -> Result<Self, ActionError> {
        if !delay_seconds.is_finite() || delay_seconds < 0.0 {
            return Err(ActionError::configuration(
                &self.service_name,
                format!("retry delay must be a non-negative number of seconds, got {delay_seconds}"),
            ));
        }
        self.retry = Some((max, delay_seconds));
        Ok(self)
    }

    pub fn with_timeout(mut self, seconds: f64) -> Result<Self, ActionError> {
        if !is_valid_seconds(seconds) {
            return Err(ActionError::configuration(
                &self.service_name,
                format!("timeout must be a non-negative number of seconds within range, got {seconds}"),
            ));
        }
        self.timeout = Some(seconds);
        Ok(self)
    }

    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_before_filter(mut self, filter: Arc<dyn ActionFilter>) -> Self {
        crate::filter::push_unique(&mut self.before_filters, filter);
        self
    }

    pub fn with_after_filter(mut self, filter: Arc<dyn ActionFilter>) -> Self {
        crate::filter::push_unique(&mut self.after_filters, filter);
        self
    }

    /// Builds a new action carrying this template's defaults.
    pub fn action(
        &self,
        context: &Arc<ServiceContext>,
        method: Method,
        path: impl Into<String>,
    ) -> Result<Action, ActionError> {
        let mut action = Action::new(context, &self.service_name, method, path)?;
        if let Some((max, delay)) = self.retry {
            action.set_retry(max, delay)?;
        }
        if let Some(timeout) = self.timeout {
            action.set_timeout(timeout)?;
        }
        action.set_options(self.options.clone());
        for filter in &self.before_filters {
            action.add_before_filter(filter.clone());
        }
        for filter in &self.after_filters {
            action.add_after_filter(filter.clone());
        }
        Ok(action)
    }
}

//! Fan-out/fan-in execution of named actions.

use std::collections::HashMap;

use log::{debug, error, warn};
use serde_json::Value;
use tokio::task::JoinSet;

use crate::{Action, ActionError, action::blocking_runtime};

/// A set of actions keyed by alias, sent concurrently and awaited as a unit.
///
/// Every action runs to completion even when a sibling fails; the first
/// unhandled error (in completion order) is returned once all have settled.
/// Actions are handed back to the set afterwards, so their meaning data and
/// responses stay readable.
///
/// ```rust,no_run
/// use reqwest::Method;
/// use service_action::{ConcurrentActions, ServiceContext};
///
/// # async fn example() -> Result<(), service_action::ActionError> {
/// let context = ServiceContext::new();
/// context.registry().register_static("users", "localhost", 8080, false)?;
///
/// let mut actions = ConcurrentActions::new();
/// actions.add_action("user", context.action("users", Method::GET, "/api/v1/user/1")?)?;
/// actions.add_action("orders", context.action("users", Method::GET, "/api/v1/user/1/orders")?)?;
/// actions.send().await?;
///
/// for (alias, data) in actions.actions_meaning_data() {
///     println!("{alias}: {data:?}");
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ConcurrentActions {
    actions: HashMap<String, Action>,
}

impl ConcurrentActions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole set.
    pub fn set_actions(&mut self, actions: impl IntoIterator<Item = (String, Action)>) -> Result<&mut Self, ActionError> {
        let mut set = HashMap::new();
        for (alias, action) in actions {
            if set.contains_key(&alias) {
                return Err(duplicate_alias(alias));
            }
            set.insert(alias, action);
        }
        self.actions = set;
        Ok(self)
    }

    pub fn add_action(&mut self, alias: impl Into<String>, action: Action) -> Result<&mut Self, ActionError> {
        let alias = alias.into();
        if self.actions.contains_key(&alias) {
            return Err(duplicate_alias(alias));
        }
        self.actions.insert(alias, action);
        Ok(self)
    }

    pub fn action(&self, alias: &str) -> Option<&Action> {
        self.actions.get(alias)
    }

    pub fn action_mut(&mut self, alias: &str) -> Option<&mut Action> {
        self.actions.get_mut(alias)
    }

    pub fn actions(&self) -> &HashMap<String, Action> {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Sends every action concurrently and waits for all of them.
    ///
    /// A panic inside one action (usually a hook) is re-raised only after the
    /// other actions have settled and been put back.
    pub async fn send(&mut self) -> Result<(), ActionError> {
        let mut tasks = JoinSet::new();
        for (alias, action) in self.actions.drain() {
            debug!(alias = alias, service = action.service_name(); "Launching action");
            tasks.spawn(async move {
                let mut action = action;
                let result = action.run(Some(&alias)).await;
                (alias, action, result)
            });
        }

        let mut first_error = None;
        let mut first_panic = None;
        while let Some(joined) = tasks.join_next().await {
            let (alias, action, result) = match joined {
                Ok(settled) => settled,
                Err(e) if e.is_panic() => {
                    error!(error:% = e; "Action task panicked, waiting for the others");
                    if first_panic.is_none() {
                        first_panic = Some(e.into_panic());
                    }
                    continue;
                },
                Err(e) => {
                    warn!(error:% = e; "Action task was cancelled");
                    continue;
                },
            };
            if let Err(err) = result {
                warn!(alias = alias, error:% = err; "Action failed");
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
            self.actions.insert(alias, action);
        }

        // The panicking action is gone; every other one has settled and is back in the map.
        if let Some(payload) = first_panic {
            std::panic::resume_unwind(payload);
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Drives [`send`](Self::send) on a private runtime. Not allowed inside an
    /// async runtime.
    pub fn send_blocking(&mut self) -> Result<(), ActionError> {
        let runtime = blocking_runtime("concurrent actions")?;
        runtime.block_on(self.send())
    }

    /// Meaning data of every action, keyed by alias.
    pub fn actions_meaning_data(&self) -> HashMap<String, Option<Value>> {
        self.actions
            .iter()
            .map(|(alias, action)| (alias.clone(), action.meaning_data().cloned()))
            .collect()
    }
}

fn duplicate_alias(alias: String) -> ActionError {
    ActionError::Configuration {
        reason: format!("alias '{alias}' is already registered"),
        target: alias,
    }
}

#[cfg(test)]
mod tests {
    use reqwest::Method;

    use super::*;
    use crate::ServiceContext;

    #[test]
    fn duplicate_aliases_are_rejected() {
        let context = ServiceContext::new();
        context.registry().register_static("users", "localhost", 8080, false).unwrap();
        let action = || context.action("users", Method::GET, "/").unwrap();

        let mut actions = ConcurrentActions::new();
        actions.add_action("a", action()).unwrap();
        let err = actions.add_action("a", action()).unwrap_err();
        assert!(err.is_configuration_error());

        let err = ConcurrentActions::new()
            .set_actions(vec![("x".to_string(), action()), ("x".to_string(), action())])
            .unwrap_err();
        assert!(err.is_configuration_error());
        assert_eq!(actions.len(), 1);
        assert!(actions.action("a").is_some());
        assert!(actions.action("b").is_none());
    }
}

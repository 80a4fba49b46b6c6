//! Before/after hooks around an action's call.
//!
//! Global filters live on the [`ServiceContext`](crate::ServiceContext) and run
//! ahead of the filters attached to an individual action. Within each list
//! filters run in registration order, and a second filter of the same type is
//! ignored.

use std::{any::TypeId, sync::Arc};

use parking_lot::RwLock;

use crate::Action;

/// A hook run before an action is sent and after it succeeds.
///
/// `after_call` only runs once the response has been verified, right before
/// the done hook.
///
/// ```rust
/// use service_action::{Action, ActionFilter};
///
/// struct UserKey(&'static str);
///
/// impl ActionFilter for UserKey {
///     fn before_call(&self, action: &mut Action) {
///         action.options_mut().insert_header("X-User-Key", self.0);
///     }
/// }
/// ```
pub trait ActionFilter: Send + Sync + 'static {
    fn before_call(&self, _action: &mut Action) {}

    fn after_call(&self, _action: &mut Action) {}

    /// Identity used to drop duplicate registrations.
    fn filter_id(&self) -> TypeId {
        TypeId::of::<Self>()
    }
}

pub(crate) fn push_unique(filters: &mut Vec<Arc<dyn ActionFilter>>, filter: Arc<dyn ActionFilter>) -> bool {
    let id = filter.filter_id();
    if filters.iter().any(|f| f.filter_id() == id) {
        return false;
    }
    filters.push(filter);
    true
}

/// Filters applied to every action created from one context.
#[derive(Default)]
pub struct GlobalFilters {
    before: RwLock<Vec<Arc<dyn ActionFilter>>>,
    after: RwLock<Vec<Arc<dyn ActionFilter>>>,
}

impl std::fmt::Debug for GlobalFilters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalFilters")
            .field("before", &self.before.read().len())
            .field("after", &self.after.read().len())
            .finish()
    }
}

impl GlobalFilters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `filter` as both a before and an after filter.
    pub fn set_global_filter(&self, filter: Arc<dyn ActionFilter>) {
        self.set_global_before_filter(filter.clone());
        self.set_global_after_filter(filter);
    }

    pub fn set_global_before_filter(&self, filter: Arc<dyn ActionFilter>) -> bool {
        push_unique(&mut self.before.write(), filter)
    }

    pub fn set_global_after_filter(&self, filter: Arc<dyn ActionFilter>) -> bool {
        push_unique(&mut self.after.write(), filter)
    }

    pub fn before_filters(&self) -> Vec<Arc<dyn ActionFilter>> {
        self.before.read().clone()
    }

    pub fn after_filters(&self) -> Vec<Arc<dyn ActionFilter>> {
        self.after.read().clone()
    }

    pub fn reset(&self) {
        self.before.write().clear();
        self.after.write().clear();
    }
}

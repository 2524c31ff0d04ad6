//! Ordered registry of sync actions
//!
//! Built explicitly at startup; immutable during a pass. Actions run in
//! ascending execution order, ties broken by registration order.

use crate::action::SyncAction;
use std::sync::Arc;

#[derive(Default)]
pub struct SyncActionRegistry {
    actions: Vec<Arc<SyncAction>>,
}

impl SyncActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, action: SyncAction) -> &mut Self {
        self.actions.push(Arc::new(action));
        self
    }

    /// Actions in execution order for one sync pass.
    pub fn iter_ordered(&self) -> Vec<Arc<SyncAction>> {
        let mut ordered = self.actions.clone();
        ordered.sort_by_key(|action| action.execution_order);
        ordered
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{EXECUTION_ORDER_END, EXECUTION_ORDER_FIRST, EXECUTION_ORDER_MIDDLE};
    use pod_common::DocRef;

    fn action(id: &str, order: i32) -> SyncAction {
        SyncAction::new(id, DocRef::new("a", "b"), DocRef::new("a", "b"), order)
    }

    #[test]
    fn iter_ordered_sorts_by_execution_order() {
        let mut registry = SyncActionRegistry::new();
        registry
            .register(action("last", EXECUTION_ORDER_END))
            .register(action("first", EXECUTION_ORDER_FIRST))
            .register(action("middle", EXECUTION_ORDER_MIDDLE));

        let ids: Vec<_> = registry
            .iter_ordered()
            .iter()
            .map(|a| a.id.clone())
            .collect();
        assert_eq!(ids, vec!["first", "middle", "last"]);
    }

    #[test]
    fn ties_keep_registration_order() {
        let mut registry = SyncActionRegistry::new();
        registry
            .register(action("a", EXECUTION_ORDER_MIDDLE))
            .register(action("b", EXECUTION_ORDER_MIDDLE));

        let ids: Vec<_> = registry
            .iter_ordered()
            .iter()
            .map(|a| a.id.clone())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}

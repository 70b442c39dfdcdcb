use std::sync::Arc;

use crate::database::models::{EntityId, UserId};
use crate::database::store::{StoreResult, WorkflowStore};

/// Role checks against manager assignments and floor occupancy.
///
/// Storage failures are returned as errors and never read as "not authorized".
#[derive(Clone)]
pub struct AuthorizationGuard {
    store: Arc<dyn WorkflowStore>,
}

impl AuthorizationGuard {
    pub fn new(store: Arc<dyn WorkflowStore>) -> Self {
        Self { store }
    }

    pub async fn is_manager(&self, user: UserId, property_id: EntityId) -> StoreResult<bool> {
        self.store.is_manager(user, property_id).await
    }

    pub async fn is_tenant(&self, user: UserId, property_id: EntityId, floor_id: EntityId) -> StoreResult<bool> {
        self.store.is_tenant(user, property_id, floor_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::store::InMemoryStore;

    #[tokio::test]
    async fn answers_role_questions_from_the_store() {
        let store = InMemoryStore::new();
        store.add_property(100, "Rose Villa", 1).await;
        store.add_property(101, "Lake View", 9).await;
        store.add_floor(200, 100, "2F", 12000).await;
        store.set_tenant(200, Some(2)).await;

        let guard = AuthorizationGuard::new(Arc::new(store));
        assert!(guard.is_manager(1, 100).await.unwrap());
        assert!(!guard.is_manager(1, 101).await.unwrap());
        assert!(!guard.is_manager(2, 100).await.unwrap());

        assert!(guard.is_tenant(2, 100, 200).await.unwrap());
        assert!(!guard.is_tenant(2, 101, 200).await.unwrap());
        assert!(!guard.is_tenant(1, 100, 200).await.unwrap());
    }
}

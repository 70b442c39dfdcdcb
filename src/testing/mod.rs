use std::sync::Arc;

use crate::database::models::{EntityId, NotificationKind, UserId};
use crate::database::store::InMemoryStore;
use crate::services::ids::SequentialIdGenerator;
use crate::services::workflow::WorkflowEngine;

pub const MANAGER: UserId = 1;
pub const TENANT: UserId = 2;
pub const OTHER: UserId = 3;
pub const OUTSIDER_MANAGER: UserId = 4;

pub const MANAGER_PHONE: &str = "01700000001";
pub const TENANT_PHONE: &str = "01700000002";
pub const OTHER_PHONE: &str = "01700000003";

pub const PROPERTY: EntityId = 100;
pub const FOREIGN_PROPERTY: EntityId = 101;

pub const FLOOR: EntityId = 200;
pub const SECOND_FLOOR: EntityId = 201;
/// Belongs to `FOREIGN_PROPERTY`.
pub const FOREIGN_FLOOR: EntityId = 300;

/// Seeded in-memory store plus an engine with deterministic ids.
pub struct Fixture {
    pub store: InMemoryStore,
    pub engine: WorkflowEngine,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::build(SequentialIdGenerator::new(1)).await
    }

    pub async fn with_id_ceiling(ceiling: i64) -> Self {
        Self::build(SequentialIdGenerator::with_ceiling(1, ceiling)).await
    }

    async fn build(ids: SequentialIdGenerator) -> Self {
        let store = InMemoryStore::new();
        store.add_user(MANAGER, MANAGER_PHONE, Some("Manager")).await;
        store.add_user(TENANT, TENANT_PHONE, Some("Tenant")).await;
        store.add_user(OTHER, OTHER_PHONE, None).await;
        store.add_user(OUTSIDER_MANAGER, "01700000004", None).await;

        store.add_property(PROPERTY, "Rose Villa", MANAGER).await;
        store.add_floor(FLOOR, PROPERTY, "2F", 12000).await;
        store.add_floor(SECOND_FLOOR, PROPERTY, "3F", 15000).await;

        store.add_property(FOREIGN_PROPERTY, "Lake View", OUTSIDER_MANAGER).await;
        store.add_floor(FOREIGN_FLOOR, FOREIGN_PROPERTY, "1F", 9000).await;

        let engine = WorkflowEngine::new(Arc::new(store.clone()), Arc::new(ids));
        Self { store, engine }
    }

    pub async fn pending_requests_for(&self, floor_id: EntityId) -> usize {
        self.store
            .all_notifications()
            .await
            .iter()
            .filter(|n| n.floor_id == floor_id && n.kind == NotificationKind::TenantRequest && n.is_pending())
            .count()
    }
}

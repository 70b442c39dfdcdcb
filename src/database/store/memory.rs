//! In-memory implementation of the workflow store.
//!
//! Used by tests and by servers started without `DATABASE_URL`. State is lost
//! on restart and is not shared between processes.
//!
//! A transaction owns the state mutex for its whole lifetime and mutates a
//! working copy; commit swaps the copy in, drop discards it. Transactions are
//! therefore fully serialized, which trivially satisfies the row-lock protocol
//! the Postgres backend relies on.
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{NotificationTx, StoreError, StoreResult, TenancyTx, WorkflowStore, WorkflowTx};
use crate::database::models::{
    EntityId, Floor, Notification, NotificationKind, NotificationStatus, NotificationView, OccupiedFloor, User, UserId,
};

#[derive(Debug, Clone)]
struct PropertyRecord {
    name: String,
}

#[derive(Debug, Clone)]
struct FloorRecord {
    property_id: EntityId,
    name: String,
    rent: i64,
    tenant: Option<UserId>,
}

#[derive(Debug, Clone, Default)]
struct State {
    users: HashMap<UserId, User>,
    properties: HashMap<EntityId, PropertyRecord>,
    /// (property, manager) pairs; ordered so "the" manager of a property is deterministic.
    managers: BTreeSet<(EntityId, UserId)>,
    floors: HashMap<EntityId, FloorRecord>,
    /// Insertion order is creation order.
    notifications: Vec<Notification>,
    reminder_cycles: HashSet<String>,
}

impl State {
    fn floor(&self, floor_id: EntityId) -> Option<Floor> {
        let record = self.floors.get(&floor_id)?;
        let property_name = self
            .properties
            .get(&record.property_id)
            .map(|p| p.name.clone())
            .unwrap_or_default();
        Some(Floor {
            id: floor_id,
            property_id: record.property_id,
            name: record.name.clone(),
            property_name,
            rent: record.rent,
            tenant: record.tenant,
        })
    }

    fn manager_of(&self, property_id: EntityId) -> Option<UserId> {
        self.managers
            .range((property_id, UserId::MIN)..=(property_id, UserId::MAX))
            .next()
            .map(|(_, user)| *user)
    }

    fn position(&self, id: EntityId) -> Option<usize> {
        self.notifications.iter().position(|n| n.id == id)
    }

    fn insert(&mut self, notification: &Notification) -> StoreResult<()> {
        if self.position(notification.id).is_some() {
            return Err(StoreError::DuplicateId(notification.id));
        }
        if notification.kind == NotificationKind::TenantRequest
            && notification.is_pending()
            && self.pending_tenant_request(notification.floor_id).is_some()
        {
            return Err(StoreError::PendingRequestExists(notification.floor_id));
        }
        self.notifications.push(notification.clone());
        Ok(())
    }

    fn pending_tenant_request(&self, floor_id: EntityId) -> Option<&Notification> {
        self.notifications
            .iter()
            .find(|n| n.floor_id == floor_id && n.kind == NotificationKind::TenantRequest && n.is_pending())
    }

    /// Newest first; equal timestamps fall back to reverse insertion order.
    fn newest_first<'a>(&'a self, filter: impl Fn(&Notification) -> bool) -> Vec<&'a Notification> {
        let mut found: Vec<&Notification> = self.notifications.iter().rev().filter(|n| filter(n)).collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        found
    }
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, id: UserId, phone_number: &str, name: Option<&str>) {
        let mut state = self.state.lock().await;
        state.users.insert(
            id,
            User {
                id,
                phone_number: phone_number.to_string(),
                name: name.map(str::to_string),
            },
        );
    }

    /// Create a property administered by `manager`.
    pub async fn add_property(&self, id: EntityId, name: &str, manager: UserId) {
        let mut state = self.state.lock().await;
        state.properties.insert(id, PropertyRecord { name: name.to_string() });
        state.managers.insert((id, manager));
    }

    pub async fn add_manager(&self, property_id: EntityId, manager: UserId) {
        self.state.lock().await.managers.insert((property_id, manager));
    }

    pub async fn add_floor(&self, id: EntityId, property_id: EntityId, name: &str, rent: i64) {
        let mut state = self.state.lock().await;
        state.floors.insert(
            id,
            FloorRecord {
                property_id,
                name: name.to_string(),
                rent,
                tenant: None,
            },
        );
    }

    /// Seed occupancy directly, bypassing the workflow.
    pub async fn set_tenant(&self, floor_id: EntityId, tenant: Option<UserId>) {
        if let Some(floor) = self.state.lock().await.floors.get_mut(&floor_id) {
            floor.tenant = tenant;
        }
    }

    pub async fn floor_tenant(&self, floor_id: EntityId) -> Option<UserId> {
        self.state.lock().await.floors.get(&floor_id).and_then(|f| f.tenant)
    }

    /// Every stored notification in creation order.
    pub async fn all_notifications(&self) -> Vec<Notification> {
        self.state.lock().await.notifications.clone()
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<State>,
    working: State,
}

#[async_trait]
impl TenancyTx for MemoryTx {
    async fn lock_floor(&mut self, floor_id: EntityId) -> StoreResult<Option<Floor>> {
        Ok(self.working.floor(floor_id))
    }

    async fn assign_tenant_if_vacant(&mut self, floor_id: EntityId, tenant: UserId, _actor: UserId) -> StoreResult<bool> {
        match self.working.floors.get_mut(&floor_id) {
            Some(floor) if floor.tenant.is_none() => {
                floor.tenant = Some(tenant);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn clear_tenant(&mut self, floor_id: EntityId, _actor: UserId) -> StoreResult<Option<UserId>> {
        Ok(self.working.floors.get_mut(&floor_id).and_then(|f| f.tenant.take()))
    }
}

#[async_trait]
impl NotificationTx for MemoryTx {
    async fn notification(&mut self, id: EntityId) -> StoreResult<Option<Notification>> {
        Ok(self.working.position(id).map(|i| self.working.notifications[i].clone()))
    }

    async fn lock_notification(&mut self, id: EntityId) -> StoreResult<Option<Notification>> {
        self.notification(id).await
    }

    async fn pending_tenant_request(&mut self, floor_id: EntityId) -> StoreResult<Option<Notification>> {
        Ok(self.working.pending_tenant_request(floor_id).cloned())
    }

    async fn insert_notification(&mut self, notification: &Notification) -> StoreResult<()> {
        self.working.insert(notification)
    }

    async fn transition_if_pending(&mut self, id: EntityId, status: NotificationStatus) -> StoreResult<bool> {
        let Some(index) = self.working.position(id) else {
            return Ok(false);
        };
        let notification = &mut self.working.notifications[index];
        if !notification.is_pending() {
            return Ok(false);
        }
        notification.status = Some(status);
        notification.updated_at = chrono::Utc::now();
        Ok(true)
    }

    async fn delete_if_pending(&mut self, id: EntityId) -> StoreResult<bool> {
        match self.working.position(id) {
            Some(index) if self.working.notifications[index].is_pending() => {
                self.working.notifications.remove(index);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl WorkflowTx for MemoryTx {
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

#[async_trait]
impl WorkflowStore for InMemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn WorkflowTx>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx { guard, working }))
    }

    async fn is_manager(&self, user: UserId, property_id: EntityId) -> StoreResult<bool> {
        Ok(self.state.lock().await.managers.contains(&(property_id, user)))
    }

    async fn is_tenant(&self, user: UserId, property_id: EntityId, floor_id: EntityId) -> StoreResult<bool> {
        let state = self.state.lock().await;
        Ok(state
            .floors
            .get(&floor_id)
            .map(|f| f.property_id == property_id && f.tenant == Some(user))
            .unwrap_or(false))
    }

    async fn find_user_by_phone(&self, phone_number: &str) -> StoreResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.values().find(|u| u.phone_number == phone_number).cloned())
    }

    async fn property_manager(&self, property_id: EntityId) -> StoreResult<Option<UserId>> {
        Ok(self.state.lock().await.manager_of(property_id))
    }

    async fn occupied_floors(&self) -> StoreResult<Vec<OccupiedFloor>> {
        let state = self.state.lock().await;
        let mut floors: Vec<OccupiedFloor> = state
            .floors
            .keys()
            .filter_map(|id| state.floor(*id))
            .filter_map(|floor| {
                let tenant = floor.tenant?;
                Some(OccupiedFloor {
                    floor_id: floor.id,
                    property_id: floor.property_id,
                    tenant,
                    manager: state.manager_of(floor.property_id),
                    property_name: floor.property_name,
                    floor_name: floor.name,
                    rent: floor.rent,
                })
            })
            .collect();
        floors.sort_by_key(|f| f.floor_id);
        Ok(floors)
    }

    async fn notifications_for_receiver(&self, receiver: UserId) -> StoreResult<Vec<NotificationView>> {
        let state = self.state.lock().await;
        Ok(state
            .newest_first(|n| n.receiver == receiver)
            .into_iter()
            .map(|n| {
                let (property_name, floor_name) = state
                    .floor(n.floor_id)
                    .map(|f| (f.property_name, f.name))
                    .unwrap_or_default();
                NotificationView::new(n.clone(), property_name, floor_name, receiver)
            })
            .collect())
    }

    async fn pending_payments(&self, floor_id: EntityId, sender: UserId) -> StoreResult<Vec<Notification>> {
        let state = self.state.lock().await;
        Ok(state
            .newest_first(|n| {
                n.floor_id == floor_id
                    && n.sender == sender
                    && n.kind == NotificationKind::PaymentSubmission
                    && n.is_pending()
            })
            .into_iter()
            .cloned()
            .collect())
    }

    async fn insert_notification(&self, notification: &Notification) -> StoreResult<()> {
        self.state.lock().await.insert(notification)
    }

    async fn mark_all_read(&self, receiver: UserId) -> StoreResult<u64> {
        let mut state = self.state.lock().await;
        let mut marked = 0;
        for notification in state.notifications.iter_mut().filter(|n| n.receiver == receiver && !n.is_read) {
            notification.is_read = true;
            marked += 1;
        }
        Ok(marked)
    }

    async fn claim_reminder_cycle(&self, cycle: &str) -> StoreResult<bool> {
        Ok(self.state.lock().await.reminder_cycles.insert(cycle.to_string()))
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

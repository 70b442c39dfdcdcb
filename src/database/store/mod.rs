//! Persistence seam for the tenancy/notification workflow.
//!
//! Reads that need no coordination (authorization checks, listings) go straight
//! through [`WorkflowStore`]. Every multi-step transition opens a
//! [`WorkflowTx`] with [`WorkflowStore::begin`], which combines the tenancy
//! side ([`TenancyTx`]) and the notification side ([`NotificationTx`]) of one
//! atomic unit.
//!
//! A transaction that is dropped without [`WorkflowTx::commit`] is rolled back.
//! Request futures that are cancelled mid-flight therefore leave no partial
//! writes behind.
use async_trait::async_trait;
use thiserror::Error;

use crate::database::models::{EntityId, Floor, Notification, NotificationStatus, NotificationView, OccupiedFloor, User, UserId};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A second pending tenant request for the same floor was rejected by the store itself.
    #[error("a pending tenant request already exists for floor {0}")]
    PendingRequestExists(EntityId),

    #[error("duplicate identifier {0}")]
    DuplicateId(EntityId),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Floor occupancy inside a transaction.
#[async_trait]
pub trait TenancyTx: Send {
    /// Read the floor and hold its row lock until the transaction ends.
    async fn lock_floor(&mut self, floor_id: EntityId) -> StoreResult<Option<Floor>>;

    /// Set the tenant only if the floor is vacant. Returns `false` when it was occupied.
    async fn assign_tenant_if_vacant(&mut self, floor_id: EntityId, tenant: UserId, actor: UserId) -> StoreResult<bool>;

    /// Clear the tenant. Returns the previous tenant, if any.
    async fn clear_tenant(&mut self, floor_id: EntityId, actor: UserId) -> StoreResult<Option<UserId>>;
}

/// Notification rows inside a transaction.
#[async_trait]
pub trait NotificationTx: Send {
    async fn notification(&mut self, id: EntityId) -> StoreResult<Option<Notification>>;

    /// Read the notification and hold its row lock until the transaction ends.
    async fn lock_notification(&mut self, id: EntityId) -> StoreResult<Option<Notification>>;

    async fn pending_tenant_request(&mut self, floor_id: EntityId) -> StoreResult<Option<Notification>>;

    async fn insert_notification(&mut self, notification: &Notification) -> StoreResult<()>;

    /// Move a pending notification to `status`. Returns `false` if it was no longer pending.
    async fn transition_if_pending(&mut self, id: EntityId, status: NotificationStatus) -> StoreResult<bool>;

    /// Delete a notification only while it is still pending. Returns `false` otherwise.
    async fn delete_if_pending(&mut self, id: EntityId) -> StoreResult<bool>;
}

#[async_trait]
pub trait WorkflowTx: TenancyTx + NotificationTx {
    async fn commit(self: Box<Self>) -> StoreResult<()>;
}

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn WorkflowTx>>;

    // Authorization reads
    async fn is_manager(&self, user: UserId, property_id: EntityId) -> StoreResult<bool>;
    async fn is_tenant(&self, user: UserId, property_id: EntityId, floor_id: EntityId) -> StoreResult<bool>;

    // Directory reads
    async fn find_user_by_phone(&self, phone_number: &str) -> StoreResult<Option<User>>;
    async fn property_manager(&self, property_id: EntityId) -> StoreResult<Option<UserId>>;
    async fn occupied_floors(&self) -> StoreResult<Vec<OccupiedFloor>>;

    // Notification reads, newest first
    async fn notifications_for_receiver(&self, receiver: UserId) -> StoreResult<Vec<NotificationView>>;
    async fn pending_payments(&self, floor_id: EntityId, sender: UserId) -> StoreResult<Vec<Notification>>;

    // Single-statement writes
    async fn insert_notification(&self, notification: &Notification) -> StoreResult<()>;
    async fn mark_all_read(&self, receiver: UserId) -> StoreResult<u64>;

    /// Record that the reminder sweep for `cycle` has started. Returns `false` if it was already claimed.
    async fn claim_reminder_cycle(&self, cycle: &str) -> StoreResult<bool>;

    async fn health_check(&self) -> StoreResult<()>;
    fn backend_name(&self) -> &'static str;
}

//! Notification-driven tenancy and payment workflow.
//!
//! Every operation takes the authenticated caller as an explicit argument.
//! The caller's role is checked first, then input is validated, all before any write. Transitions that
//! touch a floor run inside one store transaction that locks the floor row
//! first, so concurrent requests on the same floor are serialized and any
//! failure after the first write rolls the whole unit back.
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::database::models::{
    EntityId, Floor, Notification, NotificationKind, NotificationStatus, NotificationView, UserId,
};
use crate::database::store::{StoreError, WorkflowStore, WorkflowTx};
use crate::services::guard::AuthorizationGuard;
use crate::services::ids::{IdError, IdGenerator};

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("{0}")]
    AuthzDenied(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    Validation(String),

    #[error("identifier generation failed: {0}")]
    Id(#[from] IdError),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Outcome of a resolve: the request in its terminal status and the reply sent to its sender.
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub notification: Notification,
    pub reply: Notification,
}

#[derive(Clone)]
pub struct WorkflowEngine {
    store: Arc<dyn WorkflowStore>,
    guard: AuthorizationGuard,
    ids: Arc<dyn IdGenerator>,
}

impl WorkflowEngine {
    pub fn new(store: Arc<dyn WorkflowStore>, ids: Arc<dyn IdGenerator>) -> Self {
        let guard = AuthorizationGuard::new(store.clone());
        Self { store, guard, ids }
    }

    pub fn store(&self) -> &Arc<dyn WorkflowStore> {
        &self.store
    }

    /// Manager proposes the user registered under `phone_number` as tenant of a floor.
    pub async fn create_tenant_request(
        &self,
        caller: UserId,
        property_id: EntityId,
        floor_id: EntityId,
        phone_number: &str,
    ) -> WorkflowResult<Notification> {
        self.require_manager(caller, property_id).await?;
        let phone_number = validate_phone(phone_number)?;
        let tenant = self
            .store
            .find_user_by_phone(phone_number)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("No user with phone number {}", phone_number)))?;

        let mut tx = self.store.begin().await?;
        let floor = lock_floor_of_property(tx.as_mut(), property_id, floor_id).await?;

        if tx.pending_tenant_request(floor_id).await?.is_some() {
            warn!("Rejected tenant request for floor {}: one is already pending", floor_id);
            return Err(pending_request_conflict(floor_id));
        }

        let notification = Notification::tenant_request(
            self.ids.next_id()?,
            caller,
            tenant.id,
            property_id,
            floor_id,
            format!("Tenant request for {} - {}", floor.property_name, floor.name),
            Utc::now(),
        );
        tx.insert_notification(&notification).await.map_err(|e| match e {
            StoreError::PendingRequestExists(floor_id) => pending_request_conflict(floor_id),
            other => other.into(),
        })?;
        tx.commit().await?;

        info!(
            "Tenant request {} created: manager {} -> user {} for floor {}",
            notification.id, caller, tenant.id, floor_id
        );
        Ok(notification)
    }

    /// Tenant reports a payment for their floor to the property's manager.
    pub async fn create_payment_submission(
        &self,
        caller: UserId,
        property_id: EntityId,
        floor_id: EntityId,
        amount: i64,
    ) -> WorkflowResult<Notification> {
        self.require_tenant(caller, property_id, floor_id).await?;
        if amount <= 0 {
            return Err(WorkflowError::Validation("Amount must be greater than zero".to_string()));
        }
        let manager = self
            .store
            .property_manager(property_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("Property {} has no manager", property_id)))?;

        let notification = Notification::payment_submission(
            self.ids.next_id()?,
            caller,
            manager,
            property_id,
            floor_id,
            amount,
            Utc::now(),
        );
        self.store.insert_notification(&notification).await?;

        info!(
            "Payment submission {} created: tenant {} -> manager {} for floor {}, amount {}",
            notification.id, caller, manager, floor_id, amount
        );
        Ok(notification)
    }

    /// Receiver accepts or rejects a pending request.
    ///
    /// Accepting a tenant request assigns the floor; if the floor is occupied by
    /// then, nothing is written and the request stays pending.
    pub async fn resolve_notification(
        &self,
        caller: UserId,
        notification_id: EntityId,
        accept: bool,
    ) -> WorkflowResult<Resolution> {
        let mut tx = self.store.begin().await?;

        let floor_id = tx
            .notification(notification_id)
            .await?
            .ok_or_else(|| notification_not_found(notification_id))?
            .floor_id;
        let floor = tx
            .lock_floor(floor_id)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("Floor {} not found", floor_id)))?;
        let mut notification = tx
            .lock_notification(notification_id)
            .await?
            .ok_or_else(|| notification_not_found(notification_id))?;

        if notification.receiver != caller {
            warn!("User {} tried to resolve notification {} addressed to someone else", caller, notification_id);
            return Err(WorkflowError::AuthzDenied(
                "Only the receiver can resolve this notification".to_string(),
            ));
        }
        if !notification.kind.is_actionable() || !notification.is_pending() {
            return Err(not_pending(notification_id));
        }

        let status = NotificationStatus::resolution(accept);
        if !tx.transition_if_pending(notification_id, status).await? {
            return Err(not_pending(notification_id));
        }
        notification.status = Some(status);

        if notification.kind == NotificationKind::TenantRequest
            && accept
            && !tx.assign_tenant_if_vacant(floor_id, notification.receiver, caller).await?
        {
            warn!(
                "Tenant request {} could not be accepted: floor {} is already occupied",
                notification_id, floor_id
            );
            return Err(WorkflowError::Conflict(format!("Floor {} is already occupied", floor_id)));
        }

        let now = Utc::now();
        let reply = notification.status_update(self.ids.next_id()?, status, &floor.property_name, &floor.name, now);
        tx.insert_notification(&reply).await?;
        tx.commit().await?;
        notification.updated_at = now;

        info!(
            "Notification {} ({}) {} by user {}; status update {} sent to user {}",
            notification_id, notification.kind, status, caller, reply.id, reply.receiver
        );
        Ok(Resolution { notification, reply })
    }

    /// Sender deletes their own request while it is still pending.
    pub async fn withdraw_notification(&self, caller: UserId, notification_id: EntityId) -> WorkflowResult<()> {
        let mut tx = self.store.begin().await?;

        let floor_id = tx
            .notification(notification_id)
            .await?
            .ok_or_else(|| notification_not_found(notification_id))?
            .floor_id;
        tx.lock_floor(floor_id).await?;
        let notification = tx
            .lock_notification(notification_id)
            .await?
            .ok_or_else(|| notification_not_found(notification_id))?;

        if notification.sender != caller {
            warn!("User {} tried to withdraw notification {} sent by someone else", caller, notification_id);
            return Err(WorkflowError::AuthzDenied(
                "Only the sender can withdraw this notification".to_string(),
            ));
        }
        if !notification.is_pending() || !tx.delete_if_pending(notification_id).await? {
            return Err(not_pending(notification_id));
        }
        tx.commit().await?;

        info!("Notification {} ({}) withdrawn by user {}", notification_id, notification.kind, caller);
        Ok(())
    }

    /// Manager assigns a tenant directly, bypassing the request/accept handshake.
    pub async fn assign_tenant(
        &self,
        caller: UserId,
        property_id: EntityId,
        floor_id: EntityId,
        phone_number: &str,
    ) -> WorkflowResult<Floor> {
        self.require_manager(caller, property_id).await?;
        let phone_number = validate_phone(phone_number)?;
        let tenant = self
            .store
            .find_user_by_phone(phone_number)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("No user with phone number {}", phone_number)))?;

        let mut tx = self.store.begin().await?;
        let mut floor = lock_floor_of_property(tx.as_mut(), property_id, floor_id).await?;
        if !tx.assign_tenant_if_vacant(floor_id, tenant.id, caller).await? {
            return Err(WorkflowError::Conflict(format!("Floor {} is already occupied", floor_id)));
        }
        tx.commit().await?;
        floor.tenant = Some(tenant.id);

        info!("User {} assigned to floor {} by manager {}", tenant.id, floor_id, caller);
        Ok(floor)
    }

    /// Manager clears the floor's tenant. Returns who was removed.
    pub async fn remove_tenant(&self, caller: UserId, property_id: EntityId, floor_id: EntityId) -> WorkflowResult<UserId> {
        self.require_manager(caller, property_id).await?;

        let mut tx = self.store.begin().await?;
        lock_floor_of_property(tx.as_mut(), property_id, floor_id).await?;
        let removed = tx
            .clear_tenant(floor_id, caller)
            .await?
            .ok_or_else(|| WorkflowError::NotFound(format!("Floor {} has no tenant", floor_id)))?;
        tx.commit().await?;

        info!("User {} removed from floor {} by manager {}", removed, floor_id, caller);
        Ok(removed)
    }

    /// Notifications addressed to the caller, newest first.
    pub async fn list_notifications(&self, caller: UserId) -> WorkflowResult<Vec<NotificationView>> {
        Ok(self.store.notifications_for_receiver(caller).await?)
    }

    pub async fn mark_all_read(&self, caller: UserId) -> WorkflowResult<u64> {
        Ok(self.store.mark_all_read(caller).await?)
    }

    /// The caller's own payment submissions for a floor that still await the manager.
    pub async fn list_pending_payments(
        &self,
        caller: UserId,
        property_id: EntityId,
        floor_id: EntityId,
    ) -> WorkflowResult<Vec<Notification>> {
        self.require_tenant(caller, property_id, floor_id).await?;
        Ok(self.store.pending_payments(floor_id, caller).await?)
    }

    pub async fn is_manager(&self, caller: UserId, property_id: EntityId) -> WorkflowResult<bool> {
        Ok(self.guard.is_manager(caller, property_id).await?)
    }

    async fn require_manager(&self, caller: UserId, property_id: EntityId) -> WorkflowResult<()> {
        if self.guard.is_manager(caller, property_id).await? {
            return Ok(());
        }
        warn!("User {} is not a manager of property {}", caller, property_id);
        Err(WorkflowError::AuthzDenied(
            "Only the property manager can perform this action".to_string(),
        ))
    }

    async fn require_tenant(&self, caller: UserId, property_id: EntityId, floor_id: EntityId) -> WorkflowResult<()> {
        if self.guard.is_tenant(caller, property_id, floor_id).await? {
            return Ok(());
        }
        warn!("User {} is not the tenant of floor {} in property {}", caller, floor_id, property_id);
        Err(WorkflowError::AuthzDenied(
            "Only the tenant of this floor can perform this action".to_string(),
        ))
    }
}

/// Lock the floor and check it belongs to the property named in the request.
async fn lock_floor_of_property(
    tx: &mut dyn WorkflowTx,
    property_id: EntityId,
    floor_id: EntityId,
) -> WorkflowResult<Floor> {
    match tx.lock_floor(floor_id).await? {
        Some(floor) if floor.property_id == property_id => Ok(floor),
        _ => Err(WorkflowError::NotFound(format!(
            "Floor {} not found in property {}",
            floor_id, property_id
        ))),
    }
}

fn validate_phone(phone_number: &str) -> WorkflowResult<&str> {
    let trimmed = phone_number.trim();
    if trimmed.is_empty() {
        return Err(WorkflowError::Validation("Phone number is required".to_string()));
    }
    Ok(trimmed)
}

fn notification_not_found(id: EntityId) -> WorkflowError {
    WorkflowError::NotFound(format!("Notification {} not found", id))
}

fn not_pending(id: EntityId) -> WorkflowError {
    WorkflowError::InvalidState(format!("Notification {} is not pending", id))
}

fn pending_request_conflict(floor_id: EntityId) -> WorkflowError {
    WorkflowError::Conflict(format!("A tenant request is already pending for floor {}", floor_id))
}

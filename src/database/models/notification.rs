use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::database::models::{EntityId, UserId};

/// What a notification is about. Persisted explicitly; never inferred from `message`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Manager proposes a tenant for a vacant floor.
    TenantRequest,
    /// Tenant reports a payment to the manager.
    PaymentSubmission,
    /// Reply to the original requester once a request has been resolved.
    StatusUpdate,
    /// Monthly reminder emitted by the scheduler.
    RentReminder,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::TenantRequest => "tenant_request",
            NotificationKind::PaymentSubmission => "payment_submission",
            NotificationKind::StatusUpdate => "status_update",
            NotificationKind::RentReminder => "rent_reminder",
        }
    }

    /// Only requests can be accepted, rejected or withdrawn.
    pub fn is_actionable(&self) -> bool {
        matches!(self, NotificationKind::TenantRequest | NotificationKind::PaymentSubmission)
    }

    fn label(&self) -> &'static str {
        match self {
            NotificationKind::TenantRequest => "Tenant request",
            NotificationKind::PaymentSubmission => "Payment",
            NotificationKind::StatusUpdate => "Status update",
            NotificationKind::RentReminder => "Rent reminder",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tenant_request" => Ok(NotificationKind::TenantRequest),
            "payment_submission" => Ok(NotificationKind::PaymentSubmission),
            "status_update" => Ok(NotificationKind::StatusUpdate),
            "rent_reminder" => Ok(NotificationKind::RentReminder),
            other => Err(format!("unknown notification kind '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Pending,
    Accepted,
    Rejected,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Accepted => "accepted",
            NotificationStatus::Rejected => "rejected",
        }
    }

    pub fn resolution(accept: bool) -> Self {
        if accept {
            NotificationStatus::Accepted
        } else {
            NotificationStatus::Rejected
        }
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(NotificationStatus::Pending),
            "accepted" => Ok(NotificationStatus::Accepted),
            "rejected" => Ok(NotificationStatus::Rejected),
            other => Err(format!("unknown notification status '{}'", other)),
        }
    }
}

/// One pending or resolved interaction between two users about a floor.
///
/// `status` is `None` only for rent reminders, which carry no workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: EntityId,
    pub kind: NotificationKind,
    pub status: Option<NotificationStatus>,
    pub sender: UserId,
    pub receiver: UserId,
    pub property_id: EntityId,
    pub floor_id: EntityId,
    pub message: String,
    pub amount: Option<i64>,
    pub in_reply_to: Option<EntityId>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Notification {
    pub fn is_pending(&self) -> bool {
        self.status == Some(NotificationStatus::Pending)
    }

    pub fn tenant_request(
        id: EntityId,
        manager: UserId,
        tenant: UserId,
        property_id: EntityId,
        floor_id: EntityId,
        message: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self::new(id, NotificationKind::TenantRequest, Some(NotificationStatus::Pending), manager, tenant, property_id, floor_id, message, now)
    }

    pub fn payment_submission(
        id: EntityId,
        tenant: UserId,
        manager: UserId,
        property_id: EntityId,
        floor_id: EntityId,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Self {
        let mut notification = Self::new(
            id,
            NotificationKind::PaymentSubmission,
            Some(NotificationStatus::Pending),
            tenant,
            manager,
            property_id,
            floor_id,
            format!("Payment amount: ${}", amount),
            now,
        );
        notification.amount = Some(amount);
        notification
    }

    pub fn rent_reminder(
        id: EntityId,
        manager: UserId,
        tenant: UserId,
        property_id: EntityId,
        floor_id: EntityId,
        message: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self::new(id, NotificationKind::RentReminder, None, manager, tenant, property_id, floor_id, message, now)
    }

    /// Build the reply sent back to the requester after this notification was resolved.
    /// Sender and receiver are swapped and the reply carries the terminal status.
    pub fn status_update(
        &self,
        id: EntityId,
        status: NotificationStatus,
        property_name: &str,
        floor_name: &str,
        now: DateTime<Utc>,
    ) -> Self {
        let message = format!("{} {} - {}, {}", self.kind.label(), status, property_name, floor_name);
        let mut reply = Self::new(
            id,
            NotificationKind::StatusUpdate,
            Some(status),
            self.receiver,
            self.sender,
            self.property_id,
            self.floor_id,
            message,
            now,
        );
        reply.amount = self.amount;
        reply.in_reply_to = Some(self.id);
        reply
    }

    #[allow(clippy::too_many_arguments)]
    fn new(
        id: EntityId,
        kind: NotificationKind,
        status: Option<NotificationStatus>,
        sender: UserId,
        receiver: UserId,
        property_id: EntityId,
        floor_id: EntityId,
        message: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            kind,
            status,
            sender,
            receiver,
            property_id,
            floor_id,
            message,
            amount: None,
            in_reply_to: None,
            is_read: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Listing projection: a notification joined with display names.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationView {
    #[serde(flatten)]
    pub notification: Notification,
    pub property_name: String,
    pub floor_name: String,
    pub show_actions: bool,
}

impl NotificationView {
    pub fn new(notification: Notification, property_name: String, floor_name: String, viewer: UserId) -> Self {
        let show_actions =
            notification.receiver == viewer && notification.is_pending() && notification.kind.is_actionable();
        Self {
            notification,
            property_name,
            floor_name,
            show_actions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> Notification {
        Notification::tenant_request(10, 1, 2, 100, 200, "Tenant request for Rose Villa - 2F".into(), Utc::now())
    }

    #[test]
    fn kind_and_status_parse_from_their_column_text() {
        for kind in [
            NotificationKind::TenantRequest,
            NotificationKind::PaymentSubmission,
            NotificationKind::StatusUpdate,
            NotificationKind::RentReminder,
        ] {
            assert_eq!(kind.as_str().parse::<NotificationKind>().unwrap(), kind);
        }
        assert!("Payment amount: $5".parse::<NotificationKind>().is_err());
        assert!("done".parse::<NotificationStatus>().is_err());
    }

    #[test]
    fn status_update_swaps_parties_and_links_the_original() {
        let original = request();
        let reply = original.status_update(11, NotificationStatus::Rejected, "Rose Villa", "2F", Utc::now());

        assert_eq!(reply.kind, NotificationKind::StatusUpdate);
        assert_eq!(reply.status, Some(NotificationStatus::Rejected));
        assert_eq!(reply.sender, original.receiver);
        assert_eq!(reply.receiver, original.sender);
        assert_eq!(reply.in_reply_to, Some(original.id));
        assert_eq!(reply.message, "Tenant request rejected - Rose Villa, 2F");
    }

    #[test]
    fn payment_submission_keeps_amount_out_of_band() {
        let payment = Notification::payment_submission(12, 2, 1, 100, 200, 15000, Utc::now());
        assert_eq!(payment.amount, Some(15000));
        assert_eq!(payment.message, "Payment amount: $15000");
        assert!(payment.is_pending());
    }

    #[test]
    fn only_the_receiver_sees_actions_on_pending_requests() {
        let original = request();
        assert!(NotificationView::new(original.clone(), "P".into(), "F".into(), 2).show_actions);
        assert!(!NotificationView::new(original.clone(), "P".into(), "F".into(), 1).show_actions);

        let reminder = Notification::rent_reminder(13, 1, 2, 100, 200, "reminder".into(), Utc::now());
        assert!(!NotificationView::new(reminder, "P".into(), "F".into(), 2).show_actions);
    }
}

//! Postgres-backed workflow store.
//!
//! # Locking protocol
//! Every transition that can change floor occupancy or the set of pending
//! tenant requests first takes the floor row lock (`SELECT ... FOR NO KEY UPDATE`).
//! That lock still admits the `FOR KEY SHARE` taken by foreign-key checks, so
//! inserts that only reference the floor do not queue behind it.
//! Two requests racing on the same floor are therefore serialized under
//! read-committed isolation, and the second one re-reads committed state.
//! Notification rows are locked after their floor, keeping the lock order
//! floor -> notification everywhere.
//!
//! Status changes are conditional (`WHERE status = 'pending'`), and the partial
//! unique index `notifications_one_pending_request` rejects a second pending
//! tenant request for a floor even if a caller skipped the floor lock.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgExecutor, PgPool, Postgres, Transaction};

use super::{NotificationTx, StoreError, StoreResult, TenancyTx, WorkflowStore, WorkflowTx};
use crate::database::models::{
    EntityId, Floor, Notification, NotificationStatus, NotificationView, OccupiedFloor, User, UserId,
};

const PENDING_REQUEST_INDEX: &str = "notifications_one_pending_request";

const NOTIFICATION_COLUMNS: &str = "n.id, n.kind, n.status, n.sender_id, n.receiver_id, n.property_id, n.floor_id, \
     n.message, n.amount, n.in_reply_to, n.is_read, n.created_at, n.updated_at";

const FLOOR_SELECT: &str = "SELECT f.id, f.property_id, f.name, p.name AS property_name, f.rent, f.tenant_id AS tenant \
     FROM floors f JOIN properties p ON p.id = f.property_id \
     WHERE f.id = $1";

#[derive(Debug, FromRow)]
struct NotificationRow {
    id: i64,
    kind: String,
    status: Option<String>,
    sender_id: i64,
    receiver_id: i64,
    property_id: i64,
    floor_id: i64,
    message: String,
    amount: Option<i64>,
    in_reply_to: Option<i64>,
    is_read: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = StoreError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        let kind = row.kind.parse().map_err(StoreError::Corrupt)?;
        let status = row
            .status
            .as_deref()
            .map(str::parse::<NotificationStatus>)
            .transpose()
            .map_err(StoreError::Corrupt)?;

        Ok(Notification {
            id: row.id,
            kind,
            status,
            sender: row.sender_id,
            receiver: row.receiver_id,
            property_id: row.property_id,
            floor_id: row.floor_id,
            message: row.message,
            amount: row.amount,
            in_reply_to: row.in_reply_to,
            is_read: row.is_read,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct NotificationViewRow {
    #[sqlx(flatten)]
    notification: NotificationRow,
    property_name: String,
    floor_name: String,
}

fn convert_all(rows: Vec<NotificationRow>) -> StoreResult<Vec<Notification>> {
    rows.into_iter().map(Notification::try_from).collect()
}

/// Translate unique violations on insert into the store's own vocabulary.
fn insert_error(err: sqlx::Error, notification: &Notification) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return match db.constraint() {
                Some(PENDING_REQUEST_INDEX) => StoreError::PendingRequestExists(notification.floor_id),
                _ => StoreError::DuplicateId(notification.id),
            };
        }
    }
    StoreError::from(err)
}

async fn insert_notification_row<'e, E: PgExecutor<'e>>(executor: E, notification: &Notification) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO notifications (
            id, kind, status, sender_id, receiver_id, property_id, floor_id,
            message, amount, in_reply_to, is_read, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(notification.id)
    .bind(notification.kind.as_str())
    .bind(notification.status.map(|s| s.as_str()))
    .bind(notification.sender)
    .bind(notification.receiver)
    .bind(notification.property_id)
    .bind(notification.floor_id)
    .bind(&notification.message)
    .bind(notification.amount)
    .bind(notification.in_reply_to)
    .bind(notification.is_read)
    .bind(notification.created_at)
    .bind(notification.updated_at)
    .execute(executor)
    .await
    .map_err(|e| insert_error(e, notification))?;
    Ok(())
}

async fn fetch_notification<'e, E: PgExecutor<'e>>(
    executor: E,
    id: EntityId,
    for_update: bool,
) -> StoreResult<Option<Notification>> {
    let sql = format!(
        "SELECT {} FROM notifications n WHERE n.id = $1{}",
        NOTIFICATION_COLUMNS,
        if for_update { " FOR NO KEY UPDATE" } else { "" }
    );
    sqlx::query_as::<_, NotificationRow>(&sql)
        .bind(id)
        .fetch_optional(executor)
        .await?
        .map(Notification::try_from)
        .transpose()
}

async fn lock_floor_row<'e, E: PgExecutor<'e>>(executor: E, floor_id: EntityId) -> StoreResult<Option<Floor>> {
    let sql = format!("{} FOR NO KEY UPDATE OF f", FLOOR_SELECT);
    Ok(sqlx::query_as::<_, Floor>(&sql)
        .bind(floor_id)
        .fetch_optional(executor)
        .await?)
}

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub struct PgWorkflowTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl TenancyTx for PgWorkflowTx {
    async fn lock_floor(&mut self, floor_id: EntityId) -> StoreResult<Option<Floor>> {
        lock_floor_row(&mut *self.tx, floor_id).await
    }

    async fn assign_tenant_if_vacant(&mut self, floor_id: EntityId, tenant: UserId, actor: UserId) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE floors
            SET tenant_id = $2, updated_at = now(), updated_by = $3
            WHERE id = $1 AND tenant_id IS NULL
            "#,
        )
        .bind(floor_id)
        .bind(tenant)
        .bind(actor)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn clear_tenant(&mut self, floor_id: EntityId, actor: UserId) -> StoreResult<Option<UserId>> {
        let previous: Option<Option<i64>> =
            sqlx::query_scalar("SELECT tenant_id FROM floors WHERE id = $1 FOR NO KEY UPDATE")
                .bind(floor_id)
                .fetch_optional(&mut *self.tx)
                .await?;

        let Some(tenant) = previous.flatten() else {
            return Ok(None);
        };

        sqlx::query(
            r#"
            UPDATE floors
            SET tenant_id = NULL, updated_at = now(), updated_by = $2
            WHERE id = $1
            "#,
        )
        .bind(floor_id)
        .bind(actor)
        .execute(&mut *self.tx)
        .await?;
        Ok(Some(tenant))
    }
}

#[async_trait]
impl NotificationTx for PgWorkflowTx {
    async fn notification(&mut self, id: EntityId) -> StoreResult<Option<Notification>> {
        fetch_notification(&mut *self.tx, id, false).await
    }

    async fn lock_notification(&mut self, id: EntityId) -> StoreResult<Option<Notification>> {
        fetch_notification(&mut *self.tx, id, true).await
    }

    async fn pending_tenant_request(&mut self, floor_id: EntityId) -> StoreResult<Option<Notification>> {
        let sql = format!(
            "SELECT {} FROM notifications n \
             WHERE n.floor_id = $1 AND n.kind = 'tenant_request' AND n.status = 'pending' \
             LIMIT 1",
            NOTIFICATION_COLUMNS
        );
        sqlx::query_as::<_, NotificationRow>(&sql)
            .bind(floor_id)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(Notification::try_from)
            .transpose()
    }

    async fn insert_notification(&mut self, notification: &Notification) -> StoreResult<()> {
        insert_notification_row(&mut *self.tx, notification).await
    }

    async fn transition_if_pending(&mut self, id: EntityId, status: NotificationStatus) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET status = $2, updated_at = now()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_if_pending(&mut self, id: EntityId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND status = 'pending'")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl WorkflowTx for PgWorkflowTx {
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl WorkflowStore for PostgresStore {
    async fn begin(&self) -> StoreResult<Box<dyn WorkflowTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgWorkflowTx { tx }))
    }

    async fn is_manager(&self, user: UserId, property_id: EntityId) -> StoreResult<bool> {
        Ok(sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM property_managers WHERE user_id = $1 AND property_id = $2)",
        )
        .bind(user)
        .bind(property_id)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn is_tenant(&self, user: UserId, property_id: EntityId, floor_id: EntityId) -> StoreResult<bool> {
        Ok(sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM floors WHERE id = $1 AND property_id = $2 AND tenant_id = $3)",
        )
        .bind(floor_id)
        .bind(property_id)
        .bind(user)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn find_user_by_phone(&self, phone_number: &str) -> StoreResult<Option<User>> {
        Ok(sqlx::query_as::<_, User>("SELECT id, phone_number, name FROM users WHERE phone_number = $1")
            .bind(phone_number)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn property_manager(&self, property_id: EntityId) -> StoreResult<Option<UserId>> {
        Ok(sqlx::query_scalar(
            "SELECT user_id FROM property_managers WHERE property_id = $1 ORDER BY user_id LIMIT 1",
        )
        .bind(property_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn occupied_floors(&self) -> StoreResult<Vec<OccupiedFloor>> {
        Ok(sqlx::query_as::<_, OccupiedFloor>(
            r#"
            SELECT
                f.id AS floor_id,
                f.property_id,
                f.tenant_id AS tenant,
                (SELECT pm.user_id FROM property_managers pm
                 WHERE pm.property_id = f.property_id
                 ORDER BY pm.user_id LIMIT 1) AS manager,
                p.name AS property_name,
                f.name AS floor_name,
                f.rent
            FROM floors f
            JOIN properties p ON p.id = f.property_id
            WHERE f.tenant_id IS NOT NULL
            ORDER BY f.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn notifications_for_receiver(&self, receiver: UserId) -> StoreResult<Vec<NotificationView>> {
        let sql = format!(
            "SELECT {}, p.name AS property_name, f.name AS floor_name \
             FROM notifications n \
             JOIN properties p ON p.id = n.property_id \
             JOIN floors f ON f.id = n.floor_id \
             WHERE n.receiver_id = $1 \
             ORDER BY n.created_at DESC, n.id DESC",
            NOTIFICATION_COLUMNS
        );
        let rows = sqlx::query_as::<_, NotificationViewRow>(&sql)
            .bind(receiver)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                let notification = Notification::try_from(row.notification)?;
                Ok(NotificationView::new(notification, row.property_name, row.floor_name, receiver))
            })
            .collect()
    }

    async fn pending_payments(&self, floor_id: EntityId, sender: UserId) -> StoreResult<Vec<Notification>> {
        let sql = format!(
            "SELECT {} FROM notifications n \
             WHERE n.floor_id = $1 AND n.sender_id = $2 \
             AND n.kind = 'payment_submission' AND n.status = 'pending' \
             ORDER BY n.created_at DESC, n.id DESC",
            NOTIFICATION_COLUMNS
        );
        let rows = sqlx::query_as::<_, NotificationRow>(&sql)
            .bind(floor_id)
            .bind(sender)
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }

    async fn insert_notification(&self, notification: &Notification) -> StoreResult<()> {
        insert_notification_row(&self.pool, notification).await
    }

    async fn mark_all_read(&self, receiver: UserId) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET is_read = true, updated_at = now()
            WHERE receiver_id = $1 AND is_read = false
            "#,
        )
        .bind(receiver)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn claim_reminder_cycle(&self, cycle: &str) -> StoreResult<bool> {
        let result = sqlx::query("INSERT INTO reminder_runs (cycle) VALUES ($1) ON CONFLICT (cycle) DO NOTHING")
            .bind(cycle)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

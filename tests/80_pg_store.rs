#![cfg(feature = "pg-tests")]
//! Workflow guarantees checked against a real Postgres.
//!
//! Run with `DATABASE_URL=postgres://... cargo test --features pg-tests --test 80_pg_store`.
//! Every test truncates and reseeds the schema, so they hold a shared lock and
//! run one at a time. Without `DATABASE_URL` they are skipped.

use anyhow::Result;
use chrono::Utc;
use futures::future::join_all;
use once_cell::sync::Lazy;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

use rent_api::config::{DatabaseConfig, SchedulerConfig};
use rent_api::database::models::{EntityId, NotificationKind, UserId};
use rent_api::database::store::{PostgresStore, WorkflowStore};
use rent_api::database::DatabaseManager;
use rent_api::services::{RandomIdGenerator, ReminderScheduler, WorkflowEngine, WorkflowError};

const MANAGER: UserId = 1;
const TENANT: UserId = 2;
const OTHER: UserId = 3;
const TENANT_PHONE: &str = "01700000002";

const PROPERTY: EntityId = 100;
const FLOOR: EntityId = 200;

static SCHEMA_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

struct PgFixture {
    pool: PgPool,
    store: Arc<dyn WorkflowStore>,
    engine: WorkflowEngine,
    _guard: MutexGuard<'static, ()>,
}

impl PgFixture {
    async fn floor_tenant(&self, floor_id: EntityId) -> Result<Option<UserId>> {
        Ok(sqlx::query_scalar("SELECT tenant_id FROM floors WHERE id = $1")
            .bind(floor_id)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn set_tenant(&self, floor_id: EntityId, tenant: Option<UserId>) -> Result<()> {
        sqlx::query("UPDATE floors SET tenant_id = $2 WHERE id = $1")
            .bind(floor_id)
            .bind(tenant)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count(&self, kind: &str, status: Option<&str>) -> Result<i64> {
        Ok(sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE kind = $1 AND status IS NOT DISTINCT FROM $2",
        )
        .bind(kind)
        .bind(status)
        .fetch_one(&self.pool)
        .await?)
    }
}

async fn pg_fixture() -> Result<Option<PgFixture>> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("skipping pg-tests: DATABASE_URL is not set");
        return Ok(None);
    };
    let guard = SCHEMA_LOCK.lock().await;

    let config = DatabaseConfig {
        url: Some(url),
        max_connections: 20,
        connection_timeout: 5,
        run_migrations: true,
    };
    let pool = DatabaseManager::connect(&config).await?;
    DatabaseManager::migrate(&pool).await?;

    sqlx::query("TRUNCATE reminder_runs, notifications, floors, property_managers, properties, users")
        .execute(&pool)
        .await?;
    sqlx::query(
        "INSERT INTO users (id, phone_number, name) VALUES \
         (1, '01700000001', 'Manager'), (2, '01700000002', 'Tenant'), (3, '01700000003', NULL), (9, '01700000009', NULL)",
    )
    .execute(&pool)
    .await?;
    sqlx::query("INSERT INTO properties (id, name) VALUES (100, 'Rose Villa'), (101, 'Lake View')")
        .execute(&pool)
        .await?;
    sqlx::query("INSERT INTO property_managers (user_id, property_id) VALUES (1, 100), (9, 101), (3, 101)")
        .execute(&pool)
        .await?;
    sqlx::query("INSERT INTO floors (id, property_id, name, rent) VALUES (200, 100, '2F', 12000), (201, 100, '3F', 15000)")
        .execute(&pool)
        .await?;

    let store: Arc<dyn WorkflowStore> = Arc::new(PostgresStore::new(pool.clone()));
    let engine = WorkflowEngine::new(store.clone(), Arc::new(RandomIdGenerator));
    Ok(Some(PgFixture {
        pool,
        store,
        engine,
        _guard: guard,
    }))
}

#[tokio::test]
async fn concurrent_tenant_requests_leave_one_pending() -> Result<()> {
    let Some(fx) = pg_fixture().await? else { return Ok(()) };

    let attempts = (0..16).map(|_| {
        let engine = fx.engine.clone();
        tokio::spawn(async move { engine.create_tenant_request(MANAGER, PROPERTY, FLOOR, TENANT_PHONE).await })
    });
    let results: Vec<_> = join_all(attempts).await.into_iter().collect::<Result<_, _>>()?;

    let created = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(WorkflowError::Conflict(_))))
        .count();
    assert_eq!(created, 1);
    assert_eq!(conflicts, 15);
    assert_eq!(fx.count("tenant_request", Some("pending")).await?, 1);
    Ok(())
}

#[tokio::test]
async fn concurrent_accepts_resolve_once() -> Result<()> {
    let Some(fx) = pg_fixture().await? else { return Ok(()) };
    let request = fx
        .engine
        .create_tenant_request(MANAGER, PROPERTY, FLOOR, TENANT_PHONE)
        .await?;

    let attempts = (0..8).map(|_| {
        let engine = fx.engine.clone();
        tokio::spawn(async move { engine.resolve_notification(TENANT, request.id, true).await })
    });
    let results: Vec<_> = join_all(attempts).await.into_iter().collect::<Result<_, _>>()?;

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(WorkflowError::InvalidState(_))))
            .count(),
        7
    );
    assert_eq!(fx.floor_tenant(FLOOR).await?, Some(TENANT));
    assert_eq!(fx.count("tenant_request", Some("accepted")).await?, 1);
    assert_eq!(fx.count("status_update", Some("accepted")).await?, 1);
    Ok(())
}

#[tokio::test]
async fn accepting_for_an_occupied_floor_changes_nothing() -> Result<()> {
    let Some(fx) = pg_fixture().await? else { return Ok(()) };
    let request = fx
        .engine
        .create_tenant_request(MANAGER, PROPERTY, FLOOR, TENANT_PHONE)
        .await?;
    fx.set_tenant(FLOOR, Some(OTHER)).await?;

    let err = fx
        .engine
        .resolve_notification(TENANT, request.id, true)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Conflict(_)), "{:?}", err);

    assert_eq!(fx.floor_tenant(FLOOR).await?, Some(OTHER));
    assert_eq!(fx.count("tenant_request", Some("pending")).await?, 1);
    assert_eq!(fx.count("status_update", Some("accepted")).await?, 0);
    Ok(())
}

#[tokio::test]
async fn resolve_and_withdraw_race_has_one_winner() -> Result<()> {
    let Some(fx) = pg_fixture().await? else { return Ok(()) };
    let request = fx
        .engine
        .create_tenant_request(MANAGER, PROPERTY, FLOOR, TENANT_PHONE)
        .await?;

    let resolver = fx.engine.clone();
    let withdrawer = fx.engine.clone();
    let (resolved, withdrawn) = tokio::join!(
        tokio::spawn(async move { resolver.resolve_notification(TENANT, request.id, true).await }),
        tokio::spawn(async move { withdrawer.withdraw_notification(MANAGER, request.id).await }),
    );
    let (resolved, withdrawn) = (resolved?, withdrawn?);

    assert!(resolved.is_ok() != withdrawn.is_ok(), "{:?} / {:?}", resolved, withdrawn);
    if resolved.is_ok() {
        assert!(matches!(withdrawn, Err(WorkflowError::InvalidState(_))));
        assert_eq!(fx.floor_tenant(FLOOR).await?, Some(TENANT));
    } else {
        assert!(matches!(
            resolved,
            Err(WorkflowError::InvalidState(_)) | Err(WorkflowError::NotFound(_))
        ));
        assert_eq!(fx.floor_tenant(FLOOR).await?, None);
        assert_eq!(fx.count("tenant_request", Some("pending")).await?, 0);
    }
    Ok(())
}

#[tokio::test]
async fn reminders_go_out_once_per_cycle() -> Result<()> {
    let Some(fx) = pg_fixture().await? else { return Ok(()) };
    fx.set_tenant(FLOOR, Some(TENANT)).await?;
    let scheduler = ReminderScheduler::new(fx.store.clone(), Arc::new(RandomIdGenerator), &SchedulerConfig::default());
    let now = Utc::now();

    let first = scheduler.send_reminders(now, false).await?;
    assert!(first.claimed);
    assert_eq!(first.sent, 1);

    let second = scheduler.send_reminders(now, false).await?;
    assert!(!second.claimed);
    assert_eq!(second.sent, 0);
    assert_eq!(fx.count("rent_reminder", None).await?, 1);

    let inbox = fx.engine.list_notifications(TENANT).await?;
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].notification.kind, NotificationKind::RentReminder);
    assert_eq!(inbox[0].notification.sender, MANAGER);
    assert_eq!(inbox[0].property_name, "Rose Villa");
    assert_eq!(inbox[0].floor_name, "2F");
    assert!(!inbox[0].show_actions);

    let forced = scheduler.send_reminders(now, true).await?;
    assert_eq!(forced.sent, 1);
    assert_eq!(fx.count("rent_reminder", None).await?, 2);
    Ok(())
}

#[tokio::test]
async fn floor_lock_does_not_block_payment_inserts() -> Result<()> {
    let Some(fx) = pg_fixture().await? else { return Ok(()) };
    fx.set_tenant(FLOOR, Some(TENANT)).await?;

    let mut tx = fx.store.begin().await?;
    assert!(tx.lock_floor(FLOOR).await?.is_some());

    let submitted = tokio::time::timeout(
        Duration::from_secs(3),
        fx.engine.create_payment_submission(TENANT, PROPERTY, FLOOR, 12000),
    )
    .await;
    drop(tx);

    let payment = submitted.map_err(|_| anyhow::anyhow!("payment insert waited on the floor lock"))??;
    assert_eq!(payment.receiver, MANAGER);
    assert_eq!(fx.count("payment_submission", Some("pending")).await?, 1);
    Ok(())
}

#[tokio::test]
async fn listing_and_read_flags() -> Result<()> {
    let Some(fx) = pg_fixture().await? else { return Ok(()) };
    let request = fx
        .engine
        .create_tenant_request(MANAGER, PROPERTY, FLOOR, TENANT_PHONE)
        .await?;

    let inbox = fx.engine.list_notifications(TENANT).await?;
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].notification.id, request.id);
    assert!(inbox[0].show_actions);
    assert!(!inbox[0].notification.is_read);

    assert_eq!(fx.engine.mark_all_read(TENANT).await?, 1);
    assert_eq!(fx.engine.mark_all_read(TENANT).await?, 0);
    assert!(fx.engine.list_notifications(TENANT).await?[0].notification.is_read);
    assert!(fx.engine.list_notifications(MANAGER).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn assignment_removal_and_manager_lookup() -> Result<()> {
    let Some(fx) = pg_fixture().await? else { return Ok(()) };

    let floor = fx.engine.assign_tenant(MANAGER, PROPERTY, FLOOR, TENANT_PHONE).await?;
    assert_eq!(floor.tenant, Some(TENANT));
    let err = fx
        .engine
        .assign_tenant(MANAGER, PROPERTY, FLOOR, "01700000003")
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Conflict(_)));

    assert_eq!(fx.engine.remove_tenant(MANAGER, PROPERTY, FLOOR).await?, TENANT);
    assert_eq!(fx.floor_tenant(FLOOR).await?, None);
    let err = fx.engine.remove_tenant(MANAGER, PROPERTY, FLOOR).await.unwrap_err();
    assert!(matches!(err, WorkflowError::NotFound(_)));

    assert_eq!(fx.store.property_manager(101).await?, Some(OTHER));
    assert!(fx.engine.is_manager(9, 101).await?);
    assert!(!fx.engine.is_manager(TENANT, PROPERTY).await?);
    Ok(())
}

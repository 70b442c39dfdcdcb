//! Monthly rent reminders.
//!
//! One background loop sleeps until the configured day and hour of the next
//! month (in the configured UTC offset), then sends one reminder per occupied
//! floor. Each cycle is claimed in the store before anything is sent, so a
//! restarted process or a second instance never repeats a cycle.
use chrono::{DateTime, Datelike, Duration, FixedOffset, Offset, TimeZone, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::SchedulerConfig;
use crate::database::models::{Notification, OccupiedFloor};
use crate::database::store::{StoreResult, WorkflowStore};
use crate::services::ids::IdGenerator;

#[derive(Debug, Default, Clone, Serialize)]
pub struct SweepReport {
    pub cycle: String,
    /// False when the cycle had already been claimed by an earlier sweep.
    pub claimed: bool,
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct ReminderScheduler {
    store: Arc<dyn WorkflowStore>,
    ids: Arc<dyn IdGenerator>,
    offset: FixedOffset,
    day_of_month: u32,
    hour: u32,
}

impl ReminderScheduler {
    /// Day is clamped to 1..=28 so the slot exists in every month.
    pub fn new(store: Arc<dyn WorkflowStore>, ids: Arc<dyn IdGenerator>, settings: &SchedulerConfig) -> Self {
        let offset = FixedOffset::east_opt(settings.utc_offset_hours.saturating_mul(3600)).unwrap_or_else(|| {
            warn!("Invalid scheduler UTC offset {}h, using UTC", settings.utc_offset_hours);
            Utc.fix()
        });
        Self {
            store,
            ids,
            offset,
            day_of_month: settings.day_of_month.clamp(1, 28),
            hour: settings.hour.min(23),
        }
    }

    /// First scheduled slot strictly after `now`.
    pub fn next_run_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local = now.with_timezone(&self.offset);
        let (mut year, mut month) = (local.year(), local.month());

        for _ in 0..2 {
            if let Some(slot) = self.slot(year, month) {
                if slot > now {
                    return slot;
                }
            }
            (year, month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
        }
        now + Duration::days(1)
    }

    /// `YYYY-MM` of the local calendar month containing `at`.
    pub fn cycle_key(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.offset).format("%Y-%m").to_string()
    }

    fn slot(&self, year: i32, month: u32) -> Option<DateTime<Utc>> {
        self.offset
            .with_ymd_and_hms(year, month, self.day_of_month, self.hour, 0, 0)
            .single()
            .map(|t| t.with_timezone(&Utc))
    }

    /// Sleep until each slot and sweep, until `shutdown` flips to true or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Reminder scheduler started: day {} at {:02}:00 (UTC{})",
            self.day_of_month, self.hour, self.offset
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let now = Utc::now();
            let next = self.next_run_after(now);
            let wait = (next - now).to_std().unwrap_or_default();
            info!("Next rent reminder sweep at {}", next);

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }

            match self.send_reminders(next, false).await {
                Ok(report) => info!(
                    "Reminder sweep {} finished: {} sent, {} skipped, {} failed",
                    report.cycle, report.sent, report.skipped, report.failed
                ),
                Err(e) => error!("Reminder sweep failed: {}", e),
            }
        }

        info!("Reminder scheduler stopped");
    }

    /// Send the reminders for the cycle containing `at`.
    ///
    /// With `force` the sweep runs even if the cycle was already claimed.
    /// Per-floor failures are logged and counted; only failing to claim the
    /// cycle or list the floors aborts the sweep.
    pub async fn send_reminders(&self, at: DateTime<Utc>, force: bool) -> StoreResult<SweepReport> {
        let mut report = SweepReport {
            cycle: self.cycle_key(at),
            ..SweepReport::default()
        };

        report.claimed = self.store.claim_reminder_cycle(&report.cycle).await?;
        if !report.claimed && !force {
            info!("Reminders for {} were already sent, skipping", report.cycle);
            return Ok(report);
        }

        for floor in self.store.occupied_floors().await? {
            let Some(manager) = floor.manager else {
                warn!("Property {} has no manager, no reminder for floor {}", floor.property_id, floor.floor_id);
                report.skipped += 1;
                continue;
            };

            let id = match self.ids.next_id() {
                Ok(id) => id,
                Err(e) => {
                    error!("No id for reminder on floor {}: {}", floor.floor_id, e);
                    report.failed += 1;
                    continue;
                }
            };

            let reminder = Notification::rent_reminder(
                id,
                manager,
                floor.tenant,
                floor.property_id,
                floor.floor_id,
                reminder_message(&floor),
                Utc::now(),
            );
            match self.store.insert_notification(&reminder).await {
                Ok(()) => report.sent += 1,
                Err(e) => {
                    error!("Failed to send reminder for floor {}: {}", floor.floor_id, e);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}

fn reminder_message(floor: &OccupiedFloor) -> String {
    format!(
        "Monthly rent reminder for {} - {}: rent due {}",
        floor.property_name, floor.floor_name, floor.rent
    )
}

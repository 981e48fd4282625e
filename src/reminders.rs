//! Reminder lifecycle: create, list, cancel, fire and restore.
//!
//! [`ReminderService`] ties the store, the scheduler and delivery together.
//! Every persisted reminder has exactly one scheduler job while it is
//! pending; the row is deleted once the job fires.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::delivery::{Delivery, DeliveryReport};
use crate::scheduler::{ReminderJob, ReminderScheduler};
use crate::store::{Reminder, Store, StoreError};

/// Delay used by `/testremind`.
pub const TEST_REMINDER_DELAY: Duration = Duration::from_secs(20);

/// Message sent by the test reminder.
pub const TEST_REMINDER_MESSAGE: &str = "This is a test reminder. Delivery works!";

/// Errors from reminder operations.
#[derive(Debug, thiserror::Error)]
pub enum ReminderError {
    /// The requested time is not in the future.
    #[error("reminder time {when} is not in the future")]
    NotInFuture {
        /// Rejected instant.
        when: DateTime<Utc>,
    },
    /// The message is empty.
    #[error("reminder message is empty")]
    EmptyMessage,
    /// No reminder with this id belongs to the chat.
    #[error("reminder {id} not found")]
    NotFound {
        /// Requested id.
        id: i64,
    },
    /// Persistence failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of rebuilding the schedule at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    /// Jobs re-armed.
    pub restored: usize,
    /// Rows whose time passed while the process was down.
    pub skipped: usize,
}

/// Job name for a new reminder of `chat_id`.
pub fn job_name(chat_id: i64) -> String {
    format!("reminder_{chat_id}_{}", uuid::Uuid::new_v4().simple())
}

/// Coordinates persistence, scheduling and delivery of reminders.
#[derive(Debug, Clone)]
pub struct ReminderService {
    store: Store,
    scheduler: ReminderScheduler,
    delivery: Delivery,
}

impl ReminderService {
    /// Service over the given components.
    pub fn new(store: Store, scheduler: ReminderScheduler, delivery: Delivery) -> Self {
        Self {
            store,
            scheduler,
            delivery,
        }
    }

    /// The underlying scheduler.
    pub fn scheduler(&self) -> &ReminderScheduler {
        &self.scheduler
    }

    /// Persist and schedule a reminder firing at `when`.
    pub async fn create(
        &self,
        chat_id: i64,
        when: DateTime<Utc>,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<Reminder, ReminderError> {
        if when <= now {
            return Err(ReminderError::NotInFuture { when });
        }
        let message = message.trim();
        if message.is_empty() {
            return Err(ReminderError::EmptyMessage);
        }

        let name = job_name(chat_id);
        let id = self
            .store
            .insert_reminder(chat_id, message, when, &name)
            .await?;

        self.scheduler.schedule_at(
            ReminderJob {
                name: name.clone(),
                chat_id,
                message: message.to_owned(),
                reminder_id: Some(id),
            },
            when,
            now,
        );
        info!(chat_id, reminder_id = id, run_at = %when, "reminder scheduled");

        Ok(Reminder {
            id,
            chat_id,
            message: message.to_owned(),
            run_at: when,
            job_name: name,
        })
    }

    /// Pending reminders of `chat_id`, soonest first.
    pub async fn list(&self, chat_id: i64) -> Result<Vec<Reminder>, ReminderError> {
        Ok(self.store.reminders_for_chat(chat_id).await?)
    }

    /// Cancel reminder `id` owned by `chat_id`.
    pub async fn cancel(&self, chat_id: i64, id: i64) -> Result<Reminder, ReminderError> {
        let reminder = self
            .store
            .reminder(id)
            .await?
            .filter(|r| r.chat_id == chat_id)
            .ok_or(ReminderError::NotFound { id })?;

        self.store.delete_reminder(id, Some(chat_id)).await?;
        if !self.scheduler.cancel(&reminder.job_name) {
            warn!(reminder_id = id, job = %reminder.job_name, "cancelled reminder had no scheduled job");
        }
        info!(chat_id, reminder_id = id, "reminder cancelled");
        Ok(reminder)
    }

    /// Schedule an unpersisted reminder [`TEST_REMINDER_DELAY`] from now.
    pub fn schedule_test(&self, chat_id: i64) -> ReminderJob {
        let job = ReminderJob {
            name: format!("test_{chat_id}_{}", uuid::Uuid::new_v4().simple()),
            chat_id,
            message: TEST_REMINDER_MESSAGE.to_owned(),
            reminder_id: None,
        };
        self.scheduler.schedule(job.clone(), TEST_REMINDER_DELAY);
        job
    }

    /// Deliver a fired job and drop its row.
    pub async fn fire(&self, job: &ReminderJob) -> DeliveryReport {
        let report = self.delivery.deliver(job.chat_id, &job.message).await;
        info!(
            job = %job.name,
            delivered = report.delivered,
            failed = report.failed,
            "reminder delivered"
        );

        if let Some(id) = job.reminder_id {
            if let Err(e) = self.store.delete_reminder(id, None).await {
                warn!(reminder_id = id, error = %e, "failed to delete fired reminder");
            }
        }
        report
    }

    /// Re-arm every stored reminder whose time is still ahead of `now`.
    ///
    /// Reminders whose time passed while the process was down are left in
    /// the store and reported as skipped.
    pub async fn restore_pending(&self, now: DateTime<Utc>) -> Result<RestoreSummary, ReminderError> {
        let mut summary = RestoreSummary::default();
        for reminder in self.store.pending_reminders().await? {
            if reminder.run_at <= now {
                warn!(
                    reminder_id = reminder.id,
                    run_at = %reminder.run_at,
                    "reminder time passed while offline, not restoring"
                );
                summary.skipped = summary.skipped.saturating_add(1);
                continue;
            }
            self.scheduler.schedule_at(
                ReminderJob {
                    name: reminder.job_name,
                    chat_id: reminder.chat_id,
                    message: reminder.message,
                    reminder_id: Some(reminder.id),
                },
                reminder.run_at,
                now,
            );
            summary.restored = summary.restored.saturating_add(1);
        }
        info!(restored = summary.restored, skipped = summary.skipped, "pending reminders restored");
        Ok(summary)
    }
}

/// Deliver fired jobs until the channel closes or shutdown is signalled.
///
/// Each delivery runs in its own task so a slow channel cannot delay
/// other reminders.
pub async fn run_dispatcher(
    service: Arc<ReminderService>,
    mut fired_rx: mpsc::Receiver<ReminderJob>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    info!("reminder dispatcher started");
    loop {
        tokio::select! {
            job = fired_rx.recv() => {
                let Some(job) = job else { break };
                let service = Arc::clone(&service);
                tokio::spawn(async move {
                    service.fire(&job).await;
                });
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
    info!("reminder dispatcher stopped");
}

//! In-process one-shot job scheduler.
//!
//! Each scheduled reminder is a Tokio task sleeping until its deadline. When
//! it wakes it removes its own registry entry and hands the [`ReminderJob`]
//! to the dispatch channel, so firing never blocks on delivery. Jobs are
//! keyed by name; scheduling a name again replaces the earlier job.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

/// A reminder waiting to fire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderJob {
    /// Unique job name.
    pub name: String,
    /// Chat that created the reminder.
    pub chat_id: i64,
    /// Reminder message.
    pub message: String,
    /// Store row to delete after delivery; `None` for unpersisted jobs.
    pub reminder_id: Option<i64>,
}

struct Slot {
    generation: u64,
    handle: AbortHandle,
}

/// Registry of sleeping reminder tasks. Cheap to clone.
#[derive(Clone)]
pub struct ReminderScheduler {
    jobs: Arc<Mutex<HashMap<String, Slot>>>,
    next_generation: Arc<AtomicU64>,
    fired_tx: mpsc::Sender<ReminderJob>,
}

impl std::fmt::Debug for ReminderScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReminderScheduler")
            .field("scheduled", &self.len())
            .finish_non_exhaustive()
    }
}

impl ReminderScheduler {
    /// Scheduler delivering fired jobs to `fired_tx`.
    pub fn new(fired_tx: mpsc::Sender<ReminderJob>) -> Self {
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            next_generation: Arc::new(AtomicU64::new(0)),
            fired_tx,
        }
    }

    /// Scheduler plus the receiving end of its dispatch channel.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ReminderJob>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// Fire `job` after `delay`, replacing any job with the same name.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn schedule(&self, job: ReminderJob, delay: Duration) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let name = job.name.clone();

        let Ok(mut map) = self.jobs.lock() else {
            warn!(job = %name, "scheduler registry poisoned, job dropped");
            return;
        };

        let jobs = Arc::clone(&self.jobs);
        let fired_tx = self.fired_tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let owned = jobs.lock().is_ok_and(|mut map| {
                let current = map.get(&job.name).is_some_and(|s| s.generation == generation);
                if current {
                    map.remove(&job.name);
                }
                current
            });
            if !owned {
                return;
            }

            debug!(job = %job.name, "reminder job fired");
            if let Err(e) = fired_tx.send(job).await {
                warn!(job = %e.0.name, "reminder dispatcher is gone, job lost");
            }
        });

        if let Some(previous) = map.insert(
            name.clone(),
            Slot {
                generation,
                handle: task.abort_handle(),
            },
        ) {
            previous.handle.abort();
            debug!(job = %name, "reminder job replaced");
        }
        debug!(job = %name, delay_secs = delay.as_secs(), "reminder job scheduled");
    }

    /// Fire `job` at `when`, measured from `now`. A deadline that is not in
    /// the future fires immediately.
    pub fn schedule_at(&self, job: ReminderJob, when: DateTime<Utc>, now: DateTime<Utc>) {
        let delay = when
            .signed_duration_since(now)
            .to_std()
            .unwrap_or(Duration::ZERO);
        self.schedule(job, delay);
    }

    /// Cancel the job called `name`. Returns whether one was pending.
    pub fn cancel(&self, name: &str) -> bool {
        let removed = self
            .jobs
            .lock()
            .ok()
            .and_then(|mut map| map.remove(name));
        match removed {
            Some(slot) => {
                slot.handle.abort();
                debug!(job = name, "reminder job cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancel every pending job.
    pub fn cancel_all(&self) {
        if let Ok(mut map) = self.jobs.lock() {
            for (_, slot) in map.drain() {
                slot.handle.abort();
            }
        }
    }

    /// Whether a job called `name` is pending.
    pub fn is_scheduled(&self, name: &str) -> bool {
        self.jobs.lock().is_ok_and(|map| map.contains_key(name))
    }

    /// Number of pending jobs.
    pub fn len(&self) -> usize {
        self.jobs.lock().map_or(0, |map| map.len())
    }

    /// Whether no jobs are pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! Timer registry behavior under a paused clock.

use std::time::Duration;

use chrono::{TimeDelta, Utc};

use astranote::scheduler::{ReminderJob, ReminderScheduler};

fn job(name: &str, message: &str) -> ReminderJob {
    ReminderJob {
        name: name.to_owned(),
        chat_id: 42,
        message: message.to_owned(),
        reminder_id: None,
    }
}

#[tokio::test(start_paused = true)]
async fn job_fires_once_after_its_delay() {
    let (scheduler, mut fired_rx) = ReminderScheduler::channel(8);
    let started = tokio::time::Instant::now();
    scheduler.schedule(job("a", "chai"), Duration::from_secs(60));
    assert!(scheduler.is_scheduled("a"));
    assert_eq!(scheduler.len(), 1);

    let fired = tokio::time::timeout(Duration::from_secs(120), fired_rx.recv())
        .await
        .expect("job should fire")
        .expect("channel open");
    assert_eq!(fired.message, "chai");
    assert!(started.elapsed() >= Duration::from_secs(60));
    assert!(!scheduler.is_scheduled("a"));
    assert!(scheduler.is_empty());

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert!(fired_rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn cancelled_job_never_fires() {
    let (scheduler, mut fired_rx) = ReminderScheduler::channel(8);
    scheduler.schedule(job("a", "chai"), Duration::from_secs(10));

    assert!(scheduler.cancel("a"));
    assert!(!scheduler.cancel("a"));
    assert!(!scheduler.is_scheduled("a"));

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(fired_rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn rescheduling_a_name_replaces_the_job() {
    let (scheduler, mut fired_rx) = ReminderScheduler::channel(8);
    scheduler.schedule(job("a", "first"), Duration::from_secs(10));
    scheduler.schedule(job("a", "second"), Duration::from_secs(20));
    assert_eq!(scheduler.len(), 1);

    tokio::time::sleep(Duration::from_secs(30)).await;
    let fired = fired_rx.try_recv().expect("replacement should fire");
    assert_eq!(fired.message, "second");
    assert!(fired_rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn past_deadline_fires_immediately() {
    let (scheduler, mut fired_rx) = ReminderScheduler::channel(8);
    let now = Utc::now();
    scheduler.schedule_at(job("late", "missed"), now - TimeDelta::minutes(5), now);

    let fired = tokio::time::timeout(Duration::from_secs(1), fired_rx.recv())
        .await
        .expect("job should fire")
        .expect("channel open");
    assert_eq!(fired.name, "late");
}

#[tokio::test(start_paused = true)]
async fn cancel_all_clears_the_registry() {
    let (scheduler, mut fired_rx) = ReminderScheduler::channel(8);
    scheduler.schedule(job("a", "one"), Duration::from_secs(10));
    scheduler.schedule(job("b", "two"), Duration::from_secs(20));

    scheduler.cancel_all();
    assert!(scheduler.is_empty());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(fired_rx.try_recv().is_err());
}

//! Fixtures shared by the reminder tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use astranote::delivery::email::{EmailError, EmailSender, OutgoingEmail};
use astranote::delivery::{Delivery, TelegramOutbound};
use astranote::reminders::ReminderService;
use astranote::scheduler::{ReminderJob, ReminderScheduler};
use astranote::store::Store;

/// Email sender that records messages, or rejects them all.
#[derive(Default)]
pub struct RecordingEmail {
    pub sent: Mutex<Vec<OutgoingEmail>>,
    pub reject: bool,
}

impl RecordingEmail {
    pub fn rejecting() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            reject: true,
        }
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EmailSender for RecordingEmail {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError> {
        if self.reject {
            return Err(EmailError::HttpStatus {
                status: 422,
                body: "invalid recipient".to_owned(),
            });
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(email.clone());
        }
        Ok(())
    }
}

/// A wired-up service plus the queues it writes to.
pub struct Harness {
    pub store: Store,
    pub service: Arc<ReminderService>,
    pub telegram_rx: mpsc::Receiver<TelegramOutbound>,
    pub fired_rx: mpsc::Receiver<ReminderJob>,
}

pub async fn harness(email: Option<Arc<dyn EmailSender>>) -> Harness {
    let store = Store::in_memory().await.expect("in-memory store should open");
    let (telegram_tx, telegram_rx) = mpsc::channel(16);
    let (scheduler, fired_rx) = ReminderScheduler::channel(16);
    let delivery = Delivery::new(store.clone(), telegram_tx, email);
    let service = Arc::new(ReminderService::new(store.clone(), scheduler, delivery));
    Harness {
        store,
        service,
        telegram_rx,
        fired_rx,
    }
}

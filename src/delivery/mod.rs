//! Fan-out of fired reminders to a user's verified channels.
//!
//! Telegram messages are queued on the outbound channel drained by the bot
//! adapter; emails go through an [`email::EmailSender`]. A user with no
//! verified channel still gets the reminder in the originating chat.

pub mod email;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::store::{ChannelKind, Store};
use crate::telegram::ui::escape_html;

use self::email::{reminder_email, EmailSender};

/// A message queued for the Telegram bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramOutbound {
    /// Destination chat.
    pub chat_id: i64,
    /// HTML-formatted text.
    pub text: String,
}

/// Per-reminder delivery tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Channels the reminder was handed to.
    pub delivered: usize,
    /// Channels that failed.
    pub failed: usize,
}

/// Telegram text for a fired reminder.
pub fn reminder_text(message: &str) -> String {
    format!("\u{23F0} <b>Reminder:</b>\n{}", escape_html(message))
}

/// Delivers reminders to every verified channel of a chat.
#[derive(Clone)]
pub struct Delivery {
    store: Store,
    telegram_tx: mpsc::Sender<TelegramOutbound>,
    email: Option<Arc<dyn EmailSender>>,
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("email", &self.email.is_some())
            .finish_non_exhaustive()
    }
}

impl Delivery {
    /// Delivery over the given outbound queue and optional email sender.
    pub fn new(
        store: Store,
        telegram_tx: mpsc::Sender<TelegramOutbound>,
        email: Option<Arc<dyn EmailSender>>,
    ) -> Self {
        Self {
            store,
            telegram_tx,
            email,
        }
    }

    /// Queue an arbitrary HTML message for `chat_id`.
    pub async fn send_telegram(&self, chat_id: i64, text: String) -> bool {
        match self
            .telegram_tx
            .send(TelegramOutbound { chat_id, text })
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(chat_id, error = %e, "telegram outbound queue closed");
                false
            }
        }
    }

    /// Send `message` to every verified channel of `chat_id`.
    ///
    /// Falls back to the originating chat when the user has no verified
    /// channel or the channel lookup fails.
    pub async fn deliver(&self, chat_id: i64, message: &str) -> DeliveryReport {
        let channels = match self.store.verified_channels(chat_id).await {
            Ok(channels) => channels,
            Err(e) => {
                warn!(chat_id, error = %e, "channel lookup failed, delivering to chat");
                Vec::new()
            }
        };

        let mut report = DeliveryReport::default();
        if channels.is_empty() {
            tally(&mut report, self.send_telegram(chat_id, reminder_text(message)).await);
            return report;
        }

        for channel in channels {
            let ok = match channel.kind {
                ChannelKind::Telegram => match channel.address.parse::<i64>() {
                    Ok(target) => self.send_telegram(target, reminder_text(message)).await,
                    Err(_) => {
                        warn!(chat_id, address = %channel.address, "telegram channel has a non-numeric chat id");
                        false
                    }
                },
                ChannelKind::Email => self.send_email(&channel.address, message).await,
            };
            debug!(chat_id, channel = channel.kind.as_str(), ok, "reminder delivery attempt");
            tally(&mut report, ok);
        }
        report
    }

    async fn send_email(&self, address: &str, message: &str) -> bool {
        let Some(sender) = &self.email else {
            warn!("email channel is verified but no email sender is configured");
            return false;
        };
        match sender.send(&reminder_email(address, message)).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "reminder email failed");
                false
            }
        }
    }
}

fn tally(report: &mut DeliveryReport, ok: bool) {
    if ok {
        report.delivered = report.delivered.saturating_add(1);
    } else {
        report.failed = report.failed.saturating_add(1);
    }
}

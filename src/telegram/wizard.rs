//! Multi-step conversations: channel signup and step-by-step reminders.
//!
//! Each chat has at most one active [`Conversation`], held in
//! [`Conversations`]. Plain (non-command) messages are routed to
//! [`advance`], which moves the chat to its next step and returns the reply.
//! Starting a new flow replaces whatever flow the chat was in.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, warn};

use crate::delivery::email::otp_email;
use crate::otp::OtpResult;
use crate::reminders::ReminderError;
use crate::store::ChannelKind;
use crate::telegram::commands::require_verified;
use crate::telegram::ui::{escape_html, format_channels, format_countdown, Reply};
use crate::telegram::BotContext;

/// Minimum length of a step-by-step reminder message, in characters.
pub const MIN_TEXT_CHARS: usize = 3;

const YES_NO: &[&str] = &["Haan", "Nahi"];
const UPDATE_CHOICES: &[&str] = &["Haan, update karo", "Nahi, rehne do"];
const CONFIRM_CHOICES: &[&str] = &["\u{2705} Confirm", "\u{274C} Cancel"];

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Where a chat is in the signup flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignupStep {
    /// Asked whether to deliver to this Telegram chat.
    ChooseTelegram {
        /// The chat already had channels and is updating them.
        updating: bool,
    },
    /// Asked whether to add an email channel.
    ChooseEmail,
    /// Waiting for the email address.
    AskEmail,
    /// Waiting for the code sent to the address.
    AskOtp,
}

/// Where a chat is in the step-by-step reminder flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemindStep {
    /// Waiting for the reminder message.
    AskText,
    /// Waiting for the date.
    AskDate {
        /// Message collected so far.
        text: String,
    },
    /// Waiting for the time of day.
    AskTime {
        /// Message collected so far.
        text: String,
        /// Chosen date.
        date: NaiveDate,
    },
    /// Waiting for confirmation.
    Confirm {
        /// Reminder message.
        text: String,
        /// Chosen instant.
        when: DateTime<Tz>,
    },
}

/// An active multi-step flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conversation {
    /// Channel signup.
    Signup(SignupStep),
    /// Step-by-step reminder.
    Remind(RemindStep),
}

/// Active conversations keyed by chat id.
#[derive(Debug, Default)]
pub struct Conversations {
    active: Mutex<HashMap<i64, Conversation>>,
}

impl Conversations {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current step of `chat_id`, if any.
    pub fn get(&self, chat_id: i64) -> Option<Conversation> {
        self.active.lock().ok().and_then(|map| map.get(&chat_id).cloned())
    }

    /// Move `chat_id` to `conversation`.
    pub fn set(&self, chat_id: i64, conversation: Conversation) {
        if let Ok(mut map) = self.active.lock() {
            map.insert(chat_id, conversation);
        }
    }

    /// End the conversation of `chat_id`, returning its last step.
    pub fn end(&self, chat_id: i64) -> Option<Conversation> {
        self.active.lock().ok().and_then(|mut map| map.remove(&chat_id))
    }

    /// Number of chats mid-conversation.
    pub fn len(&self) -> usize {
        self.active.lock().map_or(0, |map| map.len())
    }

    /// Whether no chat is mid-conversation.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Answer classification
// ---------------------------------------------------------------------------

fn is_negative(answer: &str) -> bool {
    let lower = answer.trim().to_lowercase();
    let first = lower.split(',').next().unwrap_or_default();
    first.contains("nahi")
        || first.starts_with("no")
        || lower.contains("rehne")
        || lower.contains("cancel")
        || lower.contains('\u{274C}')
}

fn is_affirmative(answer: &str) -> bool {
    let lower = answer.trim().to_lowercase();
    !is_negative(&lower)
        && (lower.starts_with("haa")
            || lower.starts_with("yes")
            || lower == "y"
            || lower.contains("update")
            || lower.contains("confirm")
            || lower.contains('\u{2705}'))
}

/// Loose address check: one `@`, non-empty local part, dotted domain.
pub fn is_valid_email(address: &str) -> bool {
    let address = address.trim();
    if address.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = address.rsplit_once('@') else {
        return false;
    };
    !local.is_empty()
        && !local.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// `/signup`: begin (or restart) the signup flow.
pub async fn start_signup(ctx: &BotContext, chat_id: i64) -> anyhow::Result<Reply> {
    ctx.otp.clear(chat_id);
    let channels = ctx
        .store
        .channels(chat_id)
        .await
        .context("failed to load channels")?;
    info!(chat_id, existing = channels.len(), "signup started");

    if channels.is_empty() {
        ctx.conversations
            .set(chat_id, Conversation::Signup(SignupStep::ChooseTelegram { updating: false }));
        return Ok(Reply::with_choices(
            "\u{1F44B} Let's set up your reminder channels.\n\n\
             \u{1F4F1} Do you want reminders on <b>Telegram</b> (this chat)?",
            YES_NO,
        ));
    }

    ctx.conversations
        .set(chat_id, Conversation::Signup(SignupStep::ChooseTelegram { updating: true }));
    Ok(Reply::with_choices(
        format!(
            "\u{1F4CB} Your current channels:\n\n{}\n\n\u{1F4A1} Do you want to update them?",
            format_channels(&channels)
        ),
        UPDATE_CHOICES,
    ))
}

/// `/signupcancel`: abort signup and discard any pending code.
pub fn cancel_signup(ctx: &BotContext, chat_id: i64) -> Reply {
    ctx.otp.clear(chat_id);
    if matches!(ctx.conversations.get(chat_id), Some(Conversation::Signup(_))) {
        ctx.conversations.end(chat_id);
    }
    info!(chat_id, "signup cancelled");
    Reply::removing_keyboard(
        "\u{274C} Signup cancelled.\n\nSend /signup any time to start again.",
    )
}

/// `/remindstep`: begin the step-by-step reminder flow.
pub async fn start_remind(ctx: &BotContext, chat_id: i64) -> anyhow::Result<Reply> {
    if let Some(refusal) = require_verified(ctx, chat_id).await? {
        return Ok(refusal);
    }
    ctx.conversations
        .set(chat_id, Conversation::Remind(RemindStep::AskText));
    info!(chat_id, "step-by-step reminder started");
    Ok(Reply::removing_keyboard(
        "\u{1F4DD} What should I remind you about?\n\n\
         Examples:\n\
         \u{2022} Pani peena\n\
         \u{2022} Meeting attend karna\n\
         \u{2022} Gym jana\n\
         \u{2022} Medicine lena",
    ))
}

/// `/remindcancel`: abort the step-by-step flow.
pub fn cancel_remind(ctx: &BotContext, chat_id: i64) -> Reply {
    if matches!(ctx.conversations.get(chat_id), Some(Conversation::Remind(_))) {
        ctx.conversations.end(chat_id);
    }
    info!(chat_id, "step-by-step reminder cancelled");
    Reply::removing_keyboard(
        "\u{274C} Reminder setup cancelled.\n\nSend /remind or /remindstep to start again.",
    )
}

/// Feed a plain message to the chat's active conversation.
///
/// Returns `None` when the chat is not in a conversation.
pub async fn advance(
    ctx: &BotContext,
    chat_id: i64,
    text: &str,
    now: DateTime<Utc>,
) -> anyhow::Result<Option<Reply>> {
    let Some(conversation) = ctx.conversations.get(chat_id) else {
        return Ok(None);
    };
    debug!(chat_id, step = ?conversation, "conversation step");

    let reply = match conversation {
        Conversation::Signup(step) => signup_step(ctx, chat_id, step, text, now).await?,
        Conversation::Remind(step) => remind_step(ctx, chat_id, step, text, now).await?,
    };
    Ok(Some(reply))
}

// ---------------------------------------------------------------------------
// Signup
// ---------------------------------------------------------------------------

async fn signup_step(
    ctx: &BotContext,
    chat_id: i64,
    step: SignupStep,
    text: &str,
    now: DateTime<Utc>,
) -> anyhow::Result<Reply> {
    match step {
        SignupStep::ChooseTelegram { updating } => {
            if updating && is_negative(text) {
                ctx.conversations.end(chat_id);
                return Ok(Reply::removing_keyboard(
                    "\u{1F44D} OK, your channels stay the same.",
                ));
            }

            let note = if is_affirmative(text) {
                ctx.store
                    .save_channel(chat_id, ChannelKind::Telegram, &chat_id.to_string(), true)
                    .await
                    .context("failed to save telegram channel")?;
                "\u{2705} Telegram channel added."
            } else if !updating {
                ctx.store
                    .delete_channel(chat_id, ChannelKind::Telegram)
                    .await
                    .context("failed to remove telegram channel")?;
                "\u{274C} Telegram skipped."
            } else {
                "\u{1F44C} Telegram channel unchanged."
            };

            ctx.conversations
                .set(chat_id, Conversation::Signup(SignupStep::ChooseEmail));
            Ok(Reply::with_choices(
                format!("{note}\n\n\u{1F4E7} Do you also want reminders by <b>Email</b>?"),
                YES_NO,
            ))
        }

        SignupStep::ChooseEmail => {
            if is_affirmative(text) {
                ctx.conversations
                    .set(chat_id, Conversation::Signup(SignupStep::AskEmail));
                return Ok(Reply::removing_keyboard(
                    "\u{2709}\u{FE0F} Send your <b>email address</b>.\n\nExample: example@gmail.com",
                ));
            }
            ctx.conversations.end(chat_id);
            signup_complete(ctx, chat_id, "\u{2705} Signup complete!").await
        }

        SignupStep::AskEmail => {
            let address = text.trim();
            if !is_valid_email(address) {
                return Ok(Reply::text(
                    "\u{274C} That doesn't look like an email address.\n\nExample: example@gmail.com",
                ));
            }

            let Some(sender) = ctx.email.as_ref() else {
                ctx.conversations.end(chat_id);
                warn!(chat_id, "email signup attempted but no email sender is configured");
                return Ok(Reply::removing_keyboard(
                    "\u{274C} Email delivery is not configured on this bot.\n\n\
                     Send /signup to choose Telegram only.",
                ));
            };

            let code = ctx.otp.issue(chat_id, ChannelKind::Email, address, now);
            let minutes = ctx.otp.expiry().num_minutes();
            match sender.send(&otp_email(address, &code, minutes)).await {
                Ok(()) => {
                    info!(chat_id, "verification email sent");
                    ctx.conversations
                        .set(chat_id, Conversation::Signup(SignupStep::AskOtp));
                    Ok(Reply::removing_keyboard(format!(
                        "\u{2705} A code was sent to {}.\n\n\
                         \u{23F0} It expires in <b>{minutes} minutes</b>.\n\
                         \u{1F510} Type the code here.",
                        escape_html(address)
                    )))
                }
                Err(e) => {
                    warn!(chat_id, error = %e, "verification email failed");
                    ctx.otp.clear(chat_id);
                    ctx.conversations.end(chat_id);
                    Ok(Reply::removing_keyboard(
                        "\u{274C} Couldn't send the email.\n\n\
                         Check the address and send /signup to try again.",
                    ))
                }
            }
        }

        SignupStep::AskOtp => match ctx.otp.verify(chat_id, text, now) {
            OtpResult::Verified { kind, address } => {
                ctx.store
                    .save_channel(chat_id, kind, &address, true)
                    .await
                    .context("failed to save verified channel")?;
                ctx.conversations.end(chat_id);
                info!(chat_id, channel = kind.as_str(), "channel verified");
                signup_complete(ctx, chat_id, "\u{2705} Email verified!\n\n\u{1F389} Signup complete!")
                    .await
            }
            OtpResult::WrongCode { remaining } => Ok(Reply::text(format!(
                "\u{274C} Wrong code. {remaining} attempt(s) left."
            ))),
            OtpResult::TooManyAttempts => {
                ctx.conversations.end(chat_id);
                Ok(Reply::text(
                    "\u{274C} Too many wrong attempts. Send /signup to try again.",
                ))
            }
            OtpResult::Expired => {
                ctx.conversations.end(chat_id);
                Ok(Reply::text(
                    "\u{274C} The code expired. Send /signup to get a new one.",
                ))
            }
            OtpResult::NotFound => {
                ctx.conversations.end(chat_id);
                Ok(Reply::text(
                    "\u{274C} No code is pending. Send /signup to start again.",
                ))
            }
        },
    }
}

async fn signup_complete(ctx: &BotContext, chat_id: i64, headline: &str) -> anyhow::Result<Reply> {
    let channels = ctx
        .store
        .channels(chat_id)
        .await
        .context("failed to load channels")?;
    let hint = if channels.iter().any(|c| c.verified) {
        "\u{1F4A1} Use /remind to set a reminder."
    } else {
        "\u{26A0}\u{FE0F} No channel is active yet. Send /signup to add one."
    };
    Ok(Reply::removing_keyboard(format!(
        "{headline}\n\n\u{1F4CB} <b>Your channels:</b>\n{}\n\n{hint}",
        format_channels(&channels)
    )))
}

// ---------------------------------------------------------------------------
// Step-by-step reminder
// ---------------------------------------------------------------------------

async fn remind_step(
    ctx: &BotContext,
    chat_id: i64,
    step: RemindStep,
    text: &str,
    now: DateTime<Utc>,
) -> anyhow::Result<Reply> {
    let input = text.trim();
    let local_now = now.with_timezone(&ctx.timezone);

    match step {
        RemindStep::AskText => {
            if input.chars().count() < MIN_TEXT_CHARS {
                return Ok(Reply::text(format!(
                    "\u{274C} Write a slightly longer reminder (at least {MIN_TEXT_CHARS} characters)."
                )));
            }
            ctx.conversations.set(
                chat_id,
                Conversation::Remind(RemindStep::AskDate {
                    text: input.to_owned(),
                }),
            );
            Ok(Reply::text(format!(
                "\u{2705} Text saved: {}\n\n\
                 \u{1F4C5} What <b>date</b>?\n\n\
                 Format: YYYY-MM-DD\nExample: {}",
                escape_html(input),
                local_now.format("%Y-%m-%d")
            )))
        }

        RemindStep::AskDate { text } => {
            let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") else {
                return Ok(Reply::text(
                    "\u{274C} Wrong date format.\n\nUse YYYY-MM-DD, for example 2025-11-22.",
                ));
            };
            if date < local_now.date_naive() {
                return Ok(Reply::text(
                    "\u{274C} That date is in the past. Give today or a later date.",
                ));
            }
            ctx.conversations
                .set(chat_id, Conversation::Remind(RemindStep::AskTime { text, date }));
            Ok(Reply::text(format!(
                "\u{2705} Date saved: {date}\n\n\
                 \u{23F0} What <b>time</b>?\n\n\
                 Format: HH:MM (24-hour)\n\
                 \u{2022} 09:30 (subah 9:30)\n\
                 \u{2022} 14:00 (dopahar 2:00)\n\
                 \u{2022} 18:45 (shaam 6:45)"
            )))
        }

        RemindStep::AskTime { text, date } => {
            let Ok(time) = NaiveTime::parse_from_str(input, "%H:%M") else {
                return Ok(Reply::text(
                    "\u{274C} Wrong time format.\n\nUse HH:MM, for example 14:30.",
                ));
            };
            let Some(when) = ctx
                .timezone
                .from_local_datetime(&date.and_time(time))
                .earliest()
            else {
                return Ok(Reply::text(
                    "\u{274C} That time doesn't exist on that date. Pick another time.",
                ));
            };
            if when <= local_now {
                let ago = local_now.signed_duration_since(when).num_minutes();
                return Ok(Reply::text(format!(
                    "\u{274C} That time already passed ({ago} minutes ago). Give a future time."
                )));
            }

            let countdown = format_countdown(when.signed_duration_since(local_now).num_seconds())
                .unwrap_or_else(|| "0m".to_owned());
            let reply = Reply::with_choices(
                format!(
                    "\u{1F4CB} <b>Confirmation</b>\n\n\
                     \u{1F4DD} Text: {}\n\
                     \u{1F4C5} Date: {date}\n\
                     \u{23F0} Time: {}\n\
                     \u{1F55C} Fires in {countdown}\n\n\
                     Confirm or cancel?",
                    escape_html(&text),
                    time.format("%H:%M"),
                ),
                CONFIRM_CHOICES,
            );
            ctx.conversations
                .set(chat_id, Conversation::Remind(RemindStep::Confirm { text, when }));
            Ok(reply)
        }

        RemindStep::Confirm { text, when } => {
            if is_negative(input) {
                ctx.conversations.end(chat_id);
                return Ok(Reply::removing_keyboard(
                    "\u{274C} Reminder cancelled.\n\nSend /remind or /remindstep for a new one.",
                ));
            }
            if !is_affirmative(input) {
                return Ok(Reply::with_choices(
                    "Tap \u{2705} Confirm or \u{274C} Cancel.",
                    CONFIRM_CHOICES,
                ));
            }

            ctx.conversations.end(chat_id);
            match ctx
                .reminders
                .create(chat_id, when.with_timezone(&Utc), &text, now)
                .await
            {
                Ok(reminder) => Ok(Reply::removing_keyboard(format!(
                    "\u{2705} <b>Reminder set!</b>\n\n\
                     \u{1F194} ID: {id}\n\
                     \u{1F4DD} Text: {}\n\
                     \u{23F0} Time: {}\n\n\
                     \u{2022} /list \u{2014} pending reminders\n\
                     \u{2022} /cancel {id} \u{2014} cancel this one",
                    escape_html(&reminder.message),
                    when.format("%Y-%m-%d %H:%M"),
                    id = reminder.id,
                ))),
                Err(ReminderError::NotInFuture { .. }) => Ok(Reply::removing_keyboard(
                    "\u{274C} That time passed while confirming. Send /remindstep to try again.",
                )),
                Err(e) => Err(e).context("failed to create reminder"),
            }
        }
    }
}

//! Telegram slash command handlers.
//!
//! Each function handles one command and returns a [`Reply`] whose text is
//! HTML. Handlers take the current time as a parameter so they can be
//! driven from tests without a clock.

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::parser::{ParseOutcome, ParseRequest};
use crate::reminders::{ReminderError, TEST_REMINDER_DELAY};
use crate::telegram::ui::{escape_html, format_channels, format_countdown, format_when, Reply};
use crate::telegram::BotContext;

/// Reply sent to users without a verified channel.
pub const SIGNUP_REQUIRED: &str = "\u{274C} Pehle signup + verify kar lo: /signup\n\n\
Reminders can only be set once at least one delivery channel is verified.";

/// List all available commands.
pub fn handle_help() -> String {
    [
        "<b>AstraNote commands:</b>",
        "",
        "/start \u{2014} status and your channels",
        "/signup \u{2014} choose where reminders are delivered",
        "/signupcancel \u{2014} abort signup",
        "/remind &lt;text&gt; \u{2014} set a reminder in plain words",
        "/remindstep \u{2014} set a reminder step by step",
        "/remindcancel \u{2014} abort the step-by-step flow",
        "/list \u{2014} pending reminders",
        "/cancel &lt;id&gt; \u{2014} cancel a reminder",
        "/testremind \u{2014} 20-second test reminder",
        "/help \u{2014} show this message",
    ]
    .join("\n")
}

/// Greeting plus the chat's channel summary.
pub async fn handle_start(ctx: &BotContext, chat_id: i64) -> anyhow::Result<Reply> {
    let verified = ctx
        .store
        .is_user_verified(chat_id)
        .await
        .context("failed to check verification")?;

    if !verified {
        return Ok(Reply::text(
            "Hello! \u{1F44B}\n\n\
             Pehle signup complete karo, so I know where to send your reminders.\n\n\
             Send /signup to begin.",
        ));
    }

    let channels = ctx
        .store
        .channels(chat_id)
        .await
        .context("failed to load channels")?;
    Ok(Reply::text(format!(
        "Hello! \u{1F44B}\n\n\
         You are signed up and verified.\n\n\
         <b>Your channels:</b>\n{}\n\n\
         \u{2022} /remind \u{2014} new reminder\n\
         \u{2022} /testremind \u{2014} 20-second test reminder\n\
         \u{2022} /list \u{2014} pending reminders\n\
         \u{2022} /cancel &lt;id&gt; \u{2014} cancel a reminder\n\
         \u{2022} /signup \u{2014} change channels",
        format_channels(&channels)
    )))
}

/// `None` when the chat may set reminders, otherwise the refusal.
pub async fn require_verified(ctx: &BotContext, chat_id: i64) -> anyhow::Result<Option<Reply>> {
    let verified = ctx
        .store
        .is_user_verified(chat_id)
        .await
        .context("failed to check verification")?;
    Ok((!verified).then(|| Reply::text(SIGNUP_REQUIRED)))
}

/// Usage text for `/remind` without arguments.
pub fn remind_usage() -> String {
    [
        "\u{1F916} <b>Natural language reminder</b>",
        "",
        "Examples:",
        "\u{2022} <code>/remind 10 min baad meeting attend karna</code>",
        "\u{2022} <code>/remind kal shaam 5 baje gym jana</code>",
        "\u{2022} <code>/remind tomorrow 9am call karna</code>",
        "\u{2022} <code>/remind 2 hours baad khaana banana</code>",
        "\u{2022} <code>/remind next monday 10am presentation</code>",
        "",
        "\u{1F4A1} Or use /remindstep to go step by step.",
    ]
    .join("\n")
}

/// Parse `text` and schedule the reminder it describes.
///
/// The parse runs under the configured timeout; a timeout is reported to
/// the user like any other failure.
pub async fn handle_remind(
    ctx: &BotContext,
    chat_id: i64,
    text: &str,
    now: DateTime<Utc>,
) -> anyhow::Result<Reply> {
    if let Some(refusal) = require_verified(ctx, chat_id).await? {
        return Ok(refusal);
    }
    let text = text.trim();
    if text.is_empty() {
        return Ok(Reply::text(remind_usage()));
    }
    info!(chat_id, text, "natural language reminder requested");

    let request = ParseRequest::new(text, now.with_timezone(&ctx.timezone));
    let outcome = match tokio::time::timeout(ctx.parse_timeout, ctx.parser.parse(&request)).await {
        Ok(outcome) => outcome,
        Err(_) => {
            warn!(chat_id, timeout_secs = ctx.parse_timeout.as_secs(), "reminder parse timed out");
            return Ok(Reply::text(
                "\u{274C} Parsing took too long. Try a simpler phrasing or /remindstep.",
            ));
        }
    };

    let (when, message, resolved_by) = match outcome {
        ParseOutcome::Resolved {
            when,
            message,
            resolved_by,
        } => (when, message, resolved_by),
        ParseOutcome::Failed { reason, cause } => {
            info!(chat_id, cause = ?cause, "reminder text not understood");
            return Ok(Reply::text(format!("\u{274C} {}", escape_html(&reason))));
        }
    };

    let reminder = match ctx
        .reminders
        .create(chat_id, when.with_timezone(&Utc), &message, now)
        .await
    {
        Ok(reminder) => reminder,
        Err(ReminderError::NotInFuture { .. }) => {
            return Ok(Reply::text(
                "\u{274C} That time has already passed. Give a future time.",
            ));
        }
        Err(e) => return Err(e).context("failed to create reminder"),
    };

    let countdown = format_countdown(when.with_timezone(&Utc).signed_duration_since(now).num_seconds())
        .unwrap_or_else(|| "0m".to_owned());
    Ok(Reply::text(format!(
        "\u{2705} <b>Reminder set!</b>\n\n\
         \u{1F194} ID: {id}\n\
         \u{1F4DD} Text: {text}\n\
         \u{23F0} Time: {time}\n\
         \u{1F55C} Fires in {countdown}\n\
         {provenance}\n\n\
         \u{2022} /list \u{2014} pending reminders\n\
         \u{2022} /cancel {id} \u{2014} cancel this one",
        id = reminder.id,
        text = escape_html(&reminder.message),
        time = format_when(&when),
        provenance = resolved_by.label(),
    )))
}

/// List the chat's pending reminders, soonest first.
pub async fn handle_list(ctx: &BotContext, chat_id: i64, now: DateTime<Utc>) -> anyhow::Result<Reply> {
    if let Some(refusal) = require_verified(ctx, chat_id).await? {
        return Ok(refusal);
    }

    let reminders = ctx.reminders.list(chat_id).await.context("failed to list reminders")?;
    if reminders.is_empty() {
        return Ok(Reply::text(
            "\u{1F4ED} No pending reminders.\n\n\
             \u{2022} /remind \u{2014} natural language reminder\n\
             \u{2022} /remindstep \u{2014} step-by-step reminder",
        ));
    }

    let mut lines = vec![format!(
        "\u{1F4CB} <b>Your pending reminders ({}):</b>\n",
        reminders.len()
    )];
    for reminder in &reminders {
        let status = match format_countdown(reminder.run_at.signed_duration_since(now).num_seconds()) {
            Some(left) => format!("\u{1F55C} in {left}"),
            None => "\u{26A0}\u{FE0F} time passed".to_owned(),
        };
        lines.push(format!(
            "\u{1F194} ID: {}\n\u{1F4DD} {}\n\u{23F0} {}\n{status}\n",
            reminder.id,
            escape_html(&reminder.message),
            format_when(&reminder.run_at.with_timezone(&ctx.timezone)),
        ));
    }
    lines.push("\u{1F4A1} Cancel with /cancel &lt;id&gt;".to_owned());
    Ok(Reply::text(lines.join("\n")))
}

/// Cancel the reminder whose id is the first argument.
pub async fn handle_cancel(ctx: &BotContext, chat_id: i64, args: &str) -> anyhow::Result<Reply> {
    if let Some(refusal) = require_verified(ctx, chat_id).await? {
        return Ok(refusal);
    }

    let Some(arg) = args.split_whitespace().next() else {
        return Ok(Reply::text(
            "\u{274C} Give a reminder ID.\n\n\
             Usage: /cancel &lt;reminder_id&gt;\n\
             Example: /cancel 5\n\n\
             \u{1F4A1} /list shows the IDs.",
        ));
    };
    let Ok(id) = arg.parse::<i64>() else {
        return Ok(Reply::text(
            "\u{274C} The reminder ID must be a number.\n\nExample: /cancel 5",
        ));
    };

    match ctx.reminders.cancel(chat_id, id).await {
        Ok(_) => Ok(Reply::text(format!(
            "\u{2705} Reminder {id} cancelled.\n\n\u{1F4A1} /list shows the rest."
        ))),
        Err(ReminderError::NotFound { .. }) => Ok(Reply::text(format!(
            "\u{274C} No reminder with ID {id}.\n\n\u{1F4A1} Check /list for pending reminders."
        ))),
        Err(e) => Err(e).context("failed to cancel reminder"),
    }
}

/// Schedule an unpersisted reminder a few seconds out.
pub fn handle_test_remind(ctx: &BotContext, chat_id: i64) -> Reply {
    let job = ctx.reminders.schedule_test(chat_id);
    info!(chat_id, job = %job.name, "test reminder scheduled");
    Reply::text(format!(
        "\u{23F3} Test reminder scheduled. It arrives in {} seconds on all your channels.",
        TEST_REMINDER_DELAY.as_secs()
    ))
}

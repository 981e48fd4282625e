//! Telegram adapter: UI formatting, slash commands, wizards, and the bot dispatcher.
//!
//! Inbound messages are either slash commands (handled by [`commands`] and
//! the wizard entry points) or plain text fed to the chat's active
//! conversation in [`wizard`]. Fired reminders reach Telegram through an
//! outbound queue drained by a dedicated task.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use chrono_tz::Tz;
use teloxide::dispatching::UpdateFilterExt;
use teloxide::prelude::*;
use teloxide::types::{BotCommand, ParseMode};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::delivery::email::EmailSender;
use crate::delivery::TelegramOutbound;
use crate::otp::OtpStore;
use crate::parser::ReminderParser;
use crate::reminders::ReminderService;
use crate::store::Store;

use self::ui::{render_keyboard, Reply};
use self::wizard::Conversations;

pub mod commands;
pub mod ui;
pub mod wizard;

/// Placeholder shown while a `/remind` text is being parsed.
pub const PARSING_PLACEHOLDER: &str = "\u{1F504} Parsing reminder...";

// ---------------------------------------------------------------------------
// Shared state for handler injection
// ---------------------------------------------------------------------------

/// Dependencies shared by every handler, injected via `dptree::deps!`.
#[derive(Clone)]
pub struct BotContext {
    /// Channel and reminder persistence.
    pub store: Store,
    /// Pending one-time codes.
    pub otp: Arc<OtpStore>,
    /// Natural-language parser.
    pub parser: Arc<ReminderParser>,
    /// Reminder lifecycle.
    pub reminders: Arc<ReminderService>,
    /// Email transport for verification codes; `None` disables email signup.
    pub email: Option<Arc<dyn EmailSender>>,
    /// Per-chat wizard state.
    pub conversations: Arc<Conversations>,
    /// Zone user-facing times are read and shown in.
    pub timezone: Tz,
    /// Upper bound on one `/remind` parse.
    pub parse_timeout: Duration,
}

impl std::fmt::Debug for BotContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotContext")
            .field("timezone", &self.timezone)
            .field("parse_timeout", &self.parse_timeout)
            .field("email", &self.email.is_some())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Public entry point
// ---------------------------------------------------------------------------

/// Commands registered in the bot menu.
pub fn command_menu() -> Vec<BotCommand> {
    [
        ("start", "Status and your channels"),
        ("help", "List commands"),
        ("signup", "Choose where reminders are delivered"),
        ("signupcancel", "Abort signup"),
        ("remind", "Set a reminder in plain words"),
        ("remindstep", "Set a reminder step by step"),
        ("remindcancel", "Abort the step-by-step flow"),
        ("list", "Pending reminders"),
        ("cancel", "Cancel a reminder by ID"),
        ("testremind", "20-second test reminder"),
    ]
    .into_iter()
    .map(|(name, description)| BotCommand::new(name, description))
    .collect()
}

/// Run the Telegram bot.
///
/// Spawns the outbound sender, registers the command menu, and then
/// dispatches updates until the bot is stopped (Ctrl+C).
pub async fn run_telegram(
    bot_token: &str,
    ctx: BotContext,
    mut outbound_rx: mpsc::Receiver<TelegramOutbound>,
) -> anyhow::Result<()> {
    let bot = Bot::new(bot_token);

    let outbound_bot = bot.clone();
    let _outbound_handle = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            if let Err(e) = outbound_bot
                .send_message(ChatId(msg.chat_id), msg.text)
                .parse_mode(ParseMode::Html)
                .await
            {
                warn!(chat_id = msg.chat_id, error = %e, "failed to send telegram message");
            }
        }
        debug!("telegram outbound queue closed");
    });

    if let Err(e) = bot.set_my_commands(command_menu()).await {
        warn!(error = %e, "failed to register command menu");
    }

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handle_message));

    info!("telegram dispatcher starting");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![ctx])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("telegram dispatcher stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// Message handler
// ---------------------------------------------------------------------------

async fn send_reply(bot: &Bot, chat: ChatId, reply: Reply) -> ResponseResult<()> {
    let mut req = bot.send_message(chat, reply.text).parse_mode(ParseMode::Html);
    if let Some(markup) = render_keyboard(&reply.keyboard) {
        req = req.reply_markup(markup);
    }
    req.await?;
    Ok(())
}

fn error_reply(chat_id: i64, error: &anyhow::Error) -> Reply {
    warn!(chat_id, error = %format!("{error:#}"), "telegram handler failed");
    Reply::text("\u{26A0}\u{FE0F} Something went wrong. Please try again.")
}

/// Handle an incoming Telegram message.
async fn handle_message(bot: Bot, msg: Message, ctx: BotContext) -> ResponseResult<()> {
    let chat_id = msg.chat.id.0;
    let Some(text) = msg.text() else {
        debug!(chat_id, "non-text message ignored");
        return Ok(());
    };
    debug!(chat_id, "telegram message received");

    let now = Utc::now();

    if let Some((command, args)) = split_command(text) {
        if command == "remind" && !args.is_empty() {
            let pending = bot.send_message(msg.chat.id, PARSING_PLACEHOLDER).await?;
            let reply = commands::handle_remind(&ctx, chat_id, args, now)
                .await
                .unwrap_or_else(|e| error_reply(chat_id, &e));
            bot.edit_message_text(msg.chat.id, pending.id, reply.text)
                .parse_mode(ParseMode::Html)
                .await?;
            return Ok(());
        }

        let reply = dispatch_command(&ctx, chat_id, command, args, now)
            .await
            .unwrap_or_else(|e| error_reply(chat_id, &e));
        return send_reply(&bot, msg.chat.id, reply).await;
    }

    let reply = match wizard::advance(&ctx, chat_id, text, now).await {
        Ok(Some(reply)) => reply,
        Ok(None) => Reply::text(
            "Send /remind followed by your reminder, e.g. <code>/remind 10 min baad chai</code>. \
             /help lists all commands.",
        ),
        Err(e) => error_reply(chat_id, &e),
    };
    send_reply(&bot, msg.chat.id, reply).await
}

// ---------------------------------------------------------------------------
// Command dispatcher
// ---------------------------------------------------------------------------

/// Split `"/cmd@bot args"` into `("cmd", "args")`.
///
/// Returns `None` when `text` is not a slash command.
pub fn split_command(text: &str) -> Option<(&str, &str)> {
    let without_slash = text.trim_start().strip_prefix('/')?;
    let (full_command, args) = match without_slash.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (without_slash, ""),
    };
    let command = full_command.split('@').next().unwrap_or(full_command);
    if command.is_empty() {
        return None;
    }
    Some((command, args))
}

/// Run one slash command, returning the reply.
pub async fn dispatch_command(
    ctx: &BotContext,
    chat_id: i64,
    command: &str,
    args: &str,
    now: chrono::DateTime<Utc>,
) -> anyhow::Result<Reply> {
    debug!(chat_id, command, "dispatching command");
    match command {
        "start" => commands::handle_start(ctx, chat_id).await,
        "help" => Ok(Reply::text(commands::handle_help())),
        "signup" => wizard::start_signup(ctx, chat_id).await,
        "signupcancel" => Ok(wizard::cancel_signup(ctx, chat_id)),
        "remind" => commands::handle_remind(ctx, chat_id, args, now).await,
        "remindstep" => wizard::start_remind(ctx, chat_id).await,
        "remindcancel" => Ok(wizard::cancel_remind(ctx, chat_id)),
        "list" => commands::handle_list(ctx, chat_id, now).await,
        "cancel" => commands::handle_cancel(ctx, chat_id, args).await,
        "testremind" => Ok(commands::handle_test_remind(ctx, chat_id)),
        _ => Ok(Reply::text(format!(
            "Unknown command: /{}\n\n/help lists all commands.",
            ui::escape_html(command)
        ))),
    }
}

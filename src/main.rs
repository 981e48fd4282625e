//! AstraNote CLI entry point.
//!
//! Provides `start` (run the Telegram bot) and `parse` (resolve one phrase
//! and print the result, for diagnosing the parser).

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{NaiveDateTime, TimeZone, Utc};
use clap::{Parser, Subcommand};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use astranote::config::{self, Config};
use astranote::delivery::email::{EmailSender, HttpEmailSender};
use astranote::delivery::Delivery;
use astranote::otp::{self, OtpStore};
use astranote::parser::phrase::ChronoEnglishInterpreter;
use astranote::parser::{ParseOutcome, ParseRequest, ReminderParser};
use astranote::providers::router::build_provider;
use astranote::providers::LlmProvider;
use astranote::reminders::{self, ReminderService};
use astranote::scheduler::ReminderScheduler;
use astranote::store::Store;
use astranote::telegram::wizard::Conversations;
use astranote::telegram::{self, BotContext};

/// Capacity of the outbound Telegram and fired-job queues.
const QUEUE_CAPACITY: usize = 256;

/// AstraNote: reminders in plain Hinglish, delivered on Telegram and email.
#[derive(Parser)]
#[command(name = "astranote", version, about)]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Run the Telegram bot.
    Start,
    /// Parse a reminder phrase and print the result.
    Parse {
        /// Reminder text, e.g. `kal shaam 5 baje gym`.
        #[arg(required = true)]
        text: Vec<String>,
        /// Reference time as `YYYY-MM-DD HH:MM` in the configured zone.
        #[arg(long)]
        now: Option<String>,
        /// Skip the generative fallback.
        #[arg(long)]
        no_ai: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is normal.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    match cli.command {
        Command::Start => handle_start().await,
        Command::Parse { text, now, no_ai } => handle_parse(&text.join(" "), now.as_deref(), no_ai).await,
    }
}

/// Run the bot until Ctrl+C.
async fn handle_start() -> anyhow::Result<()> {
    let config = Config::load().context("failed to load configuration")?;

    let logs_dir = match &config.logging.logs_dir {
        Some(dir) => PathBuf::from(dir),
        None => config::data_dir()?.join("logs"),
    };
    let _logging_guard = astranote::logging::init_production(&logs_dir, &config.logging.level)?;

    let bot_token = config
        .telegram
        .bot_token
        .clone()
        .filter(|t| !t.trim().is_empty())
        .context("no bot token configured (set ASTRANOTE_BOT_TOKEN)")?;
    let timezone = config.parser.tz()?;

    let store = Store::open(Path::new(&config.storage.database_path))
        .await
        .with_context(|| format!("failed to open {}", config.storage.database_path))?;

    let provider = build_provider(&config.llm).context("failed to configure generative backend")?;
    match &provider {
        Some(p) => info!(model = p.model_id(), "generative fallback enabled"),
        None => info!("no generative backend configured, fallback disabled"),
    }
    let parser = Arc::new(ReminderParser::with_window(
        Arc::new(ChronoEnglishInterpreter),
        provider,
        config.parser.max_phrase_tokens,
    ));

    let email: Option<Arc<dyn EmailSender>> = HttpEmailSender::from_config(&config.email)
        .map(|sender| Arc::new(sender) as Arc<dyn EmailSender>);
    if email.is_none() {
        warn!("no email API key configured, email channels disabled");
    }

    let (telegram_tx, telegram_rx) = mpsc::channel(QUEUE_CAPACITY);
    let (scheduler, fired_rx) = ReminderScheduler::channel(QUEUE_CAPACITY);
    let delivery = Delivery::new(store.clone(), telegram_tx, email.clone());
    let service = Arc::new(ReminderService::new(store.clone(), scheduler, delivery));

    service
        .restore_pending(Utc::now())
        .await
        .context("failed to restore pending reminders")?;

    let otp_store = Arc::new(OtpStore::new(
        chrono::Duration::minutes(config.otp.expiry_minutes),
        config.otp.max_attempts,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let dispatcher = tokio::spawn(reminders::run_dispatcher(
        Arc::clone(&service),
        fired_rx,
        shutdown_rx.clone(),
    ));
    let sweeper = tokio::spawn(otp::run_sweeper(
        Arc::clone(&otp_store),
        Duration::from_secs(config.otp.sweep_interval_secs.max(1)),
        shutdown_rx,
    ));

    let ctx = BotContext {
        store,
        otp: otp_store,
        parser,
        reminders: Arc::clone(&service),
        email,
        conversations: Arc::new(Conversations::new()),
        timezone,
        parse_timeout: Duration::from_secs(config.parser.timeout_secs),
    };

    info!(timezone = %timezone, "astranote started");
    let result = telegram::run_telegram(&bot_token, ctx, telegram_rx).await;

    info!("shutting down");
    service.scheduler().cancel_all();
    let _ = shutdown_tx.send(true);
    if let Err(e) = dispatcher.await {
        warn!(error = %e, "reminder dispatcher task failed");
    }
    if let Err(e) = sweeper.await {
        warn!(error = %e, "code sweeper task failed");
    }

    result
}

/// Resolve one phrase and print what the bot would schedule.
async fn handle_parse(text: &str, now: Option<&str>, no_ai: bool) -> anyhow::Result<()> {
    let config = Config::load().context("failed to load configuration")?;
    astranote::logging::init_cli(&config.logging.level);

    let timezone = config.parser.tz()?;
    let now = match now {
        Some(raw) => {
            let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M")
                .with_context(|| format!("invalid --now {raw:?}, expected YYYY-MM-DD HH:MM"))?;
            timezone
                .from_local_datetime(&naive)
                .earliest()
                .with_context(|| format!("--now {raw:?} does not exist in {timezone}"))?
        }
        None => Utc::now().with_timezone(&timezone),
    };

    let provider = if no_ai {
        None
    } else {
        build_provider(&config.llm).context("failed to configure generative backend")?
    };
    let parser = ReminderParser::with_window(
        Arc::new(ChronoEnglishInterpreter),
        provider,
        config.parser.max_phrase_tokens,
    );

    match parser.parse(&ParseRequest::new(text, now)).await {
        ParseOutcome::Resolved {
            when,
            message,
            resolved_by,
        } => {
            println!("resolved_by: {}", resolved_by.as_str());
            println!("when: {}", when.format("%Y-%m-%d %H:%M %Z"));
            println!("message: {message}");
            Ok(())
        }
        ParseOutcome::Failed { reason, .. } => anyhow::bail!("{reason}"),
    }
}

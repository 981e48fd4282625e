//! SQLite persistence for delivery channels and pending reminders.
//!
//! Two tables (see `migrations/001_schema.sql`):
//! - `user_channels`: one row per `(chat_id, channel_type)`; only verified
//!   rows are used for delivery
//! - `reminders`: one row per scheduled reminder, deleted after it fires
//!
//! Instants are stored as RFC 3339 UTC strings so they sort lexically.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info};

const SCHEMA: &str = include_str!("../migrations/001_schema.sql");

// ---------------------------------------------------------------------------
// Domain types
// ---------------------------------------------------------------------------

/// Kind of delivery channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Telegram chat; the address is the chat id.
    Telegram,
    /// Email address.
    Email,
}

impl ChannelKind {
    /// Returns the string representation stored in SQLite.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Telegram => "telegram",
            Self::Email => "email",
        }
    }

    /// Parse from a SQLite text value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a recognised channel type.
    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "telegram" => Ok(Self::Telegram),
            "email" => Ok(Self::Email),
            other => Err(StoreError::InvalidEnum {
                field: "channel_type",
                value: other.to_owned(),
            }),
        }
    }

    /// Human label with an icon.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Telegram => "\u{1F4F1} Telegram",
            Self::Email => "\u{1F4E7} Email",
        }
    }
}

/// A delivery channel registered by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Channel kind.
    pub kind: ChannelKind,
    /// Chat id or email address.
    pub address: String,
    /// Whether the user proved ownership.
    pub verified: bool,
}

/// A persisted reminder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    /// Row id, shown to users for `/cancel`.
    pub id: i64,
    /// Owning chat.
    pub chat_id: i64,
    /// Reminder message.
    pub message: String,
    /// When it fires.
    pub run_at: DateTime<Utc>,
    /// Scheduler job name.
    pub job_name: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// An invalid enum value was read from the database.
    #[error("invalid {field} value: {value:?}")]
    InvalidEnum {
        /// Which field contained the bad value.
        field: &'static str,
        /// The unexpected value.
        value: String,
    },

    /// A stored timestamp could not be parsed.
    #[error("invalid timestamp {value:?}: {reason}")]
    InvalidTimestamp {
        /// Raw stored value.
        value: String,
        /// Parser error.
        reason: String,
    },
}

fn encode_instant(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn decode_instant(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::InvalidTimestamp {
            value: raw.to_owned(),
            reason: e.to_string(),
        })
}

type ReminderRow = (i64, i64, String, String, String);

fn reminder_from_row((id, chat_id, message, run_at, job_name): ReminderRow) -> Result<Reminder, StoreError> {
    Ok(Reminder {
        id,
        chat_id,
        message,
        run_at: decode_instant(&run_at)?,
        job_name,
    })
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Handle to the reminder database. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Store {
    db: SqlitePool,
}

impl Store {
    /// Open (creating if needed) the database at `path` and apply the schema.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        let store = Self::new(pool);
        store.migrate().await?;
        info!(path = %path.display(), "reminder store opened");
        Ok(store)
    }

    /// Fresh in-memory database with the schema applied.
    #[doc(hidden)]
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Wrap an existing pool. Call [`Store::migrate`] before use.
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Apply the idempotent schema.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.db).await?;
        Ok(())
    }

    /// Underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    // -- channels ----------------------------------------------------------

    /// Insert or replace the channel of `kind` for `chat_id`.
    pub async fn save_channel(
        &self,
        chat_id: i64,
        kind: ChannelKind,
        address: &str,
        verified: bool,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO user_channels (chat_id, channel_type, value, is_verified) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(chat_id, channel_type) DO UPDATE SET \
             value = excluded.value, is_verified = excluded.is_verified",
        )
        .bind(chat_id)
        .bind(kind.as_str())
        .bind(address)
        .bind(i64::from(verified))
        .execute(&self.db)
        .await?;
        debug!(chat_id, channel = kind.as_str(), verified, "channel saved");
        Ok(())
    }

    /// Remove the channel of `kind`. Returns whether a row was deleted.
    pub async fn delete_channel(&self, chat_id: i64, kind: ChannelKind) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM user_channels WHERE chat_id = ?1 AND channel_type = ?2")
            .bind(chat_id)
            .bind(kind.as_str())
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// All channels for `chat_id`, verified or not, ordered by kind.
    pub async fn channels(&self, chat_id: i64) -> Result<Vec<Channel>, StoreError> {
        let rows = sqlx::query_as::<_, (String, String, i64)>(
            "SELECT channel_type, value, is_verified FROM user_channels \
             WHERE chat_id = ?1 ORDER BY channel_type",
        )
        .bind(chat_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter()
            .map(|(kind, address, verified)| {
                Ok(Channel {
                    kind: ChannelKind::parse(&kind)?,
                    address,
                    verified: verified != 0,
                })
            })
            .collect()
    }

    /// Verified channels only; these are the delivery targets.
    pub async fn verified_channels(&self, chat_id: i64) -> Result<Vec<Channel>, StoreError> {
        Ok(self
            .channels(chat_id)
            .await?
            .into_iter()
            .filter(|c| c.verified)
            .collect())
    }

    /// Whether `chat_id` has at least one verified channel.
    pub async fn is_user_verified(&self, chat_id: i64) -> Result<bool, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM user_channels WHERE chat_id = ?1 AND is_verified = 1",
        )
        .bind(chat_id)
        .fetch_one(&self.db)
        .await?;
        Ok(count > 0)
    }

    // -- reminders ---------------------------------------------------------

    /// Persist a reminder and return its row id.
    pub async fn insert_reminder(
        &self,
        chat_id: i64,
        message: &str,
        run_at: DateTime<Utc>,
        job_name: &str,
    ) -> Result<i64, StoreError> {
        let result = sqlx::query(
            "INSERT INTO reminders (chat_id, reminder_text, run_at, job_name) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(chat_id)
        .bind(message)
        .bind(encode_instant(run_at))
        .bind(job_name)
        .execute(&self.db)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Delete a reminder, optionally only if it belongs to `chat_id`.
    ///
    /// Returns whether a row was deleted.
    pub async fn delete_reminder(&self, id: i64, chat_id: Option<i64>) -> Result<bool, StoreError> {
        let result = match chat_id {
            Some(chat_id) => {
                sqlx::query("DELETE FROM reminders WHERE id = ?1 AND chat_id = ?2")
                    .bind(id)
                    .bind(chat_id)
                    .execute(&self.db)
                    .await?
            }
            None => {
                sqlx::query("DELETE FROM reminders WHERE id = ?1")
                    .bind(id)
                    .execute(&self.db)
                    .await?
            }
        };
        Ok(result.rows_affected() > 0)
    }

    /// Look up one reminder by id.
    pub async fn reminder(&self, id: i64) -> Result<Option<Reminder>, StoreError> {
        sqlx::query_as::<_, ReminderRow>(
            "SELECT id, chat_id, reminder_text, run_at, job_name FROM reminders WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .map(reminder_from_row)
        .transpose()
    }

    /// Reminders for `chat_id`, soonest first.
    pub async fn reminders_for_chat(&self, chat_id: i64) -> Result<Vec<Reminder>, StoreError> {
        sqlx::query_as::<_, ReminderRow>(
            "SELECT id, chat_id, reminder_text, run_at, job_name FROM reminders \
             WHERE chat_id = ?1 ORDER BY run_at, id",
        )
        .bind(chat_id)
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .map(reminder_from_row)
        .collect()
    }

    /// Every stored reminder, soonest first. Used to rebuild the schedule.
    pub async fn pending_reminders(&self) -> Result<Vec<Reminder>, StoreError> {
        sqlx::query_as::<_, ReminderRow>(
            "SELECT id, chat_id, reminder_text, run_at, job_name FROM reminders ORDER BY run_at, id",
        )
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .map(reminder_from_row)
        .collect()
    }
}

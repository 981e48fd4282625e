//! Configuration loading.
//!
//! Loads AstraNote configuration from `./config.toml` (or
//! `$ASTRANOTE_CONFIG_PATH`). Environment variables override file values;
//! file values override defaults. A `.env` file is loaded into the process
//! environment by `main` before this runs.
//!
//! Precedence: env vars > config file > defaults.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::Deserialize;

use crate::providers::ollama::DEFAULT_OLLAMA_URL;

/// Default generative model used when only a Gemini key is supplied.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini/gemini-2.0-flash";

// ── Top-level config ────────────────────────────────────────────

/// Top-level configuration loaded from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Telegram bot settings.
    pub telegram: TelegramConfig,
    /// Reminder database location.
    pub storage: StorageConfig,
    /// Natural-language parser settings.
    pub parser: ParserConfig,
    /// Generative fallback provider.
    pub llm: LlmConfig,
    /// Outbound email delivery.
    pub email: EmailConfig,
    /// One-time code verification.
    pub otp: OtpConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// If the config file does not exist, defaults are used.
    pub fn load() -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load using a custom env resolver (for testing).
    pub fn load_with(env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let path = Self::config_path_with(&env);
        let mut config = Self::load_from_file(&path)?;
        config.apply_overrides(env);
        Ok(config)
    }

    fn load_from_file(path: &std::path::Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                Self::from_toml(&contents)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("no config file found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "failed to read config file {}: {e}",
                path.display()
            )),
        }
    }

    /// Resolve the config file path: `$ASTRANOTE_CONFIG_PATH` or `./config.toml`.
    pub fn config_path_with(env: impl Fn(&str) -> Option<String>) -> PathBuf {
        env("ASTRANOTE_CONFIG_PATH").map_or_else(|| PathBuf::from("config.toml"), PathBuf::from)
    }

    /// Apply environment variable overrides (env > config > defaults).
    ///
    /// Takes a resolver function so tests need not touch the process env.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("ASTRANOTE_BOT_TOKEN") {
            self.telegram.bot_token = Some(v);
        }
        if let Some(v) = env("ASTRANOTE_DB_PATH") {
            self.storage.database_path = v;
        }

        // Parser.
        if let Some(v) = env("ASTRANOTE_TIMEZONE") {
            self.parser.timezone = v;
        }
        if let Some(v) = env("ASTRANOTE_PARSE_TIMEOUT_SECS") {
            match v.parse() {
                Ok(n) => self.parser.timeout_secs = n,
                Err(_) => tracing::warn!(
                    var = "ASTRANOTE_PARSE_TIMEOUT_SECS",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }

        // LLM (a Gemini key alone enables the default Gemini model).
        if let Some(v) = env("ASTRANOTE_GEMINI_API_KEY") {
            self.llm.gemini_api_key = Some(v);
            if self.llm.model.is_none() {
                self.llm.model = Some(DEFAULT_GEMINI_MODEL.to_owned());
            }
        }
        if let Some(v) = env("ASTRANOTE_ANTHROPIC_API_KEY") {
            self.llm.anthropic_api_key = Some(v);
        }
        if let Some(v) = env("ASTRANOTE_OLLAMA_URL") {
            self.llm.ollama_url = v;
        }
        if let Some(v) = env("ASTRANOTE_LLM_MODEL") {
            self.llm.model = Some(v).filter(|m| !m.trim().is_empty());
        }

        // Email.
        if let Some(v) = env("ASTRANOTE_EMAIL_API_URL") {
            self.email.api_url = v;
        }
        if let Some(v) = env("ASTRANOTE_EMAIL_API_KEY") {
            self.email.api_key = Some(v);
        }
        if let Some(v) = env("ASTRANOTE_EMAIL_FROM") {
            self.email.from = v;
        }

        // OTP.
        if let Some(v) = env("ASTRANOTE_OTP_EXPIRY_MINUTES") {
            match v.parse() {
                Ok(n) => self.otp.expiry_minutes = n,
                Err(_) => tracing::warn!(
                    var = "ASTRANOTE_OTP_EXPIRY_MINUTES",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }

        // Logging.
        if let Some(v) = env("ASTRANOTE_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = env("ASTRANOTE_LOGS_DIR") {
            self.logging.logs_dir = Some(v);
        }
    }

    /// Parse a TOML string into config.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(toml_str).context("failed to parse config TOML")?;
        Ok(config)
    }
}

/// Per-user data directory (`~/.local/share/astranote` or platform equivalent).
pub fn data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("", "", "astranote")
        .context("could not determine a home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}

// ── Telegram ────────────────────────────────────────────────────

/// Telegram bot settings.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot API token.
    pub bot_token: Option<String>,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field(
                "bot_token",
                &self.bot_token.as_ref().map(|_| "__REDACTED__"),
            )
            .finish()
    }
}

// ── Storage ─────────────────────────────────────────────────────

/// Reminder database location.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file.
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "reminders.db".to_owned(),
        }
    }
}

// ── Parser ──────────────────────────────────────────────────────

/// Natural-language parser settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// IANA zone every phrase is interpreted in.
    pub timezone: String,
    /// Longest prefix offered to the date-phrase stage.
    pub max_phrase_tokens: usize,
    /// Upper bound on one parse, generative call included.
    pub timeout_secs: u64,
}

impl ParserConfig {
    /// Parsed [`Tz`] for [`ParserConfig::timezone`].
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("invalid timezone {:?}: {e}", self.timezone))
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            timezone: "Asia/Kolkata".to_owned(),
            max_phrase_tokens: 10,
            timeout_secs: 30,
        }
    }
}

// ── LLM ─────────────────────────────────────────────────────────

/// Generative fallback provider configuration.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Model spec `<provider>/<model>`; `None` disables the fallback.
    pub model: Option<String>,
    /// Google Generative Language API key.
    pub gemini_api_key: Option<String>,
    /// Anthropic API key.
    pub anthropic_api_key: Option<String>,
    /// Ollama base URL.
    pub ollama_url: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: None,
            gemini_api_key: None,
            anthropic_api_key: None,
            ollama_url: DEFAULT_OLLAMA_URL.to_owned(),
        }
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("model", &self.model)
            .field(
                "gemini_api_key",
                &self.gemini_api_key.as_ref().map(|_| "__REDACTED__"),
            )
            .field(
                "anthropic_api_key",
                &self.anthropic_api_key.as_ref().map(|_| "__REDACTED__"),
            )
            .field("ollama_url", &self.ollama_url)
            .finish()
    }
}

// ── Email ───────────────────────────────────────────────────────

/// Outbound email settings.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    /// HTTP endpoint accepting `{from, to, subject, html}` JSON.
    pub api_url: String,
    /// Bearer key; email delivery is disabled without it.
    pub api_key: Option<String>,
    /// Sender address.
    pub from: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.resend.com/emails".to_owned(),
            api_key: None,
            from: "AstraNote <reminders@astranote.app>".to_owned(),
        }
    }
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "__REDACTED__"))
            .field("from", &self.from)
            .finish()
    }
}

// ── OTP ─────────────────────────────────────────────────────────

/// One-time code settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OtpConfig {
    /// Code lifetime.
    pub expiry_minutes: i64,
    /// Wrong guesses allowed before the code is discarded.
    pub max_attempts: u32,
    /// How often expired codes are purged.
    pub sweep_interval_secs: u64,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            expiry_minutes: 10,
            max_attempts: 3,
            sweep_interval_secs: 60,
        }
    }
}

// ── Logging ─────────────────────────────────────────────────────

/// Logging settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Directory for JSON log files; defaults to `<data_dir>/logs`.
    pub logs_dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            logs_dir: None,
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────

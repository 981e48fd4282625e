//! HTML formatting and reply keyboard helpers for Telegram messages.
//!
//! All output uses HTML parse mode (never MarkdownV2).

use chrono::{DateTime, TimeZone};
use teloxide::types::{KeyboardButton, KeyboardMarkup, KeyboardRemove, ReplyMarkup};

use crate::store::Channel;

/// Escape special HTML characters in user-provided text.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// What to do with the custom reply keyboard when sending a reply.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReplyKeyboard {
    /// Leave whatever keyboard is showing.
    #[default]
    Unchanged,
    /// Hide the custom keyboard.
    Remove,
    /// Show these buttons, one inner vector per row.
    Choices(Vec<Vec<String>>),
}

/// An HTML reply plus its keyboard instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// HTML body.
    pub text: String,
    /// Keyboard instruction.
    pub keyboard: ReplyKeyboard,
}

impl Reply {
    /// Plain reply that leaves the keyboard alone.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: ReplyKeyboard::Unchanged,
        }
    }

    /// Reply that hides the custom keyboard.
    pub fn removing_keyboard(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: ReplyKeyboard::Remove,
        }
    }

    /// Reply offering a single row of choices.
    pub fn with_choices(text: impl Into<String>, choices: &[&str]) -> Self {
        Self {
            text: text.into(),
            keyboard: ReplyKeyboard::Choices(vec![choices
                .iter()
                .map(|c| (*c).to_owned())
                .collect()]),
        }
    }
}

/// Build the teloxide markup for a keyboard instruction.
pub fn render_keyboard(keyboard: &ReplyKeyboard) -> Option<ReplyMarkup> {
    match keyboard {
        ReplyKeyboard::Unchanged => None,
        ReplyKeyboard::Remove => Some(ReplyMarkup::KeyboardRemove(KeyboardRemove::new())),
        ReplyKeyboard::Choices(rows) => {
            let rows: Vec<Vec<KeyboardButton>> = rows
                .iter()
                .map(|row| row.iter().map(|label| KeyboardButton::new(label.as_str())).collect())
                .collect();
            Some(ReplyMarkup::Keyboard(
                KeyboardMarkup::new(rows)
                    .one_time_keyboard()
                    .resize_keyboard(),
            ))
        }
    }
}

/// Remaining time as `"Xh Ym"`, or `"Ym"` under an hour.
///
/// Returns `None` when `secs` is not positive.
pub fn format_countdown(secs: i64) -> Option<String> {
    if secs <= 0 {
        return None;
    }
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    Some(if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    })
}

/// Display format for reminder instants, e.g. `18 Nov 2025, 05:00 PM`.
pub fn format_when<Tz: TimeZone>(when: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    when.format("%d %b %Y, %I:%M %p").to_string()
}

/// One line per channel with its verification status.
pub fn format_channels(channels: &[Channel]) -> String {
    if channels.is_empty() {
        return "No channels yet.".to_owned();
    }
    channels
        .iter()
        .map(|c| {
            let status = if c.verified {
                "\u{2705} verified"
            } else {
                "\u{23F3} pending"
            };
            format!("{}: {} ({status})", c.kind.label(), escape_html(&c.address))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

//! Date-phrase stage.
//!
//! When no rule fires, the leading words of the text are offered to a
//! [`DatePhraseInterpreter`] as progressively shorter prefixes. The first
//! prefix that resolves to a future instant wins and the remaining words
//! become the message.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Days, TimeZone};
use chrono_english::Dialect;
use chrono_tz::Tz;
use tracing::trace;

use super::patterns::{at_clock, DayPart};
use super::{fallback_message, Resolution, ResolvedBy, Stage, StageError, StageInput, StageResult};

/// Longest prefix (in words) offered to the interpreter.
pub const MAX_PHRASE_TOKENS: usize = 10;

/// Messages shorter than this are replaced by the whole original text.
pub const MIN_MESSAGE_CHARS: usize = 3;

/// Longest digit run handed to `chrono-english`, which panics on offsets
/// too large for its duration arithmetic.
pub const MAX_NUMBER_DIGITS: usize = 4;

/// Why an interpreter rejected a phrase.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PhraseError {
    /// The phrase contains words that are not date vocabulary.
    #[error("not a date phrase: {0:?}")]
    NotADate(String),
    /// The underlying date parser refused the phrase.
    #[error("date parser rejected {phrase:?}: {reason}")]
    Rejected {
        /// Phrase offered.
        phrase: String,
        /// Parser's explanation.
        reason: String,
    },
    /// The phrase named a wall-clock time that cannot be represented.
    #[error("resolved time is out of range")]
    OutOfRange,
}

/// Turns a short phrase into an absolute instant, relative to `now`.
///
/// Implementations may return past instants; the caller filters them.
pub trait DatePhraseInterpreter: Send + Sync {
    /// Interpret `phrase` (already normalized) at `now`.
    fn interpret(&self, phrase: &str, now: DateTime<Tz>) -> Result<DateTime<Tz>, PhraseError>;
}

// ---------------------------------------------------------------------------
// chrono-english adapter
// ---------------------------------------------------------------------------

const DATE_WORDS: &[&str] = &[
    "today", "tomorrow", "yesterday", "now", "noon", "midnight", "next", "last", "this", "coming",
    "at", "in", "on", "by", "ago", "after", "before", "the", "a", "an", "of", "and", "day", "days",
    "week", "weeks", "fortnight", "month", "months", "year", "years", "hour", "hours", "hr", "hrs",
    "minute", "minutes", "min", "mins", "second", "seconds", "sec", "secs", "am", "pm", "morning",
    "afternoon", "evening", "night", "monday", "tuesday", "wednesday", "thursday", "friday",
    "saturday", "sunday", "mon", "tue", "tues", "wed", "thu", "thur", "thurs", "fri", "sat", "sun",
    "january", "february", "march", "april", "may", "june", "july", "august", "september",
    "october", "november", "december", "jan", "feb", "mar", "apr", "jun", "jul", "aug", "sep",
    "sept", "oct", "nov", "dec",
];

/// Whether `token` can be part of a date phrase.
pub fn is_date_token(token: &str) -> bool {
    if DATE_WORDS.contains(&token) {
        return true;
    }
    let digits = token.trim_end_matches(|c: char| c.is_ascii_alphabetic());
    let suffix = &token[digits.len()..];
    let numeric = !digits.is_empty()
        && digits.starts_with(|c: char| c.is_ascii_digit())
        && digits
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, ':' | '/' | '-' | '.'));
    numeric && matches!(suffix, "" | "am" | "pm" | "st" | "nd" | "rd" | "th")
}

fn longest_digit_run(token: &str) -> usize {
    token
        .split(|c: char| !c.is_ascii_digit())
        .map(str::len)
        .max()
        .unwrap_or(0)
}

/// Interpreter backed by `chrono-english`.
///
/// Only phrases made entirely of date vocabulary are considered, so a
/// window that spills into the message is rejected instead of being
/// half-parsed. `today`, `tomorrow` and `day after tomorrow` are resolved
/// directly; a trailing day-part word pins the clock to that part's
/// default hour. A leading `in` is dropped (`in 2 hours` reads as
/// `2 hours`). Numeric dates are read day-first (`5/6` is 5 June).
#[derive(Debug, Clone, Copy, Default)]
pub struct ChronoEnglishInterpreter;

impl ChronoEnglishInterpreter {
    fn base_instant(&self, phrase: &str, now: DateTime<Tz>) -> Result<DateTime<Tz>, PhraseError> {
        let anchored = match phrase {
            "" | "today" => Some(0),
            "tomorrow" => Some(1),
            "day after tomorrow" => Some(2),
            _ => None,
        };
        if let Some(days) = anchored {
            let date = now
                .date_naive()
                .checked_add_days(Days::new(days))
                .ok_or(PhraseError::OutOfRange)?;
            return now
                .timezone()
                .from_local_datetime(&date.and_time(now.time()))
                .earliest()
                .ok_or(PhraseError::OutOfRange);
        }
        chrono_english::parse_date_string(phrase, now, Dialect::Uk).map_err(|e| {
            PhraseError::Rejected {
                phrase: phrase.to_owned(),
                reason: e.to_string(),
            }
        })
    }
}

impl DatePhraseInterpreter for ChronoEnglishInterpreter {
    fn interpret(&self, phrase: &str, now: DateTime<Tz>) -> Result<DateTime<Tz>, PhraseError> {
        let tokens: Vec<&str> = phrase.split_whitespace().collect();
        if tokens.is_empty() || !tokens.iter().all(|t| is_date_token(t)) {
            return Err(PhraseError::NotADate(phrase.to_owned()));
        }
        if tokens.iter().any(|t| longest_digit_run(t) > MAX_NUMBER_DIGITS) {
            return Err(PhraseError::OutOfRange);
        }
        let tokens = match tokens.split_first() {
            Some((&"in", rest)) if !rest.is_empty() => rest,
            _ => tokens.as_slice(),
        };

        let (date_tokens, part) = match tokens.split_last() {
            Some((last, rest)) => match DayPart::parse(last) {
                Some(part) => (rest, Some(part)),
                None => (tokens, None),
            },
            None => (tokens, None),
        };

        let base = self.base_instant(&date_tokens.join(" "), now)?;
        match part {
            None => Ok(base),
            Some(part) => {
                let days_ahead = base
                    .date_naive()
                    .signed_duration_since(now.date_naive())
                    .num_days();
                let days_ahead = u64::try_from(days_ahead).map_err(|_| PhraseError::OutOfRange)?;
                at_clock(now, days_ahead, part.default_hour(), 0)
                    .map_err(|_| PhraseError::OutOfRange)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// Sliding-window stage over a [`DatePhraseInterpreter`].
pub struct PhraseResolver {
    interpreter: Arc<dyn DatePhraseInterpreter>,
    max_tokens: usize,
}

impl std::fmt::Debug for PhraseResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhraseResolver")
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}

impl PhraseResolver {
    /// Resolver with the default window of [`MAX_PHRASE_TOKENS`].
    pub fn new(interpreter: Arc<dyn DatePhraseInterpreter>) -> Self {
        Self::with_max_tokens(interpreter, MAX_PHRASE_TOKENS)
    }

    /// Resolver with a custom window size (at least one word).
    pub fn with_max_tokens(interpreter: Arc<dyn DatePhraseInterpreter>, max_tokens: usize) -> Self {
        Self {
            interpreter,
            max_tokens: max_tokens.max(1),
        }
    }

    /// Try prefixes of `normalized`, longest first.
    pub fn resolve(&self, normalized: &str, raw: &str, now: DateTime<Tz>) -> StageResult {
        let words: Vec<&str> = normalized.split_whitespace().collect();
        let longest = words.len().min(self.max_tokens);

        for split in (1..=longest).rev() {
            let (head, tail) = words.split_at(split);
            let phrase = head.join(" ");
            match self.interpreter.interpret(&phrase, now) {
                Ok(when) if when > now => {
                    trace!(phrase = %phrase, when = %when, "date phrase accepted");
                    return StageResult::Resolved(Resolution {
                        when,
                        message: fallback_message(&tail.join(" "), raw, MIN_MESSAGE_CHARS),
                    });
                }
                Ok(when) => trace!(phrase = %phrase, when = %when, "date phrase is in the past"),
                Err(e) => trace!(phrase = %phrase, error = %e, "date phrase rejected"),
            }
        }

        StageResult::Continue(StageError::NoMatch)
    }
}

#[async_trait]
impl Stage for PhraseResolver {
    fn kind(&self) -> ResolvedBy {
        ResolvedBy::GeneralResolver
    }

    async fn run(&self, input: &StageInput<'_>) -> StageResult {
        self.resolve(input.normalized, input.raw, input.now)
    }
}

//! Generative-model stage.
//!
//! Last resort for phrasing neither the rule table nor the date-phrase
//! window understands. The model is asked for a strict JSON object
//! `{"date": "YYYY-MM-DD HH:MM", "message": "..."}` in local time, and is
//! allowed to answer with nulls when the text has no usable time.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::providers::{CompletionRequest, LlmProvider, Message};

use super::{Resolution, ResolvedBy, Stage, StageError, StageInput, StageResult};

/// Wall-clock format the model must answer with.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

const MAX_REPLY_TOKENS: u32 = 200;

/// Structured reply expected from the model.
#[derive(Debug, Deserialize)]
struct ModelReply {
    #[serde(default, alias = "datetime")]
    date: Option<String>,
    #[serde(default, alias = "reminder_text")]
    message: Option<String>,
}

/// Build the instruction prompt for `text` evaluated at `now`.
///
/// Worked examples are computed from `now` so the model sees concrete
/// dates rather than placeholders.
pub fn build_prompt(text: &str, now: DateTime<Tz>) -> String {
    let today = now.date_naive();
    let tomorrow = today.checked_add_days(Days::new(1)).unwrap_or(today);
    let in_two_hours = now
        .checked_add_signed(chrono::TimeDelta::hours(2))
        .unwrap_or(now)
        .format(DATE_FORMAT);
    let zone = now.timezone();

    format!(
        r#"You convert reminder requests written in Hindi, English or a mix of both into JSON.

Current local time: {now_local} ({zone})

Vocabulary:
- kal = tomorrow, parso = day after tomorrow, aaj = today
- subah = morning (9 AM), dopahar = afternoon (2 PM), shaam = evening (6 PM), raat = night (9 PM)
- baje = o'clock, baad = after, min = minutes, ghante = hours, din = days

Examples:
- "kal subah 9 baje doctor" -> {{"date": "{tomorrow} 09:00", "message": "doctor"}}
- "2 ghante baad khaana" -> {{"date": "{in_two_hours}", "message": "khaana"}}
- "aaj raat 10 baje call mom" -> {{"date": "{today} 22:00", "message": "call mom"}}

Rules:
- Answer with a single JSON object and nothing else.
- "date" must use the format YYYY-MM-DD HH:MM in {zone} and must be after the current time.
- "message" is what the user wants to be reminded about, without the time words.
- If the request has no recognisable time, answer {{"date": null, "message": null}}.

Request: "{text}""#,
        now_local = now.format(DATE_FORMAT),
        tomorrow = tomorrow.format("%Y-%m-%d"),
        today = today.format("%Y-%m-%d"),
    )
}

/// Strip a surrounding Markdown code fence, with or without a language tag.
pub fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Validate a raw model reply against `now`.
///
/// # Errors
///
/// - [`StageError::MalformedUpstream`] when the reply is not the expected
///   JSON object or the date does not match [`DATE_FORMAT`]
/// - [`StageError::Ambiguous`] when either field is null or empty
/// - [`StageError::PastTime`] when the date is not after `now`
pub fn parse_reply(reply: &str, now: DateTime<Tz>) -> Result<Resolution, StageError> {
    let body = strip_code_fence(reply);
    let parsed: ModelReply = serde_json::from_str(body)
        .map_err(|e| StageError::MalformedUpstream(format!("reply is not the expected JSON: {e}")))?;

    let non_empty = |v: Option<String>| v.map(|s| s.trim().to_owned()).filter(|s| !s.is_empty());
    let (Some(date), Some(message)) = (non_empty(parsed.date), non_empty(parsed.message)) else {
        return Err(StageError::Ambiguous);
    };

    let naive = NaiveDateTime::parse_from_str(&date, DATE_FORMAT)
        .map_err(|e| StageError::MalformedUpstream(format!("date {date:?}: {e}")))?;
    let when = now
        .timezone()
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| StageError::MalformedUpstream(format!("date {date:?} does not exist locally")))?;

    if when <= now {
        return Err(StageError::PastTime { when });
    }
    Ok(Resolution { when, message })
}

/// Pipeline stage backed by an optional [`LlmProvider`].
pub struct GenerativeResolver {
    provider: Option<Arc<dyn LlmProvider>>,
}

impl std::fmt::Debug for GenerativeResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerativeResolver")
            .field("model", &self.provider.as_ref().map(|p| p.model_id().to_owned()))
            .finish()
    }
}

impl GenerativeResolver {
    /// Stage over `provider`; `None` means the backend is not configured.
    pub fn new(provider: Option<Arc<dyn LlmProvider>>) -> Self {
        Self { provider }
    }

    /// Whether a backend is configured.
    pub fn is_available(&self) -> bool {
        self.provider.is_some()
    }

    /// Ask the model to resolve `raw`.
    pub async fn resolve(&self, raw: &str, now: DateTime<Tz>) -> StageResult {
        let Some(provider) = &self.provider else {
            return StageResult::Continue(StageError::BackendUnavailable);
        };

        let request = CompletionRequest {
            messages: vec![Message::user(build_prompt(raw, now))],
            system: None,
            max_tokens: Some(MAX_REPLY_TOKENS),
            temperature: Some(0.0),
        };

        let response = match provider.complete(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(model = provider.model_id(), error = %e, "generative backend call failed");
                return StageResult::Continue(StageError::Transport(e.to_string()));
            }
        };
        debug!(model = %response.model, reply = %response.text, "generative backend replied");

        match parse_reply(&response.text, now) {
            Ok(resolution) => StageResult::Resolved(resolution),
            Err(e) => StageResult::Continue(e),
        }
    }
}

#[async_trait]
impl Stage for GenerativeResolver {
    fn kind(&self) -> ResolvedBy {
        ResolvedBy::Generative
    }

    async fn run(&self, input: &StageInput<'_>) -> StageResult {
        self.resolve(input.raw, input.now).await
    }
}

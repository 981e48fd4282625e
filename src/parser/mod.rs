//! Natural-language reminder parsing.
//!
//! Turns colloquial, mixed Hindi-English text such as `"10 min baad meeting"`
//! or `"kal shaam 5 baje gym"` into an exact future instant plus the reminder
//! message. Three stages are tried in a fixed order, each one validating that
//! its answer is strictly in the future before it is accepted:
//!
//! 1. [`patterns`] -- deterministic rule table over normalized text
//! 2. [`phrase`] -- sliding-window date-phrase interpretation
//! 3. [`generative`] -- generative-model fallback (optional backend)
//!
//! The [`ReminderParser`] runs the stages and folds every outcome into a
//! single [`ParseOutcome`].

pub mod generative;
pub mod normalize;
pub mod patterns;
pub mod phrase;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use chrono_tz::Tz;
use tracing::{debug, info, warn};

use crate::providers::LlmProvider;

use self::generative::GenerativeResolver;
use self::patterns::PatternMatcher;
use self::phrase::{DatePhraseInterpreter, PhraseResolver};

/// Guidance appended to every failed parse.
pub const GUIDANCE: &str = "Mention the time clearly, for example:\n\
• 10 min baad meeting\n\
• kal shaam 5 baje gym\n\
• tomorrow 11:50 pm call\n\
• 2 hours baad khaana\n\n\
Or use /remindstep to set it up step by step.";

// ---------------------------------------------------------------------------
// Request / outcome
// ---------------------------------------------------------------------------

/// A single parse invocation: raw text plus the injected current time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseRequest {
    /// Raw user text with the command prefix already stripped.
    pub text: String,
    /// Current instant in the configured local zone.
    pub now: DateTime<Tz>,
}

impl ParseRequest {
    /// Build a request for `text` evaluated at `now`.
    pub fn new(text: impl Into<String>, now: DateTime<Tz>) -> Self {
        Self {
            text: text.into(),
            now,
        }
    }
}

/// Which stage produced a successful parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolvedBy {
    /// Deterministic pattern table.
    Pattern,
    /// General date-phrase interpretation.
    GeneralResolver,
    /// Generative-model fallback.
    Generative,
}

impl ResolvedBy {
    /// Stable identifier used in logs and CLI output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pattern => "pattern",
            Self::GeneralResolver => "date_phrase",
            Self::Generative => "generative",
        }
    }

    /// Short provenance label shown to the user.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pattern => "\u{26A1} parsed by pattern rules",
            Self::GeneralResolver => "\u{1F4DA} parsed as a date phrase",
            Self::Generative => "\u{1F916} parsed by AI",
        }
    }
}

/// Result of running the whole pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    /// The text resolved to a future instant and a message.
    Resolved {
        /// When the reminder should fire. Always later than the request's `now`.
        when: DateTime<Tz>,
        /// Non-empty reminder message.
        message: String,
        /// Stage that produced the result.
        resolved_by: ResolvedBy,
    },
    /// No stage could resolve the text.
    Failed {
        /// User-facing explanation, always ending with [`GUIDANCE`].
        reason: String,
        /// The last stage failure, if any stage reported one.
        cause: Option<StageError>,
    },
}

impl ParseOutcome {
    /// Build a failure whose reason is derived from `cause`.
    pub fn failed(cause: Option<StageError>) -> Self {
        Self::Failed {
            reason: failure_reason(cause.as_ref()),
            cause,
        }
    }

    /// Returns `true` for [`ParseOutcome::Resolved`].
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved { .. })
    }
}

fn failure_reason(cause: Option<&StageError>) -> String {
    let headline = match cause {
        Some(StageError::PastTime { .. }) => "That time has already passed. Give a future time.",
        Some(StageError::Ambiguous) => "Couldn't find a date or time in that.",
        Some(StageError::MalformedUpstream(_)) => "The AI parser gave an answer I couldn't read.",
        Some(StageError::Transport(_)) => "The AI parser is not reachable right now.",
        Some(StageError::NoMatch | StageError::BackendUnavailable) | None => {
            "Couldn't understand the date/time."
        }
    };
    format!("{headline}\n\n{GUIDANCE}")
}

// ---------------------------------------------------------------------------
// Stage interface
// ---------------------------------------------------------------------------

/// Typed failure reported by a single stage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StageError {
    /// No rule or candidate applied to the text.
    #[error("no applicable rule")]
    NoMatch,
    /// A candidate resolved to an instant that is not strictly in the future.
    #[error("resolved to a past time ({when})")]
    PastTime {
        /// The rejected instant.
        when: DateTime<Tz>,
    },
    /// The generative backend explicitly declined (null fields).
    #[error("ambiguous input")]
    Ambiguous,
    /// A dependency answered in a shape that could not be interpreted.
    #[error("malformed upstream output: {0}")]
    MalformedUpstream(String),
    /// The generative backend is not configured.
    #[error("generative backend unavailable")]
    BackendUnavailable,
    /// The backend call itself failed.
    #[error("backend transport failure: {0}")]
    Transport(String),
}

/// A stage's successful answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Resolved instant.
    pub when: DateTime<Tz>,
    /// Reminder message.
    pub message: String,
}

/// What a stage tells the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageResult {
    /// Stop the pipeline with this answer.
    Resolved(Resolution),
    /// Nothing usable; try the next stage.
    Continue(StageError),
    /// Stop the pipeline with a failure.
    Fatal(StageError),
}

/// Input shared by every stage of one invocation.
#[derive(Debug, Clone, Copy)]
pub struct StageInput<'a> {
    /// Original text, trimmed.
    pub raw: &'a str,
    /// Output of [`normalize::normalize`].
    pub normalized: &'a str,
    /// Injected current time.
    pub now: DateTime<Tz>,
}

/// One resolver in the fallback pipeline.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Provenance tag attached to this stage's successes.
    fn kind(&self) -> ResolvedBy;

    /// Attempt to resolve the input.
    async fn run(&self, input: &StageInput<'_>) -> StageResult;
}

/// Replace a missing or degenerate message with the whole original text.
pub(crate) fn fallback_message(extracted: &str, original: &str, min_chars: usize) -> String {
    let extracted = extracted.trim();
    if extracted.is_empty() || extracted.chars().count() < min_chars {
        original.trim().to_owned()
    } else {
        extracted.to_owned()
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Runs the stages in order, stopping at the first success or fatal failure.
///
/// Stages hold no per-request state, so one parser can serve concurrent
/// requests.
pub struct ReminderParser {
    stages: Vec<Box<dyn Stage>>,
}

impl std::fmt::Debug for ReminderParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kinds: Vec<&str> = self.stages.iter().map(|s| s.kind().as_str()).collect();
        f.debug_struct("ReminderParser")
            .field("stages", &kinds)
            .finish()
    }
}

impl ReminderParser {
    /// Build the standard three-stage pipeline.
    ///
    /// `provider` is optional: without it the generative stage reports
    /// [`StageError::BackendUnavailable`] and the pipeline ends after the
    /// date-phrase stage.
    pub fn new(
        interpreter: Arc<dyn DatePhraseInterpreter>,
        provider: Option<Arc<dyn LlmProvider>>,
    ) -> Self {
        Self::with_window(interpreter, provider, phrase::MAX_PHRASE_TOKENS)
    }

    /// Like [`ReminderParser::new`] with a custom date-phrase window.
    pub fn with_window(
        interpreter: Arc<dyn DatePhraseInterpreter>,
        provider: Option<Arc<dyn LlmProvider>>,
        max_phrase_tokens: usize,
    ) -> Self {
        Self::with_stages(vec![
            Box::new(PatternMatcher),
            Box::new(PhraseResolver::with_max_tokens(interpreter, max_phrase_tokens)),
            Box::new(GenerativeResolver::new(provider)),
        ])
    }

    /// Build a pipeline from an explicit stage list.
    pub fn with_stages(stages: Vec<Box<dyn Stage>>) -> Self {
        Self { stages }
    }

    /// Parse one request.
    pub async fn parse(&self, request: &ParseRequest) -> ParseOutcome {
        let normalized = normalize::normalize(&request.text);
        debug!(original = %request.text, normalized = %normalized, "reminder text normalized");

        let input = StageInput {
            raw: request.text.trim(),
            normalized: &normalized,
            now: request.now,
        };

        let mut last_error = None;
        for stage in &self.stages {
            let kind = stage.kind();
            match stage.run(&input).await {
                StageResult::Resolved(resolution) => {
                    if resolution.when <= request.now {
                        warn!(
                            stage = kind.as_str(),
                            when = %resolution.when,
                            "stage answered with a non-future instant, ignoring"
                        );
                        last_error = Some(StageError::PastTime {
                            when: resolution.when,
                        });
                        continue;
                    }
                    info!(stage = kind.as_str(), when = %resolution.when, "reminder text resolved");
                    return ParseOutcome::Resolved {
                        when: resolution.when,
                        message: resolution.message,
                        resolved_by: kind,
                    };
                }
                StageResult::Continue(err) => {
                    debug!(stage = kind.as_str(), error = %err, "stage yielded");
                    last_error = Some(err);
                }
                StageResult::Fatal(err) => {
                    info!(stage = kind.as_str(), error = %err, "stage failed the parse");
                    return ParseOutcome::failed(Some(err));
                }
            }
        }

        ParseOutcome::failed(last_error)
    }
}

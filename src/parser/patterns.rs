//! Deterministic pattern stage.
//!
//! An ordered table of regex rules is evaluated against normalized text; the
//! first rule whose regex matches *and* whose captures convert to a valid
//! instant wins. A rule that matches but fails conversion (minute 75,
//! calendar overflow) is skipped and the next rule is tried. A successful
//! conversion that is not strictly in the future ends the whole parse with
//! [`StageError::PastTime`].
//!
//! Table order encodes priority: relative offsets first, then named-day rules
//! (specific before general), then bare times of today.

use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveTime, TimeDelta, TimeZone};
use chrono_tz::Tz;
use regex::{Captures, Regex};
use tracing::{debug, warn};

use super::phrase::MIN_MESSAGE_CHARS;
use super::{fallback_message, Resolution, ResolvedBy, Stage, StageError, StageInput, StageResult};

// ---------------------------------------------------------------------------
// Vocabulary
// ---------------------------------------------------------------------------

/// Part of the day named in a phrase ("kal shaam" -> evening).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayPart {
    /// Morning; hours are kept as written.
    Morning,
    /// Afternoon; hours below 12 are read as pm.
    Afternoon,
    /// Evening; hours below 12 are read as pm.
    Evening,
    /// Night; hours below 12 are read as pm and 12 is the coming midnight.
    Night,
}

impl DayPart {
    /// Parse a canonical day-part word.
    pub fn parse(word: &str) -> Option<Self> {
        match word {
            "morning" => Some(Self::Morning),
            "afternoon" => Some(Self::Afternoon),
            "evening" => Some(Self::Evening),
            "night" => Some(Self::Night),
            _ => None,
        }
    }

    /// Clock hour used when only the day-part is named.
    pub fn default_hour(self) -> u32 {
        match self {
            Self::Morning => 9,
            Self::Afternoon => 14,
            Self::Evening => 18,
            Self::Night => 21,
        }
    }
}

/// Explicit am/pm marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Meridiem {
    /// Before noon.
    Am,
    /// After noon.
    Pm,
}

impl Meridiem {
    fn parse(word: &str) -> Option<Self> {
        match word {
            "am" => Some(Self::Am),
            "pm" => Some(Self::Pm),
            _ => None,
        }
    }
}

/// How the hour was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockStyle {
    /// `HH:MM`; without a marker this is a 24-hour clock.
    Colon,
    /// Hour only (`5 baje`); without a marker small hours mean pm.
    HourOnly,
}

/// Resolve a written hour to a 24-hour clock hour.
///
/// An explicit marker wins; otherwise a day-part other than morning implies
/// pm (night 12 is midnight), and an hour-only time below 12 is assumed to
/// be pm. Hours of 24 or more wrap.
pub fn resolve_hour(
    hour: u32,
    meridiem: Option<Meridiem>,
    part: Option<DayPart>,
    style: ClockStyle,
) -> u32 {
    let marker = meridiem.or(match part {
        Some(DayPart::Morning) => None,
        Some(DayPart::Night) if hour == 12 => Some(Meridiem::Am),
        Some(_) => Some(Meridiem::Pm),
        None if style == ClockStyle::HourOnly => Some(Meridiem::Pm),
        None => None,
    });
    let hour = match marker {
        Some(Meridiem::Pm) if hour < 12 => hour.saturating_add(12),
        Some(Meridiem::Am) if hour == 12 => 0,
        _ => hour,
    };
    hour % 24
}

/// Extra day needed when `night 12` without a marker means the midnight
/// that ends that night.
fn midnight_rollover(hour: u32, meridiem: Option<Meridiem>, part: Option<DayPart>) -> u64 {
    u64::from(meridiem.is_none() && part == Some(DayPart::Night) && hour == 12)
}

// ---------------------------------------------------------------------------
// Rule table
// ---------------------------------------------------------------------------

/// Unit of a relative offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetUnit {
    /// Minutes.
    Minutes,
    /// Hours.
    Hours,
    /// Days.
    Days,
    /// Weeks.
    Weeks,
}

impl OffsetUnit {
    fn delta(self, amount: i64) -> Option<TimeDelta> {
        match self {
            Self::Minutes => TimeDelta::try_minutes(amount),
            Self::Hours => TimeDelta::try_hours(amount),
            Self::Days => TimeDelta::try_days(amount),
            Self::Weeks => TimeDelta::try_weeks(amount),
        }
    }
}

/// Extraction logic a rule runs on its captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    /// `N <unit> after <message>`.
    Offset(OffsetUnit),
    /// Named day plus `HH:MM`.
    DayClock,
    /// Named day plus day-part plus hour.
    DayPartHour,
    /// Named day plus hour, marker optional.
    DayHour,
    /// `HH:MM` today.
    BareClock,
    /// Hour with a marker today.
    BareHour,
}

/// One row of the rule table.
#[derive(Debug)]
pub struct PatternRule {
    /// Rule name used in logs.
    pub name: &'static str,
    /// Extraction logic.
    pub kind: RuleKind,
    regex: Regex,
}

impl PatternRule {
    /// Whether the rule's regex matches `text`.
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

const DAY: &str = r"(?P<day>day after tomorrow|tomorrow|today)";
const PART: &str = r"(?P<part>morning|afternoon|evening|night)";
const CLOCK: &str = r"(?P<hour>\d{1,2}):(?P<minute>\d{2})\s*(?P<meridiem>am|pm)?(?:\s*(?:baje|pe|ko))?";
const HOUR_MARKED: &str =
    r"(?P<hour>\d{1,2})\s*(?:(?P<meridiem>am|pm)(?:\s*baje)?|baje)(?:\s*(?:pe|ko))?";
const HOUR_LOOSE: &str = r"(?P<hour>\d{1,2})\s*(?P<meridiem>am|pm)?(?:\s*(?:baje|pe|ko))?";
const AT: &str = r"(?:(?:at|ko)\s+)?";
const MESSAGE: &str = r"(?:\s+(?P<msg>.*))?$";

fn rule_sources() -> Vec<(&'static str, RuleKind, String)> {
    let offset = |unit: &str| format!(r"\b(?P<amount>\d+)\s*(?:{unit})\s*(?:after|later)\b{MESSAGE}");
    vec![
        (
            "minutes_after",
            RuleKind::Offset(OffsetUnit::Minutes),
            offset("minutes?|mins?"),
        ),
        (
            "hours_after",
            RuleKind::Offset(OffsetUnit::Hours),
            offset("hours?|hrs?"),
        ),
        ("days_after", RuleKind::Offset(OffsetUnit::Days), offset("days?")),
        (
            "weeks_after",
            RuleKind::Offset(OffsetUnit::Weeks),
            offset("weeks?|wks?"),
        ),
        (
            "day_clock",
            RuleKind::DayClock,
            format!(r"\b{DAY}\s+(?:{PART}\s+)?{AT}{CLOCK}{MESSAGE}"),
        ),
        (
            "day_part_hour",
            RuleKind::DayPartHour,
            format!(r"\b{DAY}\s+{PART}\s+{AT}{HOUR_LOOSE}{MESSAGE}"),
        ),
        (
            "day_hour",
            RuleKind::DayHour,
            format!(r"\b{DAY}\s+{AT}{HOUR_LOOSE}{MESSAGE}"),
        ),
        ("bare_clock", RuleKind::BareClock, format!(r"^{AT}{CLOCK}{MESSAGE}")),
        (
            "bare_hour",
            RuleKind::BareHour,
            format!(r"^{AT}{HOUR_MARKED}{MESSAGE}"),
        ),
    ]
}

static RULES: LazyLock<Vec<PatternRule>> = LazyLock::new(|| {
    rule_sources()
        .into_iter()
        .filter_map(|(name, kind, source)| match Regex::new(&source) {
            Ok(regex) => Some(PatternRule { name, kind, regex }),
            Err(e) => {
                warn!(rule = name, error = %e, "pattern rule failed to compile");
                None
            }
        })
        .collect()
});

/// The compiled rule table in priority order.
pub fn rules() -> &'static [PatternRule] {
    &RULES
}

/// Number of rules defined, compiled or not.
pub fn defined_rule_count() -> usize {
    rule_sources().len()
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

/// Why a matched rule could not produce an instant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversionError {
    /// A captured number did not fit.
    #[error("invalid number: {0:?}")]
    Number(String),
    /// Minute out of range.
    #[error("invalid clock time {hour}:{minute:02}")]
    Clock {
        /// Resolved hour.
        hour: u32,
        /// Written minute.
        minute: u32,
    },
    /// Offset or date arithmetic left the supported range.
    #[error("date arithmetic overflow")]
    Overflow,
    /// The local wall-clock time does not exist in the zone.
    #[error("local time does not exist in {0}")]
    LocalTime(Tz),
}

fn number<T: std::str::FromStr>(caps: &Captures<'_>, name: &str) -> Result<T, ConversionError> {
    let raw = caps.name(name).map_or("", |m| m.as_str());
    raw.parse::<T>()
        .map_err(|_| ConversionError::Number(raw.to_owned()))
}

fn day_offset(caps: &Captures<'_>) -> u64 {
    match caps.name("day").map(|m| m.as_str()) {
        Some("tomorrow") => 1,
        Some("day after tomorrow") => 2,
        _ => 0,
    }
}

/// Build the instant at `hour:minute` on the day `days_ahead` after `now`.
pub fn at_clock(
    now: DateTime<Tz>,
    days_ahead: u64,
    hour: u32,
    minute: u32,
) -> Result<DateTime<Tz>, ConversionError> {
    let time = NaiveTime::from_hms_opt(hour, minute, 0)
        .ok_or(ConversionError::Clock { hour, minute })?;
    let date = now
        .date_naive()
        .checked_add_days(Days::new(days_ahead))
        .ok_or(ConversionError::Overflow)?;
    let zone = now.timezone();
    zone.from_local_datetime(&date.and_time(time))
        .earliest()
        .ok_or(ConversionError::LocalTime(zone))
}

fn convert(
    kind: RuleKind,
    caps: &Captures<'_>,
    now: DateTime<Tz>,
) -> Result<DateTime<Tz>, ConversionError> {
    let meridiem = caps.name("meridiem").and_then(|m| Meridiem::parse(m.as_str()));
    let part = caps.name("part").and_then(|m| DayPart::parse(m.as_str()));

    match kind {
        RuleKind::Offset(unit) => {
            let amount: i64 = number(caps, "amount")?;
            let delta = unit.delta(amount).ok_or(ConversionError::Overflow)?;
            now.checked_add_signed(delta)
                .ok_or(ConversionError::Overflow)
        }
        RuleKind::DayClock | RuleKind::BareClock => {
            let written = number(caps, "hour")?;
            let hour = resolve_hour(written, meridiem, part, ClockStyle::Colon);
            let days = day_offset(caps).saturating_add(midnight_rollover(written, meridiem, part));
            at_clock(now, days, hour, number(caps, "minute")?)
        }
        RuleKind::DayPartHour | RuleKind::DayHour | RuleKind::BareHour => {
            let written = number(caps, "hour")?;
            let hour = resolve_hour(written, meridiem, part, ClockStyle::HourOnly);
            let days = day_offset(caps).saturating_add(midnight_rollover(written, meridiem, part));
            at_clock(now, days, hour, 0)
        }
    }
}

/// Run the rule table over normalized text.
///
/// The returned message is the verbatim trailing text and may be empty;
/// [`PatternMatcher`] fills it in from the original input.
pub fn match_rules(normalized: &str, now: DateTime<Tz>) -> StageResult {
    for rule in rules() {
        let Some(caps) = rule.regex.captures(normalized) else {
            continue;
        };
        let when = match convert(rule.kind, &caps, now) {
            Ok(when) => when,
            Err(e) => {
                debug!(rule = rule.name, error = %e, "rule matched but conversion failed");
                continue;
            }
        };
        debug!(rule = rule.name, when = %when, "pattern rule matched");
        if when <= now {
            return StageResult::Fatal(StageError::PastTime { when });
        }
        let message = caps
            .name("msg")
            .map_or("", |m| m.as_str())
            .trim()
            .to_owned();
        return StageResult::Resolved(Resolution { when, message });
    }
    StageResult::Continue(StageError::NoMatch)
}

/// Pipeline stage wrapping [`match_rules`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternMatcher;

#[async_trait]
impl Stage for PatternMatcher {
    fn kind(&self) -> ResolvedBy {
        ResolvedBy::Pattern
    }

    async fn run(&self, input: &StageInput<'_>) -> StageResult {
        match match_rules(input.normalized, input.now) {
            StageResult::Resolved(resolution) => StageResult::Resolved(Resolution {
                message: fallback_message(&resolution.message, input.raw, MIN_MESSAGE_CHARS),
                when: resolution.when,
            }),
            other => other,
        }
    }
}

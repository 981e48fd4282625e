//! Date-phrase window and chrono-english interpreter tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Datelike, Weekday};
use chrono_tz::Tz;

use astranote::parser::phrase::{
    ChronoEnglishInterpreter, DatePhraseInterpreter, PhraseError, PhraseResolver,
};
use astranote::parser::{StageError, StageResult};

use crate::support::{at, june_first};

// ---------------------------------------------------------------------------
// ChronoEnglishInterpreter
// ---------------------------------------------------------------------------

#[test]
fn tomorrow_morning_uses_the_day_part_hour() {
    let when = ChronoEnglishInterpreter
        .interpret("tomorrow morning", june_first())
        .unwrap();
    assert_eq!(when, at(2025, 6, 2, 9, 0));
}

#[test]
fn bare_tomorrow_keeps_the_time_of_day() {
    let when = ChronoEnglishInterpreter
        .interpret("tomorrow", june_first())
        .unwrap();
    assert_eq!(when, at(2025, 6, 2, 10, 0));
}

#[test]
fn day_after_tomorrow_evening() {
    let when = ChronoEnglishInterpreter
        .interpret("day after tomorrow evening", june_first())
        .unwrap();
    assert_eq!(when, at(2025, 6, 3, 18, 0));
}

#[test]
fn today_night() {
    let when = ChronoEnglishInterpreter
        .interpret("today night", june_first())
        .unwrap();
    assert_eq!(when, at(2025, 6, 1, 21, 0));
}

#[test]
fn message_words_are_not_date_phrases() {
    for phrase in ["gym", "tomorrow gym", ""] {
        assert!(
            matches!(
                ChronoEnglishInterpreter.interpret(phrase, june_first()),
                Err(PhraseError::NotADate(_))
            ),
            "{phrase:?}"
        );
    }
}

#[test]
fn leading_in_is_dropped_before_a_duration() {
    let when = ChronoEnglishInterpreter
        .interpret("in 2 hours", june_first())
        .unwrap();
    assert_eq!(when, at(2025, 6, 1, 12, 0));
}

#[test]
fn oversized_numbers_are_out_of_range() {
    for phrase in ["1000000000 days", "in 99999 hours", "12345"] {
        assert_eq!(
            ChronoEnglishInterpreter.interpret(phrase, june_first()),
            Err(PhraseError::OutOfRange),
            "{phrase:?}"
        );
    }
}

#[test]
fn next_weekday_is_delegated_to_chrono_english() {
    let when = ChronoEnglishInterpreter
        .interpret("next friday", june_first())
        .unwrap();
    assert_eq!(when.weekday(), Weekday::Fri);
    assert!(when > june_first());
}

// ---------------------------------------------------------------------------
// PhraseResolver window
// ---------------------------------------------------------------------------

/// Interpreter that accepts only the phrases it was given.
struct Scripted {
    answers: HashMap<&'static str, DateTime<Tz>>,
    asked: Mutex<Vec<String>>,
}

impl Scripted {
    fn new(answers: &[(&'static str, DateTime<Tz>)]) -> Arc<Self> {
        Arc::new(Self {
            answers: answers.iter().copied().collect(),
            asked: Mutex::new(Vec::new()),
        })
    }

    fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }
}

impl DatePhraseInterpreter for Scripted {
    fn interpret(&self, phrase: &str, _now: DateTime<Tz>) -> Result<DateTime<Tz>, PhraseError> {
        self.asked.lock().unwrap().push(phrase.to_owned());
        self.answers
            .get(phrase)
            .copied()
            .ok_or_else(|| PhraseError::NotADate(phrase.to_owned()))
    }
}

fn resolved(result: StageResult) -> (DateTime<Tz>, String) {
    match result {
        StageResult::Resolved(r) => (r.when, r.message),
        other => panic!("expected resolution, got {other:?}"),
    }
}

#[test]
fn longest_prefix_wins() {
    let interpreter = Scripted::new(&[
        ("alpha", at(2025, 6, 5, 9, 0)),
        ("alpha beta", at(2025, 6, 6, 9, 0)),
    ]);
    let resolver = PhraseResolver::new(interpreter.clone());

    let (when, message) = resolved(resolver.resolve(
        "alpha beta gamma delta",
        "alpha beta gamma delta",
        june_first(),
    ));
    assert_eq!(when, at(2025, 6, 6, 9, 0));
    assert_eq!(message, "gamma delta");
    assert_eq!(
        interpreter.asked(),
        vec!["alpha beta gamma delta", "alpha beta gamma", "alpha beta"]
    );
}

#[test]
fn window_caps_the_first_candidate() {
    let interpreter = Scripted::new(&[]);
    let resolver = PhraseResolver::with_max_tokens(interpreter.clone(), 2);

    let result = resolver.resolve("one two three four five", "one two three four five", june_first());
    assert_eq!(result, StageResult::Continue(StageError::NoMatch));
    assert_eq!(interpreter.asked(), vec!["one two", "one"]);
}

#[test]
fn past_candidates_are_skipped() {
    let interpreter = Scripted::new(&[
        ("alpha beta", at(2025, 5, 30, 9, 0)),
        ("alpha", at(2025, 6, 2, 9, 0)),
    ]);
    let resolver = PhraseResolver::new(interpreter);

    let (when, message) = resolved(resolver.resolve("alpha beta gamma", "alpha beta gamma", june_first()));
    assert_eq!(when, at(2025, 6, 2, 9, 0));
    assert_eq!(message, "beta gamma");
}

#[test]
fn candidate_equal_to_now_is_not_future() {
    let interpreter = Scripted::new(&[("alpha", june_first())]);
    let resolver = PhraseResolver::new(interpreter);

    assert_eq!(
        resolver.resolve("alpha gym", "alpha gym", june_first()),
        StageResult::Continue(StageError::NoMatch)
    );
}

#[test]
fn short_tail_falls_back_to_original_text() {
    let interpreter = Scripted::new(&[("alpha beta", at(2025, 6, 2, 9, 0))]);
    let resolver = PhraseResolver::new(interpreter);

    let (_, message) = resolved(resolver.resolve("alpha beta go", "Alpha Beta go", june_first()));
    assert_eq!(message, "Alpha Beta go");
}

#[test]
fn empty_text_never_consults_the_interpreter() {
    let interpreter = Scripted::new(&[]);
    let resolver = PhraseResolver::new(interpreter.clone());

    assert_eq!(
        resolver.resolve("", "", june_first()),
        StageResult::Continue(StageError::NoMatch)
    );
    assert!(interpreter.asked().is_empty());
}

//! AstraNote: a Telegram reminder bot that understands Hinglish.
//!
//! Users write reminders the way they speak (`"kal shaam 5 baje gym"`,
//! `"10 min baad chai"`); the [`parser`] turns them into exact instants,
//! the [`reminders`] service persists and schedules them, and [`delivery`]
//! fans them out to every verified channel when they fire.
//!
//! See `DESIGN.md` for the architecture notes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod logging;
pub mod providers;

pub mod parser;

pub mod delivery;
pub mod otp;
pub mod reminders;
pub mod scheduler;
pub mod store;

pub mod telegram;

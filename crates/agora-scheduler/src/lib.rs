//! Workflow scheduling primitives for agora.
//!
//! This crate knows nothing about storage or agents. It provides:
//!
//! - [`Schedule`]: a parsed schedule expression, either a one-off instant or a
//!   recurring [`CronExpr`]
//! - [`CronExpr`]: a five-field UTC cron evaluator
//! - [`Alarm`]: the single deadline an organization actor sleeps on
//!
//! # Example
//!
//! ```
//! use agora_scheduler::{Alarm, AlarmChange, Schedule};
//! use chrono::{TimeZone, Utc};
//!
//! let now = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
//!
//! // Cron expressions are recurring
//! let weekly = Schedule::parse("0 9 * * 1", now).unwrap();
//! let next = weekly.first_execution(now).unwrap();
//! assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 19, 9, 0, 0).unwrap());
//!
//! // Arm the actor's timer
//! let mut alarm = Alarm::new();
//! assert_eq!(alarm.set(Some(next)), AlarmChange::Armed(next));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod alarm;
pub mod cron;
pub mod error;
pub mod schedule;

pub use alarm::{Alarm, AlarmChange};
pub use cron::CronExpr;
pub use error::{Result, ScheduleError};
pub use schedule::Schedule;

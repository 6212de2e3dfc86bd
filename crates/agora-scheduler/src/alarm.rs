//! The single per-actor timer.
//!
//! An [`Alarm`] holds at most one deadline. The owner recomputes the desired
//! deadline after every workflow mutation and hands it to [`Alarm::set`];
//! the alarm reports what changed so the owner can log it.

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};

/// The effect of [`Alarm::set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmChange {
    /// Nothing was armed; now armed at the given time.
    Armed(DateTime<Utc>),
    /// Moved from one deadline to another.
    Rearmed {
        /// Previous deadline.
        from: DateTime<Utc>,
        /// New deadline.
        to: DateTime<Utc>,
    },
    /// Was armed at the given time; now disarmed.
    Disarmed(DateTime<Utc>),
    /// The requested state equals the current one.
    Unchanged,
}

/// A single optional deadline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Alarm {
    armed: Option<DateTime<Utc>>,
}

impl Alarm {
    /// A disarmed alarm.
    #[must_use]
    pub const fn new() -> Self {
        Self { armed: None }
    }

    /// The armed deadline, if any.
    #[must_use]
    pub const fn armed_at(&self) -> Option<DateTime<Utc>> {
        self.armed
    }

    /// Returns true if a deadline is armed.
    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Arm at `next`, or disarm when `None`.
    pub fn set(&mut self, next: Option<DateTime<Utc>>) -> AlarmChange {
        let change = match (self.armed, next) {
            (current, wanted) if current == wanted => AlarmChange::Unchanged,
            (None, Some(to)) => AlarmChange::Armed(to),
            (Some(from), Some(to)) => AlarmChange::Rearmed { from, to },
            (Some(from), None) => AlarmChange::Disarmed(from),
            (None, None) => AlarmChange::Unchanged,
        };
        self.armed = next;
        change
    }

    /// Consume the deadline if it has passed.
    ///
    /// Returns true when the alarm fired; it is then disarmed until the next
    /// [`Alarm::set`].
    pub fn take_if_due(&mut self, now: DateTime<Utc>) -> bool {
        match self.armed {
            Some(at) if at <= now => {
                self.armed = None;
                true
            }
            _ => false,
        }
    }

    /// Time left until the deadline, zero if it has passed.
    #[must_use]
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<std::time::Duration> {
        self.armed
            .map(|at| (at - now).to_std().unwrap_or(std::time::Duration::ZERO))
    }

    /// A future that completes when the deadline passes.
    ///
    /// Never completes while disarmed, which makes it suitable as a
    /// `tokio::select!` branch.
    #[must_use]
    pub fn wait(&self) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        match self.remaining(Utc::now()) {
            Some(delay) => Box::pin(tokio::time::sleep(delay)),
            None => Box::pin(std::future::pending()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn set_reports_transitions() {
        let mut alarm = Alarm::new();
        let t1 = Utc::now() + Duration::minutes(5);
        let t2 = t1 + Duration::minutes(5);

        assert_eq!(alarm.set(Some(t1)), AlarmChange::Armed(t1));
        assert_eq!(alarm.set(Some(t1)), AlarmChange::Unchanged);
        assert_eq!(alarm.set(Some(t2)), AlarmChange::Rearmed { from: t1, to: t2 });
        assert_eq!(alarm.set(None), AlarmChange::Disarmed(t2));
        assert_eq!(alarm.set(None), AlarmChange::Unchanged);
        assert!(!alarm.is_armed());
    }

    #[test]
    fn take_if_due_disarms() {
        let now = Utc::now();
        let mut alarm = Alarm::new();
        alarm.set(Some(now + Duration::seconds(10)));

        assert!(!alarm.take_if_due(now));
        assert!(alarm.is_armed());
        assert!(alarm.take_if_due(now + Duration::seconds(10)));
        assert!(!alarm.is_armed());
    }

    #[test]
    fn remaining_saturates_at_zero() {
        let now = Utc::now();
        let mut alarm = Alarm::new();
        assert_eq!(alarm.remaining(now), None);

        alarm.set(Some(now - Duration::seconds(3)));
        assert_eq!(alarm.remaining(now), Some(std::time::Duration::ZERO));
    }

    #[tokio::test]
    async fn wait_completes_for_past_deadline() {
        let mut alarm = Alarm::new();
        alarm.set(Some(Utc::now() - Duration::seconds(1)));
        tokio::time::timeout(std::time::Duration::from_secs(1), alarm.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn wait_pends_while_disarmed() {
        let alarm = Alarm::new();
        let result =
            tokio::time::timeout(std::time::Duration::from_millis(20), alarm.wait()).await;
        assert!(result.is_err());
    }
}

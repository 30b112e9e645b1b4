use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Temporal status of a task instance. Variants are ordered by urgency so
/// that `a <= b` reads as "b is at least as urgent as a".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Upcoming,
    DueSoon,
    Overdue,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Upcoming => "upcoming",
            TaskStatus::DueSoon => "due-soon",
            TaskStatus::Overdue => "overdue",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a due date relative to `as_of`.
///
/// Overdue once `as_of` is past the due date; due soon when the due date is
/// at most `due_soon_days` away; upcoming otherwise. For a fixed due date and
/// window the result never becomes less urgent as `as_of` advances.
pub fn classify(due_date: NaiveDate, due_soon_days: i64, as_of: NaiveDate) -> TaskStatus {
    if as_of > due_date {
        return TaskStatus::Overdue;
    }
    if (due_date - as_of).num_days() <= due_soon_days {
        TaskStatus::DueSoon
    } else {
        TaskStatus::Upcoming
    }
}

/// Whole days past due; zero when not yet overdue.
pub fn days_overdue(due_date: NaiveDate, as_of: NaiveDate) -> i64 {
    (as_of - due_date).num_days().max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn d(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn boundaries() {
        let due = d(2025, 1, 15);
        assert_eq!(classify(due, 7, d(2025, 1, 7)), TaskStatus::Upcoming);
        assert_eq!(classify(due, 7, d(2025, 1, 8)), TaskStatus::DueSoon);
        assert_eq!(classify(due, 7, due), TaskStatus::DueSoon);
        assert_eq!(classify(due, 7, due + Duration::days(1)), TaskStatus::Overdue);
    }

    #[test]
    fn zero_window_goes_straight_from_upcoming_to_due_on_the_day() {
        let due = d(2025, 1, 15);
        assert_eq!(classify(due, 0, d(2025, 1, 14)), TaskStatus::Upcoming);
        assert_eq!(classify(due, 0, due), TaskStatus::DueSoon);
    }

    #[test]
    fn days_overdue_is_never_negative() {
        let due = d(2025, 1, 15);
        assert_eq!(days_overdue(due, d(2025, 1, 1)), 0);
        assert_eq!(days_overdue(due, d(2025, 1, 30)), 15);
    }
}

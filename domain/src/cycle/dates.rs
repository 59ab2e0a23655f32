//! Date labels and the cycle window
//!
//! A cycle asks about a contiguous run of dates starting `offset` days after
//! the contact day and spanning `interval` days. Each date is identified by a
//! [`DateLabel`], which renders the way people see it in channel prompts
//! (e.g. `Monday 01/02`) but stays a real calendar date underneath so that
//! ordering is chronological, not lexicographic.

use crate::core::error::DomainError;
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

/// One askable date within a cycle.
///
/// Wraps a [`NaiveDate`]; `Ord` is calendar order, so any sorted collection
/// of labels is chronological.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct DateLabel(NaiveDate);

impl DateLabel {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl From<NaiveDate> for DateLabel {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl std::fmt::Display for DateLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // "Monday 01/02": full weekday name, zero-padded month/day
        write!(f, "{}", self.0.format("%A %m/%d"))
    }
}

/// The run of dates one cycle asks about.
///
/// `start` is the contact day; the window covers `interval` days beginning
/// `offset` days after it. Every availability map created for a cycle uses
/// exactly this window's label set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleWindow {
    start: NaiveDate,
    offset: u32,
    interval: u32,
}

impl CycleWindow {
    /// Create a window. Fails if the interval covers no days.
    pub fn new(start: NaiveDate, offset: u32, interval: u32) -> Result<Self, DomainError> {
        if interval == 0 {
            return Err(DomainError::EmptyWindow);
        }
        Ok(Self {
            start,
            offset,
            interval,
        })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }

    /// All labels in the window, in chronological order.
    pub fn labels(&self) -> Vec<DateLabel> {
        (self.offset..self.offset + self.interval)
            .filter_map(|day| self.start.checked_add_days(Days::new(u64::from(day))))
            .map(DateLabel::new)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_label_renders_weekday_and_date() {
        // 2023-01-02 was a Monday
        let label = DateLabel::new(date(2023, 1, 2));
        assert_eq!(label.to_string(), "Monday 01/02");
    }

    #[test]
    fn test_label_order_is_chronological() {
        // Lexicographic order on the rendered labels would put 01/10 before
        // 01/9's zero-padded form; calendar order must win.
        let mut labels = vec![
            DateLabel::new(date(2023, 1, 10)),
            DateLabel::new(date(2022, 12, 31)),
            DateLabel::new(date(2023, 1, 2)),
        ];
        labels.sort();
        assert_eq!(labels[0].date(), date(2022, 12, 31));
        assert_eq!(labels[2].date(), date(2023, 1, 10));
    }

    #[test]
    fn test_window_labels_cover_offset_and_interval() {
        let window = CycleWindow::new(date(2023, 1, 1), 2, 7).unwrap();
        let labels = window.labels();

        assert_eq!(labels.len(), 7);
        assert_eq!(labels[0].date(), date(2023, 1, 3));
        assert_eq!(labels[6].date(), date(2023, 1, 9));
    }

    #[test]
    fn test_window_rejects_zero_interval() {
        assert_eq!(
            CycleWindow::new(date(2023, 1, 1), 0, 0),
            Err(DomainError::EmptyWindow)
        );
    }

    #[test]
    fn test_window_labels_are_sorted() {
        let window = CycleWindow::new(date(2023, 1, 28), 0, 10).unwrap();
        let labels = window.labels();
        let mut sorted = labels.clone();
        sorted.sort();
        assert_eq!(labels, sorted);
    }
}

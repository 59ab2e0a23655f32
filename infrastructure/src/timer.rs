//! Cycle timer
//!
//! Fires the orchestrator's contact and deadline triggers at configured
//! instants. The schedule surface is deliberately small: a trigger is a time
//! of day, optionally pinned to a weekday (`"Sun 10:00"` for weekly,
//! `"10:00"` for daily). Specs are parsed and validated once at startup,
//! so a bad spec is fatal before any cycle runs, and the orchestrator itself
//! only ever consumes the resulting instants.

use chrono::{DateTime, Datelike, Days, FixedOffset, NaiveTime, Utc, Weekday};
use freeday_application::CycleOrchestrator;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Errors from parsing a trigger spec
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TriggerError {
    #[error("Empty trigger spec")]
    Empty,

    #[error("Invalid weekday: {0}")]
    InvalidWeekday(String),

    #[error("Invalid time (expected HH:MM): {0}")]
    InvalidTime(String),
}

/// When one trigger fires: a time of day, optionally pinned to a weekday.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerSpec {
    weekday: Option<Weekday>,
    time: NaiveTime,
}

impl TriggerSpec {
    /// Parse `"Sun 10:00"` (weekly) or `"10:00"` (daily).
    pub fn parse(spec: &str) -> Result<Self, TriggerError> {
        let mut parts = spec.split_whitespace();
        let first = parts.next().ok_or(TriggerError::Empty)?;

        let (weekday, time_str) = match parts.next() {
            Some(time_str) => {
                let weekday = first
                    .parse::<Weekday>()
                    .map_err(|_| TriggerError::InvalidWeekday(first.to_string()))?;
                (Some(weekday), time_str)
            }
            None => (None, first),
        };

        let time = NaiveTime::parse_from_str(time_str, "%H:%M")
            .map_err(|_| TriggerError::InvalidTime(time_str.to_string()))?;

        Ok(Self { weekday, time })
    }

    /// The next instant strictly after `now` at which this trigger fires.
    pub fn next_after(&self, now: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
        let tz = *now.offset();
        let mut date = now.date_naive();

        loop {
            let matches_weekday = self.weekday.is_none_or(|w| date.weekday() == w);
            if matches_weekday
                && let Some(candidate) = date.and_time(self.time).and_local_timezone(tz).single()
                && candidate > now
            {
                return candidate;
            }
            // Skipped or ambiguous local times fall through to the next day.
            date = date
                .checked_add_days(Days::new(1))
                .expect("date overflow computing next trigger");
        }
    }
}

/// Drives the recurring cycle: sleeps until the next contact or deadline
/// instant and fires the corresponding trigger on the orchestrator.
pub struct CycleTimer {
    contact: TriggerSpec,
    deadline: TriggerSpec,
    tz: FixedOffset,
    shutdown: CancellationToken,
}

impl CycleTimer {
    pub fn new(
        contact: TriggerSpec,
        deadline: TriggerSpec,
        tz: FixedOffset,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            contact,
            deadline,
            tz,
            shutdown,
        }
    }

    /// Run until the shutdown token fires.
    ///
    /// Trigger errors (e.g. a deadline arriving while no cycle is
    /// collecting) are logged and the loop keeps going; the schedule is the
    /// schedule.
    pub async fn run(&self, orchestrator: Arc<CycleOrchestrator>) {
        info!("cycle timer running");

        loop {
            let now = Utc::now().with_timezone(&self.tz);
            let next_contact = self.contact.next_after(now);
            let next_deadline = self.deadline.next_after(now);

            let (instant, is_contact) = if next_contact <= next_deadline {
                (next_contact, true)
            } else {
                (next_deadline, false)
            };
            let wait = (instant - now).to_std().unwrap_or(Duration::ZERO);
            info!(
                trigger = if is_contact { "contact" } else { "deadline" },
                at = %instant,
                "sleeping until next trigger"
            );

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("cycle timer stopping");
                    return;
                }
                _ = tokio::time::sleep(wait) => {}
            }

            if is_contact {
                if let Err(e) = orchestrator.on_contact().await {
                    error!("contact trigger failed: {e}");
                }
            } else if let Err(e) = orchestrator.on_deadline().await {
                error!("deadline trigger failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn tz() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<FixedOffset> {
        tz().with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_parse_daily_spec() {
        let spec = TriggerSpec::parse("10:30").unwrap();
        assert_eq!(spec.weekday, None);
        assert_eq!(spec.time, NaiveTime::from_hms_opt(10, 30, 0).unwrap());
    }

    #[test]
    fn test_parse_weekly_spec() {
        let spec = TriggerSpec::parse("Sun 10:00").unwrap();
        assert_eq!(spec.weekday, Some(Weekday::Sun));

        // Full names work too
        let spec = TriggerSpec::parse("monday 08:15").unwrap();
        assert_eq!(spec.weekday, Some(Weekday::Mon));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(
            TriggerSpec::parse("Someday 10:00"),
            Err(TriggerError::InvalidWeekday("Someday".to_string()))
        );
        assert_eq!(
            TriggerSpec::parse("25:99"),
            Err(TriggerError::InvalidTime("25:99".to_string()))
        );
        assert_eq!(TriggerSpec::parse(""), Err(TriggerError::Empty));
    }

    #[test]
    fn test_daily_next_is_today_when_time_has_not_passed() {
        let spec = TriggerSpec::parse("10:00").unwrap();
        // 2023-01-02 09:00, so it fires an hour later
        let next = spec.next_after(at(2023, 1, 2, 9, 0));
        assert_eq!(next, at(2023, 1, 2, 10, 0));
    }

    #[test]
    fn test_daily_next_rolls_over_when_time_has_passed() {
        let spec = TriggerSpec::parse("10:00").unwrap();
        let next = spec.next_after(at(2023, 1, 2, 10, 0));
        assert_eq!(next, at(2023, 1, 3, 10, 0));
    }

    #[test]
    fn test_weekly_next_lands_on_the_weekday() {
        // 2023-01-02 is a Monday; next Sunday is 01/08
        let spec = TriggerSpec::parse("Sun 10:00").unwrap();
        let next = spec.next_after(at(2023, 1, 2, 9, 0));
        assert_eq!(next, at(2023, 1, 8, 10, 0));
    }

    #[test]
    fn test_weekly_next_skips_a_full_week_when_passed() {
        // Sunday 01/08 at 11:00, spec fires Sundays at 10:00: next week
        let spec = TriggerSpec::parse("Sun 10:00").unwrap();
        let next = spec.next_after(at(2023, 1, 8, 11, 0));
        assert_eq!(next, at(2023, 1, 15, 10, 0));
    }
}

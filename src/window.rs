use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use thiserror::Error;

/// End-of-day sentinel: selecting this as the end hour means "through the
/// last instant of the end date".
pub const END_OF_DAY: &str = "24:00";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WindowError {
    #[error("invalid clock time {0:?}, expected HH:MM")]
    BadClockTime(String),
}

/// A user-selected query scope: a date range plus clock-time bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeWindow {
    start_date: NaiveDate,
    end_date: NaiveDate,
    start_time: NaiveTime,
    end_time: NaiveTime,
}

impl TimeWindow {
    pub fn new(
        start_date: NaiveDate,
        end_date: NaiveDate,
        start_hour: &str,
        end_hour: &str,
    ) -> Result<Self, WindowError> {
        Ok(Self {
            start_date,
            end_date,
            start_time: parse_clock_time(start_hour)?,
            end_time: parse_end_time(end_hour)?,
        })
    }

    /// The inclusive instant range this window covers, or `None` when the
    /// end precedes the start (a valid window that yields no data).
    pub fn resolve(&self) -> Option<InstantRange> {
        let start = self.start_date.and_time(self.start_time);
        let end = self.end_date.and_time(self.end_time);
        (start <= end).then_some(InstantRange { start, end })
    }
}

/// A resolved window: inclusive on both bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstantRange {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl InstantRange {
    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    pub fn contains(&self, instant: NaiveDateTime) -> bool {
        self.start <= instant && instant <= self.end
    }
}

fn parse_clock_time(raw: &str) -> Result<NaiveTime, WindowError> {
    NaiveTime::parse_from_str(raw, "%H:%M")
        .map_err(|_| WindowError::BadClockTime(raw.to_string()))
}

fn parse_end_time(raw: &str) -> Result<NaiveTime, WindowError> {
    if raw == END_OF_DAY {
        // 24:00 maps to the day's closing instant, not next midnight, so
        // the final minute of the end date stays inside the window.
        return NaiveTime::from_hms_opt(23, 59, 59)
            .ok_or_else(|| WindowError::BadClockTime(raw.to_string()));
    }
    parse_clock_time(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn end_of_day_sentinel_resolves_to_last_instant() {
        let window = TimeWindow::new(date(2025, 7, 17), date(2025, 7, 17), "00:00", "24:00")
            .unwrap();
        let range = window.resolve().unwrap();
        assert_eq!(range.start(), date(2025, 7, 17).and_hms_opt(0, 0, 0).unwrap());
        assert_eq!(range.end(), date(2025, 7, 17).and_hms_opt(23, 59, 59).unwrap());
    }

    #[test]
    fn end_before_start_resolves_to_empty() {
        let window = TimeWindow::new(date(2025, 7, 17), date(2025, 7, 17), "14:00", "13:00")
            .unwrap();
        assert!(window.resolve().is_none());

        let reversed_dates =
            TimeWindow::new(date(2025, 7, 18), date(2025, 7, 17), "00:00", "24:00").unwrap();
        assert!(reversed_dates.resolve().is_none());
    }

    #[test]
    fn membership_is_inclusive_on_both_bounds() {
        let range = TimeWindow::new(date(2025, 7, 17), date(2025, 7, 17), "08:00", "10:30")
            .unwrap()
            .resolve()
            .unwrap();
        assert!(range.contains(date(2025, 7, 17).and_hms_opt(8, 0, 0).unwrap()));
        assert!(range.contains(date(2025, 7, 17).and_hms_opt(10, 30, 0).unwrap()));
        assert!(!range.contains(date(2025, 7, 17).and_hms_opt(7, 59, 0).unwrap()));
        assert!(!range.contains(date(2025, 7, 17).and_hms_opt(10, 31, 0).unwrap()));
    }

    #[test]
    fn rejects_malformed_clock_times() {
        let result = TimeWindow::new(date(2025, 7, 17), date(2025, 7, 17), "8am", "24:00");
        assert_eq!(result, Err(WindowError::BadClockTime("8am".to_string())));
    }
}

//! Calendar Resolver
//!
//! Pure calendar arithmetic: converts a timeframe unit plus integer offsets
//! into absolute window boundaries in epoch milliseconds.
//!
//! Offset 0 always means the current, not-yet-closed instance of the unit
//! (today / this week / this month / this year); offset N is N whole units
//! into the past. All boundaries are anchored at local midnight; weeks start
//! on Monday (ISO).
//!
//! The rolling-window family is the one deliberate exception to true
//! calendar arithmetic: it converts months and years into fixed day counts
//! (30.4 days per month, 365 days per year) so a rolling span can be
//! expressed as a single duration.

use chrono::{DateTime, Datelike, Duration, Local, LocalResult, Months, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed day-count approximations used by the rolling-window family only.
pub const ROLLING_DAYS_PER_YEAR: f64 = 365.0;
pub const ROLLING_DAYS_PER_MONTH: f64 = 30.4;
pub const ROLLING_WEEKS_PER_YEAR: f64 = 52.0;

/// Errors from window resolution.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CalendarError {
    /// `start` offset lies after `end` offset; the window would be inverted.
    #[error("inverted window: start offset {start} < end offset {end}")]
    InvertedWindow { start: u32, end: u32 },

    /// Offset arithmetic left the range chrono can represent.
    #[error("offset {0} out of representable range")]
    OffsetOutOfRange(u32),

    /// Timeframe keyword not recognized.
    #[error("unknown timeframe unit: {0}")]
    UnknownUnit(String),
}

/// Granularity of windowing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Day,
    Week,
    Month,
    Year,
}

impl TimeUnit {
    /// Parse a timeframe keyword. Unknown words are a caller error.
    pub fn parse(s: &str) -> Result<Self, CalendarError> {
        match s {
            "day" => Ok(TimeUnit::Day),
            "week" => Ok(TimeUnit::Week),
            "month" => Ok(TimeUnit::Month),
            "year" => Ok(TimeUnit::Year),
            other => Err(CalendarError::UnknownUnit(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeUnit::Day => "day",
            TimeUnit::Week => "week",
            TimeUnit::Month => "month",
            TimeUnit::Year => "year",
        }
    }

    /// All units, ordered from finest to coarsest.
    pub fn all() -> &'static [TimeUnit] {
        &[TimeUnit::Day, TimeUnit::Week, TimeUnit::Month, TimeUnit::Year]
    }
}

impl std::fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved absolute window, both bounds in epoch milliseconds.
/// `end_ts` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start_ts: i64,
    pub end_ts: i64,
}

/// Resolve `(unit, start, end)` offsets against `now`.
///
/// The start boundary is the beginning of the unit instance `start` whole
/// units back; the end boundary is the end of the *day* reached by shifting
/// today back `end` whole units (exclusive next midnight). Requires
/// `start >= end`.
pub fn resolve_window(
    unit: TimeUnit,
    start: u32,
    end: u32,
    now: DateTime<Local>,
) -> Result<TimeWindow, CalendarError> {
    if start < end {
        return Err(CalendarError::InvertedWindow { start, end });
    }
    let today = now.date_naive();
    let start_date = period_start(unit, start, today)?;
    let end_date = shift_back(unit, end, today)?
        .succ_opt()
        .ok_or(CalendarError::OffsetOutOfRange(end))?;

    Ok(TimeWindow {
        start_ts: local_midnight_ms(start_date),
        end_ts: local_midnight_ms(end_date),
    })
}

/// Resolve a period-aligned window: both bounds are beginnings of unit
/// instances, `[period_start(start), period_start(end))`. This is the
/// window of the whole-unit metric family; `end` 0 stops at the current
/// instance's start, so the open period is never included. Requires
/// `start >= end`; `start == end` collapses the window to its boundary
/// instant.
pub fn resolve_period_window(
    unit: TimeUnit,
    start: u32,
    end: u32,
    today: NaiveDate,
) -> Result<TimeWindow, CalendarError> {
    if start < end {
        return Err(CalendarError::InvertedWindow { start, end });
    }
    Ok(TimeWindow {
        start_ts: local_midnight_ms(period_start(unit, start, today)?),
        end_ts: local_midnight_ms(period_start(unit, end, today)?),
    })
}

/// Start date of the unit instance `offset` whole units in the past.
pub fn period_start(unit: TimeUnit, offset: u32, today: NaiveDate) -> Result<NaiveDate, CalendarError> {
    let out_of_range = || CalendarError::OffsetOutOfRange(offset);
    match unit {
        TimeUnit::Day => today
            .checked_sub_signed(Duration::days(offset as i64))
            .ok_or_else(out_of_range),
        TimeUnit::Week => {
            let monday = today - Duration::days(today.weekday().num_days_from_monday() as i64);
            monday
                .checked_sub_signed(Duration::weeks(offset as i64))
                .ok_or_else(out_of_range)
        }
        TimeUnit::Month => {
            let first = today.with_day(1).ok_or_else(out_of_range)?;
            first.checked_sub_months(Months::new(offset)).ok_or_else(out_of_range)
        }
        TimeUnit::Year => {
            let jan1 = NaiveDate::from_ymd_opt(today.year() - offset as i32, 1, 1);
            jan1.ok_or_else(out_of_range)
        }
    }
}

/// Today shifted back `offset` whole units, keeping the day-of-period where
/// the calendar allows it (month/year shifts clamp at month ends).
pub fn shift_back(unit: TimeUnit, offset: u32, today: NaiveDate) -> Result<NaiveDate, CalendarError> {
    let out_of_range = || CalendarError::OffsetOutOfRange(offset);
    match unit {
        TimeUnit::Day => today
            .checked_sub_signed(Duration::days(offset as i64))
            .ok_or_else(out_of_range),
        TimeUnit::Week => today
            .checked_sub_signed(Duration::weeks(offset as i64))
            .ok_or_else(out_of_range),
        TimeUnit::Month => today.checked_sub_months(Months::new(offset)).ok_or_else(out_of_range),
        TimeUnit::Year => today
            .checked_sub_months(Months::new(offset.saturating_mul(12)))
            .ok_or_else(out_of_range),
    }
}

/// Epoch milliseconds of local midnight for `date`.
///
/// DST gaps and folds pick the earliest valid instant; a date with no valid
/// local midnight at all falls back to the UTC interpretation.
pub fn local_midnight_ms(date: NaiveDate) -> i64 {
    let dt = date.and_time(NaiveTime::MIN);
    match Local.from_local_datetime(&dt) {
        LocalResult::Single(t) => t.timestamp_millis(),
        LocalResult::Ambiguous(earliest, _) => earliest.timestamp_millis(),
        LocalResult::None => Utc.from_utc_datetime(&dt).timestamp_millis(),
    }
}

/// True on Mondays: the weekly caches roll over.
pub fn is_week_start(date: NaiveDate) -> bool {
    date.weekday().num_days_from_monday() == 0
}

/// True on the 1st: the monthly caches roll over.
pub fn is_month_start(date: NaiveDate) -> bool {
    date.day() == 1
}

/// True on Jan 1st: the yearly caches roll over.
pub fn is_year_start(date: NaiveDate) -> bool {
    date.day() == 1 && date.month() == 1
}

/// Unit of a rolling-window token like `24h` or `12m`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowUnit {
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl WindowUnit {
    /// Single-character suffix used in function names (`last_24h_max`).
    pub fn from_suffix(c: char) -> Option<Self> {
        match c {
            'i' => Some(WindowUnit::Minute),
            'h' => Some(WindowUnit::Hour),
            'd' => Some(WindowUnit::Day),
            'w' => Some(WindowUnit::Week),
            'm' => Some(WindowUnit::Month),
            'y' => Some(WindowUnit::Year),
            _ => None,
        }
    }
}

/// A fixed-length lookback window (`24h`, `30d`, `12m`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RollingWindow {
    pub count: u32,
    pub unit: WindowUnit,
}

impl RollingWindow {
    /// Window length in milliseconds. Months and years use the fixed
    /// day-count approximations, not calendar arithmetic.
    pub fn duration_ms(&self) -> i64 {
        const MINUTE: f64 = 60_000.0;
        const HOUR: f64 = 3_600_000.0;
        const DAY: f64 = 86_400_000.0;
        let unit_ms = match self.unit {
            WindowUnit::Minute => MINUTE,
            WindowUnit::Hour => HOUR,
            WindowUnit::Day => DAY,
            WindowUnit::Week => 7.0 * DAY,
            WindowUnit::Month => ROLLING_DAYS_PER_MONTH * DAY,
            WindowUnit::Year => ROLLING_DAYS_PER_YEAR * DAY,
        };
        (self.count as f64 * unit_ms).round() as i64
    }
}

impl std::fmt::Display for RollingWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let suffix = match self.unit {
            WindowUnit::Minute => 'i',
            WindowUnit::Hour => 'h',
            WindowUnit::Day => 'd',
            WindowUnit::Week => 'w',
            WindowUnit::Month => 'm',
            WindowUnit::Year => 'y',
        };
        write!(f, "{}{}", self.count, suffix)
    }
}

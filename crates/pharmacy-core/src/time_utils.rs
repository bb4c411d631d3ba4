use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::DashboardError;

// ── System timezone detection ─────────────────────────────────────────────────

/// Detect the IANA timezone name of the running system.
///
/// Falls back to `"UTC"` if detection fails.
pub fn get_system_timezone() -> String {
    iana_time_zone::get_timezone().unwrap_or_else(|_| "UTC".to_string())
}

/// Parse an IANA timezone name, falling back to UTC with a warning.
pub fn parse_timezone(tz_name: &str) -> Tz {
    tz_name.parse::<Tz>().unwrap_or_else(|_| {
        warn!(
            "unrecognised timezone \"{}\", falling back to UTC",
            tz_name
        );
        Tz::UTC
    })
}

/// Validate that `tz_name` is a recognised IANA timezone identifier.
pub fn validate_timezone(tz_name: &str) -> bool {
    tz_name.parse::<Tz>().is_ok()
}

/// Calendar date of `ts` in `tz`.
pub fn local_date(ts: DateTime<Utc>, tz: Tz) -> NaiveDate {
    ts.with_timezone(&tz).date_naive()
}

/// Hour of day (0-23) of `ts` in `tz`.
pub fn local_hour(ts: DateTime<Utc>, tz: Tz) -> u32 {
    ts.with_timezone(&tz).hour()
}

/// `"14:00-15:00"` style label for an hour of day.
pub fn hour_label(hour: u32) -> String {
    format!("{:02}:00-{:02}:00", hour, (hour + 1) % 24)
}

// ── Granularity ───────────────────────────────────────────────────────────────

/// Calendar period used to bucket consultations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    /// ISO week, Monday to Sunday.
    Week,
    Month,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Day => "day",
            Granularity::Week => "week",
            Granularity::Month => "month",
        }
    }

    /// First calendar day of the period containing `date`.
    pub fn period_start(&self, date: NaiveDate) -> NaiveDate {
        match self {
            Granularity::Day => date,
            Granularity::Week => {
                date - chrono::Duration::days(i64::from(date.weekday().num_days_from_monday()))
            }
            Granularity::Month => date - chrono::Duration::days(i64::from(date.day0())),
        }
    }

    /// First day of the period following the one that starts at `start`.
    ///
    /// Returns `None` only at the end of chrono's representable range.
    pub fn next_start(&self, start: NaiveDate) -> Option<NaiveDate> {
        let start = self.period_start(start);
        match self {
            Granularity::Day => start.checked_add_days(Days::new(1)),
            Granularity::Week => start.checked_add_days(Days::new(7)),
            Granularity::Month => start.checked_add_months(Months::new(1)),
        }
    }

    /// Sortable key of the period containing `date`:
    /// `2024-01-15`, `2024-W03` or `2024-01`.
    pub fn key(&self, date: NaiveDate) -> String {
        match self {
            Granularity::Day => date.format("%Y-%m-%d").to_string(),
            Granularity::Week => date.format("%G-W%V").to_string(),
            Granularity::Month => date.format("%Y-%m").to_string(),
        }
    }
}

impl FromStr for Granularity {
    type Err = DashboardError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "day" | "daily" => Ok(Granularity::Day),
            "week" | "weekly" => Ok(Granularity::Week),
            "month" | "monthly" => Ok(Granularity::Month),
            other => Err(DashboardError::Config(format!(
                "unknown period granularity: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── DateRange ─────────────────────────────────────────────────────────────────

/// Inclusive range of local calendar dates; open ends are unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub since: Option<NaiveDate>,
    pub until: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(since: Option<NaiveDate>, until: Option<NaiveDate>) -> Self {
        Self { since, until }
    }

    /// The last `days` days up to and including `today`.
    pub fn last_days(days: u32, today: NaiveDate) -> Self {
        let since = today - chrono::Duration::days(i64::from(days.saturating_sub(1)));
        Self {
            since: Some(since),
            until: Some(today),
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.since.is_none() && self.until.is_none()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.since.map_or(true, |s| date >= s) && self.until.map_or(true, |u| date <= u)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

use chrono::{DateTime, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde_json::Value;
use tracing::warn;

use crate::error::ValidationError;

// ── TimestampProcessor ────────────────────────────────────────────────────────

/// Numeric epochs at or above this are milliseconds (year 5138 in seconds).
const MILLIS_EPOCH_THRESHOLD: u64 = 100_000_000_000;

/// 2200-01-01T00:00:00Z.
const MAX_EPOCH_SECS: i64 = 7_258_118_400;

/// Parses timestamps from the variety of formats found in exported records.
pub struct TimestampProcessor;

impl TimestampProcessor {
    /// Attempt to parse a [`serde_json::Value`] into a UTC [`DateTime`].
    ///
    /// Handles:
    /// * `null`       → `None`
    /// * JSON string  → RFC 3339 (including `Z`-suffix), RFC 2822, or common
    ///   naive date-time / date patterns. Naive values are read as local time
    ///   in `tz`.
    /// * JSON number  → Unix timestamp in seconds, or milliseconds for values
    ///   of 1e11 and above; results outside 1970..2200 are rejected.
    pub fn parse(value: &Value, tz: Tz) -> Option<DateTime<Utc>> {
        match value {
            Value::Null => None,
            Value::String(s) => Self::parse_str(s.as_str(), tz),
            Value::Number(n) => match n.as_i64() {
                Some(i) if i.unsigned_abs() >= MILLIS_EPOCH_THRESHOLD => {
                    Self::plausible(DateTime::from_timestamp_millis(i)?)
                }
                Some(i) => Self::plausible(DateTime::from_timestamp(i, 0)?),
                None => Self::parse_epoch(n.as_f64()?),
            },
            _ => None,
        }
    }

    /// Float epoch seconds, or milliseconds when the value is too large to be
    /// a plausible number of seconds.
    fn parse_epoch(value: f64) -> Option<DateTime<Utc>> {
        if !value.is_finite() {
            return None;
        }
        let secs = if value.abs() >= MILLIS_EPOCH_THRESHOLD as f64 {
            value / 1000.0
        } else {
            value
        };
        if !(0.0..MAX_EPOCH_SECS as f64).contains(&secs) {
            return None;
        }
        let whole = secs.trunc() as i64;
        let nanos = ((secs.fract() * 1_000_000_000.0).round() as u32).min(999_999_999);
        Self::plausible(DateTime::from_timestamp(whole, nanos)?)
    }

    /// Only instants in 1970..2200 are accepted.
    fn plausible(dt: DateTime<Utc>) -> Option<DateTime<Utc>> {
        (0..MAX_EPOCH_SECS)
            .contains(&dt.timestamp())
            .then_some(dt)
    }

    fn parse_str(s: &str, tz: Tz) -> Option<DateTime<Utc>> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }

        let normalised = if let Some(stripped) = s.strip_suffix('Z') {
            format!("{}+00:00", stripped)
        } else {
            s.to_string()
        };

        if let Ok(dt) = DateTime::parse_from_rfc3339(&normalised) {
            return Some(dt.with_timezone(&Utc));
        }

        if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
            return Some(dt.with_timezone(&Utc));
        }

        const FORMATS: &[&str] = &[
            "%Y-%m-%dT%H:%M:%S%.f",
            "%Y-%m-%dT%H:%M:%S",
            "%Y-%m-%d %H:%M:%S%.f",
            "%Y-%m-%d %H:%M:%S",
            "%Y-%m-%d %H:%M",
            "%d/%m/%Y %H:%M:%S",
        ];

        for fmt in FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
                return Self::localise(naive, tz);
            }
        }

        for fmt in ["%Y-%m-%d", "%d/%m/%Y"] {
            if let Ok(date) = chrono::NaiveDate::parse_from_str(s, fmt) {
                return Self::localise(date.and_hms_opt(0, 0, 0)?, tz);
            }
        }

        warn!("could not parse timestamp string \"{}\"", s);
        None
    }

    /// Attach `tz` to a naive local time. Ambiguous times (DST fold) take the
    /// earlier instant; non-existent times are rejected.
    fn localise(naive: NaiveDateTime, tz: Tz) -> Option<DateTime<Utc>> {
        match tz.from_local_datetime(&naive) {
            LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
            LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
            LocalResult::None => None,
        }
    }
}

// ── FieldExtractor ────────────────────────────────────────────────────────────

/// Typed access to a raw JSON row, tolerating the key-name variants used by
/// different exporters.
///
/// Each getter takes the canonical field name (reported in errors) and the
/// ordered list of accepted keys; the first key that is present and non-null
/// wins.
pub struct FieldExtractor;

impl FieldExtractor {
    fn find<'a>(obj: &'a Value, keys: &[&str]) -> Option<&'a Value> {
        keys.iter()
            .filter_map(|key| obj.get(*key))
            .find(|v| !v.is_null())
    }

    /// Non-empty string field. Numbers are accepted and stringified so that
    /// numeric pharmacist or item ids still load.
    pub fn required_str(
        obj: &Value,
        field: &'static str,
        keys: &[&str],
    ) -> Result<String, ValidationError> {
        match Self::optional_str(obj, field, keys)? {
            Some(s) => Ok(s),
            None => Err(ValidationError::MissingField(field)),
        }
    }

    pub fn optional_str(
        obj: &Value,
        field: &'static str,
        keys: &[&str],
    ) -> Result<Option<String>, ValidationError> {
        match Self::find(obj, keys) {
            None => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(other) => Err(ValidationError::InvalidField {
                field,
                value: other.to_string(),
            }),
        }
    }

    /// Non-negative number. Numeric strings such as `"12.5"` are accepted.
    pub fn required_f64(
        obj: &Value,
        field: &'static str,
        keys: &[&str],
    ) -> Result<f64, ValidationError> {
        match Self::optional_f64(obj, field, keys)? {
            Some(v) => Ok(v),
            None => Err(ValidationError::MissingField(field)),
        }
    }

    pub fn optional_f64(
        obj: &Value,
        field: &'static str,
        keys: &[&str],
    ) -> Result<Option<f64>, ValidationError> {
        let Some(raw) = Self::find(obj, keys) else {
            return Ok(None);
        };
        let value = match raw {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
        .filter(|v| v.is_finite())
        .ok_or_else(|| ValidationError::InvalidField {
            field,
            value: raw.to_string(),
        })?;

        if value < 0.0 {
            return Err(ValidationError::NegativeValue { field, value });
        }
        Ok(Some(value))
    }

    /// Unsigned integer count. Integral floats (`12.0`) are accepted.
    pub fn required_u64(
        obj: &Value,
        field: &'static str,
        keys: &[&str],
    ) -> Result<u64, ValidationError> {
        match Self::optional_u64(obj, field, keys)? {
            Some(v) => Ok(v),
            None => Err(ValidationError::MissingField(field)),
        }
    }

    pub fn optional_u64(
        obj: &Value,
        field: &'static str,
        keys: &[&str],
    ) -> Result<Option<u64>, ValidationError> {
        let Some(raw) = Self::find(obj, keys) else {
            return Ok(None);
        };
        if let Some(v) = raw.as_u64() {
            return Ok(Some(v));
        }
        let as_float = match raw {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        match as_float {
            Some(f) if f < 0.0 => Err(ValidationError::NegativeValue { field, value: f }),
            Some(f) if f.is_finite() && f.fract() == 0.0 => Ok(Some(f as u64)),
            _ => Err(ValidationError::InvalidField {
                field,
                value: raw.to_string(),
            }),
        }
    }

    pub fn required_timestamp(
        obj: &Value,
        field: &'static str,
        keys: &[&str],
        tz: Tz,
    ) -> Result<DateTime<Utc>, ValidationError> {
        let raw = Self::find(obj, keys).ok_or(ValidationError::MissingField(field))?;
        TimestampProcessor::parse(raw, tz).ok_or_else(|| ValidationError::InvalidField {
            field,
            value: raw.to_string(),
        })
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

//! # Diff Normalizer
//!
//! Decides whether two differently written values mean the same thing, so a remote
//! service that rewrites `P7D` as `P1W` does not cause an endless apply loop.
//!
//! Canonical forms exist for comparison only. Stored state always keeps the user's
//! literal (see [`ModelReconciler`](crate::reconcile::ModelReconciler)).

use crate::error::NormalizeError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Display;
use std::str::FromStr;

/// How a field's string values are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatKind {
    #[default]
    Exact,
    CaseInsensitive,
    /// Leading/trailing whitespace is insignificant.
    Trimmed,
    /// ISO-8601 duration (`P1W`, `PT36H`, `P1Y2M`).
    Duration,
    /// JSON document; key order and whitespace are insignificant.
    Json,
}

/// Comparison-only form of a value.
#[derive(Debug, Clone, PartialEq)]
pub enum Canonical {
    Text(String),
    Duration(IsoDuration),
    Json(Value),
}

const NANOS_PER_SECOND: i128 = 1_000_000_000;
const NANOS_PER_MINUTE: i128 = 60 * NANOS_PER_SECOND;
const NANOS_PER_HOUR: i128 = 60 * NANOS_PER_MINUTE;
const NANOS_PER_DAY: i128 = 24 * NANOS_PER_HOUR;
const NANOS_PER_WEEK: i128 = 7 * NANOS_PER_DAY;

/// An ISO-8601 duration split into its calendar-relative and fixed parts.
///
/// Years and months cannot be reduced to seconds, so they fold into `months` and are
/// compared on their own. Weeks, days, hours, minutes and seconds fold into `nanos`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct IsoDuration {
    months: i64,
    nanos: i128,
}

impl IsoDuration {
    pub fn months(&self) -> i64 {
        self.months
    }

    pub fn nanos(&self) -> i128 {
        self.nanos
    }

    /// True when the duration has a part that depends on the calendar.
    pub fn is_calendar_relative(&self) -> bool {
        self.months != 0
    }

    pub fn parse(value: &str) -> Result<Self, NormalizeError> {
        let invalid = |reason| NormalizeError::InvalidDuration {
            value: value.to_string(),
            reason,
        };

        let text = value.trim().to_ascii_uppercase();
        let body = text
            .strip_prefix('P')
            .ok_or_else(|| invalid("must start with 'P'"))?;
        if body.is_empty() {
            return Err(invalid("no components"));
        }

        let (date, time) = match body.split_once('T') {
            Some((_, "")) => return Err(invalid("'T' must be followed by a time component")),
            Some((date, time)) => (date, Some(time)),
            None => (body, None),
        };

        let mut duration = IsoDuration::default();
        parse_components(date, &['Y', 'M', 'W', 'D'], false, &mut duration)
            .map_err(|reason| invalid(reason))?;
        if let Some(time) = time {
            parse_components(time, &['H', 'M', 'S'], true, &mut duration)
                .map_err(|reason| invalid(reason))?;
        }
        Ok(duration)
    }
}

impl FromStr for IsoDuration {
    type Err = NormalizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Display for IsoDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "P")?;
        if self.months != 0 {
            write!(f, "{}M", self.months)?;
        }
        if self.nanos != 0 || self.months == 0 {
            let secs = self.nanos / NANOS_PER_SECOND;
            let frac = self.nanos % NANOS_PER_SECOND;
            if frac == 0 {
                write!(f, "T{secs}S")?;
            } else {
                let digits = format!("{frac:09}");
                write!(f, "T{secs}.{}S", digits.trim_end_matches('0'))?;
            }
        }
        Ok(())
    }
}

/// Parses `<number><designator>` pairs in designator order.
fn parse_components(
    mut input: &str,
    designators: &[char],
    in_time: bool,
    out: &mut IsoDuration,
) -> Result<(), &'static str> {
    let mut next_allowed = 0;
    while !input.is_empty() {
        let end = input
            .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == ','))
            .ok_or("number without designator")?;
        let (number, rest) = input.split_at(end);
        if number.is_empty() {
            return Err("designator without number");
        }
        let designator = rest.chars().next().ok_or("number without designator")?;
        input = &rest[designator.len_utf8()..];

        let position = designators[next_allowed..]
            .iter()
            .position(|d| *d == designator)
            .ok_or("unknown or out-of-order designator")?;
        next_allowed += position + 1;

        let (whole, fraction) = split_number(number)?;
        match (in_time, designator) {
            (false, 'Y') | (false, 'M') => {
                if fraction.is_some() {
                    return Err("fractional years or months cannot be compared");
                }
                let months = if designator == 'Y' {
                    whole.checked_mul(12).ok_or("value too large")?
                } else {
                    whole
                };
                out.months = out.months.checked_add(months).ok_or("value too large")?;
            }
            (false, 'W') => out.nanos += scaled(whole, fraction, NANOS_PER_WEEK)?,
            (false, 'D') => out.nanos += scaled(whole, fraction, NANOS_PER_DAY)?,
            (true, 'H') => out.nanos += scaled(whole, fraction, NANOS_PER_HOUR)?,
            (true, 'M') => out.nanos += scaled(whole, fraction, NANOS_PER_MINUTE)?,
            (true, 'S') => out.nanos += scaled(whole, fraction, NANOS_PER_SECOND)?,
            _ => return Err("unknown designator"),
        }
    }
    Ok(())
}

/// Splits `12.5` into `(12, Some("5"))`.
fn split_number(number: &str) -> Result<(i64, Option<&str>), &'static str> {
    let (whole, fraction) = match number.find(['.', ',']) {
        Some(i) => (&number[..i], Some(&number[i + 1..])),
        None => (number, None),
    };
    if whole.is_empty() || fraction.is_some_and(|f| f.is_empty() || f.contains(['.', ','])) {
        return Err("malformed number");
    }
    let whole = whole.parse::<i64>().map_err(|_| "value too large")?;
    Ok((whole, fraction))
}

fn scaled(whole: i64, fraction: Option<&str>, unit: i128) -> Result<i128, &'static str> {
    let mut total = (whole as i128).checked_mul(unit).ok_or("value too large")?;
    if let Some(fraction) = fraction {
        // Nanosecond resolution is enough; extra digits are dropped.
        let digits = &fraction[..fraction.len().min(9)];
        let value = digits.parse::<i128>().map_err(|_| "malformed number")?;
        let scale = 10i128.pow(digits.len() as u32);
        total += value * unit / scale;
    }
    Ok(total)
}

/// Comparison-only canonical form of `value` under `kind`.
pub fn canonicalize(value: &str, kind: FormatKind) -> Result<Canonical, NormalizeError> {
    match kind {
        FormatKind::Exact => Ok(Canonical::Text(value.to_string())),
        FormatKind::CaseInsensitive => Ok(Canonical::Text(value.to_lowercase())),
        FormatKind::Trimmed => Ok(Canonical::Text(value.trim().to_string())),
        FormatKind::Duration => IsoDuration::parse(value).map(Canonical::Duration),
        FormatKind::Json => serde_json::from_str(value)
            .map(Canonical::Json)
            .map_err(|e| NormalizeError::InvalidJson(e.to_string())),
    }
}

/// Whether `a` and `b` mean the same under `kind`.
///
/// Values that fail to parse are only equivalent when byte-identical.
pub fn equivalent(a: &str, b: &str, kind: FormatKind) -> bool {
    if a == b {
        return true;
    }
    match (canonicalize(a, kind), canonicalize(b, kind)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// [`equivalent`] lifted to attribute values.
///
/// Strings go through the normalizer; a JSON field may also hold a structured value,
/// which is compared against the parsed form of a string on the other side.
pub fn values_equivalent(a: &Value, b: &Value, kind: FormatKind) -> bool {
    match (a, b) {
        (Value::String(a), Value::String(b)) => equivalent(a, b, kind),
        (Value::String(text), other) | (other, Value::String(text))
            if kind == FormatKind::Json =>
        {
            serde_json::from_str::<Value>(text).is_ok_and(|parsed| &parsed == other)
        }
        _ => a == b,
    }
}

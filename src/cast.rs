//! Value coercion into the declared field types.
//!
//! Every function here is total: it inspects one [`Primitive`] and returns
//! either the coerced value or a [`CastError`] describing why the value could
//! not be converted. Nothing panics, so callers can record the failure on the
//! cell and move on.
//!
//! Canonical representations:
//!
//! | target    | representation                                   |
//! |-----------|--------------------------------------------------|
//! | `string`  | `Primitive::String`                              |
//! | `number`  | finite `Primitive::Number`                       |
//! | `boolean` | `Primitive::Boolean` (`Null` for an empty input) |
//! | `date`    | `Primitive::String` in RFC 1123 form, always GMT |

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use thiserror::Error;

use crate::{
    schema::CastTarget,
    value::{Primitive, format_number},
};

/// Tokens that read as `true`, compared against lower-cased text.
pub const TRUTHY_VALUES: &[&str] = &["1", "yes", "true", "on", "t", "y"];

/// Tokens that read as `false`, compared against lower-cased text.
pub const FALSY_VALUES: &[&str] = &["-1", "0", "no", "false", "off", "f", "n"];

/// Largest magnitude of a millisecond timestamp accepted as a date.
pub const MAX_TIMESTAMP_MILLIS: f64 = 8.64e15;

const RFC1123_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Years the RFC 1123 rendering can express with a four-digit year.
const RENDERABLE_YEARS: std::ops::RangeInclusive<i32> = 1..=9999;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%Y/%m/%d",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%b %d %Y",
    "%d %B %Y",
    "%d %b %Y",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CastError {
    #[error("Cannot cast {kind} to string")]
    String { kind: &'static str },
    #[error("Invalid number")]
    Number,
    #[error("Invalid boolean")]
    Boolean,
    #[error("Invalid date")]
    Date,
}

pub type CastResult = Result<Primitive, CastError>;

pub fn cast(target: CastTarget, value: &Primitive) -> CastResult {
    match target {
        CastTarget::String => to_string(value),
        CastTarget::Number => to_number(value),
        CastTarget::Boolean => to_boolean(value),
        CastTarget::Date => to_date(value),
    }
}

/// Whether `value` is already in the canonical representation of `target`.
pub fn is_target_type(target: CastTarget, value: &Primitive) -> bool {
    match (target, value) {
        (CastTarget::String, Primitive::String(_)) => true,
        (CastTarget::Number, Primitive::Number(_)) => true,
        (CastTarget::Boolean, Primitive::Boolean(_)) => true,
        (CastTarget::Date, Primitive::String(text)) => is_canonical_date(text),
        _ => false,
    }
}

pub fn to_string(value: &Primitive) -> CastResult {
    match value {
        Primitive::String(text) => Ok(Primitive::String(text.clone())),
        Primitive::Number(number) if number.is_finite() => {
            Ok(Primitive::String(format_number(*number)))
        }
        Primitive::Boolean(flag) => Ok(Primitive::String(
            if *flag { "true" } else { "false" }.to_string(),
        )),
        other => Err(CastError::String { kind: other.kind() }),
    }
}

pub fn to_number(value: &Primitive) -> CastResult {
    match value {
        Primitive::Number(number) if number.is_finite() => Ok(Primitive::Number(*number)),
        Primitive::String(text) => parse_number(text)
            .map(Primitive::Number)
            .ok_or(CastError::Number),
        _ => Err(CastError::Number),
    }
}

pub fn to_boolean(value: &Primitive) -> CastResult {
    let token = match value {
        Primitive::Boolean(flag) => return Ok(Primitive::Boolean(*flag)),
        Primitive::String(text) if text.is_empty() => return Ok(Primitive::Null),
        Primitive::String(text) => text.to_lowercase(),
        Primitive::Number(number) => format_number(*number),
        Primitive::Null => return Err(CastError::Boolean),
    };
    if TRUTHY_VALUES.contains(&token.as_str()) {
        Ok(Primitive::Boolean(true))
    } else if FALSY_VALUES.contains(&token.as_str()) {
        Ok(Primitive::Boolean(false))
    } else {
        Err(CastError::Boolean)
    }
}

pub fn to_date(value: &Primitive) -> CastResult {
    let parsed = match value {
        Primitive::Number(number) => from_timestamp_millis(*number),
        Primitive::String(text) => match parse_timestamp_literal(text) {
            Some(millis) => from_timestamp_millis(millis),
            None => parse_date_text(text),
        },
        _ => None,
    };
    parsed
        .filter(|date| RENDERABLE_YEARS.contains(&date.year()))
        .map(|date| Primitive::String(format_rfc1123(&date)))
        .ok_or(CastError::Date)
}

pub fn format_rfc1123(date: &DateTime<Utc>) -> String {
    date.format(RFC1123_FORMAT).to_string()
}

pub fn is_canonical_date(text: &str) -> bool {
    DateTime::parse_from_rfc2822(text)
        .map(|parsed| format_rfc1123(&parsed.with_timezone(&Utc)) == text)
        .unwrap_or(false)
}

/// Numeric literal with thousands separators removed; `None` unless finite.
fn parse_number(raw: &str) -> Option<f64> {
    let stripped = raw.replace(',', "");
    parse_timestamp_literal(&stripped)
}

fn parse_timestamp_literal(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|parsed| parsed.is_finite())
}

fn from_timestamp_millis(millis: f64) -> Option<DateTime<Utc>> {
    if !millis.is_finite() || millis.abs() > MAX_TIMESTAMP_MILLIS {
        return None;
    }
    DateTime::<Utc>::from_timestamp_millis(millis.trunc() as i64)
}

fn parse_date_text(raw: &str) -> Option<DateTime<Utc>> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc2822(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Some(stripped) = value.strip_suffix('Z')
        && let Some(parsed) = parse_naive_datetime(stripped)
    {
        return Some(parsed.and_utc());
    }
    if let Some(parsed) = parse_naive_datetime(value) {
        return Some(parsed.and_utc());
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
}

fn parse_naive_datetime(value: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

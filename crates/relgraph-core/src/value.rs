//! Column values read from the source and their coercion to target types.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use std::fmt;

use crate::error::{MigrationError, MigrationResult};
use crate::types::TargetType;

/// A single column value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Canonical text used to compare key values across scans.
    ///
    /// Integral floats and integers render identically so that a key read as
    /// `1.0` from one table matches `1` from another.
    pub fn key_repr(&self) -> String {
        match self {
            Self::Null => "\u{0}null".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => (*f as i64).to_string(),
            Self::Float(f) => f.to_string(),
            Self::Text(s) => s.clone(),
            Self::Bytes(b) => b.iter().map(|byte| format!("{byte:02x}")).collect(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            other => f.write_str(&other.key_repr()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Joins key values into one comparable identifier.
pub fn key_identity(values: &[Value]) -> String {
    values
        .iter()
        .map(Value::key_repr)
        .collect::<Vec<_>>()
        .join("\u{1f}")
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Best-effort conversion of a source value into the representation of
/// `target`. Nulls always pass through.
pub fn coerce(value: Value, target: TargetType) -> MigrationResult<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }

    let converted = match target {
        TargetType::Boolean => to_bool(&value).map(Value::Bool),
        TargetType::Short | TargetType::Integer | TargetType::Long => {
            to_int(&value).and_then(|i| check_range(i, target)).map(Value::Int)
        }
        TargetType::Float | TargetType::Double | TargetType::Decimal => {
            to_float(&value).map(Value::Float)
        }
        TargetType::String => Some(Value::Text(match &value {
            Value::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            other => other.key_repr(),
        })),
        TargetType::Date => to_date(&value).map(Value::Text),
        TargetType::DateTime => to_datetime(&value).map(Value::Text),
        TargetType::Time => to_time(&value).map(Value::Text),
        TargetType::Binary => Some(match value {
            Value::Bytes(ref b) => Value::Bytes(b.clone()),
            Value::Text(ref s) => Value::Bytes(s.as_bytes().to_vec()),
            ref other => Value::Bytes(other.key_repr().into_bytes()),
        }),
    };

    converted.ok_or_else(|| MigrationError::Coercion {
        value: value.to_string(),
        target: target.to_string(),
    })
}

fn to_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Int(0) => Some(false),
        Value::Int(1) => Some(true),
        Value::Text(s) => match s.trim().to_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "1" => Some(true),
            "false" | "f" | "no" | "n" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn to_int(value: &Value) -> Option<i64> {
    match value {
        Value::Int(i) => Some(*i),
        Value::Bool(b) => Some(i64::from(*b)),
        Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
        Value::Text(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.fract() == 0.0 && f.is_finite())
                    .map(|f| f as i64)
            })
        }
        _ => None,
    }
}

fn check_range(i: i64, target: TargetType) -> Option<i64> {
    let fits = match target {
        TargetType::Short => i16::try_from(i).is_ok(),
        TargetType::Integer => i32::try_from(i).is_ok(),
        _ => true,
    };
    fits.then_some(i)
}

fn to_float(value: &Value) -> Option<f64> {
    match value {
        Value::Float(f) => Some(*f),
        Value::Int(i) => Some(*i as f64),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Text(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn epoch(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::Int(secs) => DateTime::from_timestamp(*secs, 0).map(|d| d.naive_utc()),
        Value::Float(secs) => DateTime::from_timestamp(secs.trunc() as i64, 0).map(|d| d.naive_utc()),
        _ => None,
    }
}

fn to_datetime(value: &Value) -> Option<String> {
    let dt = match value {
        Value::Text(s) => parse_datetime(s),
        other => epoch(other),
    }?;
    Some(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
}

fn to_date(value: &Value) -> Option<String> {
    let date = match value {
        Value::Text(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .ok()
            .or_else(|| parse_datetime(s).map(|dt| dt.date())),
        other => epoch(other).map(|dt| dt.date()),
    }?;
    Some(date.format("%Y-%m-%d").to_string())
}

fn to_time(value: &Value) -> Option<String> {
    match value {
        Value::Text(s) => NaiveTime::parse_from_str(s.trim(), "%H:%M:%S%.f")
            .or_else(|_| NaiveTime::parse_from_str(s.trim(), "%H:%M"))
            .ok()
            .or_else(|| parse_datetime(s).map(|dt| dt.time()))
            .map(|t| t.format("%H:%M:%S%.f").to_string()),
        _ => None,
    }
}

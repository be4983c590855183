//! Backend field-name variants and value coercion.
//!
//! Every backend spells the same field differently ("Ticket owner",
//! "case_owner", "Case Owner"). Headers are folded (lowercase, `_` as space,
//! single spaces) and looked up in a per-domain alias table.

use crate::types::Domain;
use chrono::{DateTime, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde_json::Value;

/// Canonical fields the normalizer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    RecordId,
    CreatedAt,
    Owner,
    Pipeline,
    FirstResponseAt,
    ResponseHours,
    ResponseSeconds,
    Weekend,
}

const TICKET_COLUMNS: &[(&str, Field)] = &[
    ("ticket id", Field::RecordId),
    ("hs object id", Field::RecordId),
    ("id", Field::RecordId),
    ("create date", Field::CreatedAt),
    ("createdate", Field::CreatedAt),
    ("created at", Field::CreatedAt),
    ("case owner", Field::Owner),
    ("ticket owner", Field::Owner),
    ("owner", Field::Owner),
    ("assigned agent", Field::Owner),
    ("pipeline", Field::Pipeline),
    ("hs pipeline", Field::Pipeline),
    ("first agent email response date", Field::FirstResponseAt),
    ("first agent response date", Field::FirstResponseAt),
    ("first agent reply date", Field::FirstResponseAt),
    ("first response time (hours)", Field::ResponseHours),
    ("first response hours", Field::ResponseHours),
    ("weekend ticket", Field::Weekend),
    ("is weekend", Field::Weekend),
];

const CHAT_COLUMNS: &[(&str, Field)] = &[
    ("chat id", Field::RecordId),
    ("id", Field::RecordId),
    ("chat creation date adt", Field::CreatedAt),
    ("chat creation date utc", Field::CreatedAt),
    ("chat creation date", Field::CreatedAt),
    ("chat creation date america/moncton", Field::CreatedAt),
    ("chat creation date raw", Field::CreatedAt),
    ("primary agent raw", Field::Owner),
    ("primary agent", Field::Owner),
    ("operator 1 nick", Field::Owner),
    ("first response time", Field::ResponseSeconds),
    ("first response raw", Field::ResponseSeconds),
    ("is weekend", Field::Weekend),
    ("weekend chat", Field::Weekend),
];

/// Fold a header into its lookup form.
pub fn fold_header(header: &str) -> String {
    header
        .replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Canonical field for a backend header, if it is a known variant.
pub fn canonical_field(domain: Domain, header: &str) -> Option<Field> {
    let folded = fold_header(header);
    let table = match domain {
        Domain::Tickets => TICKET_COLUMNS,
        Domain::Chats => CHAT_COLUMNS,
    };
    table
        .iter()
        .find(|(variant, _)| *variant == folded)
        .map(|(_, field)| *field)
}

/// Whether an unmapped header names a date/time column.
pub fn is_temporal_header(header: &str) -> bool {
    let folded = fold_header(header);
    folded.split(' ').any(|w| w == "date" || w == "timestamp")
}

/// Zone to assume for offset-less timestamps from a given column.
///
/// Ticket exports are written in US Central wall-clock time. Chat exports
/// are UTC unless the column is the Moncton-local variant.
pub fn naive_zone(domain: Domain, header: &str) -> Tz {
    match domain {
        Domain::Tickets => chrono_tz::America::Chicago,
        Domain::Chats => {
            let folded = fold_header(header);
            if folded.contains("america/moncton") || folded.ends_with(" adt") {
                chrono_tz::America::Moncton
            } else {
                chrono_tz::UTC
            }
        }
    }
}

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Parse a date/time-like value into an instant.
///
/// Offset-aware strings keep their offset; naive ones are read in
/// `naive_zone`. Numbers are epoch seconds, or milliseconds when large.
/// Anything unparseable is `None`.
pub fn parse_timestamp(value: &Value, naive_zone: Tz) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp_str(s, naive_zone),
        Value::Number(n) => {
            let raw = n.as_i64()?;
            if raw.abs() >= 100_000_000_000 {
                DateTime::from_timestamp_millis(raw)
            } else {
                DateTime::from_timestamp(raw, 0)
            }
        }
        _ => None,
    }
}

fn parse_timestamp_str(raw: &str, naive_zone: Tz) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%z") {
        return Some(dt.with_timezone(&Utc));
    }
    if let Some(stripped) = s.strip_suffix(" UTC") {
        return NAIVE_FORMATS
            .iter()
            .find_map(|f| NaiveDateTime::parse_from_str(stripped, f).ok())
            .map(|naive| naive.and_utc());
    }
    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;
    match naive_zone.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        // Inside a DST gap: shift forward an hour
        LocalResult::None => naive_zone
            .from_local_datetime(&(naive + chrono::Duration::hours(1)))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc)),
    }
}

/// Numeric value of a field, accepting numbers and numeric strings.
pub fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

/// Boolean value of a field.
pub fn parse_flag(value: &Value) -> Option<bool> {
    crate::params::coerce_bool(value)
}

/// Text value of a field; blank and null values are `None`.
pub fn parse_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    let lowered = text.to_ascii_lowercase();
    if text.is_empty() || matches!(lowered.as_str(), "nan" | "null" | "none") {
        None
    } else {
        Some(text)
    }
}

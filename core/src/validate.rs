//! Input validators.
//!
//! Pure functions that turn malformed caller input into typed
//! [`GuardError`]s. Validators never catch or suppress; the guard is the
//! single boundary that converts failures into envelopes.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde_json::{Map, Value};

use crate::error::GuardError;

static ENTITY_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{3}\.(EST|MUN)\.[A-Z0-9_]+$").expect("valid entity id regex"));

/// Effective date window after watermark resolution. `adjusted` is true
/// when either bound was clipped to the watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub adjusted: bool,
}

/// Check that every named field is present and non-empty.
///
/// Missing means: absent key, `null`, empty string, or empty array. The
/// failure lists all missing fields in the order given, not just the first.
pub fn require_fields(payload: &Map<String, Value>, fields: &[&str]) -> Result<(), GuardError> {
    let missing: Vec<&str> = fields
        .iter()
        .copied()
        .filter(|name| is_missing(payload.get(*name)))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(GuardError::InvalidPayload(format!(
            "missing required fields: {}",
            missing.join(", ")
        )))
    }
}

fn is_missing(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(_) => false,
    }
}

/// Parse a strict `YYYY-MM-DD` date string, naming the offending field and
/// the received value on failure.
pub fn parse_date(value: &Value, field: &str) -> Result<NaiveDate, GuardError> {
    match value {
        Value::String(raw) => {
            if raw.len() == 10 {
                if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
                    return Ok(date);
                }
            }
            Err(GuardError::InvalidPayload(format!(
                "invalid date in '{field}' (expected YYYY-MM-DD): {raw:?}"
            )))
        }
        other => Err(GuardError::InvalidPayload(format!(
            "invalid type for '{field}': {} (expected a YYYY-MM-DD string)",
            json_type(other)
        ))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Resolve a requested window against the dataset watermark
/// `[min_date, max_date]`.
///
/// `from > to` fails in both modes. Non-strict clips out-of-window bounds
/// (`from` up to `min_date` first, then `to` down to `max_date`) and flags
/// the adjustment; strict rejects any bound outside the window.
pub fn resolve_range(
    from_value: &Value,
    to_value: &Value,
    min_date: NaiveDate,
    max_date: NaiveDate,
    strict: bool,
) -> Result<DateRange, GuardError> {
    let from = parse_date(from_value, "from")?;
    let to = parse_date(to_value, "to")?;

    if from > to {
        return Err(GuardError::InvalidPayload(
            "invalid range: 'from' is after 'to'".to_string(),
        ));
    }

    if !strict {
        let mut adjusted = false;
        let mut effective_from = from;
        let mut effective_to = to;
        if effective_from < min_date {
            effective_from = min_date;
            adjusted = true;
        }
        if effective_to > max_date {
            effective_to = max_date;
            adjusted = true;
        }
        return Ok(DateRange {
            from: effective_from,
            to: effective_to,
            adjusted,
        });
    }

    if from < min_date || to > max_date {
        return Err(GuardError::RangeOutsideWatermark(
            "requested range is outside the dataset watermark (strict mode)".to_string(),
        ));
    }

    Ok(DateRange {
        from,
        to,
        adjusted: false,
    })
}

/// Validate an entity selector (`AAA.EST.ID` / `AAA.MUN.ID`). A predicate,
/// not a transform: the value comes back unchanged.
pub fn parse_entity_id(value: &Value) -> Result<&str, GuardError> {
    let raw = value.as_str().ok_or_else(|| {
        GuardError::InvalidPayload(format!(
            "invalid entity_id: expected a string, got {}",
            json_type(value)
        ))
    })?;

    if ENTITY_ID_PATTERN.is_match(raw) {
        Ok(raw)
    } else {
        Err(GuardError::InvalidPayload(format!(
            "invalid entity_id: {raw:?} (expected AAA.EST.ID or AAA.MUN.ID)"
        )))
    }
}

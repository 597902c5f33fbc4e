//! Outbound report framing.
//!
//! The protocol defines exactly one outbound frame shape:
//! `p<id>:<json>` — literal prefix `p`, decimal id, colon, JSON-encoded
//! value. Remote peers parse this; the shape must not change.

use thiserror::Error;

use crate::{HandleId, Value};

/// Prefix byte of every report frame.
pub const REPORT_PREFIX: char = 'p';

/// Errors producing a report frame
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WireError {
    /// JSON has no representation for NaN or infinite floats.
    #[error("value contains a non-finite number")]
    NonFinite,

    #[error("JSON encoding failed: {0}")]
    Json(String),
}

/// Encode a report frame correlating `value` with `id`.
///
/// The value is checked for non-finite floats up front, so a frame is
/// either emitted whole or not at all.
pub fn encode_report(id: HandleId, value: &Value) -> Result<String, WireError> {
    ensure_finite(value)?;
    let json = serde_json::to_string(value).map_err(|e| WireError::Json(e.to_string()))?;
    Ok(format!("{REPORT_PREFIX}{id}:{json}"))
}

fn ensure_finite(value: &Value) -> Result<(), WireError> {
    match value {
        Value::Float(f) if !f.is_finite() => Err(WireError::NonFinite),
        Value::Array(items) => items.iter().try_for_each(ensure_finite),
        Value::Object(entries) => entries.values().try_for_each(ensure_finite),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_have_exact_shape() {
        let value = Value::object([("a", Value::Int(1))]);
        assert_eq!(
            encode_report(HandleId(1), &value).unwrap(),
            r#"p1:{"a":1}"#
        );
        assert_eq!(
            encode_report(HandleId::FIRST_LOCAL, &Value::Null).unwrap(),
            format!("p{}:null", i64::MAX)
        );
    }

    #[test]
    fn non_finite_floats_are_rejected() {
        assert_eq!(
            encode_report(HandleId(1), &Value::Float(f64::NAN)),
            Err(WireError::NonFinite)
        );
        let nested = Value::object([("deep", Value::Array(vec![Value::Float(f64::INFINITY)]))]);
        assert_eq!(
            encode_report(HandleId(1), &nested),
            Err(WireError::NonFinite)
        );
    }

    #[test]
    fn absent_sentinel_encodes_as_null() {
        assert_eq!(
            encode_report(HandleId(4), &Value::Undefined).unwrap(),
            "p4:null"
        );
    }
}

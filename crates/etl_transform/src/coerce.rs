//! Per-destination-column coercion (spec.md §4.2 step 3).

use crate::date_formats::normalise_date;
use etl_protocol::Value;

/// The column kind drives which coercion rule applies. Derived from the
/// live table's reported `data_type` plus the small set of column names
/// spec.md calls out as always-integer regardless of source formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Date,
    Numeric,
    Integer,
    Text,
}

/// Column names that are always treated as integers, independent of the
/// reported database type, per spec.md §4.2 step 3.
const KNOWN_INTEGER_KEYS: &[&str] = &["order_number", "line_number", "company_id", "status"];

impl ColumnKind {
    pub fn from_db_column(column: &str, data_type: &str) -> Self {
        if KNOWN_INTEGER_KEYS.contains(&column) {
            return ColumnKind::Integer;
        }
        match data_type {
            "date" | "timestamp" | "timestamp without time zone" | "timestamp with time zone" => ColumnKind::Date,
            "integer" | "bigint" | "smallint" => ColumnKind::Integer,
            "numeric" | "real" | "double precision" | "decimal" => ColumnKind::Numeric,
            _ => ColumnKind::Text,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct CoercionError(pub String);

/// Coerce one raw field value for `column` per its kind. Empty strings on
/// nullable columns become `Value::Null`; non-nullable empty strings are
/// coerced like any other value (and will fail numeric/date parsing if
/// those kinds require content).
pub fn coerce_value(raw: &Value, kind: ColumnKind, nullable: bool) -> Result<Value, CoercionError> {
    let text = raw.as_text();
    if text.is_empty() {
        if nullable {
            return Ok(Value::Null);
        }
        if matches!(kind, ColumnKind::Text) {
            return Ok(Value::Text(String::new()));
        }
    }

    match kind {
        ColumnKind::Text => Ok(Value::Text(text)),
        ColumnKind::Date => normalise_date(&text)
            .map(Value::Text)
            .ok_or_else(|| CoercionError(format!("{text:?} is not a recognised date"))),
        ColumnKind::Numeric => parse_numeric(&text).map(Value::Float),
        ColumnKind::Integer => parse_integer(&text).map(Value::Integer),
    }
}

/// Accepts decimal-comma (`1234,56`) or decimal-point (`1234.56`); rejects
/// anything else.
fn parse_numeric(text: &str) -> Result<f64, CoercionError> {
    let trimmed = text.trim();
    let normalised = if trimmed.contains('.') {
        trimmed.to_string()
    } else {
        trimmed.replacen(',', ".", 1)
    };
    normalised.parse::<f64>().map_err(|_| CoercionError(format!("{text:?} is not numeric")))
}

fn parse_integer(text: &str) -> Result<i64, CoercionError> {
    text.trim().parse::<i64>().map_err(|_| CoercionError(format!("{text:?} is not an integer")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_on_nullable_column_becomes_null() {
        let result = coerce_value(&Value::Text(String::new()), ColumnKind::Numeric, true).unwrap();
        assert_eq!(result, Value::Null);
    }

    #[test]
    fn numeric_accepts_decimal_comma() {
        let result = coerce_value(&Value::Text("1234,56".into()), ColumnKind::Numeric, false).unwrap();
        assert_eq!(result, Value::Float(1234.56));
    }

    #[test]
    fn numeric_accepts_decimal_point() {
        let result = coerce_value(&Value::Text("1234.56".into()), ColumnKind::Numeric, false).unwrap();
        assert_eq!(result, Value::Float(1234.56));
    }

    #[test]
    fn numeric_rejects_non_numeric_text() {
        assert!(coerce_value(&Value::Text("abc".into()), ColumnKind::Numeric, false).is_err());
    }

    #[test]
    fn known_integer_key_wins_over_reported_type() {
        assert_eq!(ColumnKind::from_db_column("order_number", "text"), ColumnKind::Integer);
    }

    #[test]
    fn date_coercion_normalises_to_iso() {
        let result = coerce_value(&Value::Text("31/05/2024".into()), ColumnKind::Date, false).unwrap();
        assert_eq!(result, Value::Text("2024-05-31".into()));
    }
}

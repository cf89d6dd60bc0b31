//! The Transform Layer (C2): column plan application, per-row coercion, and
//! per-table validation. Column plan *construction* against a live schema
//! lives in `etl_db::schema` since it needs a database handle; this crate
//! is the pure, schema-supplied-by-the-caller half.

pub mod coerce;
pub mod date_formats;
pub mod validate;

use coerce::{coerce_value, ColumnKind};
use etl_protocol::{Record, Value};
use std::collections::BTreeMap;
use validate::TableValidator;

pub use coerce::CoercionError;

/// One planned destination column: its kind and whether it accepts NULL.
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub source_key: String,
    pub db_column: String,
    pub kind: ColumnKind,
    pub nullable: bool,
}

/// Why one row failed transform. Carries enough detail for both the
/// strict-mode `InvalidRow` error and the dead-letter record.
#[derive(Debug, Clone)]
pub enum RowError {
    Coercion { column: String, reason: String },
    Validation(String),
}

impl std::fmt::Display for RowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RowError::Coercion { column, reason } => write!(f, "column {column}: {reason}"),
            RowError::Validation(reason) => write!(f, "{reason}"),
        }
    }
}

/// Maps records against one resolved column plan, in plan order.
pub struct RowMapper {
    table: String,
    columns: Vec<ColumnSpec>,
    validator: Box<dyn TableValidator>,
}

impl RowMapper {
    pub fn new(table: impl Into<String>, columns: Vec<ColumnSpec>) -> Self {
        let table = table.into();
        let validator = validate::validator_for(&table);
        Self { table, columns, validator }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Normalise, coerce, and validate one record. Returns the coerced
    /// values in column-plan order, ready for the copy-line encoder.
    pub fn map(&self, record: &Record) -> Result<Vec<Value>, RowError> {
        let mut coerced = Vec::with_capacity(self.columns.len());
        let mut named = BTreeMap::new();

        for spec in &self.columns {
            let raw = record.get_or_empty(&spec.source_key);
            let value = coerce_value(&raw, spec.kind, spec.nullable).map_err(|e| RowError::Coercion {
                column: spec.db_column.clone(),
                reason: e.0,
            })?;
            named.insert(spec.db_column.clone(), value.clone());
            coerced.push(value);
        }

        self.validator.validate(&named).map_err(RowError::Validation)?;
        Ok(coerced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper() -> RowMapper {
        RowMapper::new(
            "orders",
            vec![
                ColumnSpec { source_key: "order_number".into(), db_column: "order_number".into(), kind: ColumnKind::Integer, nullable: false },
                ColumnSpec { source_key: "order_date".into(), db_column: "order_date".into(), kind: ColumnKind::Date, nullable: true },
            ],
        )
    }

    #[test]
    fn maps_record_in_plan_order() {
        let record = Record::from_raw_pairs(vec![("order_number", "42"), ("order_date", "31/05/2024")]);
        let values = mapper().map(&record).unwrap();
        assert_eq!(values, vec![Value::Integer(42), Value::Text("2024-05-31".into())]);
    }

    #[test]
    fn missing_source_key_becomes_empty_then_coerced() {
        let record = Record::from_raw_pairs(vec![("order_number", "7")]);
        let values = mapper().map(&record).unwrap();
        assert_eq!(values[1], Value::Null);
    }

    #[test]
    fn coercion_failure_names_the_column() {
        let record = Record::from_raw_pairs(vec![("order_number", "not-a-number"), ("order_date", "2024-01-01")]);
        let err = mapper().map(&record).unwrap_err();
        match err {
            RowError::Coercion { column, .. } => assert_eq!(column, "order_number"),
            other => panic!("unexpected error: {other}"),
        }
    }
}

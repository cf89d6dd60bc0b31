//! Per-table row invariants (spec.md §4.2 step 4).
//!
//! The reference system validates table-specific business rules; this
//! crate exposes the hook as a small registry keyed by table name rather
//! than hard-coding every target schema, with the one worked example
//! spec.md names (order lines) as the built-in rule.

use etl_protocol::Value;
use std::collections::BTreeMap;

pub trait TableValidator: Send + Sync {
    /// `fields` are the coerced, plan-ordered db-column -> value pairs.
    fn validate(&self, fields: &BTreeMap<String, Value>) -> Result<(), String>;
}

struct OrderLineValidator;

impl TableValidator for OrderLineValidator {
    fn validate(&self, fields: &BTreeMap<String, Value>) -> Result<(), String> {
        let quantity_ok = fields
            .get("quantity")
            .map(|v| match v {
                Value::Integer(n) => *n > 0,
                Value::Float(f) => *f > 0.0,
                _ => false,
            })
            .unwrap_or(false);
        if !quantity_ok {
            return Err("order lines require a positive quantity".to_string());
        }

        let item_code_ok = fields.get("item_code").map(|v| !v.as_text().trim().is_empty()).unwrap_or(false);
        if !item_code_ok {
            return Err("order lines require a non-empty item code".to_string());
        }

        Ok(())
    }
}

struct NoopValidator;

impl TableValidator for NoopValidator {
    fn validate(&self, _fields: &BTreeMap<String, Value>) -> Result<(), String> {
        Ok(())
    }
}

/// Select the validator for `table`. Unknown tables pass through unchanged;
/// the ETL core does not invent invariants for tables it has not been told
/// about.
pub fn validator_for(table: &str) -> Box<dyn TableValidator> {
    match table {
        "order_lines" => Box::new(OrderLineValidator),
        _ => Box::new(NoopValidator),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn order_line_rejects_non_positive_quantity() {
        let validator = validator_for("order_lines");
        let fields = fields(&[("quantity", Value::Integer(0)), ("item_code", Value::Text("SKU1".into()))]);
        assert!(validator.validate(&fields).is_err());
    }

    #[test]
    fn order_line_rejects_empty_item_code() {
        let validator = validator_for("order_lines");
        let fields = fields(&[("quantity", Value::Integer(3)), ("item_code", Value::Text("".into()))]);
        assert!(validator.validate(&fields).is_err());
    }

    #[test]
    fn order_line_accepts_valid_row() {
        let validator = validator_for("order_lines");
        let fields = fields(&[("quantity", Value::Integer(3)), ("item_code", Value::Text("SKU1".into()))]);
        assert!(validator.validate(&fields).is_ok());
    }

    #[test]
    fn unknown_table_has_no_invariants() {
        let validator = validator_for("widgets");
        assert!(validator.validate(&BTreeMap::new()).is_ok());
    }
}

//! Live target-schema introspection and column plan construction.

use crate::error::{DbError, Result};
use etl_protocol::{ColumnMapping, ColumnPlan, Record, SourceMapping};
use sqlx::postgres::PgPool;
use sqlx::Row;
use std::collections::HashMap;

/// One column as reported by the live database.
#[derive(Debug, Clone)]
pub struct TableColumn {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
}

/// The live column set of one table, keyed by column name for fast lookup.
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub table: String,
    pub columns: HashMap<String, TableColumn>,
    /// Preserves the database's reported column order.
    pub ordered_names: Vec<String>,
}

impl TableSchema {
    pub fn contains(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    pub fn get(&self, column: &str) -> Option<&TableColumn> {
        self.columns.get(column)
    }
}

/// Fetch the live column set for `table` from `information_schema.columns`.
pub async fn introspect_table(pool: &PgPool, table: &str) -> Result<TableSchema> {
    let rows = sqlx::query(
        r#"SELECT column_name, data_type, is_nullable
           FROM information_schema.columns
           WHERE table_name = $1
           ORDER BY ordinal_position"#,
    )
    .bind(table)
    .fetch_all(pool)
    .await?;

    if rows.is_empty() {
        return Err(DbError::TableNotFound(table.to_string()));
    }

    let mut columns = HashMap::with_capacity(rows.len());
    let mut ordered_names = Vec::with_capacity(rows.len());
    for row in rows {
        let name: String = row.try_get("column_name")?;
        let data_type: String = row.try_get("data_type")?;
        let is_nullable_str: String = row.try_get("is_nullable")?;
        ordered_names.push(name.clone());
        columns.insert(
            name.clone(),
            TableColumn { name, data_type, is_nullable: is_nullable_str == "YES" },
        );
    }

    Ok(TableSchema { table: table.to_string(), columns, ordered_names })
}

/// Build a [`ColumnPlan`] from the first record's keys and the live table
/// schema, per the explicit-mapping-then-implicit-match rule with explicit
/// mappings winning ties.
pub fn build_column_plan(
    first_record: &Record,
    schema: &TableSchema,
    source_mapping: Option<&SourceMapping>,
) -> Result<ColumnPlan> {
    let mut mappings = Vec::new();
    let mut mapped_source_keys = std::collections::HashSet::new();

    if let Some(mapping) = source_mapping {
        for pair in &mapping.pairs {
            if schema.contains(&pair.db_column) {
                mappings.push(ColumnMapping {
                    source_key: pair.source_key.clone(),
                    db_column: pair.db_column.clone(),
                });
                mapped_source_keys.insert(pair.source_key.clone());
            }
        }
    }

    for key in first_record.keys() {
        if mapped_source_keys.contains(key) {
            continue;
        }
        if schema.contains(key) {
            mappings.push(ColumnMapping { source_key: key.to_string(), db_column: key.to_string() });
        }
    }

    let plan = ColumnPlan::new(mappings);
    if plan.is_empty() {
        return Err(DbError::NoColumnsMatch { table: schema.table.clone() });
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use etl_protocol::plan::ColumnMapping as Mapping;

    fn schema_with(columns: &[&str]) -> TableSchema {
        let mut map = HashMap::new();
        let mut ordered = Vec::new();
        for col in columns {
            map.insert(
                col.to_string(),
                TableColumn { name: col.to_string(), data_type: "text".into(), is_nullable: true },
            );
            ordered.push(col.to_string());
        }
        TableSchema { table: "orders".into(), columns: map, ordered_names: ordered }
    }

    #[test]
    fn implicit_match_on_normalised_keys() {
        let record = Record::from_raw_pairs(vec![
            ("Order Number".into(), "1".into()),
            ("unused".into(), "x".into()),
        ]);
        let schema = schema_with(&["order_number"]);
        let plan = build_column_plan(&record, &schema, None).unwrap();
        assert_eq!(plan.db_columns(), vec!["order_number".to_string()]);
    }

    #[test]
    fn explicit_mapping_wins_tie() {
        let record = Record::from_raw_pairs(vec![("order_number".into(), "1".into())]);
        let schema = schema_with(&["order_id"]);
        let mapping = SourceMapping {
            pairs: vec![Mapping { source_key: "order_number".into(), db_column: "order_id".into() }],
        };
        let plan = build_column_plan(&record, &schema, Some(&mapping)).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.mappings()[0].db_column, "order_id");
    }

    #[test]
    fn empty_plan_is_no_columns_match() {
        let record = Record::from_raw_pairs(vec![("nope".into(), "1".into())]);
        let schema = schema_with(&["order_id"]);
        assert!(matches!(build_column_plan(&record, &schema, None), Err(DbError::NoColumnsMatch { .. })));
    }
}

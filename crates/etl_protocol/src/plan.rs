//! `ColumnPlan`: the resolved source-key -> db-column mapping for a job.

use serde::{Deserialize, Serialize};

/// One `(source_key, db_column)` pair in an ordered column plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub source_key: String,
    pub db_column: String,
}

/// An ordered sequence of source-key/db-column pairs, fixed for the duration
/// of a job. Order matches the COPY column list and the encoded line.
///
/// Invariant: all `db_column`s are present in the target table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnPlan {
    mappings: Vec<ColumnMapping>,
}

impl ColumnPlan {
    pub fn new(mappings: Vec<ColumnMapping>) -> Self {
        Self { mappings }
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn mappings(&self) -> &[ColumnMapping] {
        &self.mappings
    }

    /// The ordered db column list, matching the encoded COPY line order.
    pub fn db_columns(&self) -> Vec<String> {
        self.mappings.iter().map(|m| m.db_column.clone()).collect()
    }

    pub fn source_keys(&self) -> Vec<String> {
        self.mappings.iter().map(|m| m.source_key.clone()).collect()
    }
}

/// Explicit source-key -> db-column mapping a caller may supply instead of
/// relying on implicit name matching (spec.md §4.2 step 1).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceMapping {
    pub pairs: Vec<ColumnMapping>,
}

/// The three conflict-resolution policies the bulk loader supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// `COPY` straight into the target table; let the database reject conflicts.
    Error,
    /// Stage, then `INSERT ... ON CONFLICT DO NOTHING`.
    Nothing,
    /// Stage, then `INSERT ... ON CONFLICT (keys) DO UPDATE SET ...`.
    Upsert,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_columns_preserve_order() {
        let plan = ColumnPlan::new(vec![
            ColumnMapping { source_key: "a".into(), db_column: "col_a".into() },
            ColumnMapping { source_key: "b".into(), db_column: "col_b".into() },
        ]);
        assert_eq!(plan.db_columns(), vec!["col_a", "col_b"]);
    }
}

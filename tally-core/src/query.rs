use crate::Value;
use std::sync::Arc;

/// Metadata about modify operations (INSERT/UPDATE/DELETE).
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowsAffected {
    /// Total number of rows impacted.
    pub rows_affected: u64,
    /// Identifier generated by the last insert, when the backend reports one.
    pub last_affected_id: Option<u64>,
}

/// Shared reference-counted column name list.
pub type RowNames = Arc<[String]>;
/// Owned row value slice matching `RowNames` length.
pub type Row = Box<[Value]>;

/// A result row with its corresponding column labels.
#[derive(Debug, Clone, PartialEq)]
pub struct RowLabeled {
    /// Column names.
    pub labels: RowNames,
    /// Data values (aligned by index with `labels`).
    pub values: Row,
}

impl RowLabeled {
    pub fn new(names: RowNames, values: Row) -> Self {
        Self {
            labels: names,
            values,
        }
    }
    pub fn names(&self) -> &[String] {
        &self.labels
    }
    pub fn values(&self) -> &[Value] {
        &self.values
    }
    pub fn get_column(&self, name: &str) -> Option<&Value> {
        self.labels
            .iter()
            .position(|v| v == name)
            .and_then(|i| self.values.get(i))
    }
}

impl<const N: usize> From<[(&str, Value); N]> for RowLabeled {
    fn from(value: [(&str, Value); N]) -> Self {
        let (labels, values): (Vec<_>, Vec<_>) =
            value.into_iter().map(|(k, v)| (k.to_string(), v)).unzip();
        Self::new(labels.into(), values.into())
    }
}

/// Outcome of a statement: the rows it read or the effect of a write.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Rows(Vec<RowLabeled>),
    Affected(RowsAffected),
}

impl QueryResult {
    /// Rows of a read, a write yields no rows.
    pub fn into_rows(self) -> Vec<RowLabeled> {
        match self {
            QueryResult::Rows(rows) => rows,
            QueryResult::Affected(..) => Vec::new(),
        }
    }
    pub fn affected(&self) -> Option<RowsAffected> {
        match self {
            QueryResult::Affected(v) => Some(*v),
            QueryResult::Rows(..) => None,
        }
    }
}

impl From<Vec<RowLabeled>> for QueryResult {
    fn from(value: Vec<RowLabeled>) -> Self {
        QueryResult::Rows(value)
    }
}

impl From<RowsAffected> for QueryResult {
    fn from(value: RowsAffected) -> Self {
        QueryResult::Affected(value)
    }
}

//! Contracts for reading the relational source.
//!
//! The metadata side lists tables, columns and keys; the row side streams
//! records for a [`RowQuery`] through a forward-only [`RowCursor`].

use std::collections::HashMap;
use std::fmt;

use crate::error::MigrationResult;
use crate::value::Value;

/// One column as reported by the source catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMeta {
    pub name: String,
    pub ordinal: usize,
    pub source_type: String,
}

/// One column of an imported (foreign) key.
///
/// Columns sharing `key_name` belong to the same constraint; `key_seq`
/// orders them.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedKey {
    pub key_name: String,
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
    pub key_seq: usize,
}

/// Source catalog access.
pub trait MetadataReader {
    fn list_tables(&self) -> MigrationResult<Vec<String>>;
    fn columns(&self, table: &str) -> MigrationResult<Vec<ColumnMeta>>;
    fn primary_key(&self, table: &str) -> MigrationResult<Vec<String>>;
    fn imported_keys(&self, table: &str) -> MigrationResult<Vec<ImportedKey>>;
}

/// A column qualified by its physical table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Result-set label for this column.
    pub fn alias(&self) -> String {
        format!("{}.{}", self.table, self.column)
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

/// `LEFT JOIN table ON left = right AND ...`
#[derive(Debug, Clone, PartialEq)]
pub struct JoinStep {
    pub table: String,
    /// Pairs of (column of an already joined table, column of `table`).
    pub on: Vec<(ColumnRef, ColumnRef)>,
}

/// Restricts a shared single-table hierarchy to some discriminator values.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscriminatorFilter {
    pub column: ColumnRef,
    pub values: Vec<String>,
}

/// Description of a row scan, independent of any SQL dialect.
#[derive(Debug, Clone, PartialEq)]
pub struct RowQuery {
    pub table: String,
    pub columns: Vec<ColumnRef>,
    pub joins: Vec<JoinStep>,
    pub filter: Option<DiscriminatorFilter>,
    pub order_by: Vec<ColumnRef>,
}

impl RowQuery {
    /// Plain scan of one table.
    pub fn scan(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            joins: Vec::new(),
            filter: None,
            order_by: Vec::new(),
        }
    }

    /// Add a column to the projection if it is not already selected.
    pub fn select(&mut self, column: ColumnRef) {
        if !self.columns.contains(&column) {
            self.columns.push(column);
        }
    }
}

/// One record keyed by [`ColumnRef::alias`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: HashMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: &ColumnRef, value: Value) {
        self.values.insert(column.alias(), value);
    }

    /// Value of `column`, `Null` when the column was not selected.
    pub fn get(&self, column: &ColumnRef) -> &Value {
        self.values.get(&column.alias()).unwrap_or(&Value::Null)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Forward-only cursor. An empty batch means the cursor is exhausted.
pub trait RowCursor {
    fn next_batch(&mut self) -> MigrationResult<Vec<Row>>;
}

/// Source row access.
pub trait RowReader {
    /// Number of rows `query` yields.
    fn count(&self, query: &RowQuery) -> MigrationResult<u64>;

    /// Open a cursor returning at most `batch_size` rows per batch.
    fn open<'a>(
        &'a self,
        query: &RowQuery,
        batch_size: usize,
    ) -> MigrationResult<Box<dyn RowCursor + 'a>>;
}

//! Paged row scans.

use rusqlite::params_from_iter;
use rusqlite::types::{Value as SqlValue, ValueRef};
use tracing::trace;

use relgraph_core::error::{MigrationError, MigrationResult};
use relgraph_core::source::{ColumnRef, Row, RowCursor, RowQuery, RowReader};
use relgraph_core::value::Value;

use crate::pool::SourcePool;
use crate::sql::{keyset_page, paged, render_count, render_select, Statement};

fn convert(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    }
}

impl RowReader for SourcePool {
    fn count(&self, query: &RowQuery) -> MigrationResult<u64> {
        let statement = render_count(query);
        let count: i64 = self.with_conn(|conn| {
            conn.query_row(&statement.sql, params_from_iter(statement.params.iter()), |row| row.get(0))
        })?;
        Ok(count.max(0) as u64)
    }

    fn open<'a>(&'a self, query: &RowQuery, batch_size: usize) -> MigrationResult<Box<dyn RowCursor + 'a>> {
        if query.columns.is_empty() {
            return Err(MigrationError::source_read(format!(
                "query on '{}' selects no columns",
                query.table
            )));
        }
        // keyset paging needs the sort key in every fetched row
        let keyed = !query.order_by.is_empty() && query.order_by.iter().all(|c| query.columns.contains(c));
        Ok(Box::new(PagedCursor {
            pool: self,
            statement: render_select(query),
            keyset: keyed.then(|| keyset_page(query)),
            order_by: query.order_by.clone(),
            columns: query.columns.clone(),
            batch_size: batch_size.max(1),
            last_key: None,
            fetched: 0,
            done: false,
        }))
    }
}

/// Fetches one batch per call, resuming after the last sort key seen so no
/// statement outlives the connection lock. Falls back to `LIMIT`/`OFFSET`
/// when the sort key is not selected or holds a NULL.
struct PagedCursor<'a> {
    pool: &'a SourcePool,
    statement: Statement,
    keyset: Option<Statement>,
    order_by: Vec<ColumnRef>,
    columns: Vec<ColumnRef>,
    batch_size: usize,
    last_key: Option<Vec<SqlValue>>,
    fetched: usize,
    done: bool,
}

impl PagedCursor<'_> {
    /// SQL and parameters of the next page.
    fn next_page(&self) -> (String, Vec<SqlValue>) {
        let text = |statement: &Statement| statement.params.iter().cloned().map(SqlValue::Text).collect::<Vec<_>>();
        let limit = SqlValue::Integer(self.batch_size as i64);

        match (&self.keyset, &self.last_key) {
            (Some(keyset), Some(last_key)) => {
                let mut params = text(keyset);
                params.extend(last_key.iter().cloned());
                params.push(limit);
                (keyset.sql.clone(), params)
            }
            _ => {
                let mut params = text(&self.statement);
                params.push(limit);
                params.push(SqlValue::Integer(self.fetched as i64));
                (paged(&self.statement), params)
            }
        }
    }

    /// Sort key of the last row of a batch; `None` when a part is NULL,
    /// which a row-value comparison cannot resume from.
    fn sort_key(&self, row: &Row) -> Option<Vec<SqlValue>> {
        self.order_by.iter().map(|c| sql_value(row.get(c))).collect()
    }
}

impl RowCursor for PagedCursor<'_> {
    fn next_batch(&mut self) -> MigrationResult<Vec<Row>> {
        if self.done {
            return Ok(Vec::new());
        }

        let (sql, params) = self.next_page();
        let columns = &self.columns;
        let batch: Vec<Row> = self.pool.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            let rows = stmt.query_map(params_from_iter(params.iter()), |sql_row| {
                let mut row = Row::new();
                for (i, column) in columns.iter().enumerate() {
                    row.insert(column, convert(sql_row.get_ref(i)?));
                }
                Ok(row)
            })?;
            rows.collect()
        })?;

        trace!(fetched = self.fetched, rows = batch.len(), "Fetched batch");
        self.fetched += batch.len();
        if batch.len() < self.batch_size {
            self.done = true;
        }
        if self.keyset.is_some() {
            let last_key = batch.last().and_then(|row| self.sort_key(row));
            if last_key.is_none() && !self.done {
                // NULL keys sort first; stay on offsets from here on
                self.keyset = None;
            }
            self.last_key = last_key;
        }
        Ok(batch)
    }
}

fn sql_value(value: &Value) -> Option<SqlValue> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(SqlValue::Integer(i64::from(*b))),
        Value::Int(i) => Some(SqlValue::Integer(*i)),
        Value::Float(f) => Some(SqlValue::Real(*f)),
        Value::Text(t) => Some(SqlValue::Text(t.clone())),
        Value::Bytes(b) => Some(SqlValue::Blob(b.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> SourcePool {
        let pool = SourcePool::in_memory().unwrap();
        pool.execute_batch(
            "CREATE TABLE ITEM (ID INTEGER PRIMARY KEY, NAME TEXT, PRICE REAL, DATA BLOB);
             INSERT INTO ITEM VALUES (1, 'a', 1.5, NULL), (2, 'b', NULL, x'0102'),
                                     (3, 'c', 3.0, NULL), (4, 'd', 4.25, NULL),
                                     (5, 'e', 5.0, NULL);",
        )
        .unwrap();
        pool
    }

    fn query() -> RowQuery {
        let mut query = RowQuery::scan("ITEM");
        for column in ["ID", "NAME", "PRICE", "DATA"] {
            query.select(ColumnRef::new("ITEM", column));
        }
        query.order_by.push(ColumnRef::new("ITEM", "ID"));
        query
    }

    #[test]
    fn test_count() {
        assert_eq!(pool().count(&query()).unwrap(), 5);
    }

    #[test]
    fn test_batches_cover_all_rows() {
        let pool = pool();
        let query = query();
        let mut cursor = pool.open(&query, 2).unwrap();

        let mut sizes = Vec::new();
        let mut ids = Vec::new();
        loop {
            let batch = cursor.next_batch().unwrap();
            if batch.is_empty() {
                break;
            }
            sizes.push(batch.len());
            ids.extend(batch.iter().map(|row| row.get(&ColumnRef::new("ITEM", "ID")).clone()));
        }
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(ids, (1..=5).map(Value::Int).collect::<Vec<_>>());
    }

    #[test]
    fn test_keyset_paging_resumes_after_composite_key() {
        let pool = SourcePool::in_memory().unwrap();
        pool.execute_batch(
            "CREATE TABLE CREDIT (FILM_ID INTEGER, SLOT INTEGER, NAME TEXT, PRIMARY KEY (FILM_ID, SLOT));
             INSERT INTO CREDIT VALUES (2, 1, 'd'), (1, 2, 'b'), (1, 1, 'a'), (1, 3, 'c'), (3, 1, 'e');",
        )
        .unwrap();
        let mut query = RowQuery::scan("CREDIT");
        for column in ["FILM_ID", "SLOT", "NAME"] {
            query.select(ColumnRef::new("CREDIT", column));
        }
        query.order_by.push(ColumnRef::new("CREDIT", "FILM_ID"));
        query.order_by.push(ColumnRef::new("CREDIT", "SLOT"));

        let mut cursor = pool.open(&query, 2).unwrap();
        let mut names = Vec::new();
        loop {
            let batch = cursor.next_batch().unwrap();
            if batch.is_empty() {
                break;
            }
            names.extend(batch.iter().map(|row| row.get(&ColumnRef::new("CREDIT", "NAME")).clone()));
        }
        let expected: Vec<Value> = ["a", "b", "c", "d", "e"].into_iter().map(Value::from).collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_null_sort_key_falls_back_to_offsets() {
        let pool = SourcePool::in_memory().unwrap();
        pool.execute_batch(
            "CREATE TABLE TAG (CODE TEXT PRIMARY KEY, LABEL TEXT);
             INSERT INTO TAG VALUES (NULL, 'x'), (NULL, 'y'), ('a', 'z');",
        )
        .unwrap();
        let mut query = RowQuery::scan("TAG");
        query.select(ColumnRef::new("TAG", "CODE"));
        query.select(ColumnRef::new("TAG", "LABEL"));
        query.order_by.push(ColumnRef::new("TAG", "CODE"));

        let mut cursor = pool.open(&query, 1).unwrap();
        let mut total = 0;
        loop {
            let batch = cursor.next_batch().unwrap();
            if batch.is_empty() {
                break;
            }
            total += batch.len();
        }
        assert_eq!(total, 3);
    }

    #[test]
    fn test_value_mapping() {
        let pool = pool();
        let mut cursor = pool.open(&query(), 10).unwrap();
        let batch = cursor.next_batch().unwrap();
        assert_eq!(batch.len(), 5);
        assert_eq!(batch[0].get(&ColumnRef::new("ITEM", "NAME")), &Value::from("a"));
        assert_eq!(batch[0].get(&ColumnRef::new("ITEM", "PRICE")), &Value::Float(1.5));
        assert_eq!(batch[1].get(&ColumnRef::new("ITEM", "PRICE")), &Value::Null);
        assert_eq!(batch[1].get(&ColumnRef::new("ITEM", "DATA")), &Value::Bytes(vec![1, 2]));
        assert!(cursor.next_batch().unwrap().is_empty());
    }

    #[test]
    fn test_empty_projection_is_rejected() {
        let pool = pool();
        assert!(pool.open(&RowQuery::scan("ITEM"), 10).is_err());
    }
}

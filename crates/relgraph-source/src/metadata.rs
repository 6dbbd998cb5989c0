//! Catalog access through `sqlite_master` and the table pragmas.

use rusqlite::params;
use std::collections::BTreeMap;

use relgraph_core::error::MigrationResult;
use relgraph_core::source::{ColumnMeta, ImportedKey, MetadataReader};

use crate::pool::SourcePool;

impl MetadataReader for SourcePool {
    fn list_tables(&self) -> MigrationResult<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
                 ORDER BY name",
            )?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect()
        })
    }

    fn columns(&self, table: &str) -> MigrationResult<Vec<ColumnMeta>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT cid, name, type FROM pragma_table_info(?1) ORDER BY cid")?;
            let rows = stmt.query_map(params![table], |row| {
                let cid: i64 = row.get(0)?;
                Ok(ColumnMeta {
                    ordinal: cid as usize + 1,
                    name: row.get(1)?,
                    source_type: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                })
            })?;
            rows.collect()
        })
    }

    fn primary_key(&self, table: &str) -> MigrationResult<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1) WHERE pk > 0 ORDER BY pk")?;
            let rows = stmt.query_map(params![table], |row| row.get(0))?;
            rows.collect()
        })
    }

    /// Foreign keys per constraint id. A reference without explicit columns
    /// targets the parent's primary key.
    fn imported_keys(&self, table: &str) -> MigrationResult<Vec<ImportedKey>> {
        let raw: Vec<(i64, i64, String, String, Option<String>)> = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                r#"SELECT id, seq, "table", "from", "to" FROM pragma_foreign_key_list(?1) ORDER BY id, seq"#,
            )?;
            let rows = stmt.query_map(params![table], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            })?;
            rows.collect()
        })?;

        let mut parent_keys: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut keys = Vec::with_capacity(raw.len());
        for (id, seq, referenced_table, column, to) in raw {
            let referenced_column = match to {
                Some(to) => to,
                None => {
                    if !parent_keys.contains_key(&referenced_table) {
                        let pk = self.primary_key(&referenced_table)?;
                        parent_keys.insert(referenced_table.clone(), pk);
                    }
                    parent_keys
                        .get(&referenced_table)
                        .and_then(|pk| pk.get(seq as usize))
                        .cloned()
                        .unwrap_or_default()
                }
            };
            keys.push(ImportedKey {
                key_name: format!("fk_{table}_{id}"),
                column,
                referenced_table,
                referenced_column,
                key_seq: seq as usize,
            });
        }
        Ok(keys)
    }
}

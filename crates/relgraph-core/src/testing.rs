//! Static catalog used to assemble schemas in unit tests.

use crate::error::MigrationResult;
use crate::model::{SchemaModel, TableFilter};
use crate::source::{ColumnMeta, ImportedKey, MetadataReader};
use crate::stats::ImportStatistics;

#[derive(Default)]
pub(crate) struct Catalog {
    tables: Vec<(String, Vec<ColumnMeta>, Vec<String>)>,
    keys: Vec<(String, ImportedKey)>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(mut self, name: &str, columns: &[(&str, &str)], pk: &[&str]) -> Self {
        let columns = columns
            .iter()
            .enumerate()
            .map(|(i, (column, ty))| ColumnMeta {
                name: column.to_string(),
                ordinal: i + 1,
                source_type: ty.to_string(),
            })
            .collect();
        self.tables.push((
            name.to_string(),
            columns,
            pk.iter().map(|c| c.to_string()).collect(),
        ));
        self
    }

    pub fn foreign_key(mut self, table: &str, columns: &[&str], referenced: &str, referenced_columns: &[&str]) -> Self {
        let key_name = format!("fk_{}_{}", table, self.keys.len());
        for (seq, (column, to)) in columns.iter().zip(referenced_columns).enumerate() {
            self.keys.push((
                table.to_string(),
                ImportedKey {
                    key_name: key_name.clone(),
                    column: column.to_string(),
                    referenced_table: referenced.to_string(),
                    referenced_column: to.to_string(),
                    key_seq: seq,
                },
            ));
        }
        self
    }

    pub fn load(&self, filter: &TableFilter, stats: &ImportStatistics) -> MigrationResult<SchemaModel> {
        SchemaModel::load(self, filter, stats)
    }

    pub fn into_model(self) -> SchemaModel {
        self.load(&TableFilter::default(), &ImportStatistics::new())
            .expect("catalog should load")
    }
}

impl MetadataReader for Catalog {
    fn list_tables(&self) -> MigrationResult<Vec<String>> {
        Ok(self.tables.iter().map(|(name, _, _)| name.clone()).collect())
    }

    fn columns(&self, table: &str) -> MigrationResult<Vec<ColumnMeta>> {
        Ok(self
            .tables
            .iter()
            .find(|(name, _, _)| name == table)
            .map(|(_, columns, _)| columns.clone())
            .unwrap_or_default())
    }

    fn primary_key(&self, table: &str) -> MigrationResult<Vec<String>> {
        Ok(self
            .tables
            .iter()
            .find(|(name, _, _)| name == table)
            .map(|(_, _, pk)| pk.clone())
            .unwrap_or_default())
    }

    fn imported_keys(&self, table: &str) -> MigrationResult<Vec<ImportedKey>> {
        Ok(self
            .keys
            .iter()
            .filter(|(owner, _)| owner == table)
            .map(|(_, key)| key.clone())
            .collect())
    }
}

//! Populates a [`SchemaModel`] from a [`MetadataReader`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::{Attribute, Entity, EntityId, ForeignKey, Relationship, RelationshipId, SchemaModel};
use crate::error::{MigrationError, MigrationResult};
use crate::source::{ImportedKey, MetadataReader};
use crate::stats::ImportStatistics;

/// Case-insensitive table include/exclude lists. An empty include list
/// admits every table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableFilter {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl TableFilter {
    pub fn accepts(&self, table: &str) -> bool {
        let listed = |list: &[String]| list.iter().any(|t| t.eq_ignore_ascii_case(table));
        (self.include.is_empty() || listed(&self.include)) && !listed(&self.exclude)
    }
}

impl SchemaModel {
    /// Read every accepted table with its keys and derive relationships.
    ///
    /// Failing to read the catalog is fatal; foreign keys pointing outside the
    /// accepted tables are dropped with a warning.
    pub fn load(
        reader: &dyn MetadataReader,
        filter: &TableFilter,
        stats: &ImportStatistics,
    ) -> MigrationResult<Self> {
        let mut tables = reader.list_tables()?;
        tables.retain(|t| filter.accepts(t));
        tables.sort();
        if tables.is_empty() {
            return Err(MigrationError::metadata("source exposes no tables to migrate"));
        }

        let mut model = SchemaModel::default();
        let mut pending_keys = Vec::new();

        for table in &tables {
            let entity = read_entity(reader, table)?;
            let id = model.push_entity(entity);
            pending_keys.push((id, reader.imported_keys(table)?));
        }

        for (id, keys) in pending_keys {
            let foreign_keys = group_foreign_keys(&model, id, keys, stats);
            model.entity_mut(id).foreign_keys = foreign_keys;
        }

        for index in 0..model.entities().len() {
            let id = EntityId(index);
            let foreign_keys = model.entity(id).foreign_keys.clone();
            for (position, fk) in foreign_keys.iter().enumerate() {
                let Some(parent) = model.entity_by_name(&fk.referenced_entity).map(|e| e.id) else {
                    continue;
                };
                let relationship = Relationship {
                    id: RelationshipId(0),
                    foreign_entity: id,
                    parent_entity: parent,
                    foreign_key: position,
                    from_columns: fk.columns.clone(),
                    to_columns: fk.referenced_columns.clone(),
                    inheritance: false,
                };
                if model.push_relationship(relationship).is_none() {
                    debug!(entity = %model.entity(id).name, key = %fk.name, "Duplicate foreign key ignored");
                }
            }
        }

        stats.set_schema_counts(model.entities().len(), model.relationships().len());
        info!(
            entities = model.entities().len(),
            relationships = model.relationships().len(),
            "Source schema read"
        );
        Ok(model)
    }
}

fn read_entity(reader: &dyn MetadataReader, table: &str) -> MigrationResult<Entity> {
    let mut columns = reader.columns(table)?;
    if columns.is_empty() {
        return Err(MigrationError::metadata(format!("table '{table}' has no columns")));
    }
    columns.sort_by_key(|c| c.ordinal);

    let primary_key = reader.primary_key(table)?;
    if primary_key.is_empty() {
        return Err(MigrationError::metadata(format!(
            "table '{table}' has no primary key; add one or exclude the table"
        )));
    }

    let attributes = columns
        .into_iter()
        .map(|c| Attribute {
            from_primary_key: primary_key.contains(&c.name),
            name: c.name,
            ordinal: c.ordinal,
            source_type: c.source_type,
            entity: EntityId(0),
        })
        .collect();

    Ok(Entity {
        id: EntityId(0),
        name: table.to_string(),
        schema: None,
        table: table.to_string(),
        attributes,
        primary_key,
        foreign_keys: Vec::new(),
        outbound: Vec::new(),
        inbound: Vec::new(),
        parent: None,
        inheritance_level: 0,
        bag: None,
        inherited_attributes: Vec::new(),
        parent_join: Vec::new(),
    })
}

/// Groups key columns per constraint and orders constraints by the ordinal
/// of their first column, so "first" and "second" foreign key are stable.
fn group_foreign_keys(
    model: &SchemaModel,
    id: EntityId,
    keys: Vec<ImportedKey>,
    stats: &ImportStatistics,
) -> Vec<ForeignKey> {
    let entity = model.entity(id);
    let mut grouped: BTreeMap<String, Vec<ImportedKey>> = BTreeMap::new();
    for key in keys {
        grouped.entry(key.key_name.clone()).or_default().push(key);
    }

    let mut foreign_keys = Vec::new();
    for (name, mut parts) in grouped {
        parts.sort_by_key(|k| k.key_seq);
        let referenced = parts[0].referenced_table.clone();

        let Some(parent) = model.entity_by_name(&referenced) else {
            stats.warn(format!(
                "foreign key '{name}' of '{}' references '{referenced}', which is not migrated; skipped",
                entity.name
            ));
            continue;
        };
        if let Some(missing) = parts.iter().find(|k| entity.attribute(&k.column).is_none()) {
            stats.warn(format!(
                "foreign key '{name}' of '{}' names unknown column '{}'; skipped",
                entity.name, missing.column
            ));
            continue;
        }

        let fk = ForeignKey {
            name,
            columns: parts.iter().map(|k| k.column.clone()).collect(),
            referenced_entity: parent.name.clone(),
            referenced_columns: parts.iter().map(|k| k.referenced_column.clone()).collect(),
        };
        if foreign_keys.iter().any(|existing| same_key(existing, &fk)) {
            debug!(entity = %entity.name, key = %fk.name, "Duplicate foreign key ignored");
            continue;
        }
        foreign_keys.push(fk);
    }

    let ordinal = |fk: &ForeignKey| {
        fk.columns
            .first()
            .and_then(|c| entity.attribute(c))
            .map_or(usize::MAX, |a| a.ordinal)
    };
    foreign_keys.sort_by(|a, b| ordinal(a).cmp(&ordinal(b)).then_with(|| a.name.cmp(&b.name)));
    foreign_keys
}

fn same_key(a: &ForeignKey, b: &ForeignKey) -> bool {
    let pairs = |fk: &ForeignKey| -> std::collections::BTreeSet<(String, String)> {
        fk.columns
            .iter()
            .cloned()
            .zip(fk.referenced_columns.iter().cloned())
            .collect()
    };
    a.referenced_entity == b.referenced_entity && pairs(a) == pairs(b)
}

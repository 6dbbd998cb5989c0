//! Streams source rows into the target graph.
//!
//! Every non-aggregated entity is scanned twice: once to upsert its
//! vertices, once to upsert the edges of its outbound relationships.
//! Aggregated junction entities produce edges only. Rows sharing a
//! hierarchy are materialized once per run, by the deepest entity that
//! holds them.

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::context::MigrationContext;
use crate::error::{MigrationError, MigrationResult};
use crate::graph::{EdgeType, GraphModel, ModelProperty, VertexType};
use crate::hierarchy::InheritancePattern;
use crate::model::{BagId, Entity, EntityId, Relationship, SchemaModel};
use crate::source::{ColumnRef, DiscriminatorFilter, JoinStep, Row, RowQuery, RowReader};
use crate::target::{EdgeUpsert, GraphWriter, VertexRef, VertexUpsert};
use crate::value::{coerce, Value};

pub struct ImportEngine<'a> {
    schema: &'a SchemaModel,
    graph: &'a GraphModel,
    ctx: &'a MigrationContext,
    /// Per hierarchy, identities of vertices already written this run.
    materialized: HashMap<BagId, HashSet<String>>,
    /// Per entity, identities of rows the vertex pass skipped.
    rejected: HashMap<EntityId, HashSet<String>>,
}

/// Outcome of reading one row.
enum RowOutcome<T> {
    Ready(T),
    Skip(String),
}

impl<'a> ImportEngine<'a> {
    pub fn new(schema: &'a SchemaModel, graph: &'a GraphModel, ctx: &'a MigrationContext) -> Self {
        Self {
            schema,
            graph,
            ctx,
            materialized: HashMap::new(),
            rejected: HashMap::new(),
        }
    }

    /// Hierarchy members deepest level first, then flat entities, then
    /// aggregated junction entities; ties broken by name.
    pub fn import_order(&self) -> Vec<EntityId> {
        let mut members = Vec::new();
        let mut flat = Vec::new();
        let mut junctions = Vec::new();
        for entity in self.schema.entities() {
            if self.graph.aggregation(entity.id).is_some() {
                junctions.push(entity);
            } else if entity.bag.is_some() {
                members.push(entity);
            } else {
                flat.push(entity);
            }
        }
        members.sort_by(|a, b| {
            Reverse(a.inheritance_level)
                .cmp(&Reverse(b.inheritance_level))
                .then_with(|| a.name.cmp(&b.name))
        });
        flat.sort_by(|a, b| a.name.cmp(&b.name));
        junctions.sort_by(|a, b| a.name.cmp(&b.name));
        members
            .into_iter()
            .chain(flat)
            .chain(junctions)
            .map(|e| e.id)
            .collect()
    }

    pub async fn run(&mut self, reader: &dyn RowReader, writer: &dyn GraphWriter) -> MigrationResult<()> {
        let schema = self.schema;
        let order = self.import_order();

        for id in &order {
            let query = match self.graph.aggregation(*id) {
                Some(_) => self.junction_query(schema.entity(*id)),
                None => self.vertex_query(schema.entity(*id)),
            };
            self.ctx.stats.add_records_total(reader.count(&query)?);
        }

        for id in order {
            let entity = schema.entity(id);
            if self.graph.aggregation(id).is_some() {
                self.import_junction(entity, reader, writer).await?;
            } else {
                self.import_vertices(entity, reader, writer).await?;
                self.import_edges(entity, reader, writer).await?;
            }
        }
        Ok(())
    }

    async fn import_vertices(
        &mut self,
        entity: &'a Entity,
        reader: &dyn RowReader,
        writer: &dyn GraphWriter,
    ) -> MigrationResult<()> {
        let graph = self.graph;
        let Some(vertex) = graph.vertex_for_entity(entity.id) else {
            self.ctx.stats.error(format!("entity '{}' has no vertex type; rows skipped", entity.name));
            return Ok(());
        };
        let query = self.vertex_query(entity);
        let mut cursor = reader.open(&query, self.ctx.batch_size)?;
        let (mut written, mut deduplicated) = (0u64, 0u64);

        loop {
            let batch = cursor.next_batch()?;
            if batch.is_empty() {
                break;
            }
            for row in &batch {
                self.ctx.stats.record_analyzed();
                let concrete = self.concrete_entity(entity, row);
                let upsert = match self.vertex_upsert(concrete, row) {
                    RowOutcome::Ready(upsert) => upsert,
                    RowOutcome::Skip(reason) => {
                        if let Some(rejected) = self.rejected_ref(concrete, row) {
                            self.rejected.entry(entity.id).or_default().insert(rejected.identity());
                        }
                        self.skip_row(entity, reason);
                        continue;
                    }
                };

                if let Some(bag) = entity.bag {
                    let seen = self.materialized.entry(bag).or_default();
                    if !seen.insert(upsert.vertex.identity()) {
                        deduplicated += 1;
                        continue;
                    }
                }

                let outcome = writer.upsert_vertex(&upsert).await?;
                self.ctx.stats.vertex_written(outcome.created());
                written += 1;
            }
        }

        info!(entity = %entity.name, vertex_type = %vertex.name, written, deduplicated, "Vertices imported");
        Ok(())
    }

    async fn import_edges(
        &self,
        entity: &Entity,
        reader: &dyn RowReader,
        writer: &dyn GraphWriter,
    ) -> MigrationResult<()> {
        let mapped: Vec<(&Relationship, &EdgeType)> = self
            .schema
            .outbound(entity.id)
            .filter(|r| !r.inheritance)
            .filter_map(|r| self.graph.edge_for_relationship(r.id).map(|e| (r, e)))
            .collect();
        let Some(vertex) = self.graph.vertex_for_entity(entity.id) else {
            return Ok(());
        };
        if mapped.is_empty() {
            return Ok(());
        }

        let mut query = RowQuery::scan(entity.table.clone());
        for column in &entity.primary_key {
            let column = ColumnRef::new(&entity.table, column);
            query.select(column.clone());
            query.order_by.push(column);
        }
        for (relationship, _) in &mapped {
            for column in &relationship.from_columns {
                query.select(ColumnRef::new(&entity.table, column));
            }
        }

        let rejected = self.rejected.get(&entity.id);
        let mut cursor = reader.open(&query, self.ctx.batch_size)?;
        let mut written = 0u64;
        loop {
            let batch = cursor.next_batch()?;
            if batch.is_empty() {
                break;
            }
            for row in &batch {
                // rows with an unusable key were reported by the vertex pass
                let Ok(Some(from)) = self.vertex_ref(entity, vertex, row) else {
                    continue;
                };
                if rejected.is_some_and(|r| r.contains(&from.identity())) {
                    continue;
                }
                for (relationship, edge) in &mapped {
                    let to = match self.referenced_vertex(relationship, &entity.table, row) {
                        Ok(Some(to)) => to,
                        Ok(None) => continue,
                        Err(e) if e.is_fatal() => return Err(e),
                        Err(e) => {
                            self.ctx.stats.warn(format!(
                                "edge {} of {from} skipped: {e}",
                                edge.name
                            ));
                            continue;
                        }
                    };
                    let upsert = EdgeUpsert {
                        edge_type: edge.name.clone(),
                        from: from.clone(),
                        to,
                        properties: Vec::new(),
                    };
                    let outcome = writer.upsert_edge(&upsert).await?;
                    self.ctx.stats.edge_written(outcome.created());
                    written += 1;
                }
            }
        }

        debug!(entity = %entity.name, written, "Edges imported");
        Ok(())
    }

    async fn import_junction(
        &self,
        entity: &Entity,
        reader: &dyn RowReader,
        writer: &dyn GraphWriter,
    ) -> MigrationResult<()> {
        let Some(aggregation) = self.graph.aggregation(entity.id) else {
            return Ok(());
        };
        let Some(edge) = self.graph.edge_type(&aggregation.edge) else {
            self.ctx.stats.error(format!(
                "aggregated edge type {} of '{}' is missing; junction rows skipped",
                aggregation.edge, entity.name
            ));
            return Ok(());
        };
        let out_relationship = self.schema.relationship(aggregation.out_relationship);
        let in_relationship = self.schema.relationship(aggregation.in_relationship);

        let query = self.junction_query(entity);
        let mut cursor = reader.open(&query, self.ctx.batch_size)?;
        let mut written = 0u64;
        loop {
            let batch = cursor.next_batch()?;
            if batch.is_empty() {
                break;
            }
            for row in &batch {
                self.ctx.stats.record_analyzed();
                let endpoints = self
                    .referenced_vertex(out_relationship, &entity.table, row)
                    .and_then(|from| Ok((from, self.referenced_vertex(in_relationship, &entity.table, row)?)));
                let (from, to) = match endpoints {
                    Ok((Some(from), Some(to))) => (from, to),
                    Ok(_) => {
                        self.skip_row(entity, "null foreign key".to_string());
                        continue;
                    }
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        self.skip_row(entity, e.to_string());
                        continue;
                    }
                };
                let properties = match read_properties(edge.properties.iter(), row, |p| {
                    ColumnRef::new(&entity.table, &p.column)
                }) {
                    RowOutcome::Ready(properties) => properties,
                    RowOutcome::Skip(reason) => {
                        self.skip_row(entity, reason);
                        continue;
                    }
                };

                let upsert = EdgeUpsert {
                    edge_type: edge.name.clone(),
                    from,
                    to,
                    properties,
                };
                let outcome = writer.upsert_edge(&upsert).await?;
                self.ctx.stats.edge_written(outcome.created());
                written += 1;
            }
        }

        info!(entity = %entity.name, edge_type = %edge.name, written, "Junction rows imported as edges");
        Ok(())
    }

    fn skip_row(&self, entity: &Entity, reason: String) {
        self.ctx.stats.warn(format!("row of '{}' skipped: {reason}", entity.name));
        self.ctx.stats.record_skipped();
    }

    /// Scan reconstructing full rows for `entity`: a plain scan, a join chain
    /// up a table-per-type hierarchy, or a discriminator-filtered scan of a
    /// shared table.
    fn vertex_query(&self, entity: &Entity) -> RowQuery {
        let schema = self.schema;
        let mut query = RowQuery::scan(entity.table.clone());
        for column in &entity.primary_key {
            query.order_by.push(ColumnRef::new(&entity.table, column));
        }

        let pattern = schema.pattern_of(entity.id);
        match pattern {
            Some(InheritancePattern::TablePerType) => {
                let mut current = entity;
                while let Some(parent) = current.parent.map(|p| schema.entity(p)) {
                    query.joins.push(JoinStep {
                        table: parent.table.clone(),
                        on: current
                            .parent_join
                            .iter()
                            .map(|(from, to)| {
                                (ColumnRef::new(&current.table, from), ColumnRef::new(&parent.table, to))
                            })
                            .collect(),
                    });
                    current = parent;
                }
            }
            Some(InheritancePattern::SingleTable) => {
                if let Some(bag) = entity.bag.map(|b| schema.bag(b)) {
                    if let Some(discriminator) = &bag.discriminator {
                        let column = ColumnRef::new(&entity.table, discriminator);
                        query.select(column.clone());
                        if entity.parent.is_some() {
                            let values = self
                                .subtree(entity)
                                .filter_map(|e| bag.discriminator_values.get(&e.name).cloned())
                                .collect();
                            query.filter = Some(DiscriminatorFilter { column, values });
                        }
                    }
                }
            }
            _ => {}
        }

        // a shared table may hold any subtype below the scanned one
        let concretes: Vec<&Entity> = match pattern {
            Some(InheritancePattern::SingleTable) => self.subtree(entity).collect(),
            _ => vec![entity],
        };
        for concrete in concretes {
            for column in self.vertex_columns(concrete) {
                query.select(column);
            }
        }
        query
    }

    fn junction_query(&self, entity: &Entity) -> RowQuery {
        let mut query = RowQuery::scan(entity.table.clone());
        for column in &entity.primary_key {
            query.order_by.push(ColumnRef::new(&entity.table, column));
        }
        for attribute in &entity.attributes {
            query.select(ColumnRef::new(&entity.table, &attribute.name));
        }
        query
    }

    /// `entity` and every descendant in its hierarchy.
    fn subtree<'s>(&'s self, entity: &'s Entity) -> impl Iterator<Item = &'s Entity> + 's {
        let schema = self.schema;
        let bag = entity.bag.map(|b| schema.bag(b));
        schema.entities().iter().filter(move |e| {
            e.id == entity.id
                || (bag.is_some_and(|bag| bag.contains(e.id)) && schema.lineage(e.id).contains(&entity.id))
        })
    }

    /// Concrete subtype of a shared-table row, from its discriminator value.
    fn concrete_entity(&self, scanned: &'a Entity, row: &Row) -> &'a Entity {
        let schema = self.schema;
        if schema.pattern_of(scanned.id) != Some(InheritancePattern::SingleTable) {
            return scanned;
        }
        let Some(bag) = scanned.bag.map(|b| schema.bag(b)) else {
            return scanned;
        };
        let Some(discriminator) = &bag.discriminator else {
            return scanned;
        };
        let value = row.get(&ColumnRef::new(&scanned.table, discriminator));
        if value.is_null() {
            return scanned;
        }
        bag.entity_for_value(&value.key_repr())
            .and_then(|name| schema.entity_by_name(name))
            .filter(|e| schema.lineage(e.id).contains(&scanned.id))
            .unwrap_or(scanned)
    }

    /// Physical column a vertex property of `concrete` is read from.
    fn property_column(&self, concrete: &Entity, property: &ModelProperty) -> ColumnRef {
        match self.schema.pattern_of(concrete.id) {
            // self-contained tables repeat inherited columns
            Some(InheritancePattern::TablePerConcreteType) | None => {
                ColumnRef::new(&concrete.table, &property.column)
            }
            _ => ColumnRef::new(&self.schema.entity(property.owner).table, &property.column),
        }
    }

    fn vertex_columns(&self, concrete: &Entity) -> Vec<ColumnRef> {
        let mut columns: Vec<ColumnRef> = concrete
            .primary_key
            .iter()
            .map(|c| ColumnRef::new(&concrete.table, c))
            .collect();
        if let Some(vertex) = self.graph.vertex_for_entity(concrete.id) {
            for property in self.graph.all_properties(vertex) {
                if self.schema.pattern_of(concrete.id) == Some(InheritancePattern::TablePerConcreteType)
                    && concrete.attribute(&property.column).is_none()
                {
                    continue;
                }
                columns.push(self.property_column(concrete, property));
            }
        }
        columns
    }

    /// Key of a row the vertex pass could not write, if the key itself is
    /// readable.
    fn rejected_ref(&self, concrete: &Entity, row: &Row) -> Option<VertexRef> {
        let vertex = self.graph.vertex_for_entity(concrete.id)?;
        self.vertex_ref(concrete, vertex, row).ok().flatten()
    }

    /// Key reference of the vertex a row of `entity` maps to.
    fn vertex_ref(&self, entity: &Entity, vertex: &VertexType, row: &Row) -> MigrationResult<Option<VertexRef>> {
        let mapping = self.schema.root_key_mapping(entity.id);
        let mut key = Vec::with_capacity(vertex.key.len());
        for ((own, _), name) in mapping.iter().zip(&vertex.key) {
            let value = row.get(&ColumnRef::new(&entity.table, own));
            if value.is_null() {
                return Ok(None);
            }
            key.push((name.clone(), self.coerce_key(vertex, name, value.clone())?));
        }
        Ok(Some(VertexRef {
            label: vertex.merge_label.clone(),
            key,
        }))
    }

    /// The vertex a row references through `relationship`; `None` when the
    /// foreign key is null.
    fn referenced_vertex(
        &self,
        relationship: &Relationship,
        table: &str,
        row: &Row,
    ) -> MigrationResult<Option<VertexRef>> {
        let parent = self.schema.entity(relationship.parent_entity);
        let Some(vertex) = self.graph.vertex_for_entity(parent.id) else {
            return Err(MigrationError::mapping(format!("'{}' has no vertex type", parent.name)));
        };
        let mapping = self.schema.root_key_mapping(parent.id);
        let mut key = Vec::with_capacity(vertex.key.len());
        for ((own, _), name) in mapping.iter().zip(&vertex.key) {
            let Some((from, _)) = relationship.column_pairs().find(|(_, to)| *to == own.as_str()) else {
                return Err(MigrationError::mapping(format!(
                    "foreign key of '{}' does not cover {}.{own}",
                    self.schema.entity(relationship.foreign_entity).name,
                    parent.name
                )));
            };
            let value = row.get(&ColumnRef::new(table, from));
            if value.is_null() {
                return Ok(None);
            }
            key.push((name.clone(), self.coerce_key(vertex, name, value.clone())?));
        }
        Ok(Some(VertexRef {
            label: vertex.merge_label.clone(),
            key,
        }))
    }

    fn coerce_key(&self, vertex: &VertexType, name: &str, value: Value) -> MigrationResult<Value> {
        match self.graph.property(vertex, name) {
            Some(property) => coerce(value, property.target_type),
            None => Ok(value),
        }
    }

    fn vertex_upsert(&self, concrete: &Entity, row: &Row) -> RowOutcome<VertexUpsert> {
        let Some(vertex) = self.graph.vertex_for_entity(concrete.id) else {
            return RowOutcome::Skip(format!("'{}' has no vertex type", concrete.name));
        };
        let reference = match self.vertex_ref(concrete, vertex, row) {
            Ok(Some(reference)) => reference,
            Ok(None) => return RowOutcome::Skip("null primary key".to_string()),
            Err(e) => return RowOutcome::Skip(e.to_string()),
        };

        let is_tpct = self.schema.pattern_of(concrete.id) == Some(InheritancePattern::TablePerConcreteType);
        let properties = self
            .graph
            .all_properties(vertex)
            .into_iter()
            .filter(|p| !vertex.key.contains(&p.name))
            .filter(|p| !is_tpct || concrete.attribute(&p.column).is_some());
        let properties = match read_properties(properties, row, |p| self.property_column(concrete, p)) {
            RowOutcome::Ready(properties) => properties,
            RowOutcome::Skip(reason) => return RowOutcome::Skip(reason),
        };

        RowOutcome::Ready(VertexUpsert {
            vertex: reference,
            labels: self.graph.labels(vertex),
            properties,
        })
    }
}

fn read_properties<'p>(
    properties: impl Iterator<Item = &'p ModelProperty>,
    row: &Row,
    column: impl Fn(&ModelProperty) -> ColumnRef,
) -> RowOutcome<Vec<(String, Value)>> {
    let mut values = Vec::new();
    for property in properties {
        match coerce(row.get(&column(property)).clone(), property.target_type) {
            Ok(value) => values.push((property.name.clone(), value)),
            Err(e) => return RowOutcome::Skip(format!("{}: {e}", property.name)),
        }
    }
    RowOutcome::Ready(values)
}

//! Derives vertex and edge types from a classified [`SchemaModel`].

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use super::{EdgeKey, EdgeType, GraphModel, ModelProperty, VertexType};
use crate::context::MigrationContext;
use crate::error::MigrationResult;
use crate::hierarchy::InheritancePattern;
use crate::model::{EntityId, Relationship, SchemaModel};
use crate::naming::EdgeNaming;

impl GraphModel {
    /// One vertex type per entity, one edge type per distinct
    /// (resolved name, out type, in type). Relationships that cannot be
    /// mapped are reported as errors and left out.
    pub fn build(schema: &SchemaModel, ctx: &MigrationContext) -> MigrationResult<Self> {
        let mut graph = GraphModel::default();
        let names = vertex_names(schema, ctx);

        for entity in schema.entities() {
            let name = names[&entity.id].clone();
            let vertex = VertexType {
                properties: vertex_properties(schema, entity.id, ctx),
                parent: entity.parent.map(|p| names[&p].clone()),
                inheritance_level: entity.inheritance_level,
                merge_label: String::new(),
                key: Vec::new(),
                entity: entity.id,
                name,
            };
            graph.insert_vertex(vertex);
        }
        assign_keys(&mut graph, schema, &names);

        let mut merged = 0usize;
        for relationship in schema.relationships() {
            if relationship.inheritance {
                continue;
            }
            let Some(key) = edge_key(&graph, schema, relationship, ctx) else {
                continue;
            };
            let make = || EdgeType {
                name: key.name.clone(),
                out_vertex: key.out_vertex.clone(),
                in_vertex: key.in_vertex.clone(),
                properties: Vec::new(),
                relationships: Vec::new(),
                aggregated_from: None,
            };
            if !graph.merge_edge(key.clone(), relationship.id, make) {
                merged += 1;
                debug!(edge = %key, "Relationship merged into existing edge type");
            }
        }

        ctx.stats
            .set_graph_counts(graph.vertex_count(), graph.edge_count(), 0);
        info!(
            vertex_types = graph.vertex_count(),
            edge_types = graph.edge_count(),
            merged,
            "Graph model built"
        );
        Ok(graph)
    }
}

/// Resolved vertex names, suffixed with a counter when two entities resolve
/// to the same name.
fn vertex_names(schema: &SchemaModel, ctx: &MigrationContext) -> BTreeMap<EntityId, String> {
    let mut ordered: Vec<_> = schema.entities().iter().collect();
    ordered.sort_by(|a, b| a.name.cmp(&b.name));

    let mut taken = BTreeSet::new();
    let mut names = BTreeMap::new();
    for entity in ordered {
        let candidate = ctx.naming.vertex_name(&entity.name);
        let name = unique(&candidate, &taken);
        if name != candidate {
            ctx.stats.warn(format!(
                "vertex type name '{candidate}' of '{}' is taken; using '{name}'",
                entity.name
            ));
        }
        taken.insert(name.clone());
        names.insert(entity.id, name);
    }
    names
}

fn unique(candidate: &str, taken: &BTreeSet<String>) -> String {
    if !taken.contains(candidate) {
        return candidate.to_string();
    }
    (2..)
        .map(|n| format!("{candidate}{n}"))
        .find(|name| !taken.contains(name))
        .unwrap_or_else(|| candidate.to_string())
}

fn vertex_properties(schema: &SchemaModel, entity: EntityId, ctx: &MigrationContext) -> Vec<ModelProperty> {
    let owner = schema.entity(entity);
    let mut taken = BTreeSet::new();
    let mut properties = Vec::new();
    for attribute in schema.own_attributes(entity) {
        let name = unique(&ctx.naming.property_name(&attribute.name), &taken);
        taken.insert(name.clone());
        properties.push(ModelProperty {
            name,
            column: attribute.name.clone(),
            owner: attribute.entity,
            ordinal: attribute.ordinal,
            source_type: attribute.source_type.clone(),
            target_type: ctx.target_type(&owner.name, &attribute.name, &attribute.source_type),
            from_primary_key: attribute.from_primary_key,
        });
    }
    properties.sort_by(|a, b| a.ordinal.cmp(&b.ordinal).then_with(|| a.name.cmp(&b.name)));
    properties
}

/// Sets the merge label and key property names of every vertex type.
fn assign_keys(graph: &mut GraphModel, schema: &SchemaModel, names: &BTreeMap<EntityId, String>) {
    let mut resolved = Vec::new();
    for entity in schema.entities() {
        let merges_into_root = matches!(
            schema.pattern_of(entity.id),
            Some(InheritancePattern::SingleTable | InheritancePattern::TablePerType)
        );
        let merge_entity = if merges_into_root { schema.root_of(entity.id) } else { entity.id };
        let Some(vertex) = graph.vertex_for_entity(entity.id) else {
            continue;
        };
        let properties = graph.all_properties(vertex);
        let key: Vec<String> = schema
            .root_key_mapping(entity.id)
            .into_iter()
            .filter_map(|(_, column)| {
                properties
                    .iter()
                    .find(|p| p.from_primary_key && p.column == column)
                    .map(|p| p.name.clone())
            })
            .collect();
        resolved.push((entity.id, names[&merge_entity].clone(), key));
    }

    for (entity, merge_label, key) in resolved {
        if let Some(name) = graph.entity_vertex.get(&entity).cloned() {
            if let Some(vertex) = graph.vertex_types.get_mut(&name) {
                vertex.merge_label = merge_label;
                vertex.key = key;
            }
        }
    }
}

fn edge_key(
    graph: &GraphModel,
    schema: &SchemaModel,
    relationship: &Relationship,
    ctx: &MigrationContext,
) -> Option<EdgeKey> {
    let foreign = schema.entity(relationship.foreign_entity);
    let parent = schema.entity(relationship.parent_entity);

    let (Some(out_vertex), Some(in_vertex)) = (
        graph.vertex_for_entity(foreign.id),
        graph.vertex_for_entity(parent.id),
    ) else {
        ctx.stats.error(format!(
            "relationship {} -> {} has no vertex type at one end; skipped",
            foreign.name, parent.name
        ));
        return None;
    };

    let referenced: BTreeSet<&str> = relationship.to_columns.iter().map(String::as_str).collect();
    let parent_key: BTreeSet<&str> = parent.primary_key.iter().map(String::as_str).collect();
    if referenced != parent_key {
        ctx.stats.error(format!(
            "relationship {}({}) -> {}({}) does not reference the primary key; skipped",
            foreign.name,
            relationship.from_columns.join(", "),
            parent.name,
            relationship.to_columns.join(", ")
        ));
        return None;
    }

    let name = ctx.naming.edge_name(&EdgeNaming {
        foreign_columns: &relationship.from_columns,
        foreign_entity: &foreign.name,
        parent_entity: &parent.name,
    });
    Some(EdgeKey {
        name,
        out_vertex: out_vertex.name.clone(),
        in_vertex: in_vertex.name.clone(),
    })
}

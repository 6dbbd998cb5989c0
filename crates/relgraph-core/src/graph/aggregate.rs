//! Collapses pure many-to-many junction tables into edge types.

use std::collections::BTreeSet;
use tracing::{debug, info};

use super::{Aggregation, EdgeKey, EdgeType, GraphModel};
use crate::model::{Entity, RelationshipId, SchemaModel};
use crate::stats::ImportStatistics;

/// Whether `entity` is a junction table that can become a single edge type:
/// exactly two foreign keys whose columns together are exactly its primary
/// key, nothing referencing it, and no part in a hierarchy.
pub fn is_aggregable_join_table(schema: &SchemaModel, entity: &Entity) -> bool {
    if entity.foreign_keys.len() != 2 || !entity.inbound.is_empty() || entity.bag.is_some() {
        return false;
    }
    let outbound: Vec<_> = schema.outbound(entity.id).filter(|r| !r.inheritance).collect();
    if outbound.len() != 2 {
        return false;
    }
    let fk_columns: BTreeSet<&str> = entity.foreign_key_columns();
    let pk_columns: BTreeSet<&str> = entity.primary_key.iter().map(String::as_str).collect();
    fk_columns == pk_columns
}

/// Returns a new model in which every aggregable junction entity is an edge
/// type `out + "2" + in` carrying the entity's non-key properties.
pub fn aggregate(graph: &GraphModel, schema: &SchemaModel, stats: &ImportStatistics) -> GraphModel {
    let mut result = graph.clone();

    let mut candidates: Vec<&Entity> = schema
        .entities()
        .iter()
        .filter(|e| is_aggregable_join_table(schema, e))
        .collect();
    candidates.sort_by(|a, b| a.name.cmp(&b.name));

    for entity in candidates {
        if result.aggregations.contains_key(&entity.id) {
            continue;
        }
        let Some((first, second)) = ordered_relationships(schema, entity) else {
            continue;
        };
        let (Some(edge1), Some(edge2), Some(vertex)) = (
            result.edge_for_relationship(first).cloned(),
            result.edge_for_relationship(second).cloned(),
            result.vertex_for_entity(entity.id).cloned(),
        ) else {
            debug!(entity = %entity.name, "Junction table lacks mapped edges; not aggregated");
            continue;
        };

        let key = EdgeKey {
            name: format!("{}2{}", edge1.in_vertex, edge2.in_vertex),
            out_vertex: edge1.in_vertex.clone(),
            in_vertex: edge2.in_vertex.clone(),
        };
        if result.edge_types.contains_key(&key) {
            stats.warn(format!(
                "junction table '{}' would duplicate edge type {key}; kept as a vertex type",
                entity.name
            ));
            continue;
        }

        let properties = vertex
            .properties
            .iter()
            .filter(|p| !p.from_primary_key)
            .cloned()
            .collect();

        result.vertex_types.remove(&vertex.name);
        result.entity_vertex.remove(&entity.id);
        result.edge_types.remove(&edge1.key());
        result.edge_types.remove(&edge2.key());
        result.relationship_edge.remove(&first);
        result.relationship_edge.remove(&second);

        result.edge_types.insert(
            key.clone(),
            EdgeType {
                name: key.name.clone(),
                out_vertex: key.out_vertex.clone(),
                in_vertex: key.in_vertex.clone(),
                properties,
                relationships: vec![first, second],
                aggregated_from: Some(entity.id),
            },
        );
        result.aggregations.insert(
            entity.id,
            Aggregation {
                edge: key.clone(),
                out_relationship: first,
                in_relationship: second,
            },
        );
        debug!(entity = %entity.name, edge = %key, "Junction table aggregated");
    }

    stats.set_graph_counts(result.vertex_count(), result.edge_count(), result.aggregations.len());
    info!(
        aggregated = result.aggregations.len(),
        vertex_types = result.vertex_count(),
        edge_types = result.edge_count(),
        "Join tables aggregated"
    );
    result
}

/// The junction's relationships in foreign key order.
fn ordered_relationships(schema: &SchemaModel, entity: &Entity) -> Option<(RelationshipId, RelationshipId)> {
    let mut relationships: Vec<_> = schema.outbound(entity.id).filter(|r| !r.inheritance).collect();
    relationships.sort_by_key(|r| r.foreign_key);
    match relationships.as_slice() {
        [first, second] => Some((first.id, second.id)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::MigrationContext;
    use crate::testing::Catalog;

    fn films() -> Catalog {
        Catalog::new()
            .table("FILM", &[("ID", "INTEGER"), ("TITLE", "TEXT")], &["ID"])
            .table("ACTOR", &[("ID", "INTEGER"), ("NAME", "TEXT")], &["ID"])
    }

    fn film_actor(catalog: Catalog) -> Catalog {
        catalog
            .table(
                "FILM_ACTOR",
                &[("FILM_ID", "INTEGER"), ("ACTOR_ID", "INTEGER"), ("CHARACTER", "TEXT")],
                &["FILM_ID", "ACTOR_ID"],
            )
            .foreign_key("FILM_ACTOR", &["FILM_ID"], "FILM", &["ID"])
            .foreign_key("FILM_ACTOR", &["ACTOR_ID"], "ACTOR", &["ID"])
    }

    fn build(catalog: Catalog) -> (SchemaModel, GraphModel, GraphModel, ImportStatistics) {
        let schema = catalog.into_model();
        let graph = GraphModel::build(&schema, &MigrationContext::default()).unwrap();
        let stats = ImportStatistics::new();
        let aggregated = aggregate(&graph, &schema, &stats);
        (schema, graph, aggregated, stats)
    }

    #[test]
    fn test_junction_becomes_edge() {
        let (schema, before, after, _) = build(film_actor(films()));
        assert_eq!(before.vertex_count(), 3);
        assert_eq!(before.edge_count(), 2);

        assert_eq!(after.vertex_count(), 2);
        assert!(after.vertex_type("FILM_ACTOR").is_none());
        assert_eq!(after.edge_count(), 1);

        let edge = after.edge_types().next().unwrap();
        assert_eq!(edge.name, "FILM2ACTOR");
        assert_eq!(edge.out_vertex, "FILM");
        assert_eq!(edge.in_vertex, "ACTOR");
        let props: Vec<&str> = edge.properties.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(props, vec!["CHARACTER"]);

        let junction = schema.entity_by_name("FILM_ACTOR").unwrap();
        assert_eq!(edge.aggregated_from, Some(junction.id));
        assert!(after.aggregation(junction.id).is_some());
        // the input model is left as it was
        assert!(before.vertex_type("FILM_ACTOR").is_some());
    }

    #[test]
    fn test_referenced_junction_is_kept() {
        let catalog = film_actor(films())
            .table("AWARD", &[("ID", "INTEGER"), ("FILM_ID", "INTEGER"), ("ACTOR_ID", "INTEGER")], &["ID"])
            .foreign_key("AWARD", &["FILM_ID", "ACTOR_ID"], "FILM_ACTOR", &["FILM_ID", "ACTOR_ID"]);
        let (_, before, after, _) = build(catalog);
        assert_eq!(after, before);
        assert!(after.vertex_type("FILM_ACTOR").is_some());
        assert!(after.aggregations().is_empty());
    }

    #[test]
    fn test_surrogate_key_junction_is_kept() {
        let catalog = films()
            .table(
                "CASTING",
                &[("ID", "INTEGER"), ("FILM_ID", "INTEGER"), ("ACTOR_ID", "INTEGER")],
                &["ID"],
            )
            .foreign_key("CASTING", &["FILM_ID"], "FILM", &["ID"])
            .foreign_key("CASTING", &["ACTOR_ID"], "ACTOR", &["ID"]);
        let (_, _, after, _) = build(catalog);
        assert!(after.vertex_type("CASTING").is_some());
        assert_eq!(after.edge_count(), 2);
    }

    #[test]
    fn test_partial_key_coverage_is_kept() {
        let catalog = films()
            .table(
                "SCREENING",
                &[("FILM_ID", "INTEGER"), ("ACTOR_ID", "INTEGER"), ("DAY", "DATE")],
                &["FILM_ID", "ACTOR_ID", "DAY"],
            )
            .foreign_key("SCREENING", &["FILM_ID"], "FILM", &["ID"])
            .foreign_key("SCREENING", &["ACTOR_ID"], "ACTOR", &["ID"]);
        let (_, _, after, _) = build(catalog);
        assert!(after.vertex_type("SCREENING").is_some());
    }

    #[test]
    fn test_aggregation_is_idempotent_and_collision_safe() {
        let catalog = film_actor(films())
            .table("FILM_STAR", &[("FILM_ID", "INTEGER"), ("ACTOR_ID", "INTEGER")], &["FILM_ID", "ACTOR_ID"])
            .foreign_key("FILM_STAR", &["FILM_ID"], "FILM", &["ID"])
            .foreign_key("FILM_STAR", &["ACTOR_ID"], "ACTOR", &["ID"]);
        let (schema, _, once, stats) = build(catalog);

        // FILM_ACTOR sorts first and claims FILM2ACTOR
        assert!(once.vertex_type("FILM_ACTOR").is_none());
        assert!(once.vertex_type("FILM_STAR").is_some());
        assert_eq!(stats.snapshot().warnings, 1);

        let twice = aggregate(&once, &schema, &ImportStatistics::new());
        assert_eq!(twice.vertex_count(), once.vertex_count());
        assert_eq!(twice.edge_count(), once.edge_count());
    }
}

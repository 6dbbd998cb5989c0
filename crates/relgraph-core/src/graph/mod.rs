//! Target graph schema derived from the source model.
//!
//! Vertex types are keyed by resolved name, edge types by
//! (name, out vertex type, in vertex type). Both keep links back to the
//! source entities and relationships they were derived from so the import
//! engine can use the model as its mapping table.

pub mod aggregate;
pub mod builder;

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::model::{EntityId, RelationshipId};
use crate::types::TargetType;

pub use aggregate::aggregate;

/// A property of a vertex or edge type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelProperty {
    pub name: String,
    /// Source column the value is read from.
    pub column: String,
    /// Entity declaring the column.
    pub owner: EntityId,
    pub ordinal: usize,
    pub source_type: String,
    pub target_type: TargetType,
    pub from_primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VertexType {
    pub name: String,
    pub entity: EntityId,
    /// Own properties in ordinal order; ancestors contribute the rest.
    pub properties: Vec<ModelProperty>,
    pub parent: Option<String>,
    pub inheritance_level: usize,
    /// Type whose label and key identify instances of this type in the target.
    pub merge_label: String,
    /// Key property names, in primary key order.
    pub key: Vec<String>,
}

impl VertexType {
    pub fn property(&self, name: &str) -> Option<&ModelProperty> {
        self.properties.iter().find(|p| p.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EdgeKey {
    pub name: String,
    pub out_vertex: String,
    pub in_vertex: String,
}

impl fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})-[{}]->({})", self.out_vertex, self.name, self.in_vertex)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeType {
    pub name: String,
    pub out_vertex: String,
    pub in_vertex: String,
    pub properties: Vec<ModelProperty>,
    /// Source relationships this edge type represents.
    pub relationships: Vec<RelationshipId>,
    /// Junction entity collapsed into this edge type.
    pub aggregated_from: Option<EntityId>,
}

impl EdgeType {
    pub fn key(&self) -> EdgeKey {
        EdgeKey {
            name: self.name.clone(),
            out_vertex: self.out_vertex.clone(),
            in_vertex: self.in_vertex.clone(),
        }
    }
}

/// How to rebuild an aggregated edge from a junction row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aggregation {
    pub edge: EdgeKey,
    /// Relationship resolving the out vertex.
    pub out_relationship: RelationshipId,
    /// Relationship resolving the in vertex.
    pub in_relationship: RelationshipId,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphModel {
    vertex_types: BTreeMap<String, VertexType>,
    edge_types: BTreeMap<EdgeKey, EdgeType>,
    entity_vertex: BTreeMap<EntityId, String>,
    relationship_edge: BTreeMap<RelationshipId, EdgeKey>,
    aggregations: BTreeMap<EntityId, Aggregation>,
}

impl GraphModel {
    pub fn vertex_types(&self) -> impl Iterator<Item = &VertexType> {
        self.vertex_types.values()
    }

    pub fn vertex_type(&self, name: &str) -> Option<&VertexType> {
        self.vertex_types.get(name)
    }

    pub fn vertex_for_entity(&self, entity: EntityId) -> Option<&VertexType> {
        self.entity_vertex
            .get(&entity)
            .and_then(|name| self.vertex_types.get(name))
    }

    pub fn edge_types(&self) -> impl Iterator<Item = &EdgeType> {
        self.edge_types.values()
    }

    pub fn edge_type(&self, key: &EdgeKey) -> Option<&EdgeType> {
        self.edge_types.get(key)
    }

    pub fn edge_for_relationship(&self, relationship: RelationshipId) -> Option<&EdgeType> {
        self.relationship_edge
            .get(&relationship)
            .and_then(|key| self.edge_types.get(key))
    }

    pub fn aggregations(&self) -> &BTreeMap<EntityId, Aggregation> {
        &self.aggregations
    }

    pub fn aggregation(&self, entity: EntityId) -> Option<&Aggregation> {
        self.aggregations.get(&entity)
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_types.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_types.len()
    }

    /// Ancestor chain of a vertex type, root first.
    pub fn lineage<'a>(&'a self, vertex: &'a VertexType) -> Vec<&'a VertexType> {
        let mut chain = vec![vertex];
        let mut current = vertex.parent.as_deref();
        while let Some(name) = current {
            match self.vertex_types.get(name) {
                Some(parent) if !chain.iter().any(|v| v.name == parent.name) => {
                    chain.push(parent);
                    current = parent.parent.as_deref();
                }
                _ => break,
            }
        }
        chain.reverse();
        chain
    }

    /// Inherited and own properties, root first.
    pub fn all_properties<'a>(&'a self, vertex: &'a VertexType) -> Vec<&'a ModelProperty> {
        self.lineage(vertex)
            .into_iter()
            .flat_map(|v| v.properties.iter())
            .collect()
    }

    /// Look a property up along the vertex type's lineage.
    pub fn property<'a>(&'a self, vertex: &'a VertexType, name: &str) -> Option<&'a ModelProperty> {
        self.lineage(vertex)
            .into_iter()
            .rev()
            .find_map(|v| v.property(name))
    }

    /// Label set of an instance of `vertex`, root first.
    pub fn labels(&self, vertex: &VertexType) -> Vec<String> {
        self.lineage(vertex).iter().map(|v| v.name.clone()).collect()
    }

    pub(crate) fn insert_vertex(&mut self, vertex: VertexType) {
        self.entity_vertex.insert(vertex.entity, vertex.name.clone());
        self.vertex_types.insert(vertex.name.clone(), vertex);
    }

    /// Add `relationship` to the edge type under `key`, creating it from
    /// `make` when absent. Returns whether a new type was created.
    pub(crate) fn merge_edge(
        &mut self,
        key: EdgeKey,
        relationship: RelationshipId,
        make: impl FnOnce() -> EdgeType,
    ) -> bool {
        self.relationship_edge.insert(relationship, key.clone());
        match self.edge_types.get_mut(&key) {
            Some(existing) => {
                existing.relationships.push(relationship);
                false
            }
            None => {
                let mut edge = make();
                edge.relationships = vec![relationship];
                self.edge_types.insert(key, edge);
                true
            }
        }
    }
}

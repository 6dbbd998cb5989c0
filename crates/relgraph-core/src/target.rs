//! Contract for the target graph store.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

use crate::error::MigrationResult;
use crate::graph::{EdgeType, VertexType};
use crate::value::{key_identity, Value};

/// A vertex addressed by natural key: its merge label plus key properties.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VertexRef {
    pub label: String,
    pub key: Vec<(String, Value)>,
}

impl VertexRef {
    /// Stable identity of the referenced vertex, usable as a map key.
    pub fn identity(&self) -> String {
        let values: Vec<Value> = self.key.iter().map(|(_, v)| v.clone()).collect();
        format!("{}\u{1e}{}", self.label, key_identity(&values))
    }
}

impl fmt::Display for VertexRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{", self.label)?;
        for (i, (name, value)) in self.key.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}: {value}")?;
        }
        f.write_str("}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VertexUpsert {
    pub vertex: VertexRef,
    /// Every label of the concrete type, root first.
    pub labels: Vec<String>,
    /// Non-key properties. Null values leave the stored property untouched.
    pub properties: Vec<(String, Value)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeUpsert {
    pub edge_type: String,
    pub from: VertexRef,
    pub to: VertexRef,
    pub properties: Vec<(String, Value)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

impl UpsertOutcome {
    pub fn created(self) -> bool {
        matches!(self, Self::Created)
    }
}

/// Target graph store writer.
///
/// Upserts are idempotent: a vertex is identified by label and key, an edge
/// by type and endpoints. `upsert_edge` creates key-only stubs for endpoints
/// that do not exist yet.
#[async_trait]
pub trait GraphWriter: Send + Sync {
    async fn create_vertex_type(&self, vertex: &VertexType) -> MigrationResult<()>;
    async fn create_edge_type(&self, edge: &EdgeType) -> MigrationResult<()>;
    async fn create_index(&self, vertex_type: &str, key_properties: &[String]) -> MigrationResult<()>;
    async fn upsert_vertex(&self, vertex: &VertexUpsert) -> MigrationResult<UpsertOutcome>;
    async fn upsert_edge(&self, edge: &EdgeUpsert) -> MigrationResult<UpsertOutcome>;
}

//! In-memory [`GraphWriter`] with the same merge semantics as the Neo4j
//! writer. Backs dry runs and tests.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use crate::error::{MigrationError, MigrationResult};
use crate::graph::{EdgeType, VertexType};
use crate::target::{EdgeUpsert, GraphWriter, UpsertOutcome, VertexRef, VertexUpsert};
use crate::value::Value;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredVertex {
    pub labels: BTreeSet<String>,
    pub properties: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredEdge {
    pub edge_type: String,
    pub from: String,
    pub to: String,
    pub properties: BTreeMap<String, Value>,
}

#[derive(Debug, Default)]
struct State {
    vertex_types: BTreeSet<String>,
    edge_types: BTreeSet<String>,
    indexes: BTreeSet<(String, Vec<String>)>,
    vertices: BTreeMap<String, StoredVertex>,
    edges: BTreeMap<(String, String, String), StoredEdge>,
}

impl State {
    fn merge_vertex(&mut self, vertex: &VertexRef) -> (&mut StoredVertex, UpsertOutcome) {
        let mut outcome = UpsertOutcome::Updated;
        let stored = self.vertices.entry(vertex.identity()).or_insert_with(|| {
            outcome = UpsertOutcome::Created;
            StoredVertex {
                labels: BTreeSet::from([vertex.label.clone()]),
                properties: vertex
                    .key
                    .iter()
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect(),
            }
        });
        (stored, outcome)
    }
}

#[derive(Debug, Default)]
pub struct MemoryGraph {
    state: Mutex<State>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MigrationResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| MigrationError::target_write("in-memory graph lock poisoned"))
    }

    pub fn vertex_count(&self) -> usize {
        self.state().map(|s| s.vertices.len()).unwrap_or_default()
    }

    pub fn edge_count(&self) -> usize {
        self.state().map(|s| s.edges.len()).unwrap_or_default()
    }

    pub fn vertex(&self, vertex: &VertexRef) -> Option<StoredVertex> {
        self.state().ok()?.vertices.get(&vertex.identity()).cloned()
    }

    /// Number of vertices carrying `label`.
    pub fn count_label(&self, label: &str) -> usize {
        self.state()
            .map(|s| s.vertices.values().filter(|v| v.labels.contains(label)).count())
            .unwrap_or_default()
    }

    pub fn count_edge_type(&self, edge_type: &str) -> usize {
        self.state()
            .map(|s| s.edges.values().filter(|e| e.edge_type == edge_type).count())
            .unwrap_or_default()
    }

    pub fn edges(&self) -> Vec<StoredEdge> {
        self.state()
            .map(|s| s.edges.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn vertex_types(&self) -> BTreeSet<String> {
        self.state().map(|s| s.vertex_types.clone()).unwrap_or_default()
    }

    pub fn edge_types(&self) -> BTreeSet<String> {
        self.state().map(|s| s.edge_types.clone()).unwrap_or_default()
    }

    pub fn indexes(&self) -> BTreeSet<(String, Vec<String>)> {
        self.state().map(|s| s.indexes.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl GraphWriter for MemoryGraph {
    async fn create_vertex_type(&self, vertex: &VertexType) -> MigrationResult<()> {
        self.state()?.vertex_types.insert(vertex.name.clone());
        Ok(())
    }

    async fn create_edge_type(&self, edge: &EdgeType) -> MigrationResult<()> {
        self.state()?.edge_types.insert(edge.name.clone());
        Ok(())
    }

    async fn create_index(&self, vertex_type: &str, key_properties: &[String]) -> MigrationResult<()> {
        self.state()?
            .indexes
            .insert((vertex_type.to_string(), key_properties.to_vec()));
        Ok(())
    }

    async fn upsert_vertex(&self, vertex: &VertexUpsert) -> MigrationResult<UpsertOutcome> {
        let mut state = self.state()?;
        let (stored, outcome) = state.merge_vertex(&vertex.vertex);
        stored.labels.extend(vertex.labels.iter().cloned());
        for (name, value) in &vertex.properties {
            if !value.is_null() {
                stored.properties.insert(name.clone(), value.clone());
            }
        }
        Ok(outcome)
    }

    async fn upsert_edge(&self, edge: &EdgeUpsert) -> MigrationResult<UpsertOutcome> {
        let mut state = self.state()?;
        state.merge_vertex(&edge.from);
        state.merge_vertex(&edge.to);

        let key = (edge.edge_type.clone(), edge.from.identity(), edge.to.identity());
        let mut outcome = UpsertOutcome::Updated;
        let stored = state.edges.entry(key).or_insert_with(|| {
            outcome = UpsertOutcome::Created;
            StoredEdge {
                edge_type: edge.edge_type.clone(),
                from: edge.from.identity(),
                to: edge.to.identity(),
                properties: BTreeMap::new(),
            }
        });
        for (name, value) in &edge.properties {
            if !value.is_null() {
                stored.properties.insert(name.clone(), value.clone());
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn film(id: i64) -> VertexRef {
        VertexRef {
            label: "Film".into(),
            key: vec![("id".into(), Value::Int(id))],
        }
    }

    fn director(id: i64) -> VertexRef {
        VertexRef {
            label: "Director".into(),
            key: vec![("id".into(), Value::Int(id))],
        }
    }

    #[tokio::test]
    async fn test_vertex_upsert_is_idempotent() {
        let graph = MemoryGraph::new();
        let upsert = VertexUpsert {
            vertex: film(1),
            labels: vec!["Film".into()],
            properties: vec![("title".into(), Value::from("Alien")), ("rating".into(), Value::Null)],
        };
        assert_eq!(graph.upsert_vertex(&upsert).await.unwrap(), UpsertOutcome::Created);
        assert_eq!(graph.upsert_vertex(&upsert).await.unwrap(), UpsertOutcome::Updated);
        assert_eq!(graph.vertex_count(), 1);

        let stored = graph.vertex(&film(1)).unwrap();
        assert_eq!(stored.properties.get("title"), Some(&Value::from("Alien")));
        assert!(!stored.properties.contains_key("rating"));
    }

    #[tokio::test]
    async fn test_edge_creates_stub_endpoints() {
        let graph = MemoryGraph::new();
        let edge = EdgeUpsert {
            edge_type: "HasDirector".into(),
            from: film(1),
            to: director(7),
            properties: vec![],
        };
        assert_eq!(graph.upsert_edge(&edge).await.unwrap(), UpsertOutcome::Created);
        assert_eq!(graph.upsert_edge(&edge).await.unwrap(), UpsertOutcome::Updated);
        assert_eq!(graph.vertex_count(), 2);
        assert_eq!(graph.edge_count(), 1);

        // the stub is completed by the later vertex upsert
        let outcome = graph
            .upsert_vertex(&VertexUpsert {
                vertex: director(7),
                labels: vec!["Director".into()],
                properties: vec![("name".into(), Value::from("Ridley Scott"))],
            })
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(graph.vertex_count(), 2);
        assert_eq!(graph.count_label("Director"), 1);
    }

    #[tokio::test]
    async fn test_subtype_labels_accumulate() {
        let graph = MemoryGraph::new();
        let person = VertexRef {
            label: "Person".into(),
            key: vec![("id".into(), Value::Int(3))],
        };
        graph
            .upsert_vertex(&VertexUpsert {
                vertex: person.clone(),
                labels: vec!["Person".into(), "Employee".into()],
                properties: vec![],
            })
            .await
            .unwrap();
        let stored = graph.vertex(&person).unwrap();
        assert!(stored.labels.contains("Employee"));
        assert_eq!(graph.count_label("Person"), 1);
    }
}

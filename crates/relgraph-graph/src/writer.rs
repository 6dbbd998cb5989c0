//! [`GraphWriter`] backed by Neo4j.

use anyhow::Context;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use neo4rs::{BoltType, Query};
use tracing::debug;

use relgraph_core::error::{MigrationError, MigrationResult};
use relgraph_core::graph::{EdgeType, VertexType};
use relgraph_core::target::{EdgeUpsert, GraphWriter, UpsertOutcome, VertexUpsert};
use relgraph_core::value::Value;

use crate::client::GraphClient;
use crate::cypher::{key_index, merge_edge, merge_vertex, CypherStatement};

/// Bolt representation of a column value. Bytes travel base64-encoded.
pub fn bolt_value(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(neo4rs::BoltNull),
        Value::Bool(b) => BoltType::from(*b),
        Value::Int(i) => BoltType::from(*i),
        Value::Float(f) => BoltType::from(*f),
        Value::Text(s) => BoltType::from(s.clone()),
        Value::Bytes(b) => BoltType::from(STANDARD.encode(b)),
    }
}

fn to_query(statement: CypherStatement) -> Query {
    statement
        .params
        .into_iter()
        .fold(Query::new(statement.text), |query, (name, value)| {
            query.param(&name, bolt_value(&value))
        })
}

fn write_error(e: anyhow::Error) -> MigrationError {
    MigrationError::target_write(format!("{e:#}"))
}

pub struct Neo4jWriter {
    client: GraphClient,
}

impl Neo4jWriter {
    pub fn new(client: GraphClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &GraphClient {
        &self.client
    }

    async fn upsert(&self, statement: CypherStatement, what: &str) -> MigrationResult<UpsertOutcome> {
        let created: Option<bool> = self
            .client
            .query_scalar(to_query(statement), "created")
            .await
            .with_context(|| format!("Failed to write {what}"))
            .map_err(write_error)?;
        Ok(match created {
            Some(true) => UpsertOutcome::Created,
            _ => UpsertOutcome::Updated,
        })
    }
}

#[async_trait]
impl GraphWriter for Neo4jWriter {
    // Neo4j is schema-optional: types exist once a node or edge carries them.
    async fn create_vertex_type(&self, vertex: &VertexType) -> MigrationResult<()> {
        debug!(vertex_type = %vertex.name, parent = ?vertex.parent, "Vertex type registered");
        Ok(())
    }

    async fn create_edge_type(&self, edge: &EdgeType) -> MigrationResult<()> {
        debug!(edge_type = %edge.key(), "Edge type registered");
        Ok(())
    }

    async fn create_index(&self, label: &str, key: &[String]) -> MigrationResult<()> {
        if key.is_empty() {
            return Ok(());
        }
        let statement = key_index(label, key);
        self.client
            .execute(Query::new(statement))
            .await
            .with_context(|| format!("Failed to create key index on {label}"))
            .map_err(write_error)?;
        debug!(label, ?key, "Key index ensured");
        Ok(())
    }

    async fn upsert_vertex(&self, upsert: &VertexUpsert) -> MigrationResult<UpsertOutcome> {
        self.upsert(merge_vertex(upsert), &format!("vertex {}", upsert.vertex))
            .await
    }

    async fn upsert_edge(&self, upsert: &EdgeUpsert) -> MigrationResult<UpsertOutcome> {
        let what = format!("edge {}-[{}]->{}", upsert.from, upsert.edge_type, upsert.to);
        self.upsert(merge_edge(upsert), &what).await
    }
}

//! Neo4j connection client.

use anyhow::{Context, Result};
use neo4rs::{ConfigBuilder, Graph, Query};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use relgraph_core::config::TargetConfig;

/// Configuration for connecting to Neo4j.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub max_connections: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: "neo4j".to_string(),
            database: "neo4j".to_string(),
            max_connections: 8,
        }
    }
}

impl From<&TargetConfig> for GraphConfig {
    fn from(target: &TargetConfig) -> Self {
        let defaults = Self::default();
        Self {
            uri: target.uri.clone().unwrap_or(defaults.uri),
            user: target.user.clone().unwrap_or(defaults.user),
            password: target.password.clone().unwrap_or(defaults.password),
            database: target.database.clone().unwrap_or(defaults.database),
            max_connections: defaults.max_connections,
        }
    }
}

/// Client for the target graph database.
#[derive(Clone)]
pub struct GraphClient {
    graph: Graph,
}

impl GraphClient {
    /// Connect and verify the server answers.
    ///
    /// neo4rs builds its pool lazily, so a `RETURN 1` ping forces the bolt
    /// handshake and lets callers put a timeout around this call.
    pub async fn connect(config: &GraphConfig) -> Result<Self> {
        let neo4j_config = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .db(config.database.as_str())
            .max_connections(config.max_connections)
            .fetch_size(200)
            .build()
            .context("Failed to build Neo4j config")?;

        let graph = Graph::connect(neo4j_config)
            .await
            .context("Failed to create Neo4j connection pool")?;

        graph
            .run(Query::new("RETURN 1".to_string()))
            .await
            .with_context(|| format!("Neo4j at {} is not responding to queries", config.uri))?;

        Ok(Self { graph })
    }

    /// Execute a Cypher query that returns no results.
    pub async fn execute(&self, query: Query) -> Result<()> {
        self.graph.run(query).await.context("Neo4j query execution failed")?;
        Ok(())
    }

    /// Execute a Cypher query and return results as rows.
    pub async fn query(&self, query: Query) -> Result<Vec<neo4rs::Row>> {
        let mut result = self.graph.execute(query).await.context("Neo4j query failed")?;

        let mut rows = Vec::new();
        while let Some(row) = result.next().await.context("Failed to read Neo4j result row")? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Execute a Cypher query and return a single scalar value.
    pub async fn query_scalar<T: DeserializeOwned>(&self, query: Query, field: &str) -> Result<Option<T>> {
        let rows = self.query(query).await?;
        match rows.into_iter().next() {
            Some(row) => {
                let val: T = row
                    .get(field)
                    .map_err(|e| anyhow::anyhow!("Failed to get field '{}': {:?}", field, e))?;
                Ok(Some(val))
            }
            None => Ok(None),
        }
    }

    /// Node and relationship totals, optionally restricted to one label.
    pub async fn get_counts(&self, label: Option<&str>) -> Result<GraphCounts> {
        let pattern = match label {
            Some(label) => format!("(n:{})", crate::cypher::quote(label)),
            None => "(n)".to_string(),
        };
        let node_query = Query::new(format!("MATCH {pattern} RETURN count(n) AS count"));
        let rel_query = Query::new(format!("MATCH {pattern}-[r]->() RETURN count(r) AS count"));

        let nodes: i64 = self.query_scalar(node_query, "count").await?.unwrap_or(0);
        let relationships: i64 = self.query_scalar(rel_query, "count").await?.unwrap_or(0);

        Ok(GraphCounts {
            nodes: nodes as usize,
            relationships: relationships as usize,
        })
    }

    /// Labels present in the database with their node counts.
    pub async fn label_counts(&self) -> Result<Vec<(String, usize)>> {
        let query = Query::new(
            "MATCH (n) UNWIND labels(n) AS label
             RETURN label, count(*) AS count ORDER BY label"
                .to_string(),
        );
        let mut counts = Vec::new();
        for row in self.query(query).await? {
            let label: String = row
                .get("label")
                .map_err(|e| anyhow::anyhow!("Failed to get field 'label': {:?}", e))?;
            let count: i64 = row
                .get("count")
                .map_err(|e| anyhow::anyhow!("Failed to get field 'count': {:?}", e))?;
            counts.push((label, count as usize));
        }
        Ok(counts)
    }
}

/// Node and relationship counts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphCounts {
    pub nodes: usize,
    pub relationships: usize,
}

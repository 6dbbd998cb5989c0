//! # relgraph graph
//!
//! Neo4j target for relgraph migrations: connection handling, key
//! constraints and idempotent `MERGE` upserts of vertices and edges.

pub mod client;
pub mod cypher;
pub mod writer;

pub use client::{GraphClient, GraphConfig, GraphCounts};
pub use writer::Neo4jWriter;

use anyhow::{Context, Result};
use std::time::Duration;

/// Connect to Neo4j, failing after `timeout` when the server does not answer.
pub async fn connect_writer(config: &GraphConfig, timeout: Duration) -> Result<Neo4jWriter> {
    let client = tokio::time::timeout(timeout, GraphClient::connect(config))
        .await
        .with_context(|| format!("Timed out connecting to Neo4j at {}", config.uri))??;
    Ok(Neo4jWriter::new(client))
}

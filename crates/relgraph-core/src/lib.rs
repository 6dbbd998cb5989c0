//! relgraph core library
//!
//! Schema model, hierarchy classification, graph model derivation, join
//! table aggregation and the import engine for relational-to-graph
//! migrations.

pub mod config;
pub mod context;
pub mod error;
pub mod graph;
pub mod hierarchy;
pub mod import;
pub mod memory;
pub mod model;
pub mod naming;
pub mod pipeline;
pub mod source;
pub mod stats;
pub mod target;
pub mod types;
pub mod value;

#[cfg(test)]
mod testing;

pub use config::{MappingStrategy, MigrationConfig};
pub use context::MigrationContext;
pub use error::{MigrationError, MigrationResult};
pub use graph::GraphModel;
pub use memory::MemoryGraph;
pub use model::SchemaModel;
pub use pipeline::{Migration, Stage};
pub use stats::{ImportStatistics, StatisticsSnapshot};

//! Per-run collaborators threaded through every stage.

use std::sync::Arc;

use crate::config::{MappingStrategy, MigrationConfig};
use crate::naming::{NamingConvention, NamingResolver};
use crate::stats::ImportStatistics;
use crate::types::{DataTypeHandler, TargetType};

pub struct MigrationContext {
    pub naming: Box<dyn NamingResolver + Send + Sync>,
    pub types: DataTypeHandler,
    pub strategy: MappingStrategy,
    pub batch_size: usize,
    pub stats: Arc<ImportStatistics>,
}

impl MigrationContext {
    pub fn new(config: &MigrationConfig, stats: Arc<ImportStatistics>) -> Self {
        Self {
            naming: Box::new(config.mapping.naming),
            types: config.source.driver.type_handler(),
            strategy: config.mapping.strategy,
            batch_size: config.import.batch_size.max(1),
            stats,
        }
    }

    /// Resolve a source type, falling back to `String` with a warning.
    pub fn target_type(&self, owner: &str, column: &str, source_type: &str) -> TargetType {
        self.types.resolve(source_type).unwrap_or_else(|| {
            self.stats.warn(format!(
                "unknown type '{source_type}' of {owner}.{column}; mapped to {}",
                TargetType::String
            ));
            TargetType::String
        })
    }
}

impl Default for MigrationContext {
    fn default() -> Self {
        Self {
            naming: Box::new(NamingConvention::default()),
            types: DataTypeHandler::default(),
            strategy: MappingStrategy::default(),
            batch_size: crate::config::DEFAULT_BATCH_SIZE,
            stats: Arc::new(ImportStatistics::new()),
        }
    }
}

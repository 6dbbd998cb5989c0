//! Run configuration loaded from TOML with environment fallbacks.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{MigrationError, MigrationResult};
use crate::hierarchy::HierarchyOverride;
use crate::model::TableFilter;
use crate::naming::NamingConvention;
use crate::types::SourceDriver;

pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_PROGRESS_INTERVAL_MS: u64 = 1000;

/// How junction tables are mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MappingStrategy {
    /// Every table becomes a vertex type.
    Naive,
    /// Pure many-to-many junction tables become edge types.
    #[default]
    NaiveAggregate,
}

impl MappingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Naive => "naive",
            Self::NaiveAggregate => "naive-aggregate",
        }
    }

    pub fn aggregates(&self) -> bool {
        matches!(self, Self::NaiveAggregate)
    }
}

impl FromStr for MappingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "naive" => Ok(Self::Naive),
            "naive-aggregate" | "aggregate" => Ok(Self::NaiveAggregate),
            other => Err(format!("unknown strategy '{other}'")),
        }
    }
}

impl fmt::Display for MappingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub driver: SourceDriver,
    pub url: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub uri: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
}

impl TargetConfig {
    /// Fill unset fields from `NEO4J_URI`, `NEO4J_USER` and `NEO4J_PASSWORD`.
    pub fn with_env_fallback(mut self) -> Self {
        let env = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        self.uri = self.uri.or_else(|| env("NEO4J_URI"));
        self.user = self.user.or_else(|| env("NEO4J_USER"));
        self.password = self.password.or_else(|| env("NEO4J_PASSWORD"));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    pub strategy: MappingStrategy,
    pub naming: NamingConvention,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    /// Detect table-per-type hierarchies from shared primary keys.
    pub detect_hierarchies: bool,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            strategy: MappingStrategy::default(),
            naming: NamingConvention::default(),
            include: Vec::new(),
            exclude: Vec::new(),
            detect_hierarchies: true,
        }
    }
}

impl MappingConfig {
    pub fn table_filter(&self) -> TableFilter {
        TableFilter {
            include: self.include.clone(),
            exclude: self.exclude.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    pub batch_size: usize,
    pub progress_interval_ms: u64,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            progress_interval_ms: DEFAULT_PROGRESS_INTERVAL_MS,
        }
    }
}

/// Everything one migration run needs to know.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    pub source: SourceConfig,
    pub target: TargetConfig,
    pub mapping: MappingConfig,
    pub import: ImportConfig,
    #[serde(rename = "hierarchy")]
    pub hierarchies: Vec<HierarchyOverride>,
}

impl MigrationConfig {
    pub fn from_toml(content: &str) -> MigrationResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> MigrationResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> MigrationResult<()> {
        if self.import.batch_size == 0 {
            return Err(MigrationError::config("import.batch_size must be at least 1"));
        }
        if self.import.progress_interval_ms == 0 {
            return Err(MigrationError::config("import.progress_interval_ms must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::InheritancePattern;

    #[test]
    fn test_defaults() {
        let config = MigrationConfig::from_toml("").unwrap();
        assert_eq!(config.mapping.strategy, MappingStrategy::NaiveAggregate);
        assert_eq!(config.import.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.source.driver, SourceDriver::Sqlite);
        assert!(config.mapping.detect_hierarchies);
    }

    #[test]
    fn test_full_file() {
        let config = MigrationConfig::from_toml(
            r#"
            [source]
            driver = "sqlite"
            url = "sqlite:films.db"

            [target]
            uri = "bolt://localhost:7687"
            user = "neo4j"

            [mapping]
            strategy = "naive"
            naming = "java"
            exclude = ["AUDIT_LOG"]

            [import]
            batch_size = 250

            [[hierarchy]]
            pattern = "single-table"
            root = "EMPLOYEE"
            discriminator = "KIND"
            root_value = "E"

              [[hierarchy.members]]
              name = "MANAGER"
              parent = "EMPLOYEE"
              value = "M"
              columns = ["BUDGET"]
            "#,
        )
        .unwrap();

        assert_eq!(config.mapping.strategy, MappingStrategy::Naive);
        assert_eq!(config.mapping.naming, NamingConvention::Java);
        assert!(!config.mapping.table_filter().accepts("audit_log"));
        assert_eq!(config.import.batch_size, 250);
        assert_eq!(config.import.progress_interval_ms, DEFAULT_PROGRESS_INTERVAL_MS);
        assert_eq!(config.hierarchies.len(), 1);
        assert_eq!(config.hierarchies[0].pattern, InheritancePattern::SingleTable);
        assert_eq!(config.hierarchies[0].members[0].columns, vec!["BUDGET"]);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let result = MigrationConfig::from_toml("[import]\nbatch_size = 0\n");
        assert!(matches!(result, Err(MigrationError::Config(_))));
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("naive".parse::<MappingStrategy>().unwrap(), MappingStrategy::Naive);
        assert_eq!("Naive-Aggregate".parse::<MappingStrategy>().unwrap(), MappingStrategy::NaiveAggregate);
        assert!("graph".parse::<MappingStrategy>().is_err());
    }
}

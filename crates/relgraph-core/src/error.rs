//! Centralized error types for relgraph.

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Mapping error: {0}")]
    Mapping(String),

    #[error("Cannot convert value '{value}' to {target}")]
    Coercion { value: String, target: String },

    #[error("Target write failed: {0}")]
    TargetWrite(String),

    #[error("Source read failed: {0}")]
    SourceRead(String),

    #[error("Invalid stage transition: cannot move from '{from}' to '{to}'")]
    InvalidStageTransition { from: String, to: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type for migration operations.
pub type MigrationResult<T> = Result<T, MigrationError>;

impl MigrationError {
    /// Create a metadata error.
    pub fn metadata(msg: impl Into<String>) -> Self {
        Self::Metadata(msg.into())
    }

    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a mapping error.
    pub fn mapping(msg: impl Into<String>) -> Self {
        Self::Mapping(msg.into())
    }

    /// Create a target write error.
    pub fn target_write(msg: impl Into<String>) -> Self {
        Self::TargetWrite(msg.into())
    }

    /// Create a source read error.
    pub fn source_read(msg: impl Into<String>) -> Self {
        Self::SourceRead(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error must abort the run.
    ///
    /// Coercion failures are recovered per row and mapping ambiguities per
    /// relationship; everything else stops the migration.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Coercion { .. } | Self::Mapping(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(MigrationError::metadata("no tables").is_fatal());
        assert!(MigrationError::connection("refused").is_fatal());
        assert!(MigrationError::target_write("constraint").is_fatal());
        assert!(!MigrationError::mapping("dangling relationship").is_fatal());
        assert!(!MigrationError::Coercion {
            value: "abc".into(),
            target: "Integer".into()
        }
        .is_fatal());
    }

    #[test]
    fn test_stage_transition_message() {
        let err = MigrationError::InvalidStageTransition {
            from: "schema-read".into(),
            to: "importing".into(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid stage transition: cannot move from 'schema-read' to 'importing'"
        );
    }
}

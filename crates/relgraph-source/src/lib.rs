//! # relgraph source
//!
//! SQLite implementation of the source contracts: catalog metadata through
//! `sqlite_master` and the table pragmas, rows through paged selects.

pub mod metadata;
pub mod pool;
pub mod rows;
pub mod sql;

#[cfg(test)]
mod migration_tests;

pub use pool::SourcePool;

use relgraph_core::error::{MigrationError, MigrationResult};
use relgraph_core::types::SourceDriver;

/// Open the source described by `driver` and `url`.
///
/// Only SQLite is readable in-process; other drivers are rejected with a
/// connection error naming the driver.
pub fn connect(driver: SourceDriver, url: &str) -> MigrationResult<SourcePool> {
    match driver {
        SourceDriver::Sqlite => SourcePool::open(url),
        other => Err(MigrationError::connection(format!(
            "no reader available for the '{other}' driver"
        ))),
    }
}

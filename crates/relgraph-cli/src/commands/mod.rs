//! CLI command definitions and handlers.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use relgraph_core::naming::NamingConvention;
use relgraph_core::types::SourceDriver;
use relgraph_core::{MappingStrategy, MigrationConfig};

pub mod inspect;
pub mod migrate;
pub mod status;

/// Relational-to-graph migration
#[derive(Parser)]
#[command(name = "relgraph")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Migrate a relational database into the graph store
    Migrate(migrate::MigrateArgs),

    /// Show the graph model derived from a source schema
    Inspect(inspect::InspectArgs),

    /// Show node and relationship counts of the graph store
    Status(status::StatusArgs),
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Migrate(args) => migrate::execute(args).await,
            Commands::Inspect(args) => inspect::execute(args),
            Commands::Status(args) => status::execute(args).await,
        }
    }
}

/// Source and mapping flags shared by `migrate` and `inspect`.
#[derive(Args, Debug, Default)]
pub struct SourceArgs {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Source DBMS (sqlite, postgresql, mysql, sqlserver, oracle, hsqldb)
    #[arg(long)]
    pub driver: Option<SourceDriver>,

    /// Source database URL, e.g. sqlite:films.db
    #[arg(long)]
    pub source_url: Option<String>,

    #[arg(long)]
    pub source_user: Option<String>,

    #[arg(long, env = "RELGRAPH_SOURCE_PASSWORD", hide_env_values = true)]
    pub source_password: Option<String>,

    /// Mapping strategy (naive, naive-aggregate)
    #[arg(long)]
    pub strategy: Option<MappingStrategy>,

    /// Naming convention (original, java)
    #[arg(long)]
    pub naming: Option<NamingConvention>,

    /// Only map these tables (repeatable)
    #[arg(long)]
    pub include: Vec<String>,

    /// Skip these tables (repeatable)
    #[arg(long)]
    pub exclude: Vec<String>,

    /// Do not detect table-per-type hierarchies from keys
    #[arg(long)]
    pub no_hierarchy_detection: bool,
}

impl SourceArgs {
    /// Configuration file (or defaults) with flags applied on top.
    pub fn load_config(&self) -> Result<MigrationConfig> {
        let mut config = match &self.config {
            Some(path) => MigrationConfig::load(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
            None => MigrationConfig::default(),
        };

        if let Some(driver) = self.driver {
            config.source.driver = driver;
        }
        if let Some(url) = &self.source_url {
            config.source.url = Some(url.clone());
        }
        if let Some(user) = &self.source_user {
            config.source.user = Some(user.clone());
        }
        if let Some(password) = &self.source_password {
            config.source.password = Some(password.clone());
        }
        if let Some(strategy) = self.strategy {
            config.mapping.strategy = strategy;
        }
        if let Some(naming) = self.naming {
            config.mapping.naming = naming;
        }
        if !self.include.is_empty() {
            config.mapping.include = self.include.clone();
        }
        if !self.exclude.is_empty() {
            config.mapping.exclude = self.exclude.clone();
        }
        if self.no_hierarchy_detection {
            config.mapping.detect_hierarchies = false;
        }
        Ok(config)
    }

    pub fn source_url<'a>(&self, config: &'a MigrationConfig) -> Result<&'a str> {
        config
            .source
            .url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("No source URL. Pass --source-url or set [source] url in the config file."))
    }
}

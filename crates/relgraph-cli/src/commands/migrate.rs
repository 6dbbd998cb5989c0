//! `relgraph migrate`

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use relgraph_core::config::TargetConfig;
use relgraph_core::stats::{LogListener, StatisticsListener, StatisticsPublisher};
use relgraph_core::target::GraphWriter;
use relgraph_core::{ImportStatistics, MemoryGraph, Migration, MigrationContext};
use relgraph_graph::GraphConfig;

use super::SourceArgs;
use crate::output::{print_summary, ProgressListener};

/// Target connection flags shared by `migrate` and `status`.
#[derive(Args, Debug, Default)]
pub struct TargetArgs {
    /// Bolt URI of the graph store (falls back to NEO4J_URI)
    #[arg(long)]
    pub target_uri: Option<String>,

    /// Graph store user (falls back to NEO4J_USER)
    #[arg(long)]
    pub target_user: Option<String>,

    /// Graph store password (falls back to NEO4J_PASSWORD)
    #[arg(long)]
    pub target_password: Option<String>,

    /// Graph database name
    #[arg(long)]
    pub target_database: Option<String>,

    /// Seconds to wait for the graph store to answer
    #[arg(long, default_value = "10")]
    pub connect_timeout: u64,
}

impl TargetArgs {
    /// Flags over `target`, then environment for whatever is still unset.
    pub fn apply(&self, target: TargetConfig) -> TargetConfig {
        let mut target = target;
        if let Some(uri) = &self.target_uri {
            target.uri = Some(uri.clone());
        }
        if let Some(user) = &self.target_user {
            target.user = Some(user.clone());
        }
        if let Some(password) = &self.target_password {
            target.password = Some(password.clone());
        }
        if let Some(database) = &self.target_database {
            target.database = Some(database.clone());
        }
        target.with_env_fallback()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout.max(1))
    }
}

#[derive(Args, Debug)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub target: TargetArgs,

    /// Rows fetched per source batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Import into an in-memory graph instead of the graph store
    #[arg(long)]
    pub dry_run: bool,

    /// Print the final statistics as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: MigrateArgs) -> Result<()> {
    let mut config = args.source.load_config()?;
    config.target = args.target.apply(config.target);
    if let Some(batch_size) = args.batch_size {
        config.import.batch_size = batch_size;
    }
    config.validate()?;

    let url = args.source.source_url(&config)?;
    let source = relgraph_source::connect(config.source.driver, url)?;

    let writer: Box<dyn GraphWriter> = if args.dry_run {
        info!("Dry run: importing into an in-memory graph");
        Box::new(MemoryGraph::new())
    } else {
        let graph_config = GraphConfig::from(&config.target);
        Box::new(relgraph_graph::connect_writer(&graph_config, args.target.timeout()).await?)
    };

    let stats = Arc::new(ImportStatistics::new());
    let ctx = MigrationContext::new(&config, stats.clone());
    let mut migration = Migration::new(&config, ctx);

    let show_bar = !args.json && std::io::stderr().is_terminal();
    let progress = Arc::new(ProgressListener::new());
    let listeners: Vec<Arc<dyn StatisticsListener>> = if show_bar {
        vec![progress.clone()]
    } else {
        vec![Arc::new(LogListener)]
    };
    let publisher = StatisticsPublisher::start(
        stats.clone(),
        listeners,
        Duration::from_millis(config.import.progress_interval_ms),
    );

    let result = migration.run(&source, writer.as_ref()).await;
    publisher.stop().await;
    progress.finish();

    let snapshot = stats.snapshot();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print_summary(&snapshot, &stats.warnings(), &stats.errors(), args.dry_run);
    }

    if let Err(e) = result {
        let stage = migration.stage().map_or("start", |s| s.as_str());
        eprintln!("{} failed after stage {}: {}", "Migration".red().bold(), stage, e);
        return Err(e.into());
    }
    Ok(())
}

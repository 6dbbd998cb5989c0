//! `relgraph status`

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use relgraph_core::MigrationConfig;
use relgraph_graph::{GraphClient, GraphConfig};

use super::migrate::TargetArgs;
use crate::output::pad_right;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// TOML configuration file providing the [target] section
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub target: TargetArgs,
}

pub async fn execute(args: StatusArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => MigrationConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => MigrationConfig::default(),
    };
    let graph_config = GraphConfig::from(&args.target.apply(config.target));

    let client = tokio::time::timeout(args.target.timeout(), GraphClient::connect(&graph_config))
        .await
        .with_context(|| format!("Timed out connecting to Neo4j at {}", graph_config.uri))??;

    let counts = client.get_counts(None).await?;
    println!("{} {}", "Graph store".bold(), graph_config.uri.dimmed());
    println!("  {} {}", pad_right("Nodes", 16).bold(), counts.nodes);
    println!("  {} {}", pad_right("Relationships", 16).bold(), counts.relationships);

    let labels = client.label_counts().await?;
    if !labels.is_empty() {
        println!();
        println!("{}", "Labels".cyan().bold());
        for (label, count) in labels {
            println!("  {} {}", pad_right(&label, 30), count);
        }
    }
    Ok(())
}

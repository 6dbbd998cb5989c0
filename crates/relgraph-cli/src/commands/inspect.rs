//! `relgraph inspect`

use anyhow::{Context, Result};
use clap::Args;
use std::sync::Arc;

use relgraph_core::{ImportStatistics, Migration, MigrationContext};

use super::SourceArgs;
use crate::output::print_graph_model;

#[derive(Args, Debug)]
pub struct InspectArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Print the graph model as JSON
    #[arg(long)]
    pub json: bool,
}

/// Read the source schema and show the graph model it maps to. Nothing is
/// written anywhere.
pub fn execute(args: InspectArgs) -> Result<()> {
    let config = args.source.load_config()?;
    let url = args.source.source_url(&config)?;
    let source = relgraph_source::connect(config.source.driver, url)?;

    let stats = Arc::new(ImportStatistics::new());
    let mut migration = Migration::new(&config, MigrationContext::new(&config, stats.clone()));
    migration.read_schema(&source)?;
    migration.build_graph_model()?;
    migration.aggregate()?;

    let (Some(schema), Some(graph)) = (migration.schema(), migration.graph()) else {
        anyhow::bail!("graph model was not built");
    };

    if args.json {
        let json = serde_json::to_string_pretty(graph).context("Failed to serialize graph model")?;
        println!("{json}");
        return Ok(());
    }

    print_graph_model(schema, graph);
    let warnings = stats.warnings();
    let errors = stats.errors();
    if !warnings.is_empty() || !errors.is_empty() {
        println!();
        for message in warnings.iter().chain(errors.iter()) {
            println!("  ! {message}");
        }
    }
    Ok(())
}

//! relgraph CLI
//!
//! Migrates a relational database into a property graph.

use anyhow::Result;
use clap::Parser;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod output;

use commands::Cli;

fn default_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "relgraph=info,relgraph_core=info,relgraph_source=warn,relgraph_graph=warn",
        1 => "relgraph=debug,relgraph_core=debug,relgraph_source=debug,relgraph_graph=debug",
        _ => "relgraph=trace,relgraph_core=trace,relgraph_source=trace,relgraph_graph=trace",
    }
}

/// Initialize tracing on stderr, plus a plain-text file layer when
/// `log_file` is set. The returned guard flushes the file on drop.
fn init_tracing(verbosity: u8, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(verbosity).into());
    let stderr = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    match log_file {
        Some(path) => {
            let directory = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let file_name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("--log-file must name a file: {}", path.display()))?;
            std::fs::create_dir_all(directory)?;

            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr)
                .with(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false))
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry().with(env_filter).with(stderr).init();
            Ok(None)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.verbose, cli.log_file.as_deref())?;
    cli.execute().await
}

//! Terminal output formatting.

use colored::Colorize;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;
use unicode_width::UnicodeWidthStr;

use relgraph_core::graph::GraphModel;
use relgraph_core::stats::{StatisticsListener, StatisticsSnapshot};
use relgraph_core::SchemaModel;

/// Pad a plain string to a given visual width (right-padded).
pub fn pad_right(s: &str, width: usize) -> String {
    let visual = UnicodeWidthStr::width(s);
    if visual >= width {
        s.to_string()
    } else {
        format!("{}{}", s, " ".repeat(width - visual))
    }
}

/// Truncate a string respecting visual width.
pub fn truncate_visual(s: &str, max_width: usize) -> String {
    if UnicodeWidthStr::width(s) <= max_width {
        return s.to_string();
    }
    if max_width <= 3 {
        return ".".repeat(max_width);
    }
    let mut out = String::new();
    let mut width = 0;
    for c in s.chars() {
        let w = unicode_width::UnicodeWidthChar::width(c).unwrap_or(0);
        if width + w > max_width - 3 {
            break;
        }
        out.push(c);
        width += w;
    }
    out.push_str("...");
    out
}

fn cell(s: &str, width: usize) -> String {
    pad_right(&truncate_visual(s, width), width)
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 3600 {
        format!("{}h{:02}m{:02}s", secs / 3600, secs % 3600 / 60, secs % 60)
    } else if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{:.1}s", d.as_secs_f64())
    }
}

/// Print vertex and edge types of a graph model.
pub fn print_graph_model(schema: &SchemaModel, graph: &GraphModel) {
    println!(
        "{} {} entities, {} relationships, {} hierarchies",
        "Source:".bold(),
        schema.entities().len(),
        schema.relationships().len(),
        schema.bags().len()
    );
    println!();

    println!("{} ({})", "Vertex types".cyan().bold(), graph.vertex_count());
    println!("{} {} {} {}", cell("Name", 24), cell("Table", 24), cell("Key", 20), "Properties");
    println!("{}", "─".repeat(84));
    for vertex in graph.vertex_types() {
        let entity = schema.entity(vertex.entity);
        let name = match &vertex.parent {
            Some(parent) => format!("{} < {}", vertex.name, parent),
            None => vertex.name.clone(),
        };
        let properties = vertex.properties.iter().map(|p| p.name.as_str()).collect::<Vec<_>>().join(", ");
        println!(
            "{} {} {} {}",
            cell(&name, 24),
            cell(&entity.table, 24),
            cell(&vertex.key.join(", "), 20).dimmed(),
            properties
        );
    }
    println!();

    println!("{} ({})", "Edge types".cyan().bold(), graph.edge_count());
    println!("{} {} {}", cell("Name", 24), cell("From", 24), cell("To", 24));
    println!("{}", "─".repeat(74));
    for edge in graph.edge_types() {
        let name = if edge.aggregated_from.is_some() {
            format!("{} {}", cell(&edge.name, 24), "(join table)".dimmed())
        } else {
            cell(&edge.name, 24)
        };
        println!("{} {} {}", cell(&edge.out_vertex, 24), cell(&edge.in_vertex, 24), name);
    }
}

/// Print the final statistics block with any recorded problems.
pub fn print_summary(snapshot: &StatisticsSnapshot, warnings: &[String], errors: &[String], dry_run: bool) {
    let title = if dry_run { "Dry run complete" } else { "Migration complete" };
    println!();
    println!("{} {}", title.green().bold(), format!("({})", snapshot.run_id).dimmed());
    println!("{}", "─".repeat(44));

    let rows = [
        ("Entities", snapshot.entities.to_string()),
        ("Relationships", snapshot.relationships.to_string()),
        ("Hierarchies", snapshot.hierarchies.to_string()),
        ("Vertex types", snapshot.vertex_types.to_string()),
        (
            "Edge types",
            format!("{} ({} from join tables)", snapshot.edge_types, snapshot.aggregated_edge_types),
        ),
        (
            "Records",
            format!("{} / {}", snapshot.records_analyzed, snapshot.records_total),
        ),
        (
            "Vertices",
            format!("{} created, {} updated", snapshot.vertices_created, snapshot.vertices_updated),
        ),
        (
            "Edges",
            format!("{} created, {} updated", snapshot.edges_created, snapshot.edges_updated),
        ),
        ("Rows skipped", snapshot.rows_skipped.to_string()),
        ("Elapsed", format_duration(snapshot.elapsed())),
    ];
    for (label, value) in rows {
        println!("  {} {}", pad_right(label, 16).bold(), value);
    }

    if !warnings.is_empty() {
        println!();
        println!("{} ({})", "Warnings".yellow().bold(), warnings.len());
        for warning in warnings.iter().take(20) {
            println!("  {} {}", "!".yellow(), warning);
        }
        if warnings.len() > 20 {
            println!("  {}", format!("... and {} more", warnings.len() - 20).dimmed());
        }
    }
    if !errors.is_empty() {
        println!();
        println!("{} ({})", "Errors".red().bold(), errors.len());
        for error in errors {
            println!("  {} {}", "✗".red(), error);
        }
    }
}

/// Progress bar fed by the statistics publisher.
pub struct ProgressListener {
    bar: ProgressBar,
}

impl ProgressListener {
    pub fn new() -> Self {
        let bar = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr());
        let style = ProgressStyle::with_template(
            "{spinner} {msg:>20} [{bar:40.cyan/blue}] {pos}/{len} rows ({percent}%) eta {eta}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
        bar.set_style(style);
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl StatisticsListener for ProgressListener {
    fn on_statistics(&self, snapshot: &StatisticsSnapshot) {
        self.bar.set_length(snapshot.records_total);
        self.bar.set_position(snapshot.records_analyzed);
        if let Some(stage) = snapshot.stage {
            self.bar.set_message(stage.to_string());
        }
    }
}

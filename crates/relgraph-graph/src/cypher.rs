//! Cypher text for schema statements and idempotent upserts.
//!
//! Statements are built as plain text plus named parameters so they can be
//! checked without a server. Labels and property names are backtick-quoted;
//! values always travel as parameters.

use relgraph_core::target::{EdgeUpsert, VertexRef, VertexUpsert};
use relgraph_core::value::Value;

/// Cypher text with its named parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CypherStatement {
    pub text: String,
    pub params: Vec<(String, Value)>,
}

/// Backtick-quote an identifier.
pub fn quote(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Identifier safe for constraint and index names.
fn schema_name(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| {
            p.chars()
                .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("_")
}

/// Uniqueness constraint for a single key, composite index otherwise.
pub fn key_index(label: &str, key: &[String]) -> String {
    let mut parts = vec!["relgraph", label];
    parts.extend(key.iter().map(String::as_str));
    let name = schema_name(&parts);
    match key {
        [single] => format!(
            "CREATE CONSTRAINT {name} IF NOT EXISTS FOR (n:{}) REQUIRE n.{} IS UNIQUE",
            quote(label),
            quote(single)
        ),
        _ => {
            let properties = key.iter().map(|k| format!("n.{}", quote(k))).collect::<Vec<_>>().join(", ");
            format!("CREATE INDEX {name} IF NOT EXISTS FOR (n:{}) ON ({properties})", quote(label))
        }
    }
}

/// `{`a`: $p0, `b`: $p1}` for `vertex`'s key, appending the values to `params`.
fn key_pattern(vertex: &VertexRef, prefix: &str, params: &mut Vec<(String, Value)>) -> String {
    let entries = vertex
        .key
        .iter()
        .enumerate()
        .map(|(i, (name, value))| {
            let param = format!("{prefix}{i}");
            params.push((param.clone(), value.clone()));
            format!("{}: ${param}", quote(name))
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("{{{entries}}}")
}

/// `SET` clause items for non-null properties. Null leaves the stored value.
fn set_properties(
    variable: &str,
    properties: &[(String, Value)],
    params: &mut Vec<(String, Value)>,
) -> Vec<String> {
    properties
        .iter()
        .filter(|(_, value)| !value.is_null())
        .enumerate()
        .map(|(i, (name, value))| {
            let param = format!("v{i}");
            params.push((param.clone(), value.clone()));
            format!("{variable}.{} = ${param}", quote(name))
        })
        .collect()
}

/// Merge a vertex on its merge label and key, add its subtype labels and
/// set its properties. Returns one row with `created`.
pub fn merge_vertex(upsert: &VertexUpsert) -> CypherStatement {
    let mut params = Vec::new();
    let label = quote(&upsert.vertex.label);
    let key = key_pattern(&upsert.vertex, "k", &mut params);

    let mut sets: Vec<String> = upsert
        .labels
        .iter()
        .filter(|l| **l != upsert.vertex.label)
        .map(|l| format!("n:{}", quote(l)))
        .collect();
    sets.extend(set_properties("n", &upsert.properties, &mut params));

    let mut text = format!(
        "OPTIONAL MATCH (existing:{label} {key})\n\
         WITH count(existing) = 0 AS created\n\
         MERGE (n:{label} {key})"
    );
    if !sets.is_empty() {
        text.push_str(&format!("\nSET {}", sets.join(", ")));
    }
    text.push_str("\nRETURN created");
    CypherStatement { text, params }
}

/// Merge an edge between two vertices addressed by key. Missing endpoints
/// are created as stubs carrying only their key. Returns one row with
/// `created`.
pub fn merge_edge(upsert: &EdgeUpsert) -> CypherStatement {
    let mut params = Vec::new();
    let from = key_pattern(&upsert.from, "f", &mut params);
    let to = key_pattern(&upsert.to, "t", &mut params);
    let edge_type = quote(&upsert.edge_type);

    let mut text = format!(
        "MERGE (a:{} {from})\n\
         MERGE (b:{} {to})\n\
         WITH a, b\n\
         OPTIONAL MATCH (a)-[existing:{edge_type}]->(b)\n\
         WITH a, b, count(existing) = 0 AS created\n\
         MERGE (a)-[r:{edge_type}]->(b)",
        quote(&upsert.from.label),
        quote(&upsert.to.label),
    );
    let sets = set_properties("r", &upsert.properties, &mut params);
    if !sets.is_empty() {
        text.push_str(&format!("\nSET {}", sets.join(", ")));
    }
    text.push_str("\nRETURN created");
    CypherStatement { text, params }
}

//! Naming conventions turning source identifiers into graph schema names.

use convert_case::{Case, Casing};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// What an edge name is derived from.
#[derive(Debug, Clone)]
pub struct EdgeNaming<'a> {
    pub foreign_columns: &'a [String],
    pub foreign_entity: &'a str,
    pub parent_entity: &'a str,
}

/// Pure string functions mapping source names to target names.
pub trait NamingResolver {
    fn vertex_name(&self, candidate: &str) -> String;
    fn property_name(&self, candidate: &str) -> String;
    fn edge_name(&self, edge: &EdgeNaming<'_>) -> String;
}

/// Built-in conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamingConvention {
    /// Keep source identifiers as they are.
    #[default]
    Original,
    /// PascalCase vertex types, camelCase properties.
    Java,
}

impl FromStr for NamingConvention {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "original" => Ok(Self::Original),
            "java" | "camelcase" => Ok(Self::Java),
            other => Err(format!("unknown naming convention '{other}'")),
        }
    }
}

impl NamingResolver for NamingConvention {
    fn vertex_name(&self, candidate: &str) -> String {
        match self {
            Self::Original => candidate.to_string(),
            Self::Java => pascal_case(candidate),
        }
    }

    fn property_name(&self, candidate: &str) -> String {
        match self {
            Self::Original => candidate.to_string(),
            Self::Java => camel_case(candidate),
        }
    }

    fn edge_name(&self, edge: &EdgeNaming<'_>) -> String {
        let stem = edge
            .foreign_columns
            .iter()
            .map(|c| strip_id_suffix(c))
            .filter(|c| !c.is_empty())
            .map(pascal_case)
            .collect::<String>();

        if stem.is_empty() {
            format!("Has{}", pascal_case(edge.parent_entity))
        } else {
            format!("Has{stem}")
        }
    }
}

/// Drops a trailing `_ID` / `ID` from a key column name.
fn strip_id_suffix(column: &str) -> &str {
    if column.eq_ignore_ascii_case("id") {
        return "";
    }
    let split = |n: usize| {
        column
            .len()
            .checked_sub(n)
            .filter(|&at| at > 0 && column.is_char_boundary(at))
            .map(|at| column.split_at(at))
    };

    if let Some((head, tail)) = split(3) {
        if tail.eq_ignore_ascii_case("_id") {
            return head;
        }
    }
    // Only strip a bare suffix that starts a new word (ownerId; OWNERID is ambiguous)
    if let Some((head, "Id")) = split(2) {
        if head.chars().last().is_some_and(char::is_lowercase) {
            return head;
        }
    }
    column
}

/// `FILM_ACTOR` / `filmActor` → `FilmActor`.
pub fn pascal_case(s: &str) -> String {
    s.to_case(Case::Pascal)
}

/// `FIRST_NAME` → `firstName`.
pub fn camel_case(s: &str) -> String {
    s.to_case(Case::Camel)
}

//! Renders a [`RowQuery`] as SQLite SQL.

use relgraph_core::source::{ColumnRef, RowQuery};

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn column(column: &ColumnRef) -> String {
    format!("{}.{}", quote_ident(&column.table), quote_ident(&column.column))
}

/// A statement plus its positional text parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<String>,
}

/// `SELECT` with the projection in `query.columns` order, so result column
/// `i` is `query.columns[i]`.
pub fn render_select(query: &RowQuery) -> Statement {
    render(query, false)
}

fn render(query: &RowQuery, after_key: bool) -> Statement {
    let projection = query
        .columns
        .iter()
        .map(|c| format!("{} AS {}", column(c), quote_ident(&c.alias())))
        .collect::<Vec<_>>()
        .join(", ");

    let mut sql = format!("SELECT {projection} FROM {}", quote_ident(&query.table));
    for join in &query.joins {
        let on = join
            .on
            .iter()
            .map(|(left, right)| format!("{} = {}", column(left), column(right)))
            .collect::<Vec<_>>()
            .join(" AND ");
        sql.push_str(&format!(" LEFT JOIN {} ON {on}", quote_ident(&join.table)));
    }

    let mut conditions = Vec::new();
    let mut params = Vec::new();
    if let Some(filter) = &query.filter {
        if filter.values.is_empty() {
            conditions.push("0".to_string());
        } else {
            let placeholders = vec!["?"; filter.values.len()].join(", ");
            conditions.push(format!("{} IN ({placeholders})", column(&filter.column)));
            params.extend(filter.values.iter().cloned());
        }
    }
    if after_key && !query.order_by.is_empty() {
        let key = query.order_by.iter().map(column).collect::<Vec<_>>().join(", ");
        let placeholders = vec!["?"; query.order_by.len()].join(", ");
        conditions.push(format!("({key}) > ({placeholders})"));
    }
    if !conditions.is_empty() {
        sql.push_str(&format!(" WHERE {}", conditions.join(" AND ")));
    }

    if !query.order_by.is_empty() {
        let order = query.order_by.iter().map(column).collect::<Vec<_>>().join(", ");
        sql.push_str(&format!(" ORDER BY {order}"));
    }
    Statement { sql, params }
}

pub fn render_count(query: &RowQuery) -> Statement {
    let select = render_select(query);
    Statement {
        sql: format!("SELECT COUNT(*) FROM ({})", select.sql),
        params: select.params,
    }
}

/// Appends `LIMIT ? OFFSET ?`; the caller binds both after `params`.
pub fn paged(statement: &Statement) -> String {
    format!("{} LIMIT ? OFFSET ?", statement.sql)
}

/// Next page after a known sort key: `WHERE (k1, k2) > (?, ?) ... LIMIT ?`.
/// The caller binds `params`, then one value per `order_by` column, then the
/// limit.
pub fn keyset_page(query: &RowQuery) -> Statement {
    let mut statement = render(query, true);
    statement.sql.push_str(" LIMIT ?");
    statement
}

#[cfg(test)]
mod tests {
    use super::*;
    use relgraph_core::source::{DiscriminatorFilter, JoinStep};

    #[test]
    fn test_plain_scan() {
        let mut query = RowQuery::scan("FILM");
        query.select(ColumnRef::new("FILM", "ID"));
        query.select(ColumnRef::new("FILM", "TITLE"));
        query.order_by.push(ColumnRef::new("FILM", "ID"));

        let statement = render_select(&query);
        assert_eq!(
            statement.sql,
            r#"SELECT "FILM"."ID" AS "FILM.ID", "FILM"."TITLE" AS "FILM.TITLE" FROM "FILM" ORDER BY "FILM"."ID""#
        );
        assert!(statement.params.is_empty());
    }

    #[test]
    fn test_join_chain_and_filter() {
        let mut query = RowQuery::scan("EMPLOYEE");
        query.select(ColumnRef::new("EMPLOYEE", "PERSON_ID"));
        query.joins.push(JoinStep {
            table: "PERSON".into(),
            on: vec![(ColumnRef::new("EMPLOYEE", "PERSON_ID"), ColumnRef::new("PERSON", "ID"))],
        });
        query.filter = Some(DiscriminatorFilter {
            column: ColumnRef::new("PERSON", "KIND"),
            values: vec!["E".into(), "M".into()],
        });

        let statement = render_select(&query);
        assert!(statement
            .sql
            .contains(r#"LEFT JOIN "PERSON" ON "EMPLOYEE"."PERSON_ID" = "PERSON"."ID""#));
        assert!(statement.sql.ends_with(r#"WHERE "PERSON"."KIND" IN (?, ?)"#));
        assert_eq!(statement.params, vec!["E", "M"]);

        let count = render_count(&query);
        assert!(count.sql.starts_with("SELECT COUNT(*) FROM (SELECT"));
        assert_eq!(paged(&statement), format!("{} LIMIT ? OFFSET ?", statement.sql));
    }

    #[test]
    fn test_keyset_page_follows_filter() {
        let mut query = RowQuery::scan("CREDIT");
        query.select(ColumnRef::new("CREDIT", "FILM_ID"));
        query.order_by.push(ColumnRef::new("CREDIT", "FILM_ID"));
        query.order_by.push(ColumnRef::new("CREDIT", "SLOT"));

        assert_eq!(
            keyset_page(&query).sql,
            r#"SELECT "CREDIT"."FILM_ID" AS "CREDIT.FILM_ID" FROM "CREDIT" WHERE ("CREDIT"."FILM_ID", "CREDIT"."SLOT") > (?, ?) ORDER BY "CREDIT"."FILM_ID", "CREDIT"."SLOT" LIMIT ?"#
        );

        query.filter = Some(DiscriminatorFilter {
            column: ColumnRef::new("CREDIT", "KIND"),
            values: vec!["A".into()],
        });
        let statement = keyset_page(&query);
        assert!(statement
            .sql
            .contains(r#"WHERE "CREDIT"."KIND" IN (?) AND ("CREDIT"."FILM_ID", "CREDIT"."SLOT") > (?, ?)"#));
        assert_eq!(statement.params, vec!["A"]);
    }

    #[test]
    fn test_quoting() {
        assert_eq!(quote_ident(r#"odd"name"#), r#""odd""name""#);
    }
}

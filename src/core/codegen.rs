//! BK-004: SQL generation. Groups, batches, and escapes resolved rows.
//!
//! A single `INSERT` needs one fixed column list, so each table's rows are
//! first partitioned by column set, then split into batches of at most
//! `batch_size` rows. Output is deterministic: table order, then group
//! first-encounter order, then batch order.

use super::types::{ResolvedBundle, ResolvedRow, SqlDialect, SqlValue};

/// Serializer options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SqlOptions {
    /// Maximum rows per statement; `None` or `Some(0)` means unbounded
    pub batch_size: Option<usize>,
    pub dialect: SqlDialect,
}

/// Rows sharing one column list.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnGroup<'a> {
    pub columns: Vec<String>,
    pub rows: Vec<&'a ResolvedRow>,
}

impl ColumnGroup<'_> {
    /// Comma-joined column list, e.g. `id,name`.
    pub fn key(&self) -> String {
        self.columns.join(",")
    }
}

/// Generate SQL for every table of a resolved bundle.
pub fn sql_for_recipe_bundle(bundle: &ResolvedBundle, options: &SqlOptions) -> String {
    let mut sql = String::new();

    for (table, rows) in bundle {
        // Grouping needs a first row for its reference order
        if rows.is_empty() {
            continue;
        }

        for group in group_rows_by_columns(rows) {
            for batch in chunk_rows(&group.rows, options.batch_size) {
                sql.push_str(&insert_statement(
                    options.dialect,
                    table,
                    &group.columns,
                    batch,
                ));
                sql.push('\n');
            }
        }
    }

    sql
}

/// Render one `INSERT` statement, terminated by `;`.
fn insert_statement(
    dialect: SqlDialect,
    table: &str,
    columns: &[String],
    rows: &[&ResolvedRow],
) -> String {
    let value_lists: Vec<String> = rows
        .iter()
        .map(|row| {
            let values: Vec<String> = columns
                .iter()
                .map(|column| {
                    row.get(column)
                        .map_or_else(|| "NULL".to_string(), |v| escape_value(dialect, v))
                })
                .collect();
            format!("({})", values.join(", "))
        })
        .collect();

    format!(
        "INSERT INTO {} ({}) VALUES {};",
        quote_identifier(dialect, table),
        columns.join(","),
        value_lists.join(", ")
    )
}

/// Quote a table name for the dialect.
pub fn quote_identifier(dialect: SqlDialect, ident: &str) -> String {
    match dialect {
        SqlDialect::Mysql => format!("`{}`", ident.replace('`', "``")),
    }
}

/// Escape one value for use inside a query.
///
/// Only single quotes are escaped (doubled); backslashes and double quotes
/// are emitted as-is.
pub fn escape_value(dialect: SqlDialect, value: &SqlValue) -> String {
    match dialect {
        SqlDialect::Mysql => match value {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Raw(raw) => raw.clone(),
            SqlValue::Int(n) => n.to_string(),
            SqlValue::UInt(n) => n.to_string(),
            SqlValue::Float(n) => n.to_string(),
            SqlValue::Bool(b) => quote_string(&b.to_string()),
            SqlValue::Text(s) => quote_string(s),
        },
    }
}

fn quote_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Partition rows by column set for INSERT batching.
///
/// The first row's key order is the reference. Each row's keys are stably
/// sorted by their index in the reference, unknown keys last in their
/// original order. Rows whose sorted key lists match share a group.
pub fn group_rows_by_columns(rows: &[ResolvedRow]) -> Vec<ColumnGroup<'_>> {
    let Some(first) = rows.first() else {
        return Vec::new();
    };
    let reference: Vec<&String> = first.keys().collect();

    let mut groups: indexmap::IndexMap<Vec<String>, Vec<&ResolvedRow>> = indexmap::IndexMap::new();
    for row in rows {
        let mut columns: Vec<&String> = row.keys().collect();
        columns.sort_by_key(|c| {
            reference
                .iter()
                .position(|r| r == c)
                .unwrap_or(usize::MAX)
        });
        let columns: Vec<String> = columns.into_iter().cloned().collect();
        groups.entry(columns).or_default().push(row);
    }

    groups
        .into_iter()
        .map(|(columns, rows)| ColumnGroup { columns, rows })
        .collect()
}

/// Split rows into consecutive chunks of at most `batch_size`.
pub fn chunk_rows<'r, 'a>(
    rows: &'r [&'a ResolvedRow],
    batch_size: Option<usize>,
) -> Vec<&'r [&'a ResolvedRow]> {
    match batch_size {
        Some(size) if size > 0 => rows.chunks(size).collect(),
        _ if rows.is_empty() => Vec::new(),
        _ => vec![rows],
    }
}

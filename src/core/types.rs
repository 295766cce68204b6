//! BK-002: Data model for recipe values, bundles, resolved output, and config.
//!
//! Recipe bundles are order-preserving (`IndexMap`) so table, row, and
//! column order flow through to ID generation and SQL output unchanged.

use super::tokens::{AutoIncId, NamedId, NamedIdRef, RawSql, TokenKey};
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

// ============================================================================
// Values
// ============================================================================

/// A value with no tokens left in it; what the SQL serializer consumes.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    /// Integers above `i64::MAX`, e.g. unsigned BIGINT columns.
    UInt(u64),
    Float(f64),
    Text(String),
    /// Verbatim SQL, never quoted or escaped.
    Raw(String),
}

/// A recipe cell: a literal, raw SQL, or an ID token awaiting resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Literal(SqlValue),
    AutoInc(AutoIncId),
    Named(NamedId),
    NamedRef(NamedIdRef),
}

impl Value {
    pub fn null() -> Self {
        Self::Literal(SqlValue::Null)
    }
}

impl From<SqlValue> for Value {
    fn from(v: SqlValue) -> Self {
        Self::Literal(v)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Literal(SqlValue::Text(s.to_string()))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Literal(SqlValue::Text(s))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Literal(SqlValue::Int(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Literal(SqlValue::Float(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Literal(SqlValue::Bool(b))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or_else(Value::null, Into::into)
    }
}

impl From<AutoIncId> for Value {
    fn from(t: AutoIncId) -> Self {
        Self::AutoInc(t)
    }
}

impl From<NamedId> for Value {
    fn from(t: NamedId) -> Self {
        Self::Named(t)
    }
}

impl From<NamedIdRef> for Value {
    fn from(t: NamedIdRef) -> Self {
        Self::NamedRef(t)
    }
}

impl From<RawSql> for Value {
    fn from(raw: RawSql) -> Self {
        Self::Literal(SqlValue::Raw(raw.into_inner()))
    }
}

// ============================================================================
// Bundles
// ============================================================================

/// One row of a recipe: column name → value.
pub type Row = IndexMap<String, Value>;

/// Table name → rows, as authored in a recipe.
pub type RecipeBundle = IndexMap<String, Vec<Row>>;

/// One row after ID resolution.
pub type ResolvedRow = IndexMap<String, SqlValue>;

/// Table name → resolved rows.
pub type ResolvedBundle = IndexMap<String, Vec<ResolvedRow>>;

/// Build a row from `(column, value)` pairs.
pub fn row<K: Into<String>>(columns: impl IntoIterator<Item = (K, Value)>) -> Row {
    columns.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

/// Copy a row template, giving every token a fresh identity.
///
/// Tokens sharing a key inside the template still share one (new) key in the
/// copy, so a template can link two of its own columns.
pub fn instantiate_row_template(template: &Row) -> Row {
    let mut auto_incs: FxHashMap<TokenKey, AutoIncId> = FxHashMap::default();
    let mut named: FxHashMap<TokenKey, NamedId> = FxHashMap::default();

    template
        .iter()
        .map(|(column, value)| {
            let fresh = match value {
                Value::AutoInc(t) => {
                    Value::AutoInc(*auto_incs.entry(t.key()).or_insert_with(AutoIncId::new))
                }
                Value::Named(t) => Value::Named(
                    named
                        .entry(t.key())
                        .or_insert_with(|| NamedId::new(t.name()))
                        .clone(),
                ),
                other => other.clone(),
            };
            (column.clone(), fresh)
        })
        .collect()
}

// ============================================================================
// Named-ID export
// ============================================================================

/// The object nested under a named ID in the metadata export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedIdExport {
    pub id: i64,
}

/// Table → name → exported ID, for every named ID seen in a run.
pub type NamedIdExportMap = IndexMap<String, IndexMap<String, NamedIdExport>>;

// ============================================================================
// Dialect
// ============================================================================

/// SQL flavour to emit.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    /// Backtick-quoted table names, single-quoted string literals
    #[default]
    Mysql,
}

impl fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mysql => write!(f, "mysql"),
        }
    }
}

// ============================================================================
// data-bakery.yaml
// ============================================================================

/// Project configuration. Every key is optional; CLI flags override it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BakeryConfig {
    /// Directory scanned (recursively) for recipe files
    #[serde(default)]
    pub recipes_dir: Option<PathBuf>,

    /// Directory receiving the SQL and metadata files
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// Remove stale files from the output directory before exporting
    #[serde(default)]
    pub empty_output_dir: bool,

    /// Metadata file name, relative to the output directory
    #[serde(default)]
    pub metadata_output: Option<PathBuf>,

    /// First numeric prefix for exported SQL file names
    #[serde(default)]
    pub output_prefix_start: Option<u64>,

    /// SQL dialect to emit
    #[serde(default)]
    pub sql_dialect: Option<SqlDialect>,

    /// Maximum rows per INSERT statement (unbounded when unset)
    #[serde(default)]
    pub batch_size: Option<usize>,

    /// Extra values exposed to recipes as `{{context.KEY}}`
    #[serde(default)]
    pub recipe_context: IndexMap<String, serde_yaml_ng::Value>,

    /// Default columns per table, merged under every row
    #[serde(default)]
    pub table_defaults: IndexMap<String, serde_yaml_ng::Value>,

    /// First sequence value per table (default 1)
    #[serde(default)]
    pub table_start_ids: IndexMap<String, i64>,
}

/// Default metadata file name.
pub const DEFAULT_METADATA_OUTPUT: &str = "exports.json";

// ============================================================================
// Template helper
// ============================================================================

/// Convert a serde_yaml_ng::Value to a string for template resolution.
pub fn yaml_value_to_string(val: &serde_yaml_ng::Value) -> String {
    match val {
        serde_yaml_ng::Value::String(s) => s.clone(),
        serde_yaml_ng::Value::Number(n) => n.to_string(),
        serde_yaml_ng::Value::Bool(b) => b.to_string(),
        serde_yaml_ng::Value::Null => String::new(),
        other => serde_json::to_string(other).unwrap_or_else(|_| format!("{:?}", other)),
    }
}

// ============================================================================
// Tests
// ============================================================================

//! BK-005: Recipe loading, from YAML documents into recipe bundles.
//!
//! A recipe file is a mapping of table name → list of rows. ID tokens are
//! written as YAML tags:
//!
//! ```yaml
//! user:
//!   - id: !auto_inc owner        # shared by every `!auto_inc owner` in this file
//!     email: hi@there.com
//!   - id: !named_id helloWorld
//!     created_at: !raw NOW()
//! orders:
//!   - user_id: !ref user.helloWorld
//!     note: "seeded for {{context.tenant}}, owner id {{ids.user.helloWorld}}"
//! ```
//!
//! String scalars are expanded before conversion: `{{context.KEY}}` reads the
//! recipe context, `{{ids.TABLE.NAME}}` reads (or reserves) a named ID.

use super::error::{BakeryError, Result};
use super::resolver::RecipeManager;
use super::tokens::{get_named_id, AutoIncId, NamedId, RawSql};
use super::types::{yaml_value_to_string, RecipeBundle, Row, SqlDialect, SqlValue, Value};
use indexmap::IndexMap;
use serde_yaml_ng::value::TaggedValue;
use serde_yaml_ng::{Mapping, Value as YamlValue};
use std::collections::HashMap;
use std::path::Path;

/// Values a recipe can read through `{{context.KEY}}`.
#[derive(Debug, Clone, Default)]
pub struct RecipeContext {
    values: IndexMap<String, YamlValue>,
}

impl RecipeContext {
    /// Build the context for a run. `sql_dialect` is always present and
    /// cannot be overridden by extra entries.
    pub fn new(dialect: SqlDialect, extra: &IndexMap<String, YamlValue>) -> Self {
        let mut values = extra.clone();
        values.insert(
            "sql_dialect".to_string(),
            YamlValue::String(dialect.to_string()),
        );
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&YamlValue> {
        self.values.get(key)
    }
}

/// Load a recipe from a YAML (or JSON) file.
pub fn load_recipe(
    path: &Path,
    context: &RecipeContext,
    manager: &mut RecipeManager,
) -> Result<RecipeBundle> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| BakeryError::io("cannot read recipe", path, e))?;
    parse_recipe(&content, path, context, manager)
}

/// Parse a recipe from a YAML string. `origin` is only used in errors.
pub fn parse_recipe(
    yaml: &str,
    origin: &Path,
    context: &RecipeContext,
    manager: &mut RecipeManager,
) -> Result<RecipeBundle> {
    let document: YamlValue = serde_yaml_ng::from_str(yaml)
        .map_err(|e| BakeryError::invalid_recipe(origin, format!("YAML parse error: {}", e)))?;

    let tables = match document {
        YamlValue::Mapping(tables) => tables,
        other => {
            return Err(BakeryError::UnsupportedRecipe {
                path: origin.to_path_buf(),
                found: kind_of(&other),
            })
        }
    };

    let mut loader = Loader::new(origin, context, Some(manager));
    let mut bundle = RecipeBundle::with_capacity(tables.len());

    for (table, rows) in &tables {
        let table = table
            .as_str()
            .ok_or_else(|| loader.invalid(format!("table names must be strings, got {}", kind_of(table))))?;

        let rows = match rows {
            YamlValue::Sequence(rows) => rows,
            other => {
                return Err(loader.invalid(format!(
                    "table '{}' must be a list of rows, got {}",
                    table,
                    kind_of(other)
                )))
            }
        };

        let mut parsed = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            match row {
                YamlValue::Mapping(columns) => parsed.push(loader.row(columns)?),
                other => {
                    return Err(loader.invalid(format!(
                        "row {} of table '{}' must be a mapping, got {}",
                        index,
                        table,
                        kind_of(other)
                    )))
                }
            }
        }
        bundle.insert(table.to_string(), parsed);
    }

    Ok(bundle)
}

/// Parse a row template, e.g. a table-defaults entry from the config file.
///
/// `{{ids.*}}` templates are not available here; there is no manager yet.
pub fn parse_row_template(
    value: &YamlValue,
    origin: &Path,
    context: &RecipeContext,
) -> Result<Row> {
    let mut loader = Loader::new(origin, context, None);
    match value {
        YamlValue::Mapping(columns) => loader.row(columns),
        other => Err(loader.invalid(format!(
            "row template must be a mapping, got {}",
            kind_of(other)
        ))),
    }
}

/// Resolve all `{{...}}` templates in a string.
pub fn resolve_template(
    template: &str,
    context: &RecipeContext,
    mut manager: Option<&mut RecipeManager>,
) -> Result<String> {
    let mut result = template.to_string();
    let mut start = 0;

    while let Some(open) = result[start..].find("{{") {
        let open = start + open;
        let close = result[open..]
            .find("}}")
            .ok_or_else(|| BakeryError::Template(format!("unclosed template at position {}", open)))?;
        let close = open + close + 2;
        let key = result[open + 2..close - 2].trim();

        let value = if let Some(context_key) = key.strip_prefix("context.") {
            context
                .get(context_key)
                .map(yaml_value_to_string)
                .ok_or_else(|| BakeryError::Template(format!("unknown context key: {}", context_key)))?
        } else if let Some(id_key) = key.strip_prefix("ids.") {
            let (table, name) = id_key
                .split_once('.')
                .ok_or_else(|| BakeryError::Template(format!("invalid named ID ref: {}", key)))?;
            let manager = manager.as_deref_mut().ok_or_else(|| {
                BakeryError::Template(format!("named ID lookups are not available here: {}", key))
            })?;
            manager.get_named_id(table, name)?.to_string()
        } else {
            return Err(BakeryError::Template(format!(
                "unknown template variable: {}",
                key
            )));
        };

        result.replace_range(open..close, &value);
        start = open + value.len();
    }

    Ok(result)
}

/// Per-file conversion state.
struct Loader<'a> {
    origin: &'a Path,
    context: &'a RecipeContext,
    manager: Option<&'a mut RecipeManager>,
    /// `!auto_inc label` tokens seen so far in this file
    labels: HashMap<String, AutoIncId>,
}

impl<'a> Loader<'a> {
    fn new(
        origin: &'a Path,
        context: &'a RecipeContext,
        manager: Option<&'a mut RecipeManager>,
    ) -> Self {
        Self {
            origin,
            context,
            manager,
            labels: HashMap::new(),
        }
    }

    fn invalid(&self, message: String) -> BakeryError {
        BakeryError::invalid_recipe(self.origin, message)
    }

    fn expand(&mut self, s: &str) -> Result<String> {
        if !s.contains("{{") {
            return Ok(s.to_string());
        }
        resolve_template(s, self.context, self.manager.as_deref_mut())
    }

    fn row(&mut self, columns: &Mapping) -> Result<Row> {
        let mut row = Row::with_capacity(columns.len());
        for (column, value) in columns {
            let column = column.as_str().ok_or_else(|| {
                self.invalid(format!("column names must be strings, got {}", kind_of(column)))
            })?;
            let value = self.value(value)?;
            row.insert(column.to_string(), value);
        }
        Ok(row)
    }

    fn value(&mut self, value: &YamlValue) -> Result<Value> {
        match value {
            YamlValue::Null => Ok(Value::null()),
            YamlValue::Bool(b) => Ok(Value::from(*b)),
            YamlValue::Number(n) => match (n.as_i64(), n.as_u64()) {
                (Some(i), _) => Ok(Value::from(i)),
                (None, Some(u)) => Ok(Value::Literal(SqlValue::UInt(u))),
                (None, None) => Ok(Value::from(n.as_f64().unwrap_or(f64::NAN))),
            },
            YamlValue::String(s) => Ok(Value::from(self.expand(s)?)),
            YamlValue::Sequence(_) | YamlValue::Mapping(_) => {
                let expanded = self.expand_nested(value)?;
                let json = serde_json::to_string(&expanded)
                    .map_err(|e| self.invalid(format!("cannot store nested value as JSON: {}", e)))?;
                Ok(Value::Literal(SqlValue::Text(json)))
            }
            YamlValue::Tagged(tagged) => self.token(tagged),
        }
    }

    fn expand_nested(&mut self, value: &YamlValue) -> Result<YamlValue> {
        Ok(match value {
            YamlValue::String(s) => YamlValue::String(self.expand(s)?),
            YamlValue::Sequence(items) => YamlValue::Sequence(
                items
                    .iter()
                    .map(|item| self.expand_nested(item))
                    .collect::<Result<_>>()?,
            ),
            YamlValue::Mapping(map) => {
                let mut out = Mapping::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k.clone(), self.expand_nested(v)?);
                }
                YamlValue::Mapping(out)
            }
            other => other.clone(),
        })
    }

    fn token(&mut self, tagged: &TaggedValue) -> Result<Value> {
        let tag = tagged.tag.to_string();
        let tag = tag.trim_start_matches('!');

        match tag {
            "auto_inc" => match &tagged.value {
                YamlValue::Null => Ok(Value::from(AutoIncId::new())),
                YamlValue::String(label) if label.is_empty() => Ok(Value::from(AutoIncId::new())),
                YamlValue::String(label) => Ok(Value::from(
                    *self
                        .labels
                        .entry(label.clone())
                        .or_insert_with(AutoIncId::new),
                )),
                other => Err(self.invalid(format!(
                    "!auto_inc label must be a string, got {}",
                    kind_of(other)
                ))),
            },
            "named_id" => match &tagged.value {
                YamlValue::String(name) if !name.is_empty() => Ok(Value::from(NamedId::new(name.as_str()))),
                _ => Err(self.invalid("!named_id needs a name, e.g. `!named_id specialUser`".to_string())),
            },
            "ref" => self.named_ref(&tagged.value),
            "raw" => match &tagged.value {
                YamlValue::String(sql) => {
                    let sql = self.expand(sql)?;
                    Ok(Value::from(RawSql::new(sql)))
                }
                YamlValue::Number(n) => Ok(Value::from(RawSql::new(n.to_string()))),
                other => Err(self.invalid(format!("!raw needs SQL text, got {}", kind_of(other)))),
            },
            other => Err(self.invalid(format!(
                "unknown tag '!{}', expected one of !auto_inc, !named_id, !ref, !raw",
                other
            ))),
        }
    }

    fn named_ref(&self, value: &YamlValue) -> Result<Value> {
        let parts = match value {
            YamlValue::String(s) => s.split_once('.'),
            YamlValue::Mapping(map) => {
                let table = map.get("table").and_then(YamlValue::as_str);
                let name = map.get("name").and_then(YamlValue::as_str);
                table.zip(name)
            }
            _ => None,
        };

        match parts {
            Some((table, name)) if !table.is_empty() && !name.is_empty() => {
                Ok(Value::from(get_named_id(table, name)))
            }
            _ => Err(self.invalid(
                "!ref needs `table.name` or {table, name}, e.g. `!ref user.specialUser`".to_string(),
            )),
        }
    }
}

/// Human-readable YAML node kind, for error messages.
fn kind_of(value: &YamlValue) -> &'static str {
    match value {
        YamlValue::Null => "null",
        YamlValue::Bool(_) => "boolean",
        YamlValue::Number(_) => "number",
        YamlValue::String(_) => "string",
        YamlValue::Sequence(_) => "sequence",
        YamlValue::Mapping(_) => "mapping",
        YamlValue::Tagged(_) => "tagged value",
    }
}

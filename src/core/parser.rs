//! BK-006: Config parsing, validation, and CLI override merging.
//!
//! Parses data-bakery.yaml and validates:
//! - batch_size must be at least 1
//! - table_start_ids must not be negative and must leave room to count up
//! - table_defaults entries must be mappings
//! - recipes_dir, output_dir and sql_dialect must be set once flags are merged

use super::error::{BakeryError, Result};
use super::recipe::{parse_row_template, RecipeContext};
use super::resolver::{RecipeManagerConfig, TableDefaultFn};
use super::types::{instantiate_row_template, BakeryConfig, SqlDialect, DEFAULT_METADATA_OUTPUT};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "data-bakery.yaml";

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Parse a data-bakery.yaml file from disk.
pub fn parse_config_file(path: &Path) -> Result<BakeryConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| BakeryError::io("cannot read config", path, e))?;
    parse_config(&content)
}

/// Parse a data-bakery.yaml from a string.
pub fn parse_config(yaml: &str) -> Result<BakeryConfig> {
    if yaml.trim().is_empty() {
        return Ok(BakeryConfig::default());
    }
    serde_yaml_ng::from_str(yaml).map_err(|e| BakeryError::Config(format!("YAML parse error: {}", e)))
}

/// Load the config for a run.
///
/// An explicit path must exist. Without one, `data-bakery.yaml` in the
/// working directory is used if present, otherwise every key is unset.
pub fn load_config(explicit: Option<&Path>) -> Result<BakeryConfig> {
    match explicit {
        Some(path) => parse_config_file(path),
        None => {
            let path = Path::new(DEFAULT_CONFIG_FILE);
            if path.exists() {
                parse_config_file(path)
            } else {
                tracing::debug!("no {} found, using flags only", DEFAULT_CONFIG_FILE);
                Ok(BakeryConfig::default())
            }
        }
    }
}

/// Values given on the command line. Set fields win over the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub recipes_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub metadata_output: Option<PathBuf>,
    pub output_prefix_start: Option<u64>,
    pub sql_dialect: Option<SqlDialect>,
    pub batch_size: Option<usize>,
    /// Only ever turns cleanup on
    pub empty_output_dir: bool,
}

/// Merge command-line values into a config.
///
/// The dialect falls back to mysql when neither source names one.
pub fn apply_overrides(config: &mut BakeryConfig, overrides: &ConfigOverrides) {
    if let Some(dir) = &overrides.recipes_dir {
        config.recipes_dir = Some(dir.clone());
    }
    if let Some(dir) = &overrides.output_dir {
        config.output_dir = Some(dir.clone());
    }
    if let Some(path) = &overrides.metadata_output {
        config.metadata_output = Some(path.clone());
    }
    if overrides.output_prefix_start.is_some() {
        config.output_prefix_start = overrides.output_prefix_start;
    }
    if overrides.batch_size.is_some() {
        config.batch_size = overrides.batch_size;
    }
    config.sql_dialect = overrides
        .sql_dialect
        .or(config.sql_dialect)
        .or(Some(SqlDialect::default()));
    config.empty_output_dir |= overrides.empty_output_dir;
}

/// Validate a parsed config. Returns a list of errors (empty = valid).
pub fn validate_config(config: &BakeryConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.batch_size == Some(0) {
        errors.push(ValidationError {
            message: "batch_size must be at least 1".to_string(),
        });
    }

    for (table, start) in &config.table_start_ids {
        if *start < 0 {
            errors.push(ValidationError {
                message: format!("table_start_ids.{} must not be negative, got {}", table, start),
            });
        } else if *start == i64::MAX {
            errors.push(ValidationError {
                message: format!("table_start_ids.{} leaves no IDs after {}", table, start),
            });
        }
    }

    for (table, defaults) in &config.table_defaults {
        if !defaults.is_mapping() {
            errors.push(ValidationError {
                message: format!("table_defaults.{} must be a mapping of column → value", table),
            });
        }
    }

    errors
}

/// Validate a merged config, also requiring the directories a command needs.
pub fn check_config(config: &BakeryConfig, require_output_dir: bool) -> Result<()> {
    let mut errors = validate_config(config);

    if config.recipes_dir.is_none() {
        errors.push(ValidationError {
            message: "recipes_dir is not set (use -r or recipes_dir in the config)".to_string(),
        });
    }
    if require_output_dir && config.output_dir.is_none() {
        errors.push(ValidationError {
            message: "output_dir is not set (use -d or output_dir in the config)".to_string(),
        });
    }
    if config.sql_dialect.is_none() {
        errors.push(ValidationError {
            message: "sql_dialect is not set (use -s or sql_dialect in the config)".to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        Err(BakeryError::Config(messages.join("; ")))
    }
}

/// Fully resolved settings for an export run.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateOptions {
    pub recipes_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Relative paths are taken from the output directory
    pub metadata_output: PathBuf,
    pub empty_output_dir: bool,
    pub output_prefix_start: Option<u64>,
    pub sql_dialect: SqlDialect,
    pub batch_size: Option<usize>,
}

impl GenerateOptions {
    /// Where the metadata file is written.
    pub fn metadata_path(&self) -> PathBuf {
        self.output_dir.join(&self.metadata_output)
    }
}

/// Check a merged config and turn it into run settings.
pub fn resolve_options(config: &BakeryConfig) -> Result<GenerateOptions> {
    check_config(config, true)?;
    Ok(GenerateOptions {
        recipes_dir: config.recipes_dir.clone().unwrap_or_default(),
        output_dir: config.output_dir.clone().unwrap_or_default(),
        metadata_output: config
            .metadata_output
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_METADATA_OUTPUT)),
        empty_output_dir: config.empty_output_dir,
        output_prefix_start: config.output_prefix_start,
        sql_dialect: config.sql_dialect.unwrap_or_default(),
        batch_size: config.batch_size,
    })
}

/// Build resolver settings from a config.
///
/// Each table-defaults entry is parsed once into a row template; every row
/// then receives a fresh copy with its own tokens.
pub fn build_manager_config(
    config: &BakeryConfig,
    context: &RecipeContext,
    origin: &Path,
) -> Result<RecipeManagerConfig> {
    let mut table_defaults: IndexMap<String, TableDefaultFn> = IndexMap::new();
    for (table, value) in &config.table_defaults {
        let template = parse_row_template(value, origin, context)?;
        table_defaults.insert(
            table.clone(),
            Box::new(move || instantiate_row_template(&template)),
        );
    }

    Ok(RecipeManagerConfig {
        table_defaults,
        table_start_ids: config
            .table_start_ids
            .iter()
            .map(|(table, start)| (table.clone(), *start))
            .collect(),
    })
}

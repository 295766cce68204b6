//! BK-000: Error taxonomy for recipe loading, ID resolution, and export.
//!
//! Every failure is fatal to the run. Nothing here is retried; errors
//! propagate to the CLI dispatcher, which reports them and exits non-zero.

use std::path::PathBuf;

/// Result alias used across the core.
pub type Result<T> = std::result::Result<T, BakeryError>;

/// All failure modes of a bake run.
#[derive(Debug, thiserror::Error)]
pub enum BakeryError {
    /// The same `(table, name)` pair was really defined twice.
    #[error("duplicate named ID '{name}' in table '{table}'")]
    DuplicateNamedId { table: String, name: String },

    /// A table's sequence has no values left to issue.
    #[error("ID sequence for table '{table}' is exhausted after {last}")]
    SequenceExhausted { table: String, last: i64 },

    /// A recipe file's top level is not a table mapping.
    #[error("recipe '{}' has an unsupported top-level {found}, expected a mapping of table names to rows", path.display())]
    UnsupportedRecipe { path: PathBuf, found: &'static str },

    /// A recipe file is readable but structurally invalid.
    #[error("invalid recipe '{}': {message}", path.display())]
    InvalidRecipe { path: PathBuf, message: String },

    /// A `{{...}}` template could not be expanded.
    #[error("template error: {0}")]
    Template(String),

    /// The config file or merged options are invalid.
    #[error("config error: {0}")]
    Config(String),

    /// Filesystem failure, with the offending path.
    #[error("{action} '{}': {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Metadata serialization failure.
    #[error("JSON serialize error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BakeryError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid_recipe(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::InvalidRecipe {
            path: path.into(),
            message: message.into(),
        }
    }
}

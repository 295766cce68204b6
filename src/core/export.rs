//! BK-008: Export orchestration. Recipes in, SQL files and metadata out.
//!
//! For each recipe file, in order: load → resolve IDs → serialize → write
//! `<prefix><name>.sql`. One [`RecipeManager`] is shared by every recipe, so
//! IDs stay unique per table across the whole run and named IDs can be
//! referenced across files.

use super::codegen::{sql_for_recipe_bundle, SqlOptions};
use super::error::Result;
use super::files::{export_file_name, write_atomic};
use super::recipe::{load_recipe, RecipeContext};
use super::resolver::RecipeManager;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Settings for an export run.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub output_dir: PathBuf,
    pub context: RecipeContext,
    pub sql: SqlOptions,
    /// Number the output files starting here; unnumbered when `None`
    pub start_prefix: Option<u64>,
}

/// Drives recipe loading, ID resolution, and SQL export for a set of recipes.
#[derive(Debug)]
pub struct ExportGenerator {
    recipe_paths: Vec<PathBuf>,
    manager: RecipeManager,
    config: ExportConfig,
    exported_files_count: usize,
    exported_names: HashSet<String>,
}

impl ExportGenerator {
    pub fn new(recipe_paths: Vec<PathBuf>, manager: RecipeManager, config: ExportConfig) -> Self {
        Self {
            recipe_paths,
            manager,
            config,
            exported_files_count: 0,
            exported_names: HashSet::new(),
        }
    }

    pub fn manager(&self) -> &RecipeManager {
        &self.manager
    }

    /// Export every recipe, in order. Returns the written file paths.
    ///
    /// Stops at the first failure; files already written stay on disk.
    pub fn export_all_recipes(&mut self) -> Result<Vec<PathBuf>> {
        let paths = self.recipe_paths.clone();
        let mut written = Vec::with_capacity(paths.len());
        for path in &paths {
            written.push(self.export_recipe(path)?);
        }
        Ok(written)
    }

    /// Load one recipe, resolve its IDs, and render it as SQL.
    pub fn bake_recipe(&mut self, recipe_path: &Path) -> Result<String> {
        tracing::debug!(recipe = %recipe_path.display(), "loading recipe bundle");
        let bundle = load_recipe(recipe_path, &self.config.context, &mut self.manager)?;
        let prepared = self.manager.prepare_recipe(bundle)?;
        Ok(sql_for_recipe_bundle(&prepared, &self.config.sql))
    }

    fn export_recipe(&mut self, recipe_path: &Path) -> Result<PathBuf> {
        let sql = self.bake_recipe(recipe_path)?;

        let mut file_name = export_file_name(recipe_path);
        if let Some(prefix) = self.export_prefix(self.exported_files_count) {
            file_name = format!("{}{}", prefix, file_name);
        }
        if !self.exported_names.insert(file_name.clone()) {
            tracing::warn!(file = %file_name, recipe = %recipe_path.display(), "export name already used, overwriting");
        }

        let output_path = self.config.output_dir.join(&file_name);
        tracing::debug!(path = %output_path.display(), "writing export");
        write_atomic(&output_path, &sql)?;
        self.exported_files_count += 1;
        tracing::info!(recipe = %recipe_path.display(), output = %output_path.display(), "exported");
        Ok(output_path)
    }

    /// Prefix for the `index`-th exported file, e.g. `098-`.
    ///
    /// Padded to the width of the last prefix of the run, so with a start of
    /// 98 and 5 recipes the prefixes run `098-` … `102-`.
    pub fn export_prefix(&self, index: usize) -> Option<String> {
        let start = self.config.start_prefix?;
        let total = self.recipe_paths.len().max(1) as u64;
        let width = start.saturating_add(total - 1).to_string().len();
        Some(format!("{:0width$}-", start.saturating_add(index as u64), width = width))
    }

    /// Write every named ID generated so far as pretty-printed JSON.
    pub fn export_metadata_file(&self, path: &Path) -> Result<()> {
        let named_ids = self.manager.get_generated_named_ids();
        let mut json = serde_json::to_string_pretty(&named_ids)?;
        json.push('\n');
        write_atomic(path, &json)?;
        tracing::info!(path = %path.display(), "wrote metadata");
        Ok(())
    }
}

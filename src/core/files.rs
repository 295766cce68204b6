//! BK-007: Filesystem helpers for recipe discovery, export naming, output
//! directory cleanup, and atomic writes.

use super::error::{BakeryError, Result};
use glob::Pattern;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Name of the keep-list file in the output directory.
pub const IGNORE_FILE: &str = ".databakeryignore";

/// File extensions picked up as recipes.
pub const RECIPE_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Find every recipe file under `recipes_dir` (recursively), sorted by path.
pub fn get_recipe_file_paths(recipes_dir: &Path) -> Result<Vec<PathBuf>> {
    if !recipes_dir.is_dir() {
        return Err(BakeryError::io(
            "cannot read recipes dir",
            recipes_dir,
            std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
        ));
    }

    let base = Pattern::escape(&recipes_dir.to_string_lossy());
    let mut paths = Vec::new();
    for ext in RECIPE_EXTENSIONS {
        let pattern = format!("{}/**/*.{}", base, ext);
        let entries = glob::glob(&pattern)
            .map_err(|e| BakeryError::Config(format!("invalid recipe glob '{}': {}", pattern, e)))?;
        for entry in entries {
            let path = entry.map_err(|e| {
                let path = e.path().to_path_buf();
                BakeryError::io("cannot read recipes dir", path, e.into_error())
            })?;
            if path.is_file() {
                paths.push(path);
            }
        }
    }

    paths.sort();
    paths.dedup();
    Ok(paths)
}

fn extension_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\.[^.]*$").ok()).as_ref()
}

/// Export file name for a recipe: its file name with the last extension
/// replaced by `.sql` (e.g. `hello.world.yaml` → `hello.world.sql`).
pub fn export_file_name(recipe_path: &Path) -> String {
    let file_name = recipe_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match extension_regex() {
        Some(re) => re.replace(&file_name, ".sql").into_owned(),
        None => file_name,
    }
}

/// Patterns from a `.databakeryignore` file. Blank lines and `#` comments
/// are skipped.
pub fn extract_ignore_patterns(raw: &str) -> Vec<String> {
    raw.lines()
        .filter(|line| !line.trim().is_empty())
        .filter(|line| !line.starts_with('#'))
        .map(|line| line.trim_end().to_string())
        .collect()
}

/// Entries of `output_dir` to remove before an export.
///
/// Kept: hidden entries (including the ignore file itself) and anything a
/// `.databakeryignore` pattern matches. A directory is also kept when a
/// pattern reaches into it, e.g. `fixtures/**/*.sql` keeps `fixtures`.
pub fn get_output_files_to_remove(output_dir: &Path) -> Result<Vec<PathBuf>> {
    let ignore_path = output_dir.join(IGNORE_FILE);
    let patterns = if ignore_path.is_file() {
        let raw = std::fs::read_to_string(&ignore_path)
            .map_err(|e| BakeryError::io("cannot read ignore file", &ignore_path, e))?;
        extract_ignore_patterns(&raw)
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| {
                    BakeryError::Config(format!("invalid pattern '{}' in {}: {}", p, IGNORE_FILE, e))
                })
            })
            .collect::<Result<Vec<_>>>()?
    } else {
        Vec::new()
    };

    let entries = std::fs::read_dir(output_dir)
        .map_err(|e| BakeryError::io("cannot read output dir", output_dir, e))?;

    let mut to_remove = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| BakeryError::io("cannot read output dir", output_dir, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        let is_dir = entry.path().is_dir();
        if !is_kept(&name, is_dir, &patterns) {
            to_remove.push(entry.path());
        }
    }

    to_remove.sort();
    Ok(to_remove)
}

fn is_kept(name: &str, is_dir: bool, patterns: &[Pattern]) -> bool {
    patterns.iter().any(|pattern| {
        if pattern.matches(name) {
            return true;
        }
        if !is_dir {
            return false;
        }
        let first = pattern.as_str().split('/').next().unwrap_or_default();
        pattern.as_str().contains('/')
            && Pattern::new(first).map(|p| p.matches(name)).unwrap_or(false)
    })
}

/// Remove every entry of `output_dir` not protected by the ignore file.
/// Returns what was removed.
pub fn empty_output_dir(output_dir: &Path) -> Result<Vec<PathBuf>> {
    let to_remove = get_output_files_to_remove(output_dir)?;
    for path in &to_remove {
        let result = if path.is_dir() {
            std::fs::remove_dir_all(path)
        } else {
            std::fs::remove_file(path)
        };
        result.map_err(|e| BakeryError::io("cannot remove", path, e))?;
        tracing::debug!(path = %path.display(), "removed stale output");
    }
    Ok(to_remove)
}

/// Make sure the output directory exists, and optionally clear stale files.
pub fn prepare_output_dir(output_dir: &Path, empty: bool) -> Result<()> {
    std::fs::create_dir_all(output_dir)
        .map_err(|e| BakeryError::io("cannot create output dir", output_dir, e))?;

    let stale = get_output_files_to_remove(output_dir)?;
    if stale.is_empty() {
        return Ok(());
    }

    if empty {
        let removed = empty_output_dir(output_dir)?;
        tracing::info!(count = removed.len(), dir = %output_dir.display(), "emptied output dir");
    } else {
        tracing::warn!(
            dir = %output_dir.display(),
            files = stale.len(),
            "output dir is not empty, stale files may remain (use --empty-output-dir)"
        );
    }
    Ok(())
}

/// Write a file atomically (write to temp, then rename).
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| BakeryError::io("cannot create dir", parent, e))?;
        }
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    std::fs::write(&tmp_path, contents)
        .map_err(|e| BakeryError::io("cannot write", &tmp_path, e))?;
    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(BakeryError::io("cannot rename", &tmp_path, e));
    }
    Ok(())
}

//! File tools: create, list, and read into the content cache.

use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};
use ignore::WalkBuilder;
use mender_edit::ContentCache;
use mender_utils::atomic_write;
use serde_json::Value;
use tracing::debug;

use crate::ToolError;

/// Relative paths are taken from the working directory.
pub(crate) fn resolve_path(working_dir: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        working_dir.join(path)
    }
}

fn has_glob_meta(path: &str) -> bool {
    path.contains(['*', '?', '['])
}

// ============================================================================
// create_files / create_folders / list_files
// ============================================================================

/// `files` is a path string, a `{path, content?}` object, or a list of objects.
pub fn create_files(
    working_dir: &Path,
    files: &Value,
    cache: &mut ContentCache,
) -> Result<String, ToolError> {
    let entries: Vec<&Value> = match files {
        Value::Array(items) => items.iter().collect(),
        Value::String(_) | Value::Object(_) => vec![files],
        _ => {
            return Err(ToolError::BadArgs {
                message: "Invalid input type for create_files. Expected string, dict, or list."
                    .to_string(),
            });
        }
    };

    let mut results = Vec::with_capacity(entries.len());
    for entry in entries {
        let (path, content) = match entry {
            Value::String(path) => (path.as_str(), ""),
            Value::Object(map) => {
                let Some(path) = map.get("path").and_then(Value::as_str) else {
                    results.push("Error: Missing 'path' for file".to_string());
                    continue;
                };
                (path, map.get("content").and_then(Value::as_str).unwrap_or(""))
            }
            other => {
                results.push(format!("Error: Invalid file specification: {other}"));
                continue;
            }
        };

        let resolved = resolve_path(working_dir, path);
        let written = resolved
            .parent()
            .map_or(Ok(()), std::fs::create_dir_all)
            .and_then(|()| atomic_write(&resolved, content.as_bytes()));
        match written {
            Ok(()) => {
                cache.insert(resolved, content);
                results.push(format!("File created and cached: {path}"));
            }
            Err(e) => results.push(format!("Error creating file {path}: {e}")),
        }
    }
    Ok(results.join("\n"))
}

pub fn create_folders(working_dir: &Path, paths: &[String]) -> String {
    paths
        .iter()
        .map(|path| match std::fs::create_dir_all(resolve_path(working_dir, path)) {
            Ok(()) => format!("Folder(s) created: {path}"),
            Err(e) => format!("Error creating folder(s) {path}: {e}"),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Entry names in `path`, sorted, one per line.
pub fn list_files(working_dir: &Path, path: &str) -> Result<String, ToolError> {
    let dir = resolve_path(working_dir, path);
    let entries = std::fs::read_dir(&dir).map_err(|e| ToolError::io(&dir, e))?;
    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    Ok(names.join("\n"))
}

// ============================================================================
// read_multiple_files
// ============================================================================

fn glob_matcher(pattern: &Path) -> Result<GlobMatcher, ToolError> {
    let text = pattern.to_string_lossy();
    let mut glob = GlobBuilder::new(&text);
    glob.literal_separator(true);
    glob.build()
        .map(|g| g.compile_matcher())
        .map_err(|e| ToolError::BadArgs {
            message: format!("Invalid glob '{text}': {e}"),
        })
}

/// Longest leading run of components with no glob metacharacters.
fn glob_base(pattern: &Path) -> PathBuf {
    let mut base = PathBuf::new();
    for component in pattern.components() {
        if has_glob_meta(&component.as_os_str().to_string_lossy()) {
            break;
        }
        base.push(component);
    }
    base
}

fn walk_files(root: &Path, max_depth: Option<usize>) -> Vec<PathBuf> {
    let mut builder = WalkBuilder::new(root);
    builder.standard_filters(false);
    builder.max_depth(max_depth);
    builder.sort_by_file_name(|a, b| a.cmp(b));
    builder
        .build()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
        .map(ignore::DirEntry::into_path)
        .collect()
}

/// Expand one requested path into the concrete paths to read.
fn expand(resolved: &Path, recursive: bool) -> Result<Vec<PathBuf>, ToolError> {
    if resolved.is_dir() {
        return Ok(walk_files(resolved, (!recursive).then_some(1)));
    }
    if !has_glob_meta(&resolved.to_string_lossy()) {
        return Ok(vec![resolved.to_path_buf()]);
    }
    let matcher = glob_matcher(resolved)?;
    let base = glob_base(resolved);
    if !base.is_dir() {
        return Ok(Vec::new());
    }
    Ok(walk_files(&base, None)
        .into_iter()
        .filter(|path| matcher.is_match(path))
        .collect())
}

pub fn read_multiple_files(
    working_dir: &Path,
    paths: &[String],
    recursive: bool,
    cache: &mut ContentCache,
) -> String {
    let mut results = Vec::new();
    let mut newly_read = 0usize;
    let mut problems = 0usize;

    for path in paths {
        let resolved = resolve_path(working_dir, path);
        let expanded = match expand(&resolved, recursive) {
            Ok(expanded) => expanded,
            Err(e) => {
                problems += 1;
                results.push(format!("Error reading path '{path}': {e}"));
                continue;
            }
        };
        for file in expanded {
            let shown = file.display();
            if cache.contains(&file) {
                results.push(format!(
                    "File '{shown}' is already cached. No need to read again."
                ));
                continue;
            }
            if !file.is_file() {
                problems += 1;
                results.push(format!("Skipped '{shown}': Not a file."));
                continue;
            }
            match cache.load(&file) {
                Ok(content) => {
                    newly_read += 1;
                    debug!(path = %shown, bytes = content.len(), "Cached file");
                    results.push(format!("File '{shown}' has been read and cached."));
                }
                Err(e) => {
                    problems += 1;
                    results.push(format!("Error reading path '{path}': {e}"));
                }
            }
        }
    }

    if newly_read == 0 && problems == 0 && !results.is_empty() {
        return "All requested files are already cached. No need to read from disk.".to_string();
    }
    results.join("\n")
}

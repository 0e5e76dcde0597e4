//! Local text search over the working tree.
//!
//! Walks with `ignore` so `.gitignore`/`.ignore` rules apply, and matches each
//! line with `regex`. Literal queries are escaped first.

use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobSet};
use ignore::WalkBuilder;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use tracing::debug;

use crate::ToolError;

fn default_path() -> String {
    ".".to_string()
}

const fn default_max_results() -> usize {
    50
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchArgs {
    pub query: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Treat `query` as a regular expression instead of a literal.
    #[serde(default)]
    pub regex: bool,
    /// `"sensitive"`, `"insensitive"`, or smart case (the default).
    pub case: Option<String>,
    /// Only search files matching one of these globs.
    pub glob: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaseMode {
    Smart,
    Sensitive,
    Insensitive,
}

fn parse_case(raw: Option<&str>) -> CaseMode {
    match raw.map(|s| s.trim().to_ascii_lowercase()) {
        Some(ref s) if s == "sensitive" => CaseMode::Sensitive,
        Some(ref s) if s == "insensitive" => CaseMode::Insensitive,
        _ => CaseMode::Smart,
    }
}

fn build_matcher(args: &SearchArgs) -> Result<Regex, ToolError> {
    if args.query.is_empty() {
        return Err(ToolError::BadArgs {
            message: "query must not be empty".to_string(),
        });
    }
    let pattern = if args.regex {
        args.query.clone()
    } else {
        regex::escape(&args.query)
    };
    let insensitive = match parse_case(args.case.as_deref()) {
        CaseMode::Sensitive => false,
        CaseMode::Insensitive => true,
        CaseMode::Smart => !args.query.chars().any(char::is_uppercase),
    };
    RegexBuilder::new(&pattern)
        .case_insensitive(insensitive)
        .build()
        .map_err(|e| ToolError::BadArgs {
            message: format!("Invalid regex '{}': {e}", args.query),
        })
}

fn resolve_glob_list(list: Option<&[String]>) -> Result<Option<GlobSet>, ToolError> {
    let Some(list) = list.filter(|l| !l.is_empty()) else {
        return Ok(None);
    };
    let mut builder = globset::GlobSetBuilder::new();
    for pat in list {
        let trimmed = pat.trim();
        if trimmed.is_empty() {
            return Err(ToolError::BadArgs {
                message: "glob entries must be non-empty".to_string(),
            });
        }
        let mut glob = GlobBuilder::new(trimmed);
        glob.literal_separator(false);
        if cfg!(windows) {
            glob.case_insensitive(true);
        }
        let glob = glob.build().map_err(|e| ToolError::BadArgs {
            message: format!("Invalid glob '{trimmed}': {e}"),
        })?;
        builder.add(glob);
    }
    let set = builder.build().map_err(|e| ToolError::BadArgs {
        message: format!("Invalid glob set: {e}"),
    })?;
    Ok(Some(set))
}

fn display_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Search below `working_dir.join(args.path)` and render `path:line: text` lines.
pub fn search(working_dir: &Path, args: &SearchArgs) -> Result<String, ToolError> {
    let matcher = build_matcher(args)?;
    let include = resolve_glob_list(args.glob.as_deref())?;
    let root: PathBuf = working_dir.join(&args.path);
    if !root.exists() {
        return Err(ToolError::io(
            &root,
            std::io::Error::new(std::io::ErrorKind::NotFound, "search path does not exist"),
        ));
    }

    let mut builder = WalkBuilder::new(&root);
    builder.require_git(false);
    builder.filter_entry(|entry| entry.file_name() != ".git");
    builder.sort_by_file_path(|a, b| a.cmp(b));

    let limit = args.max_results.max(1);
    let mut lines = Vec::new();
    let mut truncated = false;

    'files: for entry in builder.build() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping unreadable entry: {e}");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let path = entry.path();
        let shown = display_path(path, working_dir);
        if let Some(include) = &include
            && !include.is_match(&shown)
            && !path.file_name().is_some_and(|name| include.is_match(name))
        {
            continue;
        }
        // Binary and non-UTF-8 files are skipped.
        let Ok(content) = std::fs::read_to_string(path) else {
            continue;
        };
        for (n, line) in content.lines().enumerate() {
            if !matcher.is_match(line) {
                continue;
            }
            if lines.len() == limit {
                truncated = true;
                break 'files;
            }
            lines.push(format!("{shown}:{}: {}", n + 1, line.trim_end()));
        }
    }

    if lines.is_empty() {
        return Ok(format!("No matches found for '{}'", args.query));
    }
    let mut out = lines.join("\n");
    if truncated {
        out.push_str(&format!("\n... (results truncated at {limit})"));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::json;

    use super::{SearchArgs, search};
    use crate::ToolError;

    fn args(value: serde_json::Value) -> SearchArgs {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn literal_query_reports_path_and_line() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/lib.rs"), "fn a() {}\nfn needle() {}\n").unwrap();
        let out = search(dir.path(), &args(json!({"query": "needle("}))).unwrap();
        assert_eq!(out, "src/lib.rs:2: fn needle() {}");
    }

    #[test]
    fn gitignored_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".gitignore"), "skip.txt\n").unwrap();
        fs::write(dir.path().join("skip.txt"), "needle\n").unwrap();
        fs::write(dir.path().join("keep.txt"), "needle\n").unwrap();
        let out = search(dir.path(), &args(json!({"query": "needle"}))).unwrap();
        assert_eq!(out, "keep.txt:1: needle");
    }

    #[test]
    fn results_are_capped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("many.txt"), "x\n".repeat(10)).unwrap();
        let out = search(dir.path(), &args(json!({"query": "x", "max_results": 3}))).unwrap();
        assert_eq!(out.lines().count(), 4);
        assert!(out.ends_with("(results truncated at 3)"));
    }

    #[test]
    fn smart_case_and_regex_mode() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "Alpha\nbeta\n").unwrap();
        let out = search(dir.path(), &args(json!({"query": "alpha"}))).unwrap();
        assert_eq!(out, "a.txt:1: Alpha");
        let out = search(dir.path(), &args(json!({"query": "Beta"}))).unwrap();
        assert_eq!(out, "No matches found for 'Beta'");
        let out = search(dir.path(), &args(json!({"query": "^b.t", "regex": true}))).unwrap();
        assert_eq!(out, "a.txt:2: beta");
    }

    #[test]
    fn invalid_regex_is_bad_args() {
        let dir = tempfile::tempdir().unwrap();
        let err = search(dir.path(), &args(json!({"query": "(", "regex": true}))).unwrap_err();
        assert!(matches!(err, ToolError::BadArgs { .. }));
    }

    #[test]
    fn glob_filter_limits_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.rs"), "needle\n").unwrap();
        fs::write(dir.path().join("b.py"), "needle\n").unwrap();
        let out = search(dir.path(), &args(json!({"query": "needle", "glob": ["*.py"]}))).unwrap();
        assert_eq!(out, "b.py:1: needle");
    }
}

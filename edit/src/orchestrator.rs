//! Multi-file edit batches.

use std::path::{Path, PathBuf};

use mender_types::{FileEditOutcome, FileEditSpec};
use serde_json::Value;
use tracing::{info, warn};

use crate::applier::apply_and_persist;
use crate::cache::ContentCache;
use crate::error::EditError;
use crate::matcher::MatchConfig;
use crate::parser::{parse_edit_blocks, validate_instructions};

#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    /// One outcome per spec, in input order.
    pub outcomes: Vec<FileEditOutcome>,
    pub console_output: String,
}

/// Normalize a `files` argument into edit specs.
///
/// Accepts one object, an array of objects, or a JSON string encoding either.
pub fn validate_files_structure(value: &Value) -> Result<Vec<FileEditSpec>, EditError> {
    match value {
        Value::String(raw) => {
            let parsed: Value = serde_json::from_str(raw).map_err(|_| {
                EditError::Validation(
                    "'files' must be a dictionary or a list of dictionaries, and should not be a string."
                        .to_string(),
                )
            })?;
            if parsed.is_string() {
                return Err(EditError::Validation(
                    "'files' must be a dictionary or a list of dictionaries, and should not be a string."
                        .to_string(),
                ));
            }
            validate_files_structure(&parsed)
        }
        Value::Object(_) => Ok(vec![file_spec(value)?]),
        Value::Array(items) => {
            if items.is_empty() {
                return Err(EditError::Validation(
                    "'files' key is missing or empty.".to_string(),
                ));
            }
            items.iter().map(file_spec).collect()
        }
        _ => Err(EditError::Validation(
            "Invalid 'files' structure. Expected a dictionary or a list of dictionaries."
                .to_string(),
        )),
    }
}

fn file_spec(value: &Value) -> Result<FileEditSpec, EditError> {
    let Value::Object(map) = value else {
        return Err(EditError::Validation(
            "Each file must be a dictionary.".to_string(),
        ));
    };
    let (Some(path), Some(instructions)) = (map.get("path"), map.get("instructions")) else {
        return Err(EditError::Validation(
            "Each file dictionary must contain 'path' and 'instructions' keys.".to_string(),
        ));
    };
    let (Value::String(path), Value::String(instructions)) = (path, instructions) else {
        return Err(EditError::Validation(
            "'path' and 'instructions' must be strings.".to_string(),
        ));
    };
    FileEditSpec::new(path.as_str(), instructions.as_str()).map_err(|_| {
        EditError::Validation("'path' and 'instructions' must not be empty.".to_string())
    })
}

/// Applies batches of per-file instructions against a working directory.
#[derive(Debug, Clone)]
pub struct EditOrchestrator {
    working_dir: PathBuf,
    matching: MatchConfig,
}

impl EditOrchestrator {
    #[must_use]
    pub fn new(working_dir: impl Into<PathBuf>, matching: MatchConfig) -> Self {
        Self {
            working_dir: working_dir.into(),
            matching,
        }
    }

    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    #[must_use]
    pub fn matching(&self) -> &MatchConfig {
        &self.matching
    }

    /// Resolve a request path against the working directory.
    #[must_use]
    pub fn resolve(&self, path: &str) -> PathBuf {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.working_dir.join(candidate)
        }
    }

    /// Apply every spec in order.
    ///
    /// All instructions are validated before the first file is read, so a
    /// malformed entry leaves every file untouched.
    pub fn apply_batch(
        &self,
        specs: &[FileEditSpec],
        cache: &mut ContentCache,
    ) -> Result<BatchReport, EditError> {
        for spec in specs {
            validate_instructions(&spec.instructions).map_err(|source| {
                EditError::MalformedInstructions {
                    path: spec.path.to_string(),
                    source,
                }
            })?;
        }

        let mut outcomes = Vec::with_capacity(specs.len());
        let mut console = Vec::new();
        for spec in specs {
            let (outcome, lines) = self.apply_file(spec, cache);
            console.push(format!("{}:", spec.path));
            console.extend(lines);
            outcomes.push(outcome);
        }

        Ok(BatchReport {
            outcomes,
            console_output: console.join("\n"),
        })
    }

    fn apply_file(
        &self,
        spec: &FileEditSpec,
        cache: &mut ContentCache,
    ) -> (FileEditOutcome, Vec<String>) {
        let display = spec.path.as_str();
        let path = self.resolve(display);
        info!(path = %path.display(), "Applying edits");

        let content = match cache.load(&path) {
            Ok(content) => content,
            Err(err) => {
                warn!(path = %path.display(), "Failed to read file for editing: {err}");
                let outcome = FileEditOutcome::error(display, err);
                let line = outcome.message.clone();
                return (outcome, vec![line]);
            }
        };

        // Validated up front; an empty list means markers were present but never paired.
        let blocks = parse_edit_blocks(&spec.instructions).unwrap_or_default();
        if blocks.is_empty() {
            let outcome = FileEditOutcome::no_instructions(display);
            let line = outcome.message.clone();
            return (outcome, vec![line]);
        }

        match apply_and_persist(&path, &blocks, &content, &self.matching) {
            Ok(report) => {
                let outcome = if !report.changed() {
                    FileEditOutcome::no_changes(display, report.failed_edits.clone())
                } else {
                    cache.insert(path.clone(), report.edited_content.clone());
                    if report.failed_edits.is_empty() {
                        FileEditOutcome::success(display, report.edited_content.clone())
                    } else {
                        FileEditOutcome::partial_success(
                            display,
                            report.failed_edits.clone(),
                            report.edited_content.clone(),
                        )
                    }
                };
                (outcome, report.console_output)
            }
            Err(err) => {
                warn!(path = %path.display(), "Failed to apply edits: {err}");
                let outcome = FileEditOutcome::error(display, err);
                let line = outcome.message.clone();
                (outcome, vec![line])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use mender_types::{EditStatus, FileEditSpec};
    use serde_json::json;

    use super::{EditOrchestrator, validate_files_structure};
    use crate::cache::ContentCache;
    use crate::error::EditError;
    use crate::matcher::MatchConfig;

    fn orchestrator(dir: &std::path::Path) -> EditOrchestrator {
        EditOrchestrator::new(dir, MatchConfig::default())
    }

    #[test]
    fn accepts_object_array_and_json_string() {
        let one = json!({"path": "a.txt", "instructions": "x"});
        assert_eq!(validate_files_structure(&one).unwrap().len(), 1);

        let many = json!([
            {"path": "a.txt", "instructions": "x"},
            {"path": "b.txt", "instructions": "y", "extra": true}
        ]);
        assert_eq!(validate_files_structure(&many).unwrap().len(), 2);

        let encoded = json!(many.to_string());
        assert_eq!(validate_files_structure(&encoded).unwrap().len(), 2);
    }

    #[test]
    fn rejects_bad_shapes() {
        for bad in [
            json!(42),
            json!([]),
            json!(["a.txt"]),
            json!({"path": "a.txt"}),
            json!({"path": 1, "instructions": "x"}),
            json!({"path": "  ", "instructions": "x"}),
            json!("not json"),
        ] {
            let err = validate_files_structure(&bad).unwrap_err();
            assert!(matches!(err, EditError::Validation(_)), "{bad}: {err}");
        }
    }

    #[test]
    fn malformed_entry_aborts_before_any_write() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "one\n").unwrap();
        let specs = vec![
            FileEditSpec::new("a.txt", "<SEARCH>one</SEARCH><REPLACE>two</REPLACE>").unwrap(),
            FileEditSpec::new("b.txt", "no markers at all").unwrap(),
        ];
        let mut cache = ContentCache::new();
        let err = orchestrator(dir.path())
            .apply_batch(&specs, &mut cache)
            .unwrap_err();
        assert!(matches!(err, EditError::MalformedInstructions { ref path, .. } if path == "b.txt"));
        assert_eq!(fs::read_to_string(dir.path().join("a.txt")).unwrap(), "one\n");
        assert!(cache.is_empty());
    }

    #[test]
    fn statuses_follow_apply_results() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("ok.txt"), "alpha\n").unwrap();
        fs::write(dir.path().join("partial.txt"), "beta\n").unwrap();
        fs::write(dir.path().join("none.txt"), "gamma\n").unwrap();
        fs::write(dir.path().join("empty.txt"), "delta\n").unwrap();

        let specs = vec![
            FileEditSpec::new("ok.txt", "<SEARCH>alpha</SEARCH><REPLACE>ALPHA</REPLACE>").unwrap(),
            FileEditSpec::new(
                "partial.txt",
                "<SEARCH>beta</SEARCH><REPLACE>BETA</REPLACE>\n\
                 <SEARCH>zzzzzzzzzzzzzzzzzzzzzzzz</SEARCH><REPLACE>q</REPLACE>",
            )
            .unwrap(),
            FileEditSpec::new(
                "none.txt",
                "<SEARCH>qqqqqqqqqqqqqqqqqqqqqq</SEARCH><REPLACE>w</REPLACE>",
            )
            .unwrap(),
            FileEditSpec::new("empty.txt", "<SEARCH>a</SEARCH> prose <REPLACE>b</REPLACE>")
                .unwrap(),
        ];
        let mut cache = ContentCache::new();
        let report = orchestrator(dir.path())
            .apply_batch(&specs, &mut cache)
            .unwrap();

        let statuses: Vec<_> = report.outcomes.iter().map(|o| o.status).collect();
        assert_eq!(
            statuses,
            vec![
                EditStatus::Success,
                EditStatus::PartialSuccess,
                EditStatus::NoChanges,
                EditStatus::NoInstructions,
            ]
        );
        assert_eq!(report.outcomes[1].failed_edits.len(), 1);
        assert_eq!(fs::read_to_string(dir.path().join("ok.txt")).unwrap(), "ALPHA\n");
        assert_eq!(cache.get(&dir.path().join("ok.txt")), Some("ALPHA\n"));
        assert_eq!(fs::read_to_string(dir.path().join("none.txt")).unwrap(), "gamma\n");
    }

    #[test]
    fn io_failure_is_isolated_to_its_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("later.txt"), "keep\n").unwrap();
        let specs = vec![
            FileEditSpec::new("missing.txt", "<SEARCH>a</SEARCH><REPLACE>b</REPLACE>").unwrap(),
            FileEditSpec::new("later.txt", "<SEARCH>keep</SEARCH><REPLACE>kept</REPLACE>")
                .unwrap(),
        ];
        let mut cache = ContentCache::new();
        let report = orchestrator(dir.path())
            .apply_batch(&specs, &mut cache)
            .unwrap();
        assert_eq!(report.outcomes[0].status, EditStatus::Error);
        assert!(
            report.outcomes[0]
                .message
                .starts_with("Error editing/applying to file missing.txt:")
        );
        assert_eq!(report.outcomes[1].status, EditStatus::Success);
        assert_eq!(fs::read_to_string(dir.path().join("later.txt")).unwrap(), "kept\n");
    }

    #[test]
    fn absolute_paths_bypass_working_dir() {
        let orch = EditOrchestrator::new("/work", MatchConfig::default());
        assert_eq!(orch.resolve("/etc/hosts"), std::path::PathBuf::from("/etc/hosts"));
        assert_eq!(orch.resolve("src/a.rs"), std::path::PathBuf::from("/work/src/a.rs"));
    }
}
